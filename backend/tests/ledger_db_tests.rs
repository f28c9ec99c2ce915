//! Ledger write paths against Postgres
//!
//! Each test gets a fresh database with the crate's migrations applied.
//! Run with `DATABASE_URL` pointing at a server that allows creating
//! databases: `cargo test -- --ignored`.

use chrono::NaiveDate;
use material_ledger_backend::error::AppError;
use material_ledger_backend::middleware::AuthUser;
use material_ledger_backend::services::catalog::CreateMaterialInput;
use material_ledger_backend::services::purchase::CreatePurchaseInput;
use material_ledger_backend::services::usage::{CreateUsageInput, UpdateUsageInput};
use material_ledger_backend::services::{
    valuation, CatalogService, LedgerService, PurchaseService, TaskAccessService, UsageService,
};
use rust_decimal::Decimal;
use shared::{end_of_day, fold_positions, PurchaseLineInput, Role};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn material(pool: &PgPool, name: &str) -> Uuid {
    CatalogService::new(pool.clone())
        .create(
            Uuid::new_v4(),
            CreateMaterialInput {
                name: Some(name.to_string()),
                unit: Some("支".to_string()),
                reference_cost: Some(dec("1")),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
}

async fn task(pool: &PgPool) -> Uuid {
    sqlx::query_scalar("INSERT INTO tasks (title) VALUES ('Install drainage') RETURNING id")
        .fetch_one(pool)
        .await
        .unwrap()
}

fn line(material_item_id: Uuid, quantity: &str, unit_cost: &str) -> PurchaseLineInput {
    PurchaseLineInput {
        material_item_id: Some(material_item_id),
        quantity: Some(dec(quantity)),
        unit_cost: Some(dec(unit_cost)),
    }
}

async fn purchase(pool: &PgPool, items: Vec<PurchaseLineInput>) -> Result<Uuid, AppError> {
    PurchaseService::new(pool.clone())
        .create(
            Uuid::new_v4(),
            date(2024, 3, 1),
            CreatePurchaseInput {
                supplier_name: Some("Acme".to_string()),
                purchase_date: Some(date(2024, 3, 1)),
                items: Some(items),
                ..Default::default()
            },
        )
        .await
        .map(|detail| detail.batch.id)
}

async fn count(pool: &PgPool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

/// SQL aggregate, raw delta sum and the in-memory fold must agree
async fn assert_snapshot_matches_ledger(pool: &PgPool, material_item_id: Uuid) {
    let position = valuation::position_of(pool, material_item_id).await.unwrap();

    let summed: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(qty_delta), 0) FROM material_stock_transactions WHERE material_item_id = $1",
    )
    .bind(material_item_id)
    .fetch_one(pool)
    .await
    .unwrap();
    assert_eq!(position.qty, summed);

    let entries = LedgerService::new(pool.clone())
        .entries_before(end_of_day(date(2100, 1, 1)))
        .await
        .unwrap();
    let folded = fold_positions(&entries, None)
        .remove(&material_item_id)
        .unwrap_or_default();
    assert_eq!(folded.qty, position.qty);
    assert_eq!(folded.amount, position.amount);
}

fn same_edit() -> UpdateUsageInput {
    UpdateUsageInput {
        used_qty: Some(dec("4")),
        used_date: Some(date(2024, 3, 2)),
        ..Default::default()
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn repeated_usage_update_keeps_one_ledger_row(pool: PgPool) {
    let pipe = material(&pool, "PVC pipe").await;
    let task_id = task(&pool).await;
    purchase(&pool, vec![line(pipe, "10", "5")]).await.unwrap();
    assert_snapshot_matches_ledger(&pool, pipe).await;

    let usages = UsageService::new(pool.clone());
    let usage = usages
        .create(
            task_id,
            Uuid::new_v4(),
            date(2024, 3, 2),
            CreateUsageInput {
                material_item_id: Some(pipe),
                used_qty: Some(dec("3")),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(usage.unit_cost_snapshot, dec("5"));
    assert_snapshot_matches_ledger(&pool, pipe).await;

    let first = usages
        .update(task_id, usage.id, Uuid::new_v4(), same_edit())
        .await
        .unwrap();
    let after_first = valuation::position_of(&pool, pipe).await.unwrap();
    let second = usages
        .update(task_id, usage.id, Uuid::new_v4(), same_edit())
        .await
        .unwrap();
    let after_second = valuation::position_of(&pool, pipe).await.unwrap();

    assert_eq!(first.total_cost, second.total_cost);
    assert_eq!(after_first.qty, after_second.qty);
    assert_eq!(after_second.qty, dec("6"));
    assert_eq!(after_second.amount, dec("30"));

    let rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM material_stock_transactions WHERE task_material_usage_id = $1",
    )
    .bind(usage.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(rows, 1);
    assert_snapshot_matches_ledger(&pool, pipe).await;
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn deleting_usage_restores_position(pool: PgPool) {
    let sealant = material(&pool, "Sealant").await;
    let task_id = task(&pool).await;
    purchase(&pool, vec![line(sealant, "10", "5"), line(sealant, "10", "7")])
        .await
        .unwrap();
    let before = valuation::position_of(&pool, sealant).await.unwrap();

    let usages = UsageService::new(pool.clone());
    let usage = usages
        .create(
            task_id,
            Uuid::new_v4(),
            date(2024, 3, 3),
            CreateUsageInput {
                material_item_id: Some(sealant),
                used_qty: Some(dec("5")),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(usage.unit_cost_snapshot, dec("6"));
    assert_eq!(usage.total_cost, dec("30"));

    usages.delete(task_id, usage.id).await.unwrap();

    let after = valuation::position_of(&pool, sealant).await.unwrap();
    assert_eq!(after.qty, before.qty);
    assert_eq!(after.amount, before.amount);
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM material_stock_transactions WHERE txn_type = 'task_use'").await,
        0
    );
    assert_snapshot_matches_ledger(&pool, sealant).await;

    let missing = usages.delete(task_id, usage.id).await.unwrap_err();
    assert!(matches!(missing, AppError::NotFound(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn failed_line_rolls_back_whole_batch(pool: PgPool) {
    let pipe = material(&pool, "PVC pipe").await;
    let elbow = material(&pool, "Elbow").await;

    sqlx::query(
        r#"
        CREATE FUNCTION reject_second_line() RETURNS TRIGGER AS $$
        BEGIN
            IF NEW.sort_order = 1 THEN
                RAISE EXCEPTION 'line rejected';
            END IF;
            RETURN NEW;
        END;
        $$ LANGUAGE plpgsql
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "CREATE TRIGGER trg_reject_second_line BEFORE INSERT ON material_purchase_items \
         FOR EACH ROW EXECUTE FUNCTION reject_second_line()",
    )
    .execute(&pool)
    .await
    .unwrap();

    let err = purchase(&pool, vec![line(pipe, "10", "5"), line(elbow, "2", "20")])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DatabaseError(_)));

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM material_purchase_batches").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM material_purchase_items").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM material_stock_transactions").await, 0);

    let untouched = CatalogService::new(pool.clone()).get(pipe).await.unwrap();
    assert_eq!(untouched.reference_cost, dec("1"));
    assert_snapshot_matches_ledger(&pool, pipe).await;
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn purchase_ledger_row_matches_stored_item(pool: PgPool) {
    let pipe = material(&pool, "PVC pipe").await;
    purchase(&pool, vec![line(pipe, "1.00005", "2.123456")])
        .await
        .unwrap();

    let (quantity, unit_cost, amount): (Decimal, Decimal, Decimal) =
        sqlx::query_as("SELECT quantity, unit_cost, amount FROM material_purchase_items")
            .fetch_one(&pool)
            .await
            .unwrap();
    let (qty_delta, txn_cost, amount_delta): (Decimal, Decimal, Decimal) =
        sqlx::query_as("SELECT qty_delta, unit_cost, amount_delta FROM material_stock_transactions")
            .fetch_one(&pool)
            .await
            .unwrap();

    assert_eq!(qty_delta, quantity);
    assert_eq!(txn_cost, unit_cost);
    assert_eq!(amount_delta, amount);
    assert_eq!(quantity, dec("1.0001"));
    assert_eq!(amount, dec("2.12"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn task_access_follows_assignment(pool: PgPool) {
    let assignee = Uuid::new_v4();
    let task_id: Uuid =
        sqlx::query_scalar("INSERT INTO tasks (title, assigned_to_id) VALUES ('Pour slab', $1) RETURNING id")
            .bind(assignee)
            .fetch_one(&pool)
            .await
            .unwrap();
    let access = TaskAccessService::new(pool.clone());

    let worker = AuthUser {
        user_id: assignee,
        role: Role::Worker,
    };
    access.ensure_access(task_id, &worker).await.unwrap();

    let outsider = AuthUser {
        user_id: Uuid::new_v4(),
        role: Role::Worker,
    };
    let denied = access.ensure_access(task_id, &outsider).await.unwrap_err();
    assert!(matches!(denied, AppError::TaskAccessDenied));

    let missing = access.ensure_access(Uuid::new_v4(), &worker).await.unwrap_err();
    assert!(matches!(missing, AppError::NotFound(_)));
}
