//! Material catalog service
//!
//! Items are unique by `(name, spec)` and are never physically deleted,
//! because ledger rows keep a foreign reference to them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    double_option, material_display_name, normalize_reference_cost, normalize_text, normalize_unit,
    require_text, FieldError, MaterialRef, MAX_UNIT_COST,
};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Maximum number of catalog rows returned by a listing
pub const CATALOG_LIST_LIMIT: i64 = 500;

const MATERIAL_COLUMNS: &str =
    "id, name, spec, unit, reference_cost, is_active, created_by, created_at, updated_at";

/// Material catalog service
#[derive(Clone)]
pub struct CatalogService {
    db: PgPool,
}

#[derive(Debug, Clone, FromRow)]
struct MaterialItemRow {
    id: Uuid,
    name: String,
    spec: Option<String>,
    unit: String,
    reference_cost: Decimal,
    is_active: bool,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Catalog entry as returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct MaterialItem {
    pub id: Uuid,
    pub name: String,
    pub spec: Option<String>,
    pub display_name: String,
    pub unit: String,
    pub reference_cost: Decimal,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<MaterialItemRow> for MaterialItem {
    fn from(row: MaterialItemRow) -> Self {
        Self {
            display_name: material_display_name(&row.name, row.spec.as_deref()),
            id: row.id,
            name: row.name,
            spec: row.spec,
            unit: row.unit,
            reference_cost: row.reference_cost,
            is_active: row.is_active,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl MaterialItem {
    pub fn to_ref(&self) -> MaterialRef {
        MaterialRef {
            id: self.id,
            name: self.name.clone(),
            spec: self.spec.clone(),
            unit: self.unit.clone(),
            reference_cost: self.reference_cost,
            is_active: self.is_active,
        }
    }
}

/// Input for creating a catalog entry
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateMaterialInput {
    #[validate(length(max = 120, message = "name must be at most 120 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 120, message = "spec must be at most 120 characters"))]
    pub spec: Option<String>,
    #[validate(length(max = 20, message = "unit must be at most 20 characters"))]
    pub unit: Option<String>,
    pub reference_cost: Option<Decimal>,
    pub is_active: Option<bool>,
}

/// Partial update of a catalog entry
///
/// `spec: null` clears the spec; an absent field is left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateMaterialInput {
    #[validate(length(max = 120, message = "name must be at most 120 characters"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub spec: Option<Option<String>>,
    #[validate(length(max = 20, message = "unit must be at most 20 characters"))]
    pub unit: Option<String>,
    pub reference_cost: Option<Decimal>,
    pub is_active: Option<bool>,
}

impl CatalogService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List catalog items ordered by name, then spec
    pub async fn list(&self, include_inactive: bool) -> AppResult<Vec<MaterialItem>> {
        let rows = sqlx::query_as::<_, MaterialItemRow>(&format!(
            r#"
            SELECT {MATERIAL_COLUMNS}
            FROM material_items
            WHERE ($1 OR is_active)
            ORDER BY name, COALESCE(spec, '')
            LIMIT $2
            "#
        ))
        .bind(include_inactive)
        .bind(CATALOG_LIST_LIMIT)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(MaterialItem::from).collect())
    }

    /// Get a single catalog item
    pub async fn get(&self, id: Uuid) -> AppResult<MaterialItem> {
        find_by_id(&self.db, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Material item".to_string()))
    }

    /// Create a catalog item; a duplicate `(name, spec)` pair is a conflict
    pub async fn create(&self, actor_id: Uuid, input: CreateMaterialInput) -> AppResult<MaterialItem> {
        input.validate()?;

        let name = require_text(input.name.as_deref(), "name")?;
        let spec = normalize_text(input.spec.as_deref());
        let unit = normalize_unit(input.unit.as_deref());
        let reference_cost = reference_cost(input.reference_cost.unwrap_or(Decimal::ZERO))?;

        if let Some(existing) = self.find_by_identity(&name, spec.as_deref(), None).await? {
            return Err(duplicate(Some(&existing)));
        }

        let row = sqlx::query_as::<_, MaterialItemRow>(&format!(
            r#"
            INSERT INTO material_items (name, spec, unit, reference_cost, is_active, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {MATERIAL_COLUMNS}
            "#
        ))
        .bind(&name)
        .bind(&spec)
        .bind(&unit)
        .bind(reference_cost)
        .bind(input.is_active.unwrap_or(true))
        .bind(actor_id)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique_violation)?;

        tracing::info!(material_item_id = %row.id, name = %row.name, "Material item created");

        Ok(row.into())
    }

    /// Update a catalog item in place
    pub async fn update(&self, id: Uuid, input: UpdateMaterialInput) -> AppResult<MaterialItem> {
        input.validate()?;

        let current = self.get(id).await?;

        // A blank name keeps the current one
        let name = normalize_text(input.name.as_deref()).unwrap_or(current.name);
        let spec = match input.spec {
            Some(spec) => normalize_text(spec.as_deref()),
            None => current.spec,
        };
        let unit = match input.unit.as_deref() {
            Some(unit) => normalize_unit(Some(unit)),
            None => current.unit,
        };
        let reference_cost = match input.reference_cost {
            Some(cost) => reference_cost(cost)?,
            None => current.reference_cost,
        };
        let is_active = input.is_active.unwrap_or(current.is_active);

        if let Some(existing) = self.find_by_identity(&name, spec.as_deref(), Some(id)).await? {
            return Err(duplicate(Some(&existing)));
        }

        let row = sqlx::query_as::<_, MaterialItemRow>(&format!(
            r#"
            UPDATE material_items
            SET name = $2, spec = $3, unit = $4, reference_cost = $5, is_active = $6
            WHERE id = $1
            RETURNING {MATERIAL_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&name)
        .bind(&spec)
        .bind(&unit)
        .bind(reference_cost)
        .bind(is_active)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique_violation)?;

        tracing::info!(material_item_id = %row.id, "Material item updated");

        Ok(row.into())
    }

    async fn find_by_identity(
        &self,
        name: &str,
        spec: Option<&str>,
        exclude_id: Option<Uuid>,
    ) -> AppResult<Option<MaterialItem>> {
        let row = sqlx::query_as::<_, MaterialItemRow>(&format!(
            r#"
            SELECT {MATERIAL_COLUMNS}
            FROM material_items
            WHERE name = $1
              AND COALESCE(spec, '') = COALESCE($2, '')
              AND ($3::uuid IS NULL OR id <> $3)
            "#
        ))
        .bind(name)
        .bind(spec)
        .bind(exclude_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(MaterialItem::from))
    }
}

/// Clamped reference cost that still fits its column
fn reference_cost(value: Decimal) -> Result<Decimal, FieldError> {
    let cost = normalize_reference_cost(value);
    if cost >= MAX_UNIT_COST {
        return Err(FieldError::out_of_range("reference_cost"));
    }
    Ok(cost)
}

/// Load one catalog item on any executor, including an open transaction
pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> AppResult<Option<MaterialItem>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, MaterialItemRow>(&format!(
        "SELECT {MATERIAL_COLUMNS} FROM material_items WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(MaterialItem::from))
}

/// Which of `ids` exist in the catalog
pub async fn existing_ids<'e, E>(executor: E, ids: &[Uuid]) -> AppResult<Vec<Uuid>>
where
    E: PgExecutor<'e>,
{
    let found = sqlx::query_scalar::<_, Uuid>("SELECT id FROM material_items WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(executor)
        .await?;
    Ok(found)
}

/// Every catalog item, active or not, in display order
pub async fn all_refs<'e, E>(executor: E) -> AppResult<Vec<MaterialRef>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, MaterialItemRow>(&format!(
        "SELECT {MATERIAL_COLUMNS} FROM material_items ORDER BY name, COALESCE(spec, '')"
    ))
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| MaterialItem::from(row).to_ref())
        .collect())
}

fn duplicate(existing: Option<&MaterialItem>) -> AppError {
    AppError::DuplicateEntry {
        resource: "Material item".to_string(),
        existing: existing.and_then(|item| serde_json::to_value(item).ok()),
    }
}

/// Two concurrent creates can both pass the pre-check; the unique index decides
fn map_unique_violation(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => duplicate(None),
        _ => AppError::DatabaseError(err),
    }
}
