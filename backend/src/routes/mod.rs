//! Route definitions for the material stock ledger

use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Protected routes - material ledger
        .nest("/materials", material_routes(state))
}

/// Material ledger routes (protected)
fn material_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Catalog
        .route(
            "/items",
            get(handlers::list_materials).post(handlers::create_material),
        )
        .route(
            "/items/:id",
            get(handlers::get_material).put(handlers::update_material),
        )
        // Stock snapshots and ledger audit
        .route("/stock/summary", get(handlers::get_stock_summary))
        .route("/stock/transactions", get(handlers::list_stock_transactions))
        // Purchase batches
        .route(
            "/purchases",
            get(handlers::list_purchases).post(handlers::create_purchase),
        )
        .route("/purchases/:id", get(handlers::get_purchase))
        // Task usage
        .route(
            "/tasks/:task_id/usages",
            get(handlers::list_usages).post(handlers::create_usage),
        )
        .route(
            "/tasks/:task_id/usages/:usage_id",
            put(handlers::update_usage).delete(handlers::delete_usage),
        )
        // Reports
        .route("/reports/monthly", get(handlers::get_monthly_report))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
