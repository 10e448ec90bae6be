use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{audit, competitions, handlers, holds};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Audit
        .route("/audit", get(audit::query_audit))
        // Competitions (admin + reporting surface)
        .route("/competitions", post(competitions::create_competition))
        .route("/competitions", get(competitions::list_competitions))
        .route("/competitions/{id}", get(competitions::get_competition))
        .route("/competitions/{id}/snapshot", get(competitions::get_snapshot))
        .route("/competitions/{id}/entries", get(competitions::list_entries))
        // Scheduler triggers
        .route("/competitions/{id}/close", post(competitions::close_competition))
        .route("/competitions/{id}/draw", post(competitions::draw_competition))
        .route("/competitions/{id}/draw", get(competitions::get_draw))
        // Holds (cart surface)
        .route("/holds", post(holds::create_hold))
        .route("/holds/{id}", get(holds::get_hold))
        .route("/holds/{id}", delete(holds::release_hold))
        .route("/holds/{id}/renew", post(holds::renew_hold))
        .route("/holds/{id}/purchase", post(holds::purchase))
        .route("/holds/{id}/complete", post(holds::complete_purchase))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
