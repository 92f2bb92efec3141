use axum::{Router, routing::{get, post, put}, middleware};
use crate::state::AppState;
use crate::handlers::delivery::{create, get_delivery, update_status};
use crate::middleware::auth::require_auth;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/deliveries", post(create))
        .route("/deliveries/{id}", get(get_delivery))
        .route("/deliveries/{id}/status", put(update_status))
        .layer(middleware::from_fn(require_auth))
}
