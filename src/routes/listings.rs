use axum::{Router, routing::{get, delete}, middleware};
use crate::state::AppState;
use crate::handlers::listing::{upsert_listing, list_own_listings, remove_listing};
use crate::middleware::auth::require_auth;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/listings", get(list_own_listings).put(upsert_listing))
        .route("/listings/{medicine_id}", delete(remove_listing))
        .layer(middleware::from_fn(require_auth))
}
