use axum::{Router, routing::{get, put}, middleware};
use crate::state::AppState;
use crate::handlers::reservation::{list_reservations, get_reservation, update_reservation_status};
use crate::middleware::auth::require_auth;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reservations", get(list_reservations))
        .route("/reservations/{id}", get(get_reservation))
        .route("/reservations/{id}/status", put(update_reservation_status))
        .layer(middleware::from_fn(require_auth))
}
