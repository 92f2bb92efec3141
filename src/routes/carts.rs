use axum::{Router, routing::{get, post, put}, middleware};
use crate::state::AppState;
use crate::handlers::cart::{view_cart, add_item, update_item, remove_item};
use crate::handlers::checkout::payment_init;
use crate::middleware::auth::require_auth;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(view_cart))
        .route("/cart/items", post(add_item))
        .route("/cart/items/{id}", put(update_item).delete(remove_item))
        .route("/cart/payment-init", post(payment_init))
        .layer(middleware::from_fn(require_auth))
}
