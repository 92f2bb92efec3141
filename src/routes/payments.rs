use axum::{Router, routing::get};
use crate::state::AppState;
use crate::handlers::checkout::payment_callback;

// The gateway redirects the shopper here; it carries its own signed
// token, so this stays outside the bearer-auth layer.
pub fn routes() -> Router<AppState> {
    Router::new().route("/payment/callback", get(payment_callback))
}
