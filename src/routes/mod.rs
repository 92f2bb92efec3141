pub mod users;
pub mod listings;
pub mod carts;
pub mod payments;
pub mod reservations;
pub mod deliveries;

use axum::Router;
use crate::state::AppState;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(users::routes())
        .merge(listings::routes())
        .merge(carts::routes())
        .merge(payments::routes())
        .merge(reservations::routes())
        .merge(deliveries::routes())
}
