use axum::extract::{Extension, Path, State};
use axum::Json;

use crate::dtos::reservation::{ReservationResponse, UpdateReservationStatusRequest};
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::state::AppState;
use crate::workflow::fulfillment::update_order_status;

pub async fn list_reservations(
    State(AppState { store, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ReservationResponse>>, AppError> {
    let orders = if auth.is_customer() {
        store.orders_for_customer(auth.user_id).await?
    } else if auth.is_pharmacy() {
        store.orders_for_pharmacy(auth.user_id).await?
    } else {
        return Err(AppError::forbidden("No reservation list for this role"));
    };
    Ok(Json(orders.into_iter().map(ReservationResponse::from).collect()))
}

pub async fn get_reservation(
    State(AppState { store, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<ReservationResponse>, AppError> {
    let order = store
        .order(id)
        .await?
        .ok_or_else(|| AppError::not_found("Reservation not found"))?;

    let allowed = auth.is_admin()
        || (auth.is_customer() && order.customer_id == auth.user_id)
        || (auth.is_pharmacy() && order.pharmacy_id == auth.user_id);
    if !allowed {
        return Err(AppError::forbidden("Not your reservation"));
    }

    let mut response = ReservationResponse::from(order);
    response.delivery = store.delivery_for_order(id).await?.map(Into::into);
    Ok(Json(response))
}

pub async fn update_reservation_status(
    State(AppState { store, notifier, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateReservationStatusRequest>,
) -> Result<Json<ReservationResponse>, AppError> {
    if !auth.is_pharmacy() {
        return Err(AppError::forbidden("Only pharmacies update reservation status"));
    }

    let order =
        update_order_status(store.as_ref(), notifier.as_ref(), id, auth.user_id, req.status).await?;
    Ok(Json(order.into()))
}
