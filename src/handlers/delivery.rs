use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::dtos::delivery::{CreateDeliveryRequest, DeliveryResponse, UpdateDeliveryStatusRequest};
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::state::AppState;
use crate::workflow::fulfillment::{advance_delivery, create_delivery};

pub async fn create(
    State(AppState { store, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateDeliveryRequest>,
) -> Result<(StatusCode, Json<DeliveryResponse>), AppError> {
    if !auth.is_pharmacy() {
        return Err(AppError::forbidden("Only pharmacies dispatch deliveries"));
    }

    let delivery = create_delivery(
        store.as_ref(),
        req.reservation_id,
        auth.user_id,
        req.address,
        req.delivery_person.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(DeliveryResponse::new(delivery, None))))
}

pub async fn get_delivery(
    State(AppState { store, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<DeliveryResponse>, AppError> {
    let delivery = store
        .delivery(id)
        .await?
        .ok_or_else(|| AppError::not_found("Delivery not found"))?;
    let order = store
        .order(delivery.order_id)
        .await?
        .ok_or_else(|| AppError::not_found("Reservation not found"))?;

    let allowed = auth.is_admin()
        || (auth.is_customer() && order.customer_id == auth.user_id)
        || (auth.is_pharmacy() && order.pharmacy_id == auth.user_id);
    if !allowed {
        return Err(AppError::forbidden("Not your delivery"));
    }
    Ok(Json(DeliveryResponse::new(delivery, Some(order.into()))))
}

pub async fn update_status(
    State(AppState { store, notifier, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateDeliveryStatusRequest>,
) -> Result<Json<DeliveryResponse>, AppError> {
    if !auth.is_pharmacy() {
        return Err(AppError::forbidden("Only pharmacies update delivery status"));
    }

    let (delivery, order) = advance_delivery(
        store.as_ref(),
        notifier.as_ref(),
        id,
        auth.user_id,
        req.delivery_status,
        req.delivery_person.as_deref(),
    )
    .await?;
    Ok(Json(DeliveryResponse::new(delivery, order.map(Into::into))))
}
