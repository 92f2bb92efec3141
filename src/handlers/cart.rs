use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::dtos::cart::{
    AddCartItemRequest, CartGroupResponse, CartItemResponse, CartResponse, CartViewParams,
    UpdateCartItemRequest,
};
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::DeliveryOption;
use crate::state::AppState;
use crate::workflow::cart::{compute_order_totals, group_by_pharmacy};

fn require_customer(auth: &AuthContext) -> Result<(), AppError> {
    if !auth.is_customer() {
        return Err(AppError::forbidden("Only customers have a cart"));
    }
    Ok(())
}

pub async fn view_cart(
    State(AppState { store, fees, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<CartViewParams>,
) -> Result<Json<CartResponse>, AppError> {
    require_customer(&auth)?;

    let delivery_type = match params.delivery_type.as_deref() {
        None => DeliveryOption::Pickup,
        Some(s) => DeliveryOption::parse(s)
            .ok_or_else(|| AppError::validation(format!("Unknown delivery type '{s}'")))?,
    };

    let items = store.cart_items(auth.user_id).await?;
    let groups = group_by_pharmacy(&items);
    let totals = compute_order_totals(&groups, delivery_type, &fees);

    Ok(Json(CartResponse {
        groups: groups.into_iter().map(CartGroupResponse::from).collect(),
        totals,
    }))
}

pub async fn add_item(
    State(AppState { store, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<AddCartItemRequest>,
) -> Result<(StatusCode, Json<CartItemResponse>), AppError> {
    require_customer(&auth)?;
    if req.quantity < 1 {
        return Err(AppError::validation("Quantity must be at least 1"));
    }

    // Snapshot the listing price at add time.
    let listing = store
        .listing(req.pharmacy_id, req.medicine_id)
        .await?
        .ok_or_else(|| AppError::not_found("Listing not found"))?;

    let item = store
        .add_cart_item(auth.user_id, req.pharmacy_id, req.medicine_id, req.quantity, listing.unit_price)
        .await?;
    Ok((StatusCode::CREATED, Json(item.into())))
}

pub async fn update_item(
    State(AppState { store, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(item_id): Path<i64>,
    Json(req): Json<UpdateCartItemRequest>,
) -> Result<Json<CartItemResponse>, AppError> {
    require_customer(&auth)?;
    // Zero quantity is not a state; removal is the deletion mechanism.
    if req.quantity < 1 {
        return Err(AppError::validation("Quantity must be at least 1; remove the item instead"));
    }

    let item = store.set_cart_item_quantity(auth.user_id, item_id, req.quantity).await?;
    Ok(Json(item.into()))
}

pub async fn remove_item(
    State(AppState { store, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(item_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    require_customer(&auth)?;
    store.remove_cart_item(auth.user_id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
