use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::dtos::listing::{ListingResponse, UpsertListingRequest};
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::Listing;
use crate::state::AppState;

pub async fn upsert_listing(
    State(AppState { store, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpsertListingRequest>,
) -> Result<Json<ListingResponse>, AppError> {
    if !auth.is_pharmacy() {
        return Err(AppError::forbidden("Only pharmacies can manage listings"));
    }
    if req.medicine_name.trim().is_empty() {
        return Err(AppError::validation("Medicine name required"));
    }
    if req.unit_price.cents() <= 0 {
        return Err(AppError::validation("Unit price must be greater than 0.00"));
    }

    let listing = store
        .upsert_listing(Listing {
            pharmacy_id: auth.user_id,
            medicine_id: req.medicine_id,
            medicine_name: req.medicine_name,
            unit_price: req.unit_price,
        })
        .await?;
    Ok(Json(listing.into()))
}

pub async fn list_own_listings(
    State(AppState { store, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ListingResponse>>, AppError> {
    if !auth.is_pharmacy() {
        return Err(AppError::forbidden("Only pharmacies can manage listings"));
    }
    let listings = store.listings_for_pharmacy(auth.user_id).await?;
    Ok(Json(listings.into_iter().map(ListingResponse::from).collect()))
}

pub async fn remove_listing(
    State(AppState { store, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(medicine_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !auth.is_pharmacy() {
        return Err(AppError::forbidden("Only pharmacies can manage listings"));
    }
    if !store.remove_listing(auth.user_id, medicine_id).await? {
        return Err(AppError::not_found("Listing not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
