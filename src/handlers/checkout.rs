use axum::extract::{Extension, Query, State};
use axum::Json;

use crate::dtos::checkout::{CallbackParams, CallbackResponse, PaymentInitRequest, PaymentInitResponse};
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::services::gateway::verify_callback_token;
use crate::state::AppState;
use crate::workflow::checkout::{handle_gateway_callback, init_checkout};

pub async fn payment_init(
    State(AppState { store, gateway, fees, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<PaymentInitRequest>,
) -> Result<Json<PaymentInitResponse>, AppError> {
    if !auth.is_customer() {
        return Err(AppError::forbidden("Only customers can check out"));
    }

    let init = init_checkout(
        store.as_ref(),
        gateway.as_ref(),
        &fees,
        auth.user_id,
        req.delivery_type,
        req.delivery_address,
    )
    .await?;
    Ok(Json(init.into()))
}

/// Gateway redirect target. Public, but the outcome is only trusted after
/// the signed callback token verifies against the shared gateway secret.
pub async fn payment_callback(
    State(AppState { store, notifier, .. }): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<CallbackResponse>, AppError> {
    let secret = std::env::var("GATEWAY_SECRET")
        .map_err(|_| AppError::internal("Gateway secret not configured"))?;

    let outcome = verify_callback_token(&params.token, &secret, &params.transaction_id)?;
    if outcome.as_str() != params.outcome {
        return Err(AppError::unauthorized("Callback outcome does not match its signature"));
    }

    let result =
        handle_gateway_callback(store.as_ref(), notifier.as_ref(), &params.transaction_id, outcome)
            .await?;
    Ok(Json(result.into()))
}
