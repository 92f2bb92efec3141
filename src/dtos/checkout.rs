use serde::{Deserialize, Serialize};

use crate::dtos::reservation::ReservationResponse;
use crate::models::{CheckoutTotals, DeliveryOption, SessionOutcome};
use crate::workflow::checkout::{CallbackResult, CheckoutInit};

#[derive(Deserialize)]
pub struct PaymentInitRequest {
    pub delivery_type: DeliveryOption,
    pub delivery_address: Option<String>,
}

#[derive(Serialize)]
pub struct PaymentInitResponse {
    pub transaction_id: String,
    pub gateway_page_url: String,
    pub totals: CheckoutTotals,
}

impl From<CheckoutInit> for PaymentInitResponse {
    fn from(init: CheckoutInit) -> Self {
        Self {
            transaction_id: init.transaction_id,
            gateway_page_url: init.gateway_page_url,
            totals: init.totals,
        }
    }
}

/// Gateway redirect query: outcome and the signed token attesting it.
#[derive(Deserialize)]
pub struct CallbackParams {
    pub transaction_id: String,
    pub outcome: String,
    pub token: String,
}

#[derive(Serialize)]
pub struct FailedGroupResponse {
    pub pharmacy_id: i64,
    pub reason: String,
}

#[derive(Serialize)]
pub struct CallbackResponse {
    pub outcome: SessionOutcome,
    pub reservations: Vec<ReservationResponse>,
    pub failed_groups: Vec<FailedGroupResponse>,
    pub already_resolved: bool,
}

impl From<CallbackResult> for CallbackResponse {
    fn from(result: CallbackResult) -> Self {
        Self {
            outcome: result.outcome,
            reservations: result.orders.into_iter().map(ReservationResponse::from).collect(),
            failed_groups: result
                .failed_groups
                .into_iter()
                .map(|f| FailedGroupResponse { pharmacy_id: f.pharmacy_id, reason: f.reason })
                .collect(),
            already_resolved: result.already_resolved,
        }
    }
}
