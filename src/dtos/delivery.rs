use serde::{Deserialize, Serialize};

use crate::dtos::reservation::ReservationResponse;
use crate::models::{Delivery, DeliveryStatus};

#[derive(Deserialize)]
pub struct CreateDeliveryRequest {
    pub reservation_id: i64,
    // Defaults to the reservation's delivery address.
    pub address: Option<String>,
    pub delivery_person: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateDeliveryStatusRequest {
    pub delivery_status: DeliveryStatus,
    pub delivery_person: Option<String>,
}

#[derive(Serialize)]
pub struct DeliveryResponse {
    pub id: i64,
    pub reservation_id: i64,
    pub address: String,
    pub delivery_person: Option<String>,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation: Option<ReservationResponse>,
}

impl DeliveryResponse {
    pub fn new(d: Delivery, reservation: Option<ReservationResponse>) -> Self {
        Self {
            id: d.id,
            reservation_id: d.order_id,
            address: d.address,
            delivery_person: d.delivery_person,
            status: d.status,
            reservation,
        }
    }
}
