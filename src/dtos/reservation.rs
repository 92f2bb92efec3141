use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Delivery, DeliveryOption, DeliveryStatus, Money, Order, OrderItem, OrderStatus};

#[derive(Deserialize)]
pub struct UpdateReservationStatusRequest {
    pub status: OrderStatus,
}

#[derive(Serialize)]
pub struct ReservationItemResponse {
    pub medicine_id: i64,
    pub quantity: i32,
    pub unit_price: Money,
}

impl From<OrderItem> for ReservationItemResponse {
    fn from(i: OrderItem) -> Self {
        Self { medicine_id: i.medicine_id, quantity: i.quantity, unit_price: i.unit_price }
    }
}

/// Delivery summary embedded in a reservation view.
#[derive(Serialize)]
pub struct ReservationDeliveryResponse {
    pub id: i64,
    pub status: DeliveryStatus,
    pub address: String,
    pub delivery_person: Option<String>,
}

impl From<Delivery> for ReservationDeliveryResponse {
    fn from(d: Delivery) -> Self {
        Self { id: d.id, status: d.status, address: d.address, delivery_person: d.delivery_person }
    }
}

#[derive(Serialize)]
pub struct ReservationResponse {
    pub id: i64,
    pub customer_id: i64,
    pub pharmacy_id: i64,
    pub items: Vec<ReservationItemResponse>,
    pub total_price: Money,
    pub delivery_option: DeliveryOption,
    pub delivery_address: Option<String>,
    pub status: OrderStatus,
    pub transaction_id: String,
    pub paid_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<ReservationDeliveryResponse>,
}

impl From<Order> for ReservationResponse {
    fn from(o: Order) -> Self {
        Self {
            id: o.id,
            customer_id: o.customer_id,
            pharmacy_id: o.pharmacy_id,
            items: o.items.into_iter().map(ReservationItemResponse::from).collect(),
            total_price: o.total_price,
            delivery_option: o.delivery_option,
            delivery_address: o.delivery_address,
            status: o.status,
            transaction_id: o.transaction_id,
            paid_at: o.paid_at,
            delivery: None,
        }
    }
}
