pub mod money;
pub mod status;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use money::Money;
pub use status::{DeliveryOption, DeliveryStatus, OrderStatus, SessionOutcome};

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// A pharmacy's offer of one medicine at a unit price.
#[derive(Debug, Clone)]
pub struct Listing {
    pub pharmacy_id: i64,
    pub medicine_id: i64,
    pub medicine_name: String,
    pub unit_price: Money,
}

/// One line of a customer's cart. The unit price is snapshotted from the
/// listing at add time and never re-read from the live listing.
#[derive(Debug, Clone)]
pub struct CartItem {
    pub id: i64,
    pub customer_id: i64,
    pub pharmacy_id: i64,
    pub medicine_id: i64,
    pub quantity: i32,
    pub unit_price: Money,
}

/// Derived grouping of cart items by pharmacy. Never persisted; recomputed
/// from the flat item list whenever it is needed.
#[derive(Debug, Clone)]
pub struct PharmacyGroup {
    pub pharmacy_id: i64,
    pub items: Vec<CartItem>,
    pub subtotal: Money,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CheckoutTotals {
    pub medicine_total: Money,
    pub delivery_charge: Money,
    pub platform_fee: Money,
    pub grand_total: Money,
}

/// Flat delivery fee per distinct pharmacy plus a percentage platform fee
/// on the medicine total.
#[derive(Debug, Clone, Copy)]
pub struct FeeSchedule {
    pub flat_delivery_fee: Money,
    pub platform_fee_basis_points: i64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            flat_delivery_fee: Money::from_cents(6_000),
            platform_fee_basis_points: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub medicine_id: i64,
    pub quantity: i32,
    pub unit_price: Money,
}

/// A single pharmacy's commitment to fulfill the medicines of one checkout
/// group for one customer.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub pharmacy_id: i64,
    pub items: Vec<OrderItem>,
    pub total_price: Money,
    pub delivery_option: DeliveryOption,
    pub delivery_address: Option<String>,
    pub status: OrderStatus,
    pub transaction_id: String,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: i64,
    pub pharmacy_id: i64,
    pub items: Vec<OrderItem>,
    pub total_price: Money,
    pub delivery_option: DeliveryOption,
    pub delivery_address: Option<String>,
    pub transaction_id: String,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: i64,
    pub order_id: i64,
    pub address: String,
    pub delivery_person: Option<String>,
    pub status: DeliveryStatus,
}

/// One cart line as captured at checkout-init, used to detect cart edits
/// racing the gateway callback. Kept sorted for comparison.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub pharmacy_id: i64,
    pub medicine_id: i64,
    pub quantity: i32,
    pub unit_price: Money,
}

impl SnapshotItem {
    pub fn of_cart(items: &[CartItem]) -> Vec<SnapshotItem> {
        let mut snapshot: Vec<SnapshotItem> = items
            .iter()
            .map(|i| SnapshotItem {
                pharmacy_id: i.pharmacy_id,
                medicine_id: i.medicine_id,
                quantity: i.quantity,
                unit_price: i.unit_price,
            })
            .collect();
        snapshot.sort();
        snapshot
    }
}

/// Ephemeral record of one checkout attempt, from gateway redirect to
/// terminal outcome.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub transaction_id: String,
    pub customer_id: i64,
    pub snapshot: Vec<SnapshotItem>,
    pub totals: CheckoutTotals,
    pub delivery_option: DeliveryOption,
    pub delivery_address: Option<String>,
    pub gateway_session_id: String,
    pub outcome: SessionOutcome,
    /// Ids of orders created when the session resolved successfully; the
    /// recorded result returned to duplicate callbacks.
    pub order_ids: Vec<i64>,
}
