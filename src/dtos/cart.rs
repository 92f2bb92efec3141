use serde::{Deserialize, Serialize};

use crate::models::{CartItem, CheckoutTotals, Money, PharmacyGroup};

#[derive(Deserialize)]
pub struct AddCartItemRequest {
    pub pharmacy_id: i64,
    pub medicine_id: i64,
    pub quantity: i32,
}

#[derive(Deserialize)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

#[derive(Deserialize)]
pub struct CartViewParams {
    // "pickup" (default) or "delivery"; affects the delivery charge shown.
    pub delivery_type: Option<String>,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub id: i64,
    pub pharmacy_id: i64,
    pub medicine_id: i64,
    pub quantity: i32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl From<CartItem> for CartItemResponse {
    fn from(i: CartItem) -> Self {
        Self {
            id: i.id,
            pharmacy_id: i.pharmacy_id,
            medicine_id: i.medicine_id,
            quantity: i.quantity,
            unit_price: i.unit_price,
            line_total: i.unit_price.times(i.quantity),
        }
    }
}

#[derive(Serialize)]
pub struct CartGroupResponse {
    pub pharmacy_id: i64,
    pub subtotal: Money,
    pub items: Vec<CartItemResponse>,
}

impl From<PharmacyGroup> for CartGroupResponse {
    fn from(g: PharmacyGroup) -> Self {
        Self {
            pharmacy_id: g.pharmacy_id,
            subtotal: g.subtotal,
            items: g.items.into_iter().map(CartItemResponse::from).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct CartResponse {
    pub groups: Vec<CartGroupResponse>,
    pub totals: CheckoutTotals,
}
