use serde::{Deserialize, Serialize};

use crate::models::{Listing, Money};

#[derive(Deserialize)]
pub struct UpsertListingRequest {
    pub medicine_id: i64,
    pub medicine_name: String,
    pub unit_price: Money,
}

#[derive(Serialize)]
pub struct ListingResponse {
    pub pharmacy_id: i64,
    pub medicine_id: i64,
    pub medicine_name: String,
    pub unit_price: Money,
}

impl From<Listing> for ListingResponse {
    fn from(l: Listing) -> Self {
        Self {
            pharmacy_id: l.pharmacy_id,
            medicine_id: l.medicine_id,
            medicine_name: l.medicine_name,
            unit_price: l.unit_price,
        }
    }
}
