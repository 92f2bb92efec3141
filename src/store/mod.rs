pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{
    CartItem, Delivery, DeliveryStatus, Listing, Money, NewOrder, Order, OrderStatus,
    PaymentSession, SessionOutcome, User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence boundary for the marketplace.
///
/// Implementations must be thread-safe. Status transitions are
/// compare-and-set on the current status so that concurrent updates to the
/// same row serialize without a global lock; `complete_delivery` is the one
/// operation spanning two rows and must be atomic.
#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn create_user(&self, username: &str, password_hash: &str, role: &str)
        -> Result<User, AppError>;
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, AppError>;
    async fn user_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    // Pharmacy listings
    async fn upsert_listing(&self, listing: Listing) -> Result<Listing, AppError>;
    /// Returns false when no such listing existed.
    async fn remove_listing(&self, pharmacy_id: i64, medicine_id: i64) -> Result<bool, AppError>;
    async fn listings_for_pharmacy(&self, pharmacy_id: i64) -> Result<Vec<Listing>, AppError>;
    async fn listing(&self, pharmacy_id: i64, medicine_id: i64)
        -> Result<Option<Listing>, AppError>;

    // Cart
    async fn cart_items(&self, customer_id: i64) -> Result<Vec<CartItem>, AppError>;
    async fn add_cart_item(
        &self,
        customer_id: i64,
        pharmacy_id: i64,
        medicine_id: i64,
        quantity: i32,
        unit_price: Money,
    ) -> Result<CartItem, AppError>;
    async fn set_cart_item_quantity(
        &self,
        customer_id: i64,
        item_id: i64,
        quantity: i32,
    ) -> Result<CartItem, AppError>;
    async fn remove_cart_item(&self, customer_id: i64, item_id: i64) -> Result<(), AppError>;
    /// Deletes exactly the listed cart lines. Lines added after the caller
    /// captured `item_ids` are left in place.
    async fn remove_cart_items(&self, customer_id: i64, item_ids: &[i64]) -> Result<(), AppError>;

    // Payment sessions
    async fn insert_session(&self, session: PaymentSession) -> Result<(), AppError>;
    async fn session(&self, transaction_id: &str) -> Result<Option<PaymentSession>, AppError>;
    /// Compare-and-set `pending -> outcome`. Returns false when the session
    /// was already terminal (a concurrent or duplicate callback won).
    async fn resolve_session(
        &self,
        transaction_id: &str,
        outcome: SessionOutcome,
    ) -> Result<bool, AppError>;
    async fn record_session_orders(
        &self,
        transaction_id: &str,
        order_ids: &[i64],
    ) -> Result<(), AppError>;

    // Orders
    /// Creates one order for one pharmacy group. Fails with `NotFound` when
    /// a referenced listing no longer exists.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, AppError>;
    async fn order(&self, id: i64) -> Result<Option<Order>, AppError>;
    async fn orders_for_customer(&self, customer_id: i64) -> Result<Vec<Order>, AppError>;
    async fn orders_for_pharmacy(&self, pharmacy_id: i64) -> Result<Vec<Order>, AppError>;
    /// Compare-and-set on the current status. Returns false when the row's
    /// status no longer equals `expected`.
    async fn transition_order(
        &self,
        id: i64,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool, AppError>;

    // Deliveries
    /// At most one delivery per order; a second attempt fails with
    /// `Conflict`.
    async fn insert_delivery(
        &self,
        order_id: i64,
        address: &str,
        delivery_person: Option<&str>,
    ) -> Result<Delivery, AppError>;
    async fn delivery(&self, id: i64) -> Result<Option<Delivery>, AppError>;
    async fn delivery_for_order(&self, order_id: i64) -> Result<Option<Delivery>, AppError>;
    async fn transition_delivery(
        &self,
        id: i64,
        expected: DeliveryStatus,
        next: DeliveryStatus,
        delivery_person: Option<&str>,
    ) -> Result<bool, AppError>;
    /// Moves the delivery `out_for_delivery -> delivered` and its order
    /// `accepted -> delivered` in one atomic operation, so the two records
    /// never disagree.
    async fn complete_delivery(
        &self,
        id: i64,
        delivery_person: Option<&str>,
    ) -> Result<(Delivery, Order), AppError>;
}
