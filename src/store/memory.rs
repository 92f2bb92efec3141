//! In-memory store implementation.
//!
//! Backs the workflow tests and the no-database local mode with the same
//! interface as the PostgreSQL implementation. All state lives behind one
//! lock, so multi-row operations are naturally atomic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::models::{
    CartItem, Delivery, DeliveryStatus, Listing, Money, NewOrder, Order, OrderStatus,
    PaymentSession, SessionOutcome, User,
};
use crate::store::Store;

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    listings: Vec<Listing>,
    cart_items: Vec<CartItem>,
    sessions: HashMap<String, PaymentSession>,
    orders: Vec<Order>,
    deliveries: Vec<Delivery>,
    next_id: i64,
}

impl Inner {
    fn mint_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<User, AppError> {
        let mut inner = self.inner.write().await;
        if inner.users.iter().any(|u| u.username == username) {
            return Err(AppError::conflict("Username already exists"));
        }
        let user = User {
            id: inner.mint_id(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role: role.to_string(),
            created_at: Utc::now(),
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().find(|u| u.username == username).cloned())
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn upsert_listing(&self, listing: Listing) -> Result<Listing, AppError> {
        let mut inner = self.inner.write().await;
        match inner
            .listings
            .iter_mut()
            .find(|l| l.pharmacy_id == listing.pharmacy_id && l.medicine_id == listing.medicine_id)
        {
            Some(existing) => *existing = listing.clone(),
            None => inner.listings.push(listing.clone()),
        }
        Ok(listing)
    }

    async fn remove_listing(&self, pharmacy_id: i64, medicine_id: i64) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        let before = inner.listings.len();
        inner
            .listings
            .retain(|l| !(l.pharmacy_id == pharmacy_id && l.medicine_id == medicine_id));
        Ok(inner.listings.len() != before)
    }

    async fn listings_for_pharmacy(&self, pharmacy_id: i64) -> Result<Vec<Listing>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .listings
            .iter()
            .filter(|l| l.pharmacy_id == pharmacy_id)
            .cloned()
            .collect())
    }

    async fn listing(
        &self,
        pharmacy_id: i64,
        medicine_id: i64,
    ) -> Result<Option<Listing>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .listings
            .iter()
            .find(|l| l.pharmacy_id == pharmacy_id && l.medicine_id == medicine_id)
            .cloned())
    }

    async fn cart_items(&self, customer_id: i64) -> Result<Vec<CartItem>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .cart_items
            .iter()
            .filter(|i| i.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn add_cart_item(
        &self,
        customer_id: i64,
        pharmacy_id: i64,
        medicine_id: i64,
        quantity: i32,
        unit_price: Money,
    ) -> Result<CartItem, AppError> {
        let mut inner = self.inner.write().await;
        // Same listing added twice folds into one line.
        if let Some(existing) = inner.cart_items.iter_mut().find(|i| {
            i.customer_id == customer_id
                && i.pharmacy_id == pharmacy_id
                && i.medicine_id == medicine_id
        }) {
            existing.quantity += quantity;
            return Ok(existing.clone());
        }
        let item = CartItem {
            id: inner.mint_id(),
            customer_id,
            pharmacy_id,
            medicine_id,
            quantity,
            unit_price,
        };
        inner.cart_items.push(item.clone());
        Ok(item)
    }

    async fn set_cart_item_quantity(
        &self,
        customer_id: i64,
        item_id: i64,
        quantity: i32,
    ) -> Result<CartItem, AppError> {
        let mut inner = self.inner.write().await;
        let item = inner
            .cart_items
            .iter_mut()
            .find(|i| i.id == item_id && i.customer_id == customer_id)
            .ok_or_else(|| AppError::not_found("Cart item not found"))?;
        item.quantity = quantity;
        Ok(item.clone())
    }

    async fn remove_cart_item(&self, customer_id: i64, item_id: i64) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let before = inner.cart_items.len();
        inner
            .cart_items
            .retain(|i| !(i.id == item_id && i.customer_id == customer_id));
        if inner.cart_items.len() == before {
            return Err(AppError::not_found("Cart item not found"));
        }
        Ok(())
    }

    async fn remove_cart_items(&self, customer_id: i64, item_ids: &[i64]) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        inner
            .cart_items
            .retain(|i| !(i.customer_id == customer_id && item_ids.contains(&i.id)));
        Ok(())
    }

    async fn insert_session(&self, session: PaymentSession) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if inner.sessions.contains_key(&session.transaction_id) {
            return Err(AppError::conflict("Payment session already exists"));
        }
        inner.sessions.insert(session.transaction_id.clone(), session);
        Ok(())
    }

    async fn session(&self, transaction_id: &str) -> Result<Option<PaymentSession>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.sessions.get(transaction_id).cloned())
    }

    async fn resolve_session(
        &self,
        transaction_id: &str,
        outcome: SessionOutcome,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(transaction_id)
            .ok_or_else(|| AppError::not_found("Payment session not found"))?;
        if session.outcome.is_terminal() {
            return Ok(false);
        }
        session.outcome = outcome;
        Ok(true)
    }

    async fn record_session_orders(
        &self,
        transaction_id: &str,
        order_ids: &[i64],
    ) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(transaction_id)
            .ok_or_else(|| AppError::not_found("Payment session not found"))?;
        session.order_ids = order_ids.to_vec();
        Ok(())
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, AppError> {
        let mut inner = self.inner.write().await;
        for item in &order.items {
            let listed = inner
                .listings
                .iter()
                .any(|l| l.pharmacy_id == order.pharmacy_id && l.medicine_id == item.medicine_id);
            if !listed {
                return Err(AppError::not_found(format!(
                    "Medicine {} is no longer listed by pharmacy {}",
                    item.medicine_id, order.pharmacy_id
                )));
            }
        }
        let created = Order {
            id: inner.mint_id(),
            customer_id: order.customer_id,
            pharmacy_id: order.pharmacy_id,
            items: order.items,
            total_price: order.total_price,
            delivery_option: order.delivery_option,
            delivery_address: order.delivery_address,
            status: OrderStatus::Pending,
            transaction_id: order.transaction_id,
            paid_at: order.paid_at,
        };
        inner.orders.push(created.clone());
        Ok(created)
    }

    async fn order(&self, id: i64) -> Result<Option<Order>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn orders_for_customer(&self, customer_id: i64) -> Result<Vec<Order>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .orders
            .iter()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn orders_for_pharmacy(&self, pharmacy_id: i64) -> Result<Vec<Order>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .orders
            .iter()
            .filter(|o| o.pharmacy_id == pharmacy_id)
            .cloned()
            .collect())
    }

    async fn transition_order(
        &self,
        id: i64,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| AppError::not_found("Reservation not found"))?;
        if order.status != expected {
            return Ok(false);
        }
        order.status = next;
        Ok(true)
    }

    async fn insert_delivery(
        &self,
        order_id: i64,
        address: &str,
        delivery_person: Option<&str>,
    ) -> Result<Delivery, AppError> {
        let mut inner = self.inner.write().await;
        if inner.deliveries.iter().any(|d| d.order_id == order_id) {
            return Err(AppError::conflict("Delivery already exists for this reservation"));
        }
        let delivery = Delivery {
            id: inner.mint_id(),
            order_id,
            address: address.to_string(),
            delivery_person: delivery_person.map(str::to_string),
            status: DeliveryStatus::Pending,
        };
        inner.deliveries.push(delivery.clone());
        Ok(delivery)
    }

    async fn delivery(&self, id: i64) -> Result<Option<Delivery>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.deliveries.iter().find(|d| d.id == id).cloned())
    }

    async fn delivery_for_order(&self, order_id: i64) -> Result<Option<Delivery>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.deliveries.iter().find(|d| d.order_id == order_id).cloned())
    }

    async fn transition_delivery(
        &self,
        id: i64,
        expected: DeliveryStatus,
        next: DeliveryStatus,
        delivery_person: Option<&str>,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        let delivery = inner
            .deliveries
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| AppError::not_found("Delivery not found"))?;
        if delivery.status != expected {
            return Ok(false);
        }
        delivery.status = next;
        if let Some(person) = delivery_person {
            delivery.delivery_person = Some(person.to_string());
        }
        Ok(true)
    }

    async fn complete_delivery(
        &self,
        id: i64,
        delivery_person: Option<&str>,
    ) -> Result<(Delivery, Order), AppError> {
        // One critical section covers both records; either both move to
        // delivered or neither does.
        let mut inner = self.inner.write().await;

        let (order_id, current) = {
            let delivery = inner
                .deliveries
                .iter()
                .find(|d| d.id == id)
                .ok_or_else(|| AppError::not_found("Delivery not found"))?;
            (delivery.order_id, delivery.status)
        };
        if current != DeliveryStatus::OutForDelivery {
            return Err(AppError::invalid_transition(current.as_str(), DeliveryStatus::Delivered.as_str()));
        }

        let order_status = inner
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .map(|o| o.status)
            .ok_or_else(|| AppError::not_found("Reservation not found"))?;
        if order_status != OrderStatus::Accepted {
            return Err(AppError::invalid_transition(order_status.as_str(), OrderStatus::Delivered.as_str()));
        }

        let delivery = inner
            .deliveries
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| AppError::not_found("Delivery not found"))?;
        delivery.status = DeliveryStatus::Delivered;
        if let Some(person) = delivery_person {
            delivery.delivery_person = Some(person.to_string());
        }
        let delivery = delivery.clone();

        let order = inner
            .orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| AppError::not_found("Reservation not found"))?;
        order.status = OrderStatus::Delivered;
        let order = order.clone();

        Ok((delivery, order))
    }
}
