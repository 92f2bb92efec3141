//! Checkout/payment reconciliation.
//!
//! `init_checkout` snapshots the cart into a pending payment session and
//! obtains the hosted-checkout redirect. `handle_gateway_callback` resolves
//! the session exactly once and, on success, converts the cart into one
//! pending order per pharmacy group. Order creation is per-group
//! independent: a single payment funds multiple pharmacies, so one group
//! failing must not roll back orders already placed with the others.

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    CheckoutTotals, DeliveryOption, FeeSchedule, NewOrder, Order, OrderItem, PaymentSession,
    SessionOutcome, SnapshotItem,
};
use crate::services::notifier::notify_best_effort;
use crate::services::{NotificationKind, Notifier, PaymentGateway, SessionMetadata};
use crate::store::Store;
use crate::workflow::cart::{compute_order_totals, group_by_pharmacy};

pub const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);
pub const CURRENCY: &str = "USD";

#[derive(Debug, Clone)]
pub struct CheckoutInit {
    pub transaction_id: String,
    pub gateway_page_url: String,
    pub totals: CheckoutTotals,
}

#[derive(Debug)]
pub struct GroupFailure {
    pub pharmacy_id: i64,
    pub reason: String,
}

#[derive(Debug)]
pub struct CallbackResult {
    pub outcome: SessionOutcome,
    pub orders: Vec<Order>,
    pub failed_groups: Vec<GroupFailure>,
    /// True when this callback was a duplicate and the recorded result of
    /// the first resolution is being returned.
    pub already_resolved: bool,
}

pub async fn init_checkout(
    store: &dyn Store,
    gateway: &dyn PaymentGateway,
    fees: &FeeSchedule,
    customer_id: i64,
    delivery_option: DeliveryOption,
    delivery_address: Option<String>,
) -> Result<CheckoutInit, AppError> {
    let delivery_address = delivery_address.filter(|a| !a.trim().is_empty());
    if delivery_option == DeliveryOption::Delivery && delivery_address.is_none() {
        return Err(AppError::validation("Delivery address is required for home delivery"));
    }

    let items = store.cart_items(customer_id).await?;
    if items.is_empty() {
        return Err(AppError::validation("Cart is empty"));
    }

    let groups = group_by_pharmacy(&items);
    let totals = compute_order_totals(&groups, delivery_option, fees);

    let transaction_id = Uuid::new_v4().to_string();
    let metadata = SessionMetadata { transaction_id: transaction_id.clone(), customer_id };

    // Bounded call to the gateway. On timeout nothing has been persisted
    // and no money has moved, so the customer simply retries.
    let gateway_session =
        match tokio::time::timeout(GATEWAY_TIMEOUT, gateway.create_session(totals.grand_total, CURRENCY, &metadata))
            .await
        {
            Ok(result) => result?,
            Err(_) => return Err(AppError::external("Payment gateway timed out")),
        };

    store
        .insert_session(PaymentSession {
            transaction_id: transaction_id.clone(),
            customer_id,
            snapshot: SnapshotItem::of_cart(&items),
            totals,
            delivery_option,
            delivery_address,
            gateway_session_id: gateway_session.gateway_session_id,
            outcome: SessionOutcome::Pending,
            order_ids: Vec::new(),
        })
        .await?;

    tracing::info!(
        %transaction_id,
        customer_id,
        grand_total = %totals.grand_total,
        "Checkout initiated"
    );

    Ok(CheckoutInit {
        transaction_id,
        gateway_page_url: gateway_session.redirect_url,
        totals,
    })
}

pub async fn handle_gateway_callback(
    store: &dyn Store,
    notifier: &dyn Notifier,
    transaction_id: &str,
    outcome: SessionOutcome,
) -> Result<CallbackResult, AppError> {
    if !outcome.is_terminal() {
        return Err(AppError::validation("Gateway outcome must be terminal"));
    }

    let session = store
        .session(transaction_id)
        .await?
        .ok_or_else(|| AppError::not_found("Payment session not found"))?;

    // Gateway retries and webhook duplicates must not re-create orders.
    if session.outcome.is_terminal() {
        return recorded_result(store, &session.order_ids, session.outcome).await;
    }

    if outcome != SessionOutcome::Success {
        if !store.resolve_session(transaction_id, outcome).await? {
            let session = reload_session(store, transaction_id).await?;
            return recorded_result(store, &session.order_ids, session.outcome).await;
        }
        tracing::info!(transaction_id, outcome = outcome.as_str(), "Checkout not completed");
        return Ok(CallbackResult {
            outcome,
            orders: Vec::new(),
            failed_groups: Vec::new(),
            already_resolved: false,
        });
    }

    // The customer paid for the snapshot taken at init. A cart edited since
    // then must not be silently converted into orders.
    let items = store.cart_items(session.customer_id).await?;
    if SnapshotItem::of_cart(&items) != session.snapshot {
        store.resolve_session(transaction_id, SessionOutcome::Failed).await?;
        return Err(AppError::state_conflict(
            "Cart changed since checkout began; please review your cart and retry",
        ));
    }

    // Claim the session before creating anything so a concurrent duplicate
    // callback cannot double-create orders.
    if !store.resolve_session(transaction_id, SessionOutcome::Success).await? {
        let session = reload_session(store, transaction_id).await?;
        return recorded_result(store, &session.order_ids, session.outcome).await;
    }

    // The lines paid for are the ones fetched for the comparison above; a
    // line added concurrently from here on is not covered by this payment
    // and must survive the cart cleanup below.
    let paid_item_ids: Vec<i64> = items.iter().map(|i| i.id).collect();

    let paid_at = Utc::now();
    let mut orders = Vec::new();
    let mut failed_groups = Vec::new();

    for group in group_by_pharmacy(&items) {
        let new_order = NewOrder {
            customer_id: session.customer_id,
            pharmacy_id: group.pharmacy_id,
            items: group
                .items
                .iter()
                .map(|i| OrderItem {
                    medicine_id: i.medicine_id,
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                })
                .collect(),
            total_price: group.subtotal,
            delivery_option: session.delivery_option,
            delivery_address: session.delivery_address.clone(),
            transaction_id: transaction_id.to_string(),
            paid_at,
        };
        match store.insert_order(new_order).await {
            Ok(order) => orders.push(order),
            Err(e) => {
                tracing::warn!(
                    transaction_id,
                    pharmacy_id = group.pharmacy_id,
                    error = ?e,
                    "Order creation failed for pharmacy group"
                );
                failed_groups.push(GroupFailure {
                    pharmacy_id: group.pharmacy_id,
                    reason: failure_reason(&e),
                });
            }
        }
    }

    let order_ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
    store.record_session_orders(transaction_id, &order_ids).await?;
    store.remove_cart_items(session.customer_id, &paid_item_ids).await?;

    notify_best_effort(
        notifier,
        NotificationKind::PaymentSuccess,
        session.customer_id,
        serde_json::json!({
            "transaction_id": transaction_id,
            "grand_total": session.totals.grand_total,
            "orders": order_ids,
        }),
    )
    .await;
    for order in &orders {
        notify_best_effort(
            notifier,
            NotificationKind::ReservationConfirmed,
            session.customer_id,
            serde_json::json!({
                "reservation_id": order.id,
                "pharmacy_id": order.pharmacy_id,
                "total_price": order.total_price,
            }),
        )
        .await;
    }

    tracing::info!(
        transaction_id,
        orders = orders.len(),
        failed_groups = failed_groups.len(),
        "Checkout completed"
    );

    Ok(CallbackResult {
        outcome: SessionOutcome::Success,
        orders,
        failed_groups,
        already_resolved: false,
    })
}

async fn reload_session(store: &dyn Store, transaction_id: &str) -> Result<PaymentSession, AppError> {
    store
        .session(transaction_id)
        .await?
        .ok_or_else(|| AppError::not_found("Payment session not found"))
}

async fn recorded_result(
    store: &dyn Store,
    order_ids: &[i64],
    outcome: SessionOutcome,
) -> Result<CallbackResult, AppError> {
    let mut orders = Vec::with_capacity(order_ids.len());
    for id in order_ids {
        if let Some(order) = store.order(*id).await? {
            orders.push(order);
        }
    }
    Ok(CallbackResult { outcome, orders, failed_groups: Vec::new(), already_resolved: true })
}

fn failure_reason(e: &AppError) -> String {
    match e {
        AppError::NotFound(msg)
        | AppError::ValidationError(msg)
        | AppError::Conflict(msg)
        | AppError::StateConflict(msg)
        | AppError::ExternalService(msg) => msg.clone(),
        _ => "Order creation failed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CartItem, Listing, Money, OrderStatus};
    use crate::services::gateway::MockGateway;
    use crate::services::notifier::RecordingNotifier;
    use crate::store::MemoryStore;

    async fn seed_two_pharmacy_cart(store: &MemoryStore) -> i64 {
        let customer = store.create_user("amal", "hash", "customer").await.unwrap();
        for (pharmacy_id, medicine_id, name, cents) in
            [(101, 1, "Paracetamol 500mg", 1_000), (102, 2, "Cetirizine 10mg", 500)]
        {
            store
                .upsert_listing(Listing {
                    pharmacy_id,
                    medicine_id,
                    medicine_name: name.to_string(),
                    unit_price: Money::from_cents(cents),
                })
                .await
                .unwrap();
        }
        store.add_cart_item(customer.id, 101, 1, 2, Money::from_cents(1_000)).await.unwrap();
        store.add_cart_item(customer.id, 102, 2, 3, Money::from_cents(500)).await.unwrap();
        customer.id
    }

    async fn init(
        store: &MemoryStore,
        gateway: &MockGateway,
        customer_id: i64,
    ) -> CheckoutInit {
        init_checkout(
            store,
            gateway,
            &FeeSchedule::default(),
            customer_id,
            DeliveryOption::Delivery,
            Some("12 Lake Road".to_string()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn successful_checkout_creates_one_order_per_pharmacy() {
        let store = MemoryStore::new();
        let gateway = MockGateway::new();
        let notifier = RecordingNotifier::new();
        let customer_id = seed_two_pharmacy_cart(&store).await;

        let init = init(&store, &gateway, customer_id).await;
        assert_eq!(init.totals.medicine_total.to_string(), "35.00");
        assert_eq!(init.totals.delivery_charge.to_string(), "120.00");
        assert_eq!(init.totals.platform_fee.to_string(), "0.11");
        assert_eq!(init.totals.grand_total.to_string(), "155.11");
        // Init must not touch the cart.
        assert_eq!(store.cart_items(customer_id).await.unwrap().len(), 2);

        let result = handle_gateway_callback(&store, &notifier, &init.transaction_id, SessionOutcome::Success)
            .await
            .unwrap();
        assert!(!result.already_resolved);
        assert_eq!(result.orders.len(), 2);
        assert!(result.failed_groups.is_empty());
        for order in &result.orders {
            assert_eq!(order.status, OrderStatus::Pending);
            assert_eq!(order.transaction_id, init.transaction_id);
            assert_eq!(order.delivery_option, DeliveryOption::Delivery);
        }
        assert!(store.cart_items(customer_id).await.unwrap().is_empty());

        assert_eq!(notifier.count_of(NotificationKind::PaymentSuccess), 1);
        assert_eq!(notifier.count_of(NotificationKind::ReservationConfirmed), 2);
    }

    #[tokio::test]
    async fn cancelled_outcome_leaves_cart_untouched() {
        let store = MemoryStore::new();
        let gateway = MockGateway::new();
        let notifier = RecordingNotifier::new();
        let customer_id = seed_two_pharmacy_cart(&store).await;

        let init = init(&store, &gateway, customer_id).await;
        let result =
            handle_gateway_callback(&store, &notifier, &init.transaction_id, SessionOutcome::Cancelled)
                .await
                .unwrap();

        assert_eq!(result.outcome, SessionOutcome::Cancelled);
        assert!(result.orders.is_empty());
        assert_eq!(store.cart_items(customer_id).await.unwrap().len(), 2);
        let session = store.session(&init.transaction_id).await.unwrap().unwrap();
        assert_eq!(session.outcome, SessionOutcome::Cancelled);
        assert_eq!(notifier.count_of(NotificationKind::PaymentSuccess), 0);
    }

    #[tokio::test]
    async fn duplicate_success_callback_is_a_noop() {
        let store = MemoryStore::new();
        let gateway = MockGateway::new();
        let notifier = RecordingNotifier::new();
        let customer_id = seed_two_pharmacy_cart(&store).await;

        let init = init(&store, &gateway, customer_id).await;
        let first = handle_gateway_callback(&store, &notifier, &init.transaction_id, SessionOutcome::Success)
            .await
            .unwrap();
        let second = handle_gateway_callback(&store, &notifier, &init.transaction_id, SessionOutcome::Success)
            .await
            .unwrap();

        assert!(second.already_resolved);
        let first_ids: Vec<i64> = first.orders.iter().map(|o| o.id).collect();
        let second_ids: Vec<i64> = second.orders.iter().map(|o| o.id).collect();
        assert_eq!(first_ids, second_ids);
        // No extra orders, no extra notifications.
        assert_eq!(store.orders_for_customer(customer_id).await.unwrap().len(), 2);
        assert_eq!(notifier.count_of(NotificationKind::PaymentSuccess), 1);
    }

    #[tokio::test]
    async fn cart_edit_between_init_and_callback_is_rejected() {
        let store = MemoryStore::new();
        let gateway = MockGateway::new();
        let notifier = RecordingNotifier::new();
        let customer_id = seed_two_pharmacy_cart(&store).await;

        let init = init(&store, &gateway, customer_id).await;
        store.add_cart_item(customer_id, 101, 1, 1, Money::from_cents(1_000)).await.unwrap();

        let err = handle_gateway_callback(&store, &notifier, &init.transaction_id, SessionOutcome::Success)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StateConflict(_)));

        // Session marked failed, no orders, cart left for the customer to review.
        let session = store.session(&init.transaction_id).await.unwrap().unwrap();
        assert_eq!(session.outcome, SessionOutcome::Failed);
        assert!(store.orders_for_customer(customer_id).await.unwrap().is_empty());
        assert_eq!(store.cart_items(customer_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn vanished_listing_fails_only_its_group() {
        let store = MemoryStore::new();
        let gateway = MockGateway::new();
        let notifier = RecordingNotifier::new();
        let customer_id = seed_two_pharmacy_cart(&store).await;

        let init = init(&store, &gateway, customer_id).await;
        // Pharmacy 102 delists the medicine while the customer is paying.
        assert!(store.remove_listing(102, 2).await.unwrap());

        let result = handle_gateway_callback(&store, &notifier, &init.transaction_id, SessionOutcome::Success)
            .await
            .unwrap();
        assert_eq!(result.orders.len(), 1);
        assert_eq!(result.orders[0].pharmacy_id, 101);
        assert_eq!(result.failed_groups.len(), 1);
        assert_eq!(result.failed_groups[0].pharmacy_id, 102);

        // The surviving order stands; nothing rolled it back.
        assert_eq!(store.orders_for_customer(customer_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn init_rejects_empty_cart_and_blank_address() {
        let store = MemoryStore::new();
        let gateway = MockGateway::new();
        let customer = store.create_user("nimal", "hash", "customer").await.unwrap();

        let err = init_checkout(
            &store,
            &gateway,
            &FeeSchedule::default(),
            customer.id,
            DeliveryOption::Pickup,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        store
            .upsert_listing(Listing {
                pharmacy_id: 101,
                medicine_id: 1,
                medicine_name: "Paracetamol 500mg".to_string(),
                unit_price: Money::from_cents(1_000),
            })
            .await
            .unwrap();
        store.add_cart_item(customer.id, 101, 1, 1, Money::from_cents(1_000)).await.unwrap();

        let err = init_checkout(
            &store,
            &gateway,
            &FeeSchedule::default(),
            customer.id,
            DeliveryOption::Delivery,
            Some("   ".to_string()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(gateway.sessions_created(), 0);
    }

    #[tokio::test]
    async fn gateway_failure_persists_nothing() {
        let store = MemoryStore::new();
        let gateway = MockGateway::new();
        gateway.set_fail(true);
        let customer_id = seed_two_pharmacy_cart(&store).await;

        let err = init_checkout(
            &store,
            &gateway,
            &FeeSchedule::default(),
            customer_id,
            DeliveryOption::Pickup,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
        assert_eq!(store.cart_items(customer_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn notification_failure_never_blocks_checkout() {
        let store = MemoryStore::new();
        let gateway = MockGateway::new();
        let notifier = RecordingNotifier::new();
        notifier.set_fail(true);
        let customer_id = seed_two_pharmacy_cart(&store).await;

        let init = init(&store, &gateway, customer_id).await;
        let result = handle_gateway_callback(&store, &notifier, &init.transaction_id, SessionOutcome::Success)
            .await
            .unwrap();
        assert_eq!(result.orders.len(), 2);
        assert!(store.cart_items(customer_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_transaction_is_not_found() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let err = handle_gateway_callback(&store, &notifier, "no-such-txn", SessionOutcome::Success)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    /// Delegating store that slips a new cart line in while the success
    /// callback is recording its orders, after the snapshot comparison has
    /// already passed.
    struct LateCartAddStore {
        inner: MemoryStore,
        customer_id: i64,
    }

    #[async_trait::async_trait]
    impl Store for LateCartAddStore {
        async fn create_user(
            &self,
            username: &str,
            password_hash: &str,
            role: &str,
        ) -> Result<crate::models::User, AppError> {
            self.inner.create_user(username, password_hash, role).await
        }
        async fn user_by_username(
            &self,
            username: &str,
        ) -> Result<Option<crate::models::User>, AppError> {
            self.inner.user_by_username(username).await
        }
        async fn user_by_id(&self, id: i64) -> Result<Option<crate::models::User>, AppError> {
            self.inner.user_by_id(id).await
        }
        async fn upsert_listing(&self, listing: Listing) -> Result<Listing, AppError> {
            self.inner.upsert_listing(listing).await
        }
        async fn remove_listing(&self, pharmacy_id: i64, medicine_id: i64) -> Result<bool, AppError> {
            self.inner.remove_listing(pharmacy_id, medicine_id).await
        }
        async fn listings_for_pharmacy(&self, pharmacy_id: i64) -> Result<Vec<Listing>, AppError> {
            self.inner.listings_for_pharmacy(pharmacy_id).await
        }
        async fn listing(
            &self,
            pharmacy_id: i64,
            medicine_id: i64,
        ) -> Result<Option<Listing>, AppError> {
            self.inner.listing(pharmacy_id, medicine_id).await
        }
        async fn cart_items(&self, customer_id: i64) -> Result<Vec<CartItem>, AppError> {
            self.inner.cart_items(customer_id).await
        }
        async fn add_cart_item(
            &self,
            customer_id: i64,
            pharmacy_id: i64,
            medicine_id: i64,
            quantity: i32,
            unit_price: Money,
        ) -> Result<CartItem, AppError> {
            self.inner
                .add_cart_item(customer_id, pharmacy_id, medicine_id, quantity, unit_price)
                .await
        }
        async fn set_cart_item_quantity(
            &self,
            customer_id: i64,
            item_id: i64,
            quantity: i32,
        ) -> Result<CartItem, AppError> {
            self.inner.set_cart_item_quantity(customer_id, item_id, quantity).await
        }
        async fn remove_cart_item(&self, customer_id: i64, item_id: i64) -> Result<(), AppError> {
            self.inner.remove_cart_item(customer_id, item_id).await
        }
        async fn remove_cart_items(
            &self,
            customer_id: i64,
            item_ids: &[i64],
        ) -> Result<(), AppError> {
            self.inner.remove_cart_items(customer_id, item_ids).await
        }
        async fn insert_session(&self, session: PaymentSession) -> Result<(), AppError> {
            self.inner.insert_session(session).await
        }
        async fn session(&self, transaction_id: &str) -> Result<Option<PaymentSession>, AppError> {
            self.inner.session(transaction_id).await
        }
        async fn resolve_session(
            &self,
            transaction_id: &str,
            outcome: SessionOutcome,
        ) -> Result<bool, AppError> {
            self.inner.resolve_session(transaction_id, outcome).await
        }
        async fn record_session_orders(
            &self,
            transaction_id: &str,
            order_ids: &[i64],
        ) -> Result<(), AppError> {
            // The concurrent shopper strikes between order creation and
            // cart cleanup.
            self.inner
                .add_cart_item(self.customer_id, 101, 55, 1, Money::from_cents(700))
                .await?;
            self.inner.record_session_orders(transaction_id, order_ids).await
        }
        async fn insert_order(&self, order: NewOrder) -> Result<Order, AppError> {
            self.inner.insert_order(order).await
        }
        async fn order(&self, id: i64) -> Result<Option<Order>, AppError> {
            self.inner.order(id).await
        }
        async fn orders_for_customer(&self, customer_id: i64) -> Result<Vec<Order>, AppError> {
            self.inner.orders_for_customer(customer_id).await
        }
        async fn orders_for_pharmacy(&self, pharmacy_id: i64) -> Result<Vec<Order>, AppError> {
            self.inner.orders_for_pharmacy(pharmacy_id).await
        }
        async fn transition_order(
            &self,
            id: i64,
            expected: OrderStatus,
            next: OrderStatus,
        ) -> Result<bool, AppError> {
            self.inner.transition_order(id, expected, next).await
        }
        async fn insert_delivery(
            &self,
            order_id: i64,
            address: &str,
            delivery_person: Option<&str>,
        ) -> Result<crate::models::Delivery, AppError> {
            self.inner.insert_delivery(order_id, address, delivery_person).await
        }
        async fn delivery(&self, id: i64) -> Result<Option<crate::models::Delivery>, AppError> {
            self.inner.delivery(id).await
        }
        async fn delivery_for_order(
            &self,
            order_id: i64,
        ) -> Result<Option<crate::models::Delivery>, AppError> {
            self.inner.delivery_for_order(order_id).await
        }
        async fn transition_delivery(
            &self,
            id: i64,
            expected: crate::models::DeliveryStatus,
            next: crate::models::DeliveryStatus,
            delivery_person: Option<&str>,
        ) -> Result<bool, AppError> {
            self.inner.transition_delivery(id, expected, next, delivery_person).await
        }
        async fn complete_delivery(
            &self,
            id: i64,
            delivery_person: Option<&str>,
        ) -> Result<(crate::models::Delivery, Order), AppError> {
            self.inner.complete_delivery(id, delivery_person).await
        }
    }

    #[tokio::test]
    async fn line_added_during_callback_survives_cart_cleanup() {
        let inner = MemoryStore::new();
        let gateway = MockGateway::new();
        let notifier = RecordingNotifier::new();
        let customer_id = seed_two_pharmacy_cart(&inner).await;
        let store = LateCartAddStore { inner: inner.clone(), customer_id };

        let init = init_checkout(
            &store,
            &gateway,
            &FeeSchedule::default(),
            customer_id,
            DeliveryOption::Delivery,
            Some("12 Lake Road".to_string()),
        )
        .await
        .unwrap();

        let result =
            handle_gateway_callback(&store, &notifier, &init.transaction_id, SessionOutcome::Success)
                .await
                .unwrap();
        assert_eq!(result.orders.len(), 2);

        // Only the two paid lines are gone; the late addition is not part
        // of this payment and stays in the cart.
        let remaining = inner.cart_items(customer_id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].medicine_id, 55);
        assert_eq!(remaining[0].quantity, 1);
    }
}
