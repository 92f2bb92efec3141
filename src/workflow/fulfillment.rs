//! Reservation and delivery lifecycle.
//!
//! Transitions commit through per-row compare-and-set on the prior status,
//! so two concurrent updates to one reservation cannot both win while
//! unrelated reservations stay fully concurrent. Each successful transition
//! dispatches exactly one best-effort notification to the customer.

use crate::error::AppError;
use crate::models::{Delivery, DeliveryOption, DeliveryStatus, Order, OrderStatus};
use crate::services::notifier::notify_best_effort;
use crate::services::{NotificationKind, Notifier};
use crate::store::Store;

/// Pharmacy-driven reservation status change.
///
/// Legal moves: `pending -> accepted | rejected` and, for pickup
/// reservations only, `accepted -> delivered`. Delivery reservations reach
/// `delivered` through their Delivery record.
pub async fn update_order_status(
    store: &dyn Store,
    notifier: &dyn Notifier,
    order_id: i64,
    actor_pharmacy_id: i64,
    requested: OrderStatus,
) -> Result<Order, AppError> {
    let order = store
        .order(order_id)
        .await?
        .ok_or_else(|| AppError::not_found("Reservation not found"))?;
    if order.pharmacy_id != actor_pharmacy_id {
        return Err(AppError::forbidden("Only the owning pharmacy can update this reservation"));
    }
    if !order.status.can_transition(requested, order.delivery_option) {
        return Err(AppError::invalid_transition(order.status.as_str(), requested.as_str()));
    }

    if !store.transition_order(order_id, order.status, requested).await? {
        // Raced a concurrent update; report against the fresh status.
        let current = store
            .order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found("Reservation not found"))?;
        return Err(AppError::invalid_transition(current.status.as_str(), requested.as_str()));
    }

    let updated = store
        .order(order_id)
        .await?
        .ok_or_else(|| AppError::not_found("Reservation not found"))?;

    notify_best_effort(
        notifier,
        NotificationKind::StatusUpdate(requested),
        updated.customer_id,
        serde_json::json!({
            "reservation_id": updated.id,
            "status": updated.status,
        }),
    )
    .await;

    Ok(updated)
}

/// Pharmacy dispatches a delivery for an accepted home-delivery
/// reservation. At most one delivery per reservation.
pub async fn create_delivery(
    store: &dyn Store,
    order_id: i64,
    actor_pharmacy_id: i64,
    address: Option<String>,
    delivery_person: Option<&str>,
) -> Result<Delivery, AppError> {
    let order = store
        .order(order_id)
        .await?
        .ok_or_else(|| AppError::not_found("Reservation not found"))?;
    if order.pharmacy_id != actor_pharmacy_id {
        return Err(AppError::forbidden("Only the owning pharmacy can dispatch this reservation"));
    }
    if order.delivery_option != DeliveryOption::Delivery {
        return Err(AppError::validation("Pickup reservations have no delivery"));
    }
    if order.status != OrderStatus::Accepted {
        return Err(AppError::validation(
            "Reservation must be accepted before a delivery is created",
        ));
    }

    let address = address
        .filter(|a| !a.trim().is_empty())
        .or(order.delivery_address)
        .ok_or_else(|| AppError::validation("Delivery address is required"))?;

    store.insert_delivery(order_id, &address, delivery_person).await
}

/// Advances a delivery forward through `pending -> out_for_delivery ->
/// delivered`. Reaching `delivered` also moves the companion reservation to
/// `delivered` in the same atomic store operation.
///
/// Returns the delivery and, when the reservation moved too, its new state.
pub async fn advance_delivery(
    store: &dyn Store,
    notifier: &dyn Notifier,
    delivery_id: i64,
    actor_pharmacy_id: i64,
    requested: DeliveryStatus,
    delivery_person: Option<&str>,
) -> Result<(Delivery, Option<Order>), AppError> {
    let delivery = store
        .delivery(delivery_id)
        .await?
        .ok_or_else(|| AppError::not_found("Delivery not found"))?;
    let order = store
        .order(delivery.order_id)
        .await?
        .ok_or_else(|| AppError::not_found("Reservation not found"))?;
    if order.pharmacy_id != actor_pharmacy_id {
        return Err(AppError::forbidden("Only the owning pharmacy can update this delivery"));
    }
    if !delivery.status.can_advance_to(requested) {
        return Err(AppError::invalid_transition(delivery.status.as_str(), requested.as_str()));
    }

    if requested == DeliveryStatus::Delivered {
        let (delivery, order) = store.complete_delivery(delivery_id, delivery_person).await?;
        notify_best_effort(
            notifier,
            NotificationKind::StatusUpdate(OrderStatus::Delivered),
            order.customer_id,
            serde_json::json!({
                "reservation_id": order.id,
                "delivery_id": delivery.id,
                "status": order.status,
            }),
        )
        .await;
        return Ok((delivery, Some(order)));
    }

    if !store
        .transition_delivery(delivery_id, delivery.status, requested, delivery_person)
        .await?
    {
        let current = store
            .delivery(delivery_id)
            .await?
            .ok_or_else(|| AppError::not_found("Delivery not found"))?;
        return Err(AppError::invalid_transition(current.status.as_str(), requested.as_str()));
    }

    let updated = store
        .delivery(delivery_id)
        .await?
        .ok_or_else(|| AppError::not_found("Delivery not found"))?;
    Ok((updated, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::models::{Listing, Money, NewOrder, OrderItem};
    use crate::services::notifier::RecordingNotifier;
    use crate::store::MemoryStore;

    async fn seed_order(store: &MemoryStore, option: DeliveryOption) -> Order {
        store
            .upsert_listing(Listing {
                pharmacy_id: 7,
                medicine_id: 1,
                medicine_name: "Amoxicillin 250mg".to_string(),
                unit_price: Money::from_cents(1_200),
            })
            .await
            .unwrap();
        store
            .insert_order(NewOrder {
                customer_id: 3,
                pharmacy_id: 7,
                items: vec![OrderItem { medicine_id: 1, quantity: 2, unit_price: Money::from_cents(1_200) }],
                total_price: Money::from_cents(2_400),
                delivery_option: option,
                delivery_address: match option {
                    DeliveryOption::Delivery => Some("12 Lake Road".to_string()),
                    DeliveryOption::Pickup => None,
                },
                transaction_id: "txn-test".to_string(),
                paid_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn pending_order_cannot_jump_to_delivered() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let order = seed_order(&store, DeliveryOption::Pickup).await;

        let err = update_order_status(&store, &notifier, order.id, 7, OrderStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        // Status unchanged.
        let current = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(current.status, OrderStatus::Pending);
        assert_eq!(notifier.sent.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn pickup_path_accept_then_deliver() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let order = seed_order(&store, DeliveryOption::Pickup).await;

        let accepted = update_order_status(&store, &notifier, order.id, 7, OrderStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(accepted.status, OrderStatus::Accepted);
        let delivered = update_order_status(&store, &notifier, order.id, 7, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        // Exactly one notification per transition.
        assert_eq!(notifier.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delivery_orders_cannot_be_delivered_directly() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let order = seed_order(&store, DeliveryOption::Delivery).await;

        update_order_status(&store, &notifier, order.id, 7, OrderStatus::Accepted).await.unwrap();
        let err = update_order_status(&store, &notifier, order.id, 7, OrderStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn rejected_is_terminal() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let order = seed_order(&store, DeliveryOption::Pickup).await;

        update_order_status(&store, &notifier, order.id, 7, OrderStatus::Rejected).await.unwrap();
        let err = update_order_status(&store, &notifier, order.id, 7, OrderStatus::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn only_the_owning_pharmacy_may_act() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let order = seed_order(&store, DeliveryOption::Pickup).await;

        let err = update_order_status(&store, &notifier, order.id, 99, OrderStatus::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn concurrent_transitions_serialize_per_order() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let order = seed_order(&store, DeliveryOption::Pickup).await;

        let accept = update_order_status(&store, &notifier, order.id, 7, OrderStatus::Accepted);
        let reject = update_order_status(&store, &notifier, order.id, 7, OrderStatus::Rejected);
        let (a, r) = tokio::join!(accept, reject);

        // Exactly one of the two terminal moves wins.
        assert_eq!(a.is_ok() as u8 + r.is_ok() as u8, 1);
        let current = store.order(order.id).await.unwrap().unwrap();
        assert!(matches!(current.status, OrderStatus::Accepted | OrderStatus::Rejected));
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delivery_requires_accepted_delivery_order() {
        let store = MemoryStore::new();
        let order = seed_order(&store, DeliveryOption::Delivery).await;

        // Still pending.
        let err = create_delivery(&store, order.id, 7, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let pickup = seed_order(&store, DeliveryOption::Pickup).await;
        let err = create_delivery(&store, pickup.id, 7, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn second_delivery_for_one_order_conflicts() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let order = seed_order(&store, DeliveryOption::Delivery).await;
        update_order_status(&store, &notifier, order.id, 7, OrderStatus::Accepted).await.unwrap();

        create_delivery(&store, order.id, 7, None, None).await.unwrap();
        let err = create_delivery(&store, order.id, 7, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn dispatched_delivery_is_found_by_reservation() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let order = seed_order(&store, DeliveryOption::Delivery).await;
        update_order_status(&store, &notifier, order.id, 7, OrderStatus::Accepted).await.unwrap();

        assert!(store.delivery_for_order(order.id).await.unwrap().is_none());
        let created = create_delivery(&store, order.id, 7, None, None).await.unwrap();

        let found = store.delivery_for_order(order.id).await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.status, DeliveryStatus::Pending);
        assert_eq!(found.address, "12 Lake Road");
    }

    #[tokio::test]
    async fn delivery_path_marks_order_delivered_with_the_delivery() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let order = seed_order(&store, DeliveryOption::Delivery).await;
        update_order_status(&store, &notifier, order.id, 7, OrderStatus::Accepted).await.unwrap();

        let delivery = create_delivery(&store, order.id, 7, None, None).await.unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Pending);
        assert_eq!(delivery.address, "12 Lake Road");

        let (delivery, moved) = advance_delivery(
            &store,
            &notifier,
            delivery.id,
            7,
            DeliveryStatus::OutForDelivery,
            Some("Kasun"),
        )
        .await
        .unwrap();
        assert_eq!(delivery.status, DeliveryStatus::OutForDelivery);
        assert_eq!(delivery.delivery_person.as_deref(), Some("Kasun"));
        assert!(moved.is_none());
        // Order not delivered yet.
        assert_eq!(store.order(order.id).await.unwrap().unwrap().status, OrderStatus::Accepted);

        let (delivery, moved) =
            advance_delivery(&store, &notifier, delivery.id, 7, DeliveryStatus::Delivered, None)
                .await
                .unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Delivered);
        let order = moved.expect("order moves with the delivery");
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(store.order(order.id).await.unwrap().unwrap().status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn delivery_cannot_skip_out_for_delivery() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let order = seed_order(&store, DeliveryOption::Delivery).await;
        update_order_status(&store, &notifier, order.id, 7, OrderStatus::Accepted).await.unwrap();
        let delivery = create_delivery(&store, order.id, 7, None, None).await.unwrap();

        let err = advance_delivery(&store, &notifier, delivery.id, 7, DeliveryStatus::Delivered, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(
            store.delivery(delivery.id).await.unwrap().unwrap().status,
            DeliveryStatus::Pending
        );
    }
}
