//! Notification dispatch boundary. Fire-and-forget from the workflow's
//! perspective; a dispatch failure never rolls back order or payment state.

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::OrderStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    ReservationConfirmed,
    PaymentSuccess,
    StatusUpdate(OrderStatus),
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ReservationConfirmed => "reservation-confirmed",
            NotificationKind::PaymentSuccess => "payment-success",
            NotificationKind::StatusUpdate(_) => "status-update",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        kind: NotificationKind,
        recipient_customer_id: i64,
        data: serde_json::Value,
    ) -> Result<(), AppError>;
}

/// Dispatches a notification, swallowing and logging any failure.
pub async fn notify_best_effort(
    notifier: &dyn Notifier,
    kind: NotificationKind,
    recipient_customer_id: i64,
    data: serde_json::Value,
) {
    if let Err(e) = notifier.send(kind, recipient_customer_id, data).await {
        tracing::warn!(
            kind = kind.as_str(),
            customer_id = recipient_customer_id,
            error = ?e,
            "Notification dispatch failed"
        );
    }
}

/// Notifier that only logs. Stands in for the transactional email service.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        kind: NotificationKind,
        recipient_customer_id: i64,
        data: serde_json::Value,
    ) -> Result<(), AppError> {
        tracing::info!(
            kind = kind.as_str(),
            customer_id = recipient_customer_id,
            %data,
            "Notification dispatched"
        );
        Ok(())
    }
}

/// Recording notifier double for workflow tests.
#[cfg(test)]
pub struct RecordingNotifier {
    pub sent: std::sync::Mutex<Vec<(NotificationKind, i64, serde_json::Value)>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
            fail: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn count_of(&self, kind: NotificationKind) -> usize {
        self.sent.lock().unwrap().iter().filter(|(k, _, _)| *k == kind).count()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        kind: NotificationKind,
        recipient_customer_id: i64,
        data: serde_json::Value,
    ) -> Result<(), AppError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AppError::external("Notification service down"));
        }
        self.sent.lock().unwrap().push((kind, recipient_customer_id, data));
        Ok(())
    }
}
