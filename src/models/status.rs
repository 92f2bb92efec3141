use serde::{Deserialize, Serialize};

/// Lifecycle of an order/reservation.
///
/// `pending -> accepted | rejected`; `accepted -> delivered` directly for
/// pickup orders, or through the Delivery sub-resource for delivery orders.
/// `rejected` and `delivered` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Rejected,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "accepted" => Some(OrderStatus::Accepted),
            "rejected" => Some(OrderStatus::Rejected),
            "delivered" => Some(OrderStatus::Delivered),
            _ => None,
        }
    }

    /// Whether a pharmacy-driven transition to `next` is legal.
    ///
    /// `accepted -> delivered` is only legal for pickup orders; delivery
    /// orders reach `delivered` through their Delivery record instead.
    pub fn can_transition(&self, next: OrderStatus, option: DeliveryOption) -> bool {
        matches!(
            (self, next, option),
            (OrderStatus::Pending, OrderStatus::Accepted, _)
                | (OrderStatus::Pending, OrderStatus::Rejected, _)
                | (OrderStatus::Accepted, OrderStatus::Delivered, DeliveryOption::Pickup)
        )
    }
}

/// Lifecycle of a delivery: strictly forward through the fixed sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    OutForDelivery,
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::OutForDelivery => "out_for_delivery",
            DeliveryStatus::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DeliveryStatus::Pending),
            "out_for_delivery" => Some(DeliveryStatus::OutForDelivery),
            "delivered" => Some(DeliveryStatus::Delivered),
            _ => None,
        }
    }

    pub fn can_advance_to(&self, next: DeliveryStatus) -> bool {
        matches!(
            (self, next),
            (DeliveryStatus::Pending, DeliveryStatus::OutForDelivery)
                | (DeliveryStatus::OutForDelivery, DeliveryStatus::Delivered)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOption {
    Pickup,
    Delivery,
}

impl DeliveryOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOption::Pickup => "pickup",
            DeliveryOption::Delivery => "delivery",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pickup" => Some(DeliveryOption::Pickup),
            "delivery" => Some(DeliveryOption::Delivery),
            _ => None,
        }
    }
}

/// Terminal resolution of a payment session. Sessions start `pending` and
/// are resolved exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Pending,
    Success,
    Failed,
    Cancelled,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Pending => "pending",
            SessionOutcome::Success => "success",
            SessionOutcome::Failed => "failed",
            SessionOutcome::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SessionOutcome::Pending),
            "success" => Some(SessionOutcome::Success),
            "failed" => Some(SessionOutcome::Failed),
            "cancelled" => Some(SessionOutcome::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionOutcome::Pending)
    }
}
