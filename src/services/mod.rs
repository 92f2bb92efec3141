pub mod gateway;
pub mod notifier;

pub use gateway::{HostedCheckoutGateway, PaymentGateway, SessionMetadata};
pub use notifier::{LogNotifier, NotificationKind, Notifier};
