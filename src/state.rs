use std::sync::Arc;

use crate::models::FeeSchedule;
use crate::services::{Notifier, PaymentGateway};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub fees: FeeSchedule,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        fees: FeeSchedule,
    ) -> Self {
        Self { store, gateway, notifier, fees }
    }
}
