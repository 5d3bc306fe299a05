use std::sync::Arc;

use crate::config::Config;
use crate::services::{CheckoutSettings, FulfillmentEngine, Notifier, PaymentInitiator};
use crate::store::Stores;
use crate::webhook::WebhookGateway;

/// Shared by every handler. Holds no mutable state of its own; all
/// coordination goes through the stores.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub initiator: PaymentInitiator,
    pub gateway: WebhookGateway,
}

impl AppState {
    pub fn new(config: Config, stores: Stores, notifier: Arc<dyn Notifier>) -> Self {
        let initiator = PaymentInitiator::new(
            stores.events.clone(),
            stores.payments.clone(),
            CheckoutSettings {
                currency: config.payment_currency.clone(),
                public_key: config.paystack_public_key.clone(),
            },
        );
        let engine = FulfillmentEngine::new(&stores, notifier, config.notifier_timeout);
        let gateway = WebhookGateway::new(config.paystack_secret_key.clone(), Arc::new(engine));

        Self {
            config: Arc::new(config),
            initiator,
            gateway,
        }
    }
}
