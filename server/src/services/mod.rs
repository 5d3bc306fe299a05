pub mod fulfillment;
pub mod initiator;
pub mod inventory;
pub mod notifier;

pub use fulfillment::{
    ChargeConfirmation, FulfillmentEngine, FulfillmentError, FulfillmentOutcome,
    FulfillmentReport, LineReport, TransitionOutcome,
};
pub use initiator::{CheckoutSettings, PaymentInitiator};
pub use inventory::InventoryLedger;
pub use notifier::{LogNotifier, Notifier, NotifyError};
