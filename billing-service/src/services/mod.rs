//! Services module for the recurring billing service.

pub mod database;
pub mod entitlement;
pub mod error;
pub mod generator;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod notifier;
pub mod schedule;
pub mod store;
pub mod templates;

pub use database::Database;
pub use entitlement::EntitlementApplier;
pub use error::BillingError;
pub use generator::InvoiceGenerator;
pub use ledger::{CallbackOutcome, InitiatePurchase, PurchaseLedger};
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{
    FailingNotifier, HttpEmailNotifier, LogNotifier, Notification, Notifier, RecordingNotifier,
};
pub use store::{
    InvoiceStore, PurchaseStore, StoreHealth, Stores, SubscriberStore, TemplateStore,
};
pub use templates::TemplateService;
