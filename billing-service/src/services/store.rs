//! Storage seams. Both the PostgreSQL and in-memory backends implement
//! every trait here; the service layer only sees [`Stores`].

use crate::models::{
    CreateRecurringTemplate, EntitlementGrant, GeneratedInvoice, GenerationCommit, Invoice,
    InvoiceLineItem, NewPurchaseOrder, PurchaseOrder, PurchaseTransition, RecurringTemplate,
    Settlement, Subscriber,
};
use crate::services::error::BillingError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[async_trait]
pub trait PurchaseStore: Send + Sync {
    /// Insert a new order. A duplicate `order_id` is a [`BillingError::Conflict`].
    async fn insert_purchase(&self, order: &NewPurchaseOrder) -> Result<PurchaseOrder, BillingError>;

    async fn get_purchase(&self, order_id: &str) -> Result<Option<PurchaseOrder>, BillingError>;

    /// Apply `transition` only while the order is still open.
    /// Returns `None` when the order is missing or already terminal.
    async fn transition_purchase(
        &self,
        order_id: &str,
        transition: &PurchaseTransition,
    ) -> Result<Option<PurchaseOrder>, BillingError>;

    /// Mark the order paid and write `grant` to its subscriber as one unit.
    /// `None` when the order is missing or already terminal; nothing is
    /// written then. An unknown subscriber leaves `Settlement::subscriber`
    /// empty while the order still settles.
    async fn settle_paid(
        &self,
        order_id: &str,
        transition: &PurchaseTransition,
        grant: Option<&EntitlementGrant>,
    ) -> Result<Option<Settlement>, BillingError>;
}

#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn get_subscriber(&self, subscriber_id: Uuid) -> Result<Option<Subscriber>, BillingError>;

    async fn upsert_subscriber(&self, subscriber: &Subscriber) -> Result<Subscriber, BillingError>;
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn create_template(
        &self,
        input: &CreateRecurringTemplate,
    ) -> Result<RecurringTemplate, BillingError>;

    async fn get_template(&self, template_id: Uuid) -> Result<Option<RecurringTemplate>, BillingError>;

    async fn list_templates(&self, owner_id: Uuid) -> Result<Vec<RecurringTemplate>, BillingError>;

    /// Persist the editable fields of `template` if its stored version is
    /// still `expected_version`. Bumps the version.
    async fn save_template(
        &self,
        template: &RecurringTemplate,
        expected_version: i64,
    ) -> Result<Option<RecurringTemplate>, BillingError>;

    async fn delete_template(&self, template_id: Uuid) -> Result<bool, BillingError>;

    /// Advance the template and persist the invoice with its line items as
    /// one unit. `None` when the template is no longer at
    /// `commit.expected_version` or no longer active; nothing is written then.
    async fn commit_generation(
        &self,
        commit: &GenerationCommit,
    ) -> Result<Option<GeneratedInvoice>, BillingError>;
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, BillingError>;

    /// Line items ordered by `order_index`.
    async fn list_line_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceLineItem>, BillingError>;

    async fn count_invoices(&self, owner_id: Uuid) -> Result<i64, BillingError>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn health_check(&self) -> Result<(), BillingError>;

    fn backend(&self) -> &'static str;
}

/// Injected storage handles plus the per-operation deadline.
#[derive(Clone)]
pub struct Stores {
    pub purchases: Arc<dyn PurchaseStore>,
    pub subscribers: Arc<dyn SubscriberStore>,
    pub templates: Arc<dyn TemplateStore>,
    pub invoices: Arc<dyn InvoiceStore>,
    pub health: Arc<dyn StoreHealth>,
    pub timeout: Duration,
}

impl Stores {
    /// Wire every seam to one backend.
    pub fn from_backend<S>(backend: Arc<S>, timeout: Duration) -> Self
    where
        S: PurchaseStore + SubscriberStore + TemplateStore + InvoiceStore + StoreHealth + 'static,
    {
        Self {
            purchases: backend.clone(),
            subscribers: backend.clone(),
            templates: backend.clone(),
            invoices: backend.clone(),
            health: backend,
            timeout,
        }
    }

    /// Run a store operation under the configured deadline.
    pub async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, BillingError>
    where
        F: Future<Output = Result<T, BillingError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    operation = operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Store operation timed out"
                );
                Err(BillingError::Persistence(anyhow::anyhow!(
                    "{} timed out after {}ms",
                    operation,
                    self.timeout.as_millis()
                )))
            }
        }
    }
}
