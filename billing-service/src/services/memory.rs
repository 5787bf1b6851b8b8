//! In-memory backend. Ephemeral; used for demo mode and tests.
//!
//! All state lives behind one mutex so multi-entity updates (a generation
//! commit, a conditional purchase transition) are atomic.

use crate::models::{
    format_invoice_number, CreateRecurringTemplate, EntitlementGrant, GeneratedInvoice,
    GenerationCommit, Invoice, InvoiceLineItem, NewPurchaseOrder, PurchaseOrder,
    PurchaseTransition, RecurringTemplate, Settlement, Subscriber, TemplateStatus,
};
use crate::services::error::BillingError;
use crate::services::store::{
    InvoiceStore, PurchaseStore, StoreHealth, SubscriberStore, TemplateStore,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::info;
use uuid::Uuid;

const GATEWAY: &str = "oxapay";

#[derive(Default)]
struct MemoryState {
    purchases: HashMap<String, PurchaseOrder>,
    subscribers: HashMap<Uuid, Subscriber>,
    templates: HashMap<Uuid, RecurringTemplate>,
    invoices: HashMap<Uuid, Invoice>,
    line_items: HashMap<Uuid, Vec<InvoiceLineItem>>,
    invoice_counters: HashMap<Uuid, i64>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, BillingError> {
        self.state
            .lock()
            .map_err(|_| BillingError::Persistence(anyhow::anyhow!("memory store lock poisoned")))
    }
}

#[async_trait]
impl PurchaseStore for MemoryStore {
    async fn insert_purchase(&self, order: &NewPurchaseOrder) -> Result<PurchaseOrder, BillingError> {
        let mut state = self.lock()?;
        if state.purchases.contains_key(&order.order_id) {
            return Err(BillingError::Conflict(format!(
                "Purchase order '{}' already exists",
                order.order_id
            )));
        }

        let now = Utc::now();
        let purchase = PurchaseOrder {
            order_id: order.order_id.clone(),
            subscriber_id: order.subscriber_id,
            raw_subscriber_ref: order.raw_subscriber_ref.clone(),
            plan: order.plan.as_str().to_string(),
            billing_cycle: order.billing_cycle.as_str().to_string(),
            amount: order.amount,
            currency: order.currency.clone(),
            gateway: GATEWAY.to_string(),
            track_id: order.track_id.clone(),
            status: order.status.as_str().to_string(),
            paid_at: None,
            expires_at: None,
            created_utc: now,
            updated_utc: now,
        };
        state
            .purchases
            .insert(purchase.order_id.clone(), purchase.clone());
        Ok(purchase)
    }

    async fn get_purchase(&self, order_id: &str) -> Result<Option<PurchaseOrder>, BillingError> {
        Ok(self.lock()?.purchases.get(order_id).cloned())
    }

    async fn transition_purchase(
        &self,
        order_id: &str,
        transition: &PurchaseTransition,
    ) -> Result<Option<PurchaseOrder>, BillingError> {
        let mut state = self.lock()?;
        Ok(state
            .purchases
            .get_mut(order_id)
            .and_then(|purchase| apply_transition(purchase, transition)))
    }

    async fn settle_paid(
        &self,
        order_id: &str,
        transition: &PurchaseTransition,
        grant: Option<&EntitlementGrant>,
    ) -> Result<Option<Settlement>, BillingError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let Some(purchase) = state
            .purchases
            .get_mut(order_id)
            .and_then(|purchase| apply_transition(purchase, transition))
        else {
            return Ok(None);
        };

        let subscriber = grant.and_then(|grant| {
            state
                .subscribers
                .get_mut(&grant.subscriber_id)
                .map(|subscriber| {
                    subscriber.plan = grant.plan.as_str().to_string();
                    subscriber.plan_expires_at = Some(grant.expires_at);
                    subscriber.updated_utc = purchase.updated_utc;
                    subscriber.clone()
                })
        });

        Ok(Some(Settlement {
            purchase,
            subscriber,
        }))
    }
}

/// Apply `transition` while the order is still open.
fn apply_transition(
    purchase: &mut PurchaseOrder,
    transition: &PurchaseTransition,
) -> Option<PurchaseOrder> {
    if purchase.status().is_terminal() {
        return None;
    }

    purchase.status = transition.status.as_str().to_string();
    if transition.paid_at.is_some() {
        purchase.paid_at = transition.paid_at;
    }
    if transition.expires_at.is_some() {
        purchase.expires_at = transition.expires_at;
    }
    purchase.updated_utc = Utc::now();
    Some(purchase.clone())
}

#[async_trait]
impl SubscriberStore for MemoryStore {
    async fn get_subscriber(&self, subscriber_id: Uuid) -> Result<Option<Subscriber>, BillingError> {
        Ok(self.lock()?.subscribers.get(&subscriber_id).cloned())
    }

    async fn upsert_subscriber(&self, subscriber: &Subscriber) -> Result<Subscriber, BillingError> {
        let mut state = self.lock()?;
        let mut stored = subscriber.clone();
        stored.updated_utc = Utc::now();
        state
            .subscribers
            .insert(stored.subscriber_id, stored.clone());
        Ok(stored)
    }

}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn create_template(
        &self,
        input: &CreateRecurringTemplate,
    ) -> Result<RecurringTemplate, BillingError> {
        let now = Utc::now();
        let template = RecurringTemplate {
            template_id: Uuid::new_v4(),
            owner_id: input.owner_id,
            template_name: input.template_name.clone(),
            client_name: input.client_name.clone(),
            client_email: input.client_email.clone(),
            client_business_name: input.client_business_name.clone(),
            client_address: input.client_address.clone(),
            client_phone: input.client_phone.clone(),
            frequency: input.frequency.as_str().to_string(),
            start_date: input.start_date,
            next_invoice_date: input.next_invoice_date,
            end_date: input.end_date,
            status: input.status.as_str().to_string(),
            currency: input.currency.clone(),
            subtotal: input.subtotal,
            tax_enabled: input.tax_enabled,
            tax_rate: input.tax_rate,
            tax_amount: input.tax_amount,
            discount_enabled: input.discount_enabled,
            discount_amount: input.discount_amount,
            total: input.total,
            invoices_generated: 0,
            max_invoices: input.max_invoices,
            items: input.items.clone(),
            notes: input.notes.clone(),
            terms: input.terms.clone(),
            version: 0,
            created_utc: now,
            updated_utc: now,
        };

        self.lock()?
            .templates
            .insert(template.template_id, template.clone());
        info!(template_id = %template.template_id, "Recurring template created");
        Ok(template)
    }

    async fn get_template(&self, template_id: Uuid) -> Result<Option<RecurringTemplate>, BillingError> {
        Ok(self.lock()?.templates.get(&template_id).cloned())
    }

    async fn list_templates(&self, owner_id: Uuid) -> Result<Vec<RecurringTemplate>, BillingError> {
        let state = self.lock()?;
        let mut templates: Vec<_> = state
            .templates
            .values()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        templates.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(templates)
    }

    async fn save_template(
        &self,
        template: &RecurringTemplate,
        expected_version: i64,
    ) -> Result<Option<RecurringTemplate>, BillingError> {
        let mut state = self.lock()?;
        let Some(stored) = state.templates.get_mut(&template.template_id) else {
            return Ok(None);
        };
        if stored.version != expected_version {
            return Ok(None);
        }

        let mut updated = template.clone();
        updated.owner_id = stored.owner_id;
        updated.invoices_generated = stored.invoices_generated;
        updated.created_utc = stored.created_utc;
        updated.version = stored.version + 1;
        updated.updated_utc = Utc::now();
        *stored = updated.clone();
        Ok(Some(updated))
    }

    async fn delete_template(&self, template_id: Uuid) -> Result<bool, BillingError> {
        Ok(self.lock()?.templates.remove(&template_id).is_some())
    }

    async fn commit_generation(
        &self,
        commit: &GenerationCommit,
    ) -> Result<Option<GeneratedInvoice>, BillingError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let template = match state.templates.get_mut(&commit.template_id) {
            Some(t)
                if t.version == commit.expected_version
                    && t.template_status() == TemplateStatus::Active =>
            {
                t
            }
            _ => return Ok(None),
        };

        let owner_id = commit.draft.owner_id;
        let existing = state
            .invoices
            .values()
            .filter(|i| i.owner_id == owner_id)
            .count() as i64;
        let counter = state.invoice_counters.entry(owner_id).or_insert(existing);
        *counter += 1;
        let invoice_number = format_invoice_number(*counter);

        let now = Utc::now();
        template.invoices_generated += 1;
        template.next_invoice_date = commit.next_invoice_date;
        template.version += 1;
        template.updated_utc = now;

        let invoice = commit.draft.to_invoice(invoice_number.clone(), now);
        state
            .line_items
            .insert(invoice.invoice_id, commit.draft.line_items());
        state.invoices.insert(invoice.invoice_id, invoice);

        Ok(Some(GeneratedInvoice {
            invoice_id: commit.draft.invoice_id,
            invoice_number,
        }))
    }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, BillingError> {
        Ok(self.lock()?.invoices.get(&invoice_id).cloned())
    }

    async fn list_line_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceLineItem>, BillingError> {
        let state = self.lock()?;
        let mut items = state.line_items.get(&invoice_id).cloned().unwrap_or_default();
        items.sort_by_key(|item| item.order_index);
        Ok(items)
    }

    async fn count_invoices(&self, owner_id: Uuid) -> Result<i64, BillingError> {
        Ok(self
            .lock()?
            .invoices
            .values()
            .filter(|i| i.owner_id == owner_id)
            .count() as i64)
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn health_check(&self) -> Result<(), BillingError> {
        self.lock().map(|_| ())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
