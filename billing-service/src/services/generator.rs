//! Turns an active recurring template into a draft invoice and advances
//! its schedule.

use crate::models::{GeneratedInvoice, GenerationCommit, InvoiceDraft, TemplateStatus};
use crate::services::error::BillingError;
use crate::services::metrics::{record_generation_conflict, record_invoice_generated};
use crate::services::schedule;
use crate::services::store::Stores;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct InvoiceGenerator {
    stores: Stores,
}

impl InvoiceGenerator {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Generate the next invoice for `template_id`.
    ///
    /// The invoice, its line items and the template's counters are written
    /// together, conditional on the template version read here. Of several
    /// concurrent calls only one can commit; the rest get a state conflict.
    #[instrument(skip(self))]
    pub async fn generate(&self, template_id: Uuid) -> Result<GeneratedInvoice, BillingError> {
        let template = self
            .stores
            .bounded(
                "get_template",
                self.stores.templates.get_template(template_id),
            )
            .await?
            .ok_or_else(|| BillingError::NotFound("Recurring template".to_string()))?;

        let status = template.template_status();
        if status != TemplateStatus::Active {
            record_generation_conflict("inactive");
            return Err(BillingError::StateConflict(format!(
                "Template is {}; only active templates generate invoices",
                status.as_str()
            )));
        }

        let frequency = template.schedule_frequency();
        let next_invoice_date = schedule::advance(template.next_invoice_date, frequency)
            .ok_or_else(|| {
                BillingError::Validation(format!(
                    "Cannot schedule past {}",
                    template.next_invoice_date
                ))
            })?;

        let commit = GenerationCommit {
            template_id,
            expected_version: template.version,
            next_invoice_date,
            draft: InvoiceDraft::from_template(&template),
        };

        let committed = self
            .stores
            .bounded(
                "commit_generation",
                self.stores.templates.commit_generation(&commit),
            )
            .await?;

        let Some(generated) = committed else {
            warn!(
                template_id = %template_id,
                version = template.version,
                "Template changed during generation"
            );
            record_generation_conflict("version");
            return Err(BillingError::StateConflict(
                "Invoice already generated for this schedule window".to_string(),
            ));
        };

        record_invoice_generated(frequency.as_str());
        info!(
            template_id = %template_id,
            invoice_id = %generated.invoice_id,
            invoice_number = %generated.invoice_number,
            next_invoice_date = %next_invoice_date,
            "Invoice generated from template"
        );

        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CreateRecurringTemplate, Frequency, InvoiceStatus, TemplateItem, UpdateRecurringTemplate,
    };
    use crate::services::memory::MemoryStore;
    use crate::services::store::{InvoiceStore, TemplateStore};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use std::time::Duration;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn input(owner_id: Uuid, frequency: Frequency, next: NaiveDate) -> CreateRecurringTemplate {
        CreateRecurringTemplate {
            owner_id,
            template_name: "Retainer".to_string(),
            client_name: "Acme".to_string(),
            client_email: "ap@acme.test".to_string(),
            client_business_name: Some("Acme Ltd".to_string()),
            client_address: None,
            client_phone: None,
            frequency,
            start_date: next,
            next_invoice_date: next,
            end_date: None,
            status: TemplateStatus::Active,
            currency: "INR".to_string(),
            subtotal: Decimal::from(300),
            tax_enabled: false,
            tax_rate: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            discount_enabled: false,
            discount_amount: Decimal::ZERO,
            total: Decimal::from(300),
            max_invoices: None,
            items: vec![
                TemplateItem {
                    title: "Design".to_string(),
                    description: None,
                    hours: Some(Decimal::from(2)),
                    rate: Decimal::from(100),
                    subtotal: Decimal::from(200),
                },
                TemplateItem {
                    title: "Hosting".to_string(),
                    description: None,
                    hours: None,
                    rate: Decimal::from(100),
                    subtotal: Decimal::from(100),
                },
            ],
            notes: None,
            terms: None,
        }
    }

    fn generator(store: Arc<MemoryStore>) -> InvoiceGenerator {
        InvoiceGenerator::new(Stores::from_backend(store, Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn yearly_template_after_three_invoices() {
        let store = Arc::new(MemoryStore::new());
        let generator = generator(store.clone());
        let owner = Uuid::new_v4();

        let monthly = store
            .create_template(&input(owner, Frequency::Monthly, d(2024, 1, 31)))
            .await
            .unwrap();
        for _ in 0..3 {
            generator.generate(monthly.template_id).await.unwrap();
        }
        assert_eq!(store.count_invoices(owner).await.unwrap(), 3);

        let yearly = store
            .create_template(&input(owner, Frequency::Yearly, d(2024, 3, 1)))
            .await
            .unwrap();
        let generated = generator.generate(yearly.template_id).await.unwrap();
        assert_eq!(generated.invoice_number, "INV-0004");

        let after = store.get_template(yearly.template_id).await.unwrap().unwrap();
        assert_eq!(after.next_invoice_date, d(2025, 3, 1));
        assert_eq!(after.invoices_generated, 1);

        let invoice = store.get_invoice(generated.invoice_id).await.unwrap().unwrap();
        assert_eq!(invoice.invoice_status(), InvoiceStatus::Draft);
        assert_eq!(invoice.template_id, Some(yearly.template_id));
        assert_eq!(invoice.issue_date, d(2024, 3, 1));

        let items = store.list_line_items(generated.invoice_id).await.unwrap();
        let order: Vec<_> = items.iter().map(|i| (i.order_index, i.title.as_str())).collect();
        assert_eq!(order, vec![(0, "Design"), (1, "Hosting")]);
    }

    #[tokio::test]
    async fn monthly_schedule_clamps_through_generations() {
        let store = Arc::new(MemoryStore::new());
        let generator = generator(store.clone());
        let template = store
            .create_template(&input(Uuid::new_v4(), Frequency::Monthly, d(2024, 1, 31)))
            .await
            .unwrap();

        generator.generate(template.template_id).await.unwrap();
        let after = store.get_template(template.template_id).await.unwrap().unwrap();
        assert_eq!(after.next_invoice_date, d(2024, 2, 29));
    }

    #[tokio::test]
    async fn paused_template_is_rejected_without_side_effects() {
        let store = Arc::new(MemoryStore::new());
        let generator = generator(store.clone());
        let owner = Uuid::new_v4();
        let mut paused = input(owner, Frequency::Monthly, d(2024, 5, 1));
        paused.status = TemplateStatus::Paused;
        let template = store.create_template(&paused).await.unwrap();

        let err = generator.generate(template.template_id).await.unwrap_err();
        assert!(matches!(err, BillingError::StateConflict(_)));

        let after = store.get_template(template.template_id).await.unwrap().unwrap();
        assert_eq!(after, template);
        assert_eq!(store.count_invoices(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_template_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let err = generator(store).generate(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BillingError::NotFound(_)));
    }

    #[tokio::test]
    async fn template_edits_do_not_touch_generated_invoices() {
        let store = Arc::new(MemoryStore::new());
        let generator = generator(store.clone());
        let template = store
            .create_template(&input(Uuid::new_v4(), Frequency::Weekly, d(2024, 6, 3)))
            .await
            .unwrap();
        let generated = generator.generate(template.template_id).await.unwrap();

        let mut current = store.get_template(template.template_id).await.unwrap().unwrap();
        let version = current.version;
        UpdateRecurringTemplate {
            client_name: Some("Renamed".to_string()),
            total: Some(Decimal::from(999)),
            ..Default::default()
        }
        .apply_to(&mut current);
        store.save_template(&current, version).await.unwrap().unwrap();

        let invoice = store.get_invoice(generated.invoice_id).await.unwrap().unwrap();
        assert_eq!(invoice.client_name, "Acme");
        assert_eq!(invoice.total, Decimal::from(300));
    }
}
