//! Recurring template management.

use crate::models::{CreateRecurringTemplate, RecurringTemplate, UpdateRecurringTemplate};
use crate::services::error::BillingError;
use crate::services::store::Stores;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct TemplateService {
    stores: Stores,
}

struct Checked<'a> {
    start_date: NaiveDate,
    next_invoice_date: NaiveDate,
    end_date: Option<NaiveDate>,
    max_invoices: Option<i32>,
    amounts: [(&'a str, Decimal); 5],
}

fn check(t: Checked<'_>) -> Result<(), BillingError> {
    if t.next_invoice_date < t.start_date {
        return Err(BillingError::Validation(
            "next_invoice_date cannot be before start_date".to_string(),
        ));
    }
    if let Some(end) = t.end_date {
        if end < t.start_date {
            return Err(BillingError::Validation(
                "end_date cannot be before start_date".to_string(),
            ));
        }
    }
    if matches!(t.max_invoices, Some(n) if n < 1) {
        return Err(BillingError::Validation(
            "max_invoices must be at least 1".to_string(),
        ));
    }
    for (field, value) in t.amounts {
        if value < Decimal::ZERO {
            return Err(BillingError::Validation(format!(
                "{} cannot be negative",
                field
            )));
        }
    }
    Ok(())
}

impl TemplateService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    #[instrument(skip(self, input), fields(owner_id = %input.owner_id))]
    pub async fn create(
        &self,
        input: CreateRecurringTemplate,
    ) -> Result<RecurringTemplate, BillingError> {
        check(Checked {
            start_date: input.start_date,
            next_invoice_date: input.next_invoice_date,
            end_date: input.end_date,
            max_invoices: input.max_invoices,
            amounts: [
                ("subtotal", input.subtotal),
                ("tax_rate", input.tax_rate),
                ("tax_amount", input.tax_amount),
                ("discount_amount", input.discount_amount),
                ("total", input.total),
            ],
        })?;

        self.stores
            .bounded("create_template", self.stores.templates.create_template(&input))
            .await
    }

    pub async fn list(&self, owner_id: Uuid) -> Result<Vec<RecurringTemplate>, BillingError> {
        self.stores
            .bounded("list_templates", self.stores.templates.list_templates(owner_id))
            .await
    }

    pub async fn get(&self, template_id: Uuid) -> Result<RecurringTemplate, BillingError> {
        self.stores
            .bounded("get_template", self.stores.templates.get_template(template_id))
            .await?
            .ok_or_else(|| BillingError::NotFound("Recurring template".to_string()))
    }

    /// Apply a partial update. The schedule may only move forward, and the
    /// write fails with a state conflict if the template changed meanwhile.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        template_id: Uuid,
        patch: UpdateRecurringTemplate,
    ) -> Result<RecurringTemplate, BillingError> {
        let mut template = self.get(template_id).await?;
        let version = template.version;

        if let Some(next) = patch.next_invoice_date {
            if next < template.next_invoice_date {
                return Err(BillingError::Validation(format!(
                    "next_invoice_date cannot move backward from {}",
                    template.next_invoice_date
                )));
            }
        }

        patch.apply_to(&mut template);
        check(Checked {
            start_date: template.start_date,
            next_invoice_date: template.next_invoice_date,
            end_date: template.end_date,
            max_invoices: template.max_invoices,
            amounts: [
                ("subtotal", template.subtotal),
                ("tax_rate", template.tax_rate),
                ("tax_amount", template.tax_amount),
                ("discount_amount", template.discount_amount),
                ("total", template.total),
            ],
        })?;

        let saved = self
            .stores
            .bounded(
                "save_template",
                self.stores.templates.save_template(&template, version),
            )
            .await?
            .ok_or_else(|| {
                BillingError::StateConflict(
                    "Template was modified concurrently; reload and retry".to_string(),
                )
            })?;

        info!(template_id = %template_id, version = saved.version, "Recurring template updated");
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, template_id: Uuid) -> Result<(), BillingError> {
        let deleted = self
            .stores
            .bounded(
                "delete_template",
                self.stores.templates.delete_template(template_id),
            )
            .await?;
        if !deleted {
            return Err(BillingError::NotFound("Recurring template".to_string()));
        }
        info!(template_id = %template_id, "Recurring template deleted");
        Ok(())
    }
}
