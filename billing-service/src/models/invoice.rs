//! Invoices materialized from recurring templates.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

use super::recurring::RecurringTemplate;

/// Invoice status. Generated invoices always start as drafts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        s.parse().unwrap_or(InvoiceStatus::Draft)
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "cancelled" => Ok(InvoiceStatus::Cancelled),
            other => Err(format!("Unknown invoice status '{}'", other)),
        }
    }
}

/// Render a per-owner sequence number, e.g. `INV-0004`.
pub fn format_invoice_number(sequence: i64) -> String {
    format!("INV-{:04}", sequence)
}

/// Invoice snapshot. Never rewritten by later template edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub owner_id: Uuid,
    pub template_id: Option<Uuid>,
    pub invoice_number: String,
    pub status: String,
    pub issue_date: NaiveDate,
    pub client_name: String,
    pub client_email: String,
    pub client_business_name: Option<String>,
    pub client_address: Option<String>,
    pub client_phone: Option<String>,
    pub currency: String,
    pub subtotal: Decimal,
    pub tax_enabled: bool,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub discount_enabled: bool,
    pub discount_amount: Decimal,
    pub total: Decimal,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Invoice {
    pub fn invoice_status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }
}

/// Line item of an invoice, ordered by `order_index` starting at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InvoiceLineItem {
    pub line_item_id: Uuid,
    pub invoice_id: Uuid,
    pub order_index: i32,
    pub title: String,
    pub description: Option<String>,
    pub hours: Option<Decimal>,
    pub rate: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineItemDraft {
    pub order_index: i32,
    pub title: String,
    pub description: Option<String>,
    pub hours: Option<Decimal>,
    pub rate: Decimal,
    pub subtotal: Decimal,
}

/// Everything needed to persist an invoice except its number,
/// which the store allocates inside the commit.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceDraft {
    pub invoice_id: Uuid,
    pub owner_id: Uuid,
    pub template_id: Uuid,
    pub issue_date: NaiveDate,
    pub client_name: String,
    pub client_email: String,
    pub client_business_name: Option<String>,
    pub client_address: Option<String>,
    pub client_phone: Option<String>,
    pub currency: String,
    pub subtotal: Decimal,
    pub tax_enabled: bool,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub discount_enabled: bool,
    pub discount_amount: Decimal,
    pub total: Decimal,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub items: Vec<LineItemDraft>,
}

impl InvoiceDraft {
    /// Snapshot the client and financial fields of `template`.
    pub fn from_template(template: &RecurringTemplate) -> Self {
        let items = template
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| LineItemDraft {
                order_index: index as i32,
                title: item.title.clone(),
                description: item.description.clone(),
                hours: item.hours,
                rate: item.rate,
                subtotal: item.subtotal,
            })
            .collect();

        Self {
            invoice_id: Uuid::new_v4(),
            owner_id: template.owner_id,
            template_id: template.template_id,
            issue_date: template.next_invoice_date,
            client_name: template.client_name.clone(),
            client_email: template.client_email.clone(),
            client_business_name: template.client_business_name.clone(),
            client_address: template.client_address.clone(),
            client_phone: template.client_phone.clone(),
            currency: template.currency.clone(),
            subtotal: template.subtotal,
            tax_enabled: template.tax_enabled,
            tax_rate: template.tax_rate,
            tax_amount: template.tax_amount,
            discount_enabled: template.discount_enabled,
            discount_amount: template.discount_amount,
            total: template.total,
            notes: template.notes.clone(),
            terms: template.terms.clone(),
            items,
        }
    }

    /// The persisted form, once a number has been allocated.
    pub fn to_invoice(&self, invoice_number: String, created_utc: DateTime<Utc>) -> Invoice {
        Invoice {
            invoice_id: self.invoice_id,
            owner_id: self.owner_id,
            template_id: Some(self.template_id),
            invoice_number,
            status: InvoiceStatus::Draft.as_str().to_string(),
            issue_date: self.issue_date,
            client_name: self.client_name.clone(),
            client_email: self.client_email.clone(),
            client_business_name: self.client_business_name.clone(),
            client_address: self.client_address.clone(),
            client_phone: self.client_phone.clone(),
            currency: self.currency.clone(),
            subtotal: self.subtotal,
            tax_enabled: self.tax_enabled,
            tax_rate: self.tax_rate,
            tax_amount: self.tax_amount,
            discount_enabled: self.discount_enabled,
            discount_amount: self.discount_amount,
            total: self.total,
            notes: self.notes.clone(),
            terms: self.terms.clone(),
            created_utc,
        }
    }

    pub fn line_items(&self) -> Vec<InvoiceLineItem> {
        self.items
            .iter()
            .map(|item| InvoiceLineItem {
                line_item_id: Uuid::new_v4(),
                invoice_id: self.invoice_id,
                order_index: item.order_index,
                title: item.title.clone(),
                description: item.description.clone(),
                hours: item.hours,
                rate: item.rate,
                subtotal: item.subtotal,
            })
            .collect()
    }
}

/// One generation unit: advance the template from `expected_version`
/// and persist `draft` with its line items, or do nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationCommit {
    pub template_id: Uuid,
    pub expected_version: i64,
    pub next_invoice_date: NaiveDate,
    pub draft: InvoiceDraft,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedInvoice {
    pub invoice_id: Uuid,
    pub invoice_number: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::recurring::{TemplateItem, TemplateStatus};

    fn template() -> RecurringTemplate {
        let now = Utc::now();
        RecurringTemplate {
            template_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            template_name: "Retainer".to_string(),
            client_name: "Acme".to_string(),
            client_email: "ap@acme.test".to_string(),
            client_business_name: None,
            client_address: None,
            client_phone: None,
            frequency: "monthly".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            next_invoice_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            end_date: None,
            status: TemplateStatus::Active.as_str().to_string(),
            currency: "INR".to_string(),
            subtotal: Decimal::new(30000, 2),
            tax_enabled: false,
            tax_rate: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            discount_enabled: false,
            discount_amount: Decimal::ZERO,
            total: Decimal::new(30000, 2),
            invoices_generated: 0,
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
                    description: Some("Monthly".to_string()),
                    hours: None,
                    rate: Decimal::from(100),
                    subtotal: Decimal::from(100),
                },
            ],
            notes: None,
            terms: None,
            version: 0,
            created_utc: now,
            updated_utc: now,
        }
    }

    #[test]
    fn invoice_numbers_are_zero_padded() {
        assert_eq!(format_invoice_number(4), "INV-0004");
        assert_eq!(format_invoice_number(12345), "INV-12345");
    }

    #[test]
    fn draft_preserves_item_order() {
        let template = template();
        let draft = InvoiceDraft::from_template(&template);
        let items = draft.line_items();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].order_index, 0);
        assert_eq!(items[0].title, "Design");
        assert_eq!(items[1].order_index, 1);
        assert!(items.iter().all(|i| i.invoice_id == draft.invoice_id));

        let invoice = draft.to_invoice("INV-0001".to_string(), Utc::now());
        assert_eq!(invoice.invoice_status(), InvoiceStatus::Draft);
        assert_eq!(invoice.template_id, Some(template.template_id));
        assert_eq!(invoice.total, template.total);
    }
}
