//! Recurring invoice template model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// How often a template produces an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Yearly => "yearly",
        }
    }

    /// Unrecognized values schedule monthly.
    pub fn from_string(s: &str) -> Self {
        s.parse().unwrap_or(Frequency::Monthly)
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "quarterly" => Ok(Frequency::Quarterly),
            "yearly" => Ok(Frequency::Yearly),
            other => Err(format!("Unknown frequency '{}'", other)),
        }
    }
}

/// Template lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateStatus {
    Active,
    Paused,
    Completed,
}

impl TemplateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateStatus::Active => "active",
            TemplateStatus::Paused => "paused",
            TemplateStatus::Completed => "completed",
        }
    }

    /// Unknown stored values are treated as paused so they never generate.
    pub fn from_string(s: &str) -> Self {
        s.parse().unwrap_or(TemplateStatus::Paused)
    }
}

impl FromStr for TemplateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(TemplateStatus::Active),
            "paused" => Ok(TemplateStatus::Paused),
            "completed" => Ok(TemplateStatus::Completed),
            other => Err(format!("Unknown template status '{}'", other)),
        }
    }
}

/// One billable row of a template; copied verbatim onto each generated invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateItem {
    pub title: String,
    pub description: Option<String>,
    pub hours: Option<Decimal>,
    pub rate: Decimal,
    pub subtotal: Decimal,
}

/// Recurring billing template.
///
/// `version` is bumped by every write and is the optimistic-concurrency token
/// used when a generation commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RecurringTemplate {
    pub template_id: Uuid,
    pub owner_id: Uuid,
    pub template_name: String,
    pub client_name: String,
    pub client_email: String,
    pub client_business_name: Option<String>,
    pub client_address: Option<String>,
    pub client_phone: Option<String>,
    pub frequency: String,
    pub start_date: NaiveDate,
    pub next_invoice_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: String,
    pub currency: String,
    pub subtotal: Decimal,
    pub tax_enabled: bool,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub discount_enabled: bool,
    pub discount_amount: Decimal,
    pub total: Decimal,
    pub invoices_generated: i32,
    pub max_invoices: Option<i32>,
    #[sqlx(json)]
    pub items: Vec<TemplateItem>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub version: i64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl RecurringTemplate {
    pub fn template_status(&self) -> TemplateStatus {
        TemplateStatus::from_string(&self.status)
    }

    pub fn schedule_frequency(&self) -> Frequency {
        Frequency::from_string(&self.frequency)
    }
}

/// Input for creating a template.
#[derive(Debug, Clone)]
pub struct CreateRecurringTemplate {
    pub owner_id: Uuid,
    pub template_name: String,
    pub client_name: String,
    pub client_email: String,
    pub client_business_name: Option<String>,
    pub client_address: Option<String>,
    pub client_phone: Option<String>,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub next_invoice_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: TemplateStatus,
    pub currency: String,
    pub subtotal: Decimal,
    pub tax_enabled: bool,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub discount_enabled: bool,
    pub discount_amount: Decimal,
    pub total: Decimal,
    pub max_invoices: Option<i32>,
    pub items: Vec<TemplateItem>,
    pub notes: Option<String>,
    pub terms: Option<String>,
}

/// Partial update of a template. Schedule counters are not writable here.
#[derive(Debug, Clone, Default)]
pub struct UpdateRecurringTemplate {
    pub template_name: Option<String>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_business_name: Option<String>,
    pub client_address: Option<String>,
    pub client_phone: Option<String>,
    pub frequency: Option<Frequency>,
    pub next_invoice_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<TemplateStatus>,
    pub currency: Option<String>,
    pub subtotal: Option<Decimal>,
    pub tax_enabled: Option<bool>,
    pub tax_rate: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub discount_enabled: Option<bool>,
    pub discount_amount: Option<Decimal>,
    pub total: Option<Decimal>,
    pub max_invoices: Option<i32>,
    pub items: Option<Vec<TemplateItem>>,
    pub notes: Option<String>,
    pub terms: Option<String>,
}

impl UpdateRecurringTemplate {
    /// Apply the present fields onto `template`, leaving the rest untouched.
    pub fn apply_to(&self, template: &mut RecurringTemplate) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }
        fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *target = value.clone();
            }
        }

        set(&mut template.template_name, &self.template_name);
        set(&mut template.client_name, &self.client_name);
        set(&mut template.client_email, &self.client_email);
        set_opt(&mut template.client_business_name, &self.client_business_name);
        set_opt(&mut template.client_address, &self.client_address);
        set_opt(&mut template.client_phone, &self.client_phone);
        if let Some(frequency) = self.frequency {
            template.frequency = frequency.as_str().to_string();
        }
        set(&mut template.next_invoice_date, &self.next_invoice_date);
        set_opt(&mut template.end_date, &self.end_date);
        if let Some(status) = self.status {
            template.status = status.as_str().to_string();
        }
        set(&mut template.currency, &self.currency);
        set(&mut template.subtotal, &self.subtotal);
        set(&mut template.tax_enabled, &self.tax_enabled);
        set(&mut template.tax_rate, &self.tax_rate);
        set(&mut template.tax_amount, &self.tax_amount);
        set(&mut template.discount_enabled, &self.discount_enabled);
        set(&mut template.discount_amount, &self.discount_amount);
        set(&mut template.total, &self.total);
        set_opt(&mut template.max_invoices, &self.max_invoices);
        set(&mut template.items, &self.items);
        set_opt(&mut template.notes, &self.notes);
        set_opt(&mut template.terms, &self.terms);
    }
}
