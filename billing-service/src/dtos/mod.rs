//! HTTP request and response bodies.

use crate::models::{
    CreateRecurringTemplate, Frequency, Invoice, InvoiceLineItem, PlanTier, PurchaseOrder,
    Subscriber, TemplateItem, TemplateStatus, UpdateRecurringTemplate,
};
use crate::services::{BillingError, InitiatePurchase};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

const DEFAULT_TEMPLATE_CURRENCY: &str = "INR";

// =========================================================================
// Purchases
// =========================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePurchaseRequest {
    pub user_id: Option<String>,
    pub plan: Option<String>,
    pub billing_cycle: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub order_id: Option<String>,
    pub track_id: Option<String>,
}

impl InitiatePurchaseRequest {
    pub fn into_intent(self) -> Result<InitiatePurchase, BillingError> {
        fn field(value: Option<String>, name: &str) -> Result<String, BillingError> {
            value.ok_or_else(|| BillingError::Validation(format!("{} is required", name)))
        }

        Ok(InitiatePurchase {
            order_id: field(self.order_id, "orderId")?,
            subscriber_ref: field(self.user_id, "userId")?,
            plan: field(self.plan, "plan")?,
            billing_cycle: field(self.billing_cycle, "billingCycle")?,
            amount: self
                .amount
                .ok_or_else(|| BillingError::Validation("amount is required".to_string()))?,
            currency: self.currency,
            track_id: self.track_id,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub ok: bool,
    pub purchase: PurchaseOrder,
}

#[derive(Debug, Deserialize)]
pub struct PaymentCallbackRequest {
    pub order_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

// =========================================================================
// Recurring templates
// =========================================================================

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TemplateItemRequest {
    #[validate(length(min = 1, message = "item title is required"))]
    pub title: String,
    pub description: Option<String>,
    pub hours: Option<Decimal>,
    #[serde(default)]
    pub rate: Decimal,
    #[serde(default)]
    pub subtotal: Decimal,
}

impl From<TemplateItemRequest> for TemplateItem {
    fn from(item: TemplateItemRequest) -> Self {
        TemplateItem {
            title: item.title,
            description: item.description,
            hours: item.hours,
            rate: item.rate,
            subtotal: item.subtotal,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTemplateRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, message = "template_name is required"))]
    pub template_name: String,
    #[validate(length(min = 1, message = "client_name is required"))]
    pub client_name: String,
    #[validate(email(message = "client_email must be a valid email"))]
    pub client_email: String,
    pub client_business_name: Option<String>,
    pub client_address: Option<String>,
    pub client_phone: Option<String>,
    pub frequency: String,
    pub start_date: NaiveDate,
    pub next_invoice_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub currency: Option<String>,
    #[serde(default)]
    pub subtotal: Decimal,
    #[serde(default)]
    pub tax_enabled: bool,
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub tax_amount: Decimal,
    #[serde(default)]
    pub discount_enabled: bool,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub total: Decimal,
    pub max_invoices: Option<i32>,
    #[serde(default)]
    #[validate(nested)]
    pub items: Vec<TemplateItemRequest>,
    pub notes: Option<String>,
    pub terms: Option<String>,
}

fn parse_status(status: Option<String>) -> Result<Option<TemplateStatus>, BillingError> {
    status
        .map(|s| s.parse().map_err(BillingError::Validation))
        .transpose()
}

fn parse_frequency(frequency: Option<String>) -> Result<Option<Frequency>, BillingError> {
    frequency
        .map(|s| s.parse().map_err(BillingError::Validation))
        .transpose()
}

impl CreateTemplateRequest {
    pub fn into_input(self) -> Result<CreateRecurringTemplate, BillingError> {
        self.validate()?;
        let frequency = parse_frequency(Some(self.frequency))?.unwrap_or(Frequency::Monthly);

        Ok(CreateRecurringTemplate {
            owner_id: self.user_id,
            template_name: self.template_name,
            client_name: self.client_name,
            client_email: self.client_email,
            client_business_name: self.client_business_name,
            client_address: self.client_address,
            client_phone: self.client_phone,
            frequency,
            start_date: self.start_date,
            next_invoice_date: self.next_invoice_date.unwrap_or(self.start_date),
            end_date: self.end_date,
            status: parse_status(self.status)?.unwrap_or(TemplateStatus::Active),
            currency: self
                .currency
                .filter(|c| !c.trim().is_empty())
                .map(|c| c.trim().to_uppercase())
                .unwrap_or_else(|| DEFAULT_TEMPLATE_CURRENCY.to_string()),
            subtotal: self.subtotal,
            tax_enabled: self.tax_enabled,
            tax_rate: self.tax_rate,
            tax_amount: self.tax_amount,
            discount_enabled: self.discount_enabled,
            discount_amount: self.discount_amount,
            total: self.total,
            max_invoices: self.max_invoices,
            items: self.items.into_iter().map(TemplateItem::from).collect(),
            notes: self.notes,
            terms: self.terms,
        })
    }
}

/// Partial update. `invoices_generated` and the owner are not accepted.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTemplateRequest {
    #[validate(length(min = 1))]
    pub template_name: Option<String>,
    #[validate(length(min = 1))]
    pub client_name: Option<String>,
    #[validate(email)]
    pub client_email: Option<String>,
    pub client_business_name: Option<String>,
    pub client_address: Option<String>,
    pub client_phone: Option<String>,
    pub frequency: Option<String>,
    pub next_invoice_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub currency: Option<String>,
    pub subtotal: Option<Decimal>,
    pub tax_enabled: Option<bool>,
    pub tax_rate: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub discount_enabled: Option<bool>,
    pub discount_amount: Option<Decimal>,
    pub total: Option<Decimal>,
    pub max_invoices: Option<i32>,
    #[validate(nested)]
    pub items: Option<Vec<TemplateItemRequest>>,
    pub notes: Option<String>,
    pub terms: Option<String>,
}

impl UpdateTemplateRequest {
    pub fn into_patch(self) -> Result<UpdateRecurringTemplate, BillingError> {
        self.validate()?;

        Ok(UpdateRecurringTemplate {
            template_name: self.template_name,
            client_name: self.client_name,
            client_email: self.client_email,
            client_business_name: self.client_business_name,
            client_address: self.client_address,
            client_phone: self.client_phone,
            frequency: parse_frequency(self.frequency)?,
            next_invoice_date: self.next_invoice_date,
            end_date: self.end_date,
            status: parse_status(self.status)?,
            currency: self.currency.map(|c| c.trim().to_uppercase()),
            subtotal: self.subtotal,
            tax_enabled: self.tax_enabled,
            tax_rate: self.tax_rate,
            tax_amount: self.tax_amount,
            discount_enabled: self.discount_enabled,
            discount_amount: self.discount_amount,
            total: self.total,
            max_invoices: self.max_invoices,
            items: self
                .items
                .map(|items| items.into_iter().map(TemplateItem::from).collect()),
            notes: self.notes,
            terms: self.terms,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ListTemplatesQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateInvoiceResponse {
    pub invoice_id: Uuid,
    pub invoice_number: String,
}

// =========================================================================
// Invoices & entitlements
// =========================================================================

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub line_items: Vec<InvoiceLineItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntitlementResponse {
    pub subscriber_id: Uuid,
    pub plan: String,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub features: Vec<String>,
}

impl EntitlementResponse {
    pub fn from_subscriber(subscriber: &Subscriber, now: DateTime<Utc>) -> Self {
        let tier = subscriber.plan_tier();
        let active = match (tier, subscriber.plan_expires_at) {
            (PlanTier::Free, _) => true,
            (_, Some(expires_at)) => expires_at > now,
            (_, None) => false,
        };
        // Lapsed paid plans fall back to the free feature set.
        let effective = if active { tier } else { PlanTier::Free };

        Self {
            subscriber_id: subscriber.subscriber_id,
            plan: tier.as_str().to_string(),
            plan_expires_at: subscriber.plan_expires_at,
            active,
            features: effective
                .features()
                .iter()
                .map(|f| f.label().to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn missing_purchase_fields_are_validation_errors() {
        let request: InitiatePurchaseRequest =
            serde_json::from_value(serde_json::json!({"userId": "u", "plan": "pro"})).unwrap();
        assert!(matches!(
            request.into_intent(),
            Err(BillingError::Validation(_))
        ));
    }

    #[test]
    fn create_template_defaults() {
        let request: CreateTemplateRequest = serde_json::from_value(serde_json::json!({
            "user_id": Uuid::new_v4(),
            "template_name": "Retainer",
            "client_name": "Acme",
            "client_email": "ap@acme.test",
            "frequency": "weekly",
            "start_date": "2024-01-01",
            "total": 10
        }))
        .unwrap();

        let input = request.into_input().unwrap();
        assert_eq!(input.currency, "INR");
        assert_eq!(input.status, TemplateStatus::Active);
        assert_eq!(input.frequency, Frequency::Weekly);
        assert_eq!(input.next_invoice_date, input.start_date);
        assert_eq!(input.total, Decimal::from(10));
    }

    #[test]
    fn create_template_rejects_bad_email_and_frequency() {
        let base = serde_json::json!({
            "user_id": Uuid::new_v4(),
            "template_name": "Retainer",
            "client_name": "Acme",
            "client_email": "not-an-email",
            "frequency": "weekly",
            "start_date": "2024-01-01"
        });
        let request: CreateTemplateRequest = serde_json::from_value(base.clone()).unwrap();
        assert!(matches!(request.into_input(), Err(BillingError::Validation(_))));

        let mut other = base;
        other["client_email"] = "ok@acme.test".into();
        other["frequency"] = "hourly".into();
        let request: CreateTemplateRequest = serde_json::from_value(other).unwrap();
        assert!(matches!(request.into_input(), Err(BillingError::Validation(_))));
    }

    #[test]
    fn lapsed_plan_reports_free_features() {
        let now = Utc::now();
        let mut subscriber = Subscriber::new(Uuid::new_v4(), None, None);
        subscriber.plan = "agency".to_string();
        subscriber.plan_expires_at = Some(now - Duration::days(1));

        let response = EntitlementResponse::from_subscriber(&subscriber, now);
        assert!(!response.active);
        assert_eq!(response.plan, "agency");
        assert_eq!(
            response.features,
            vec!["Core invoicing", "Email delivery", "Client portal"]
        );

        subscriber.plan_expires_at = Some(now + Duration::days(10));
        let response = EntitlementResponse::from_subscriber(&subscriber, now);
        assert!(response.active);
        assert_eq!(response.features.len(), 4);
    }
}
