//! Domain models for the recurring billing service.

mod invoice;
mod plan;
mod purchase;
mod recurring;
mod subscriber;

pub use invoice::{
    format_invoice_number, GeneratedInvoice, GenerationCommit, Invoice, InvoiceDraft,
    InvoiceLineItem, InvoiceStatus, LineItemDraft,
};
pub use plan::{BillingCycle, PlanFeature, PlanTier};
pub use purchase::{
    EntitlementGrant, NewPurchaseOrder, PurchaseOrder, PurchaseStatus, PurchaseTransition,
    Settlement,
};
pub use recurring::{
    CreateRecurringTemplate, Frequency, RecurringTemplate, TemplateItem, TemplateStatus,
    UpdateRecurringTemplate,
};
pub use subscriber::Subscriber;
