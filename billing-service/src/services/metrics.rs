//! Prometheus metrics for purchase settlement and invoice generation.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_counter_vec, register_histogram_vec, register_int_counter_vec,
    CounterVec, Encoder, HistogramVec, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Store operation duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "billing_db_query_duration_seconds",
            "Store operation duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Purchases initiated by plan and cycle
pub static PURCHASES_INITIATED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Payment callbacks by target status and outcome (applied / noop)
pub static PURCHASE_TRANSITIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Settled purchase amount by currency and plan
pub static PURCHASE_AMOUNT_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Entitlement writes by plan and outcome (applied / skipped)
pub static ENTITLEMENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Plan notifications by outcome (sent / failed)
pub static NOTIFICATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Invoices generated by template frequency
pub static INVOICES_GENERATED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Generation attempts that lost the template version race
pub static GENERATION_CONFLICTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Safe to call more than once.
pub fn init_metrics() {
    PURCHASES_INITIATED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "billing_purchases_initiated_total",
                "Total purchase orders recorded by plan and billing cycle"
            ),
            &["plan", "billing_cycle"]
        )
        .expect("Failed to register PURCHASES_INITIATED_TOTAL")
    });

    PURCHASE_TRANSITIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "billing_purchase_transitions_total",
                "Payment callbacks by target status and outcome"
            ),
            &["status", "outcome"]
        )
        .expect("Failed to register PURCHASE_TRANSITIONS_TOTAL")
    });

    PURCHASE_AMOUNT_TOTAL.get_or_init(|| {
        register_counter_vec!(
            opts!(
                "billing_purchase_amount_total",
                "Total settled purchase amount by currency and plan"
            ),
            &["currency", "plan"]
        )
        .expect("Failed to register PURCHASE_AMOUNT_TOTAL")
    });

    ENTITLEMENTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "billing_entitlements_total",
                "Plan entitlement writes by plan and outcome"
            ),
            &["plan", "outcome"]
        )
        .expect("Failed to register ENTITLEMENTS_TOTAL")
    });

    NOTIFICATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "billing_notifications_total",
                "Plan notifications by outcome"
            ),
            &["outcome"]
        )
        .expect("Failed to register NOTIFICATIONS_TOTAL")
    });

    INVOICES_GENERATED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "billing_invoices_generated_total",
                "Invoices generated from recurring templates by frequency"
            ),
            &["frequency"]
        )
        .expect("Failed to register INVOICES_GENERATED_TOTAL")
    });

    GENERATION_CONFLICTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "billing_generation_conflicts_total",
                "Generation attempts rejected by the template version check"
            ),
            &["reason"]
        )
        .expect("Failed to register GENERATION_CONFLICTS_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("billing_errors_total", "Total errors by type for alerting"),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_purchase_initiated(plan: &str, billing_cycle: &str) {
    if let Some(counter) = PURCHASES_INITIATED_TOTAL.get() {
        counter.with_label_values(&[plan, billing_cycle]).inc();
    }
}

pub fn record_purchase_transition(status: &str, outcome: &str) {
    if let Some(counter) = PURCHASE_TRANSITIONS_TOTAL.get() {
        counter.with_label_values(&[status, outcome]).inc();
    }
}

/// Record a settled amount for financial tracking.
pub fn record_purchase_amount(currency: &str, plan: &str, amount: f64) {
    if let Some(counter) = PURCHASE_AMOUNT_TOTAL.get() {
        counter
            .with_label_values(&[currency, plan])
            .inc_by(amount.abs());
    }
}

pub fn record_entitlement(plan: &str, outcome: &str) {
    if let Some(counter) = ENTITLEMENTS_TOTAL.get() {
        counter.with_label_values(&[plan, outcome]).inc();
    }
}

pub fn record_notification(outcome: &str) {
    if let Some(counter) = NOTIFICATIONS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_invoice_generated(frequency: &str) {
    if let Some(counter) = INVOICES_GENERATED_TOTAL.get() {
        counter.with_label_values(&[frequency]).inc();
    }
}

pub fn record_generation_conflict(reason: &str) {
    if let Some(counter) = GENERATION_CONFLICTS_TOTAL.get() {
        counter.with_label_values(&[reason]).inc();
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}
