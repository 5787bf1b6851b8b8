//! PostgreSQL backend for the recurring billing service.

use crate::models::{
    format_invoice_number, CreateRecurringTemplate, EntitlementGrant, GeneratedInvoice,
    GenerationCommit, Invoice, InvoiceLineItem, InvoiceStatus, NewPurchaseOrder, PurchaseOrder,
    PurchaseStatus, PurchaseTransition, RecurringTemplate, Settlement, Subscriber,
    TemplateStatus,
};
use crate::services::error::BillingError;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{
    InvoiceStore, PurchaseStore, StoreHealth, SubscriberStore, TemplateStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const GATEWAY: &str = "oxapay";

const PURCHASE_COLUMNS: &str = "order_id, subscriber_id, raw_subscriber_ref, plan, billing_cycle, amount, currency, gateway, track_id, status, paid_at, expires_at, created_utc, updated_utc";

const SUBSCRIBER_COLUMNS: &str =
    "subscriber_id, email, name, plan, plan_expires_at, created_utc, updated_utc";

const TEMPLATE_COLUMNS: &str = "template_id, owner_id, template_name, client_name, client_email, client_business_name, client_address, client_phone, frequency, start_date, next_invoice_date, end_date, status, currency, subtotal, tax_enabled, tax_rate, tax_amount, discount_enabled, discount_amount, total, invoices_generated, max_invoices, items, notes, terms, version, created_utc, updated_utc";

const INVOICE_COLUMNS: &str = "invoice_id, owner_id, template_id, invoice_number, status, issue_date, client_name, client_email, client_business_name, client_address, client_phone, currency, subtotal, tax_enabled, tax_rate, tax_amount, discount_enabled, discount_amount, total, notes, terms, created_utc";

fn db_error(context: &str, e: sqlx::Error) -> BillingError {
    BillingError::Persistence(anyhow::anyhow!("Failed to {}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "recurring-billing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, BillingError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| db_error("connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), BillingError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| BillingError::Persistence(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

// =========================================================================
// Purchase Operations
// =========================================================================

#[async_trait]
impl PurchaseStore for Database {
    #[instrument(skip(self, order), fields(order_id = %order.order_id))]
    async fn insert_purchase(&self, order: &NewPurchaseOrder) -> Result<PurchaseOrder, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_purchase"])
            .start_timer();

        let purchase = sqlx::query_as::<_, PurchaseOrder>(&format!(
            r#"
            INSERT INTO purchase_orders (order_id, subscriber_id, raw_subscriber_ref, plan, billing_cycle, amount, currency, gateway, track_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {PURCHASE_COLUMNS}
            "#
        ))
        .bind(&order.order_id)
        .bind(order.subscriber_id)
        .bind(&order.raw_subscriber_ref)
        .bind(order.plan.as_str())
        .bind(order.billing_cycle.as_str())
        .bind(order.amount)
        .bind(&order.currency)
        .bind(GATEWAY)
        .bind(&order.track_id)
        .bind(order.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                BillingError::Conflict(format!(
                    "Purchase order '{}' already exists",
                    order.order_id
                ))
            }
            _ => db_error("create purchase", e),
        })?;

        timer.observe_duration();
        info!(order_id = %purchase.order_id, status = %purchase.status, "Purchase recorded");

        Ok(purchase)
    }

    #[instrument(skip(self))]
    async fn get_purchase(&self, order_id: &str) -> Result<Option<PurchaseOrder>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_purchase"])
            .start_timer();

        let purchase = sqlx::query_as::<_, PurchaseOrder>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchase_orders WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get purchase", e))?;

        timer.observe_duration();
        Ok(purchase)
    }

    #[instrument(skip(self, transition), fields(status = transition.status.as_str()))]
    async fn transition_purchase(
        &self,
        order_id: &str,
        transition: &PurchaseTransition,
    ) -> Result<Option<PurchaseOrder>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transition_purchase"])
            .start_timer();

        let purchase = sqlx::query_as::<_, PurchaseOrder>(&transition_sql())
            .bind(order_id)
            .bind(transition.status.as_str())
            .bind(transition.paid_at)
            .bind(transition.expires_at)
            .bind(open_statuses())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("transition purchase", e))?;

        timer.observe_duration();
        Ok(purchase)
    }

    #[instrument(skip(self, transition, grant))]
    async fn settle_paid(
        &self,
        order_id: &str,
        transition: &PurchaseTransition,
        grant: Option<&EntitlementGrant>,
    ) -> Result<Option<Settlement>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["settle_paid"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin settlement", e))?;

        // Row lock on the order holds concurrent callbacks until this commits.
        let purchase = sqlx::query_as::<_, PurchaseOrder>(&transition_sql())
            .bind(order_id)
            .bind(transition.status.as_str())
            .bind(transition.paid_at)
            .bind(transition.expires_at)
            .bind(open_statuses())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("settle purchase", e))?;

        let Some(purchase) = purchase else {
            tx.rollback()
                .await
                .map_err(|e| db_error("rollback settlement", e))?;
            timer.observe_duration();
            return Ok(None);
        };

        let subscriber = match grant {
            Some(grant) => sqlx::query_as::<_, Subscriber>(&format!(
                r#"
                UPDATE subscribers
                SET plan = $2, plan_expires_at = $3, updated_utc = NOW()
                WHERE subscriber_id = $1
                RETURNING {SUBSCRIBER_COLUMNS}
                "#
            ))
            .bind(grant.subscriber_id)
            .bind(grant.plan.as_str())
            .bind(grant.expires_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("apply entitlement", e))?,
            None => None,
        };

        tx.commit()
            .await
            .map_err(|e| db_error("commit settlement", e))?;

        timer.observe_duration();
        info!(
            order_id = %order_id,
            entitled = subscriber.is_some(),
            "Purchase settled"
        );

        Ok(Some(Settlement {
            purchase,
            subscriber,
        }))
    }
}

/// Conditional status update; matches only while the order is open.
fn transition_sql() -> String {
    format!(
        r#"
        UPDATE purchase_orders
        SET status = $2,
            paid_at = COALESCE($3, paid_at),
            expires_at = COALESCE($4, expires_at),
            updated_utc = NOW()
        WHERE order_id = $1 AND status = ANY($5)
        RETURNING {PURCHASE_COLUMNS}
        "#
    )
}

fn open_statuses() -> Vec<String> {
    PurchaseStatus::OPEN
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

// =========================================================================
// Subscriber Operations
// =========================================================================

#[async_trait]
impl SubscriberStore for Database {
    #[instrument(skip(self))]
    async fn get_subscriber(&self, subscriber_id: Uuid) -> Result<Option<Subscriber>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscriber"])
            .start_timer();

        let subscriber = sqlx::query_as::<_, Subscriber>(&format!(
            "SELECT {SUBSCRIBER_COLUMNS} FROM subscribers WHERE subscriber_id = $1"
        ))
        .bind(subscriber_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get subscriber", e))?;

        timer.observe_duration();
        Ok(subscriber)
    }

    #[instrument(skip(self, subscriber), fields(subscriber_id = %subscriber.subscriber_id))]
    async fn upsert_subscriber(&self, subscriber: &Subscriber) -> Result<Subscriber, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_subscriber"])
            .start_timer();

        let stored = sqlx::query_as::<_, Subscriber>(&format!(
            r#"
            INSERT INTO subscribers (subscriber_id, email, name, plan, plan_expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (subscriber_id) DO UPDATE
            SET email = EXCLUDED.email,
                name = EXCLUDED.name,
                plan = EXCLUDED.plan,
                plan_expires_at = EXCLUDED.plan_expires_at,
                updated_utc = NOW()
            RETURNING {SUBSCRIBER_COLUMNS}
            "#
        ))
        .bind(subscriber.subscriber_id)
        .bind(&subscriber.email)
        .bind(&subscriber.name)
        .bind(&subscriber.plan)
        .bind(subscriber.plan_expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("upsert subscriber", e))?;

        timer.observe_duration();
        Ok(stored)
    }
}

// =========================================================================
// Template Operations
// =========================================================================

#[async_trait]
impl TemplateStore for Database {
    #[instrument(skip(self, input), fields(owner_id = %input.owner_id))]
    async fn create_template(
        &self,
        input: &CreateRecurringTemplate,
    ) -> Result<RecurringTemplate, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_template"])
            .start_timer();

        let template = sqlx::query_as::<_, RecurringTemplate>(&format!(
            r#"
            INSERT INTO recurring_templates (template_id, owner_id, template_name, client_name, client_email, client_business_name, client_address, client_phone, frequency, start_date, next_invoice_date, end_date, status, currency, subtotal, tax_enabled, tax_rate, tax_amount, discount_enabled, discount_amount, total, max_invoices, items, notes, terms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
            RETURNING {TEMPLATE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.owner_id)
        .bind(&input.template_name)
        .bind(&input.client_name)
        .bind(&input.client_email)
        .bind(&input.client_business_name)
        .bind(&input.client_address)
        .bind(&input.client_phone)
        .bind(input.frequency.as_str())
        .bind(input.start_date)
        .bind(input.next_invoice_date)
        .bind(input.end_date)
        .bind(input.status.as_str())
        .bind(&input.currency)
        .bind(input.subtotal)
        .bind(input.tax_enabled)
        .bind(input.tax_rate)
        .bind(input.tax_amount)
        .bind(input.discount_enabled)
        .bind(input.discount_amount)
        .bind(input.total)
        .bind(input.max_invoices)
        .bind(Json(&input.items))
        .bind(&input.notes)
        .bind(&input.terms)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("create template", e))?;

        timer.observe_duration();
        info!(template_id = %template.template_id, "Recurring template created");

        Ok(template)
    }

    #[instrument(skip(self))]
    async fn get_template(&self, template_id: Uuid) -> Result<Option<RecurringTemplate>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_template"])
            .start_timer();

        let template = sqlx::query_as::<_, RecurringTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM recurring_templates WHERE template_id = $1"
        ))
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get template", e))?;

        timer.observe_duration();
        Ok(template)
    }

    #[instrument(skip(self))]
    async fn list_templates(&self, owner_id: Uuid) -> Result<Vec<RecurringTemplate>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_templates"])
            .start_timer();

        let templates = sqlx::query_as::<_, RecurringTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM recurring_templates WHERE owner_id = $1 ORDER BY created_utc DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list templates", e))?;

        timer.observe_duration();
        Ok(templates)
    }

    #[instrument(skip(self, template), fields(template_id = %template.template_id))]
    async fn save_template(
        &self,
        template: &RecurringTemplate,
        expected_version: i64,
    ) -> Result<Option<RecurringTemplate>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_template"])
            .start_timer();

        let saved = sqlx::query_as::<_, RecurringTemplate>(&format!(
            r#"
            UPDATE recurring_templates
            SET template_name = $3, client_name = $4, client_email = $5,
                client_business_name = $6, client_address = $7, client_phone = $8,
                frequency = $9, next_invoice_date = $10, end_date = $11, status = $12,
                currency = $13, subtotal = $14, tax_enabled = $15, tax_rate = $16,
                tax_amount = $17, discount_enabled = $18, discount_amount = $19, total = $20,
                max_invoices = $21, items = $22, notes = $23, terms = $24,
                version = version + 1, updated_utc = NOW()
            WHERE template_id = $1 AND version = $2
            RETURNING {TEMPLATE_COLUMNS}
            "#
        ))
        .bind(template.template_id)
        .bind(expected_version)
        .bind(&template.template_name)
        .bind(&template.client_name)
        .bind(&template.client_email)
        .bind(&template.client_business_name)
        .bind(&template.client_address)
        .bind(&template.client_phone)
        .bind(&template.frequency)
        .bind(template.next_invoice_date)
        .bind(template.end_date)
        .bind(&template.status)
        .bind(&template.currency)
        .bind(template.subtotal)
        .bind(template.tax_enabled)
        .bind(template.tax_rate)
        .bind(template.tax_amount)
        .bind(template.discount_enabled)
        .bind(template.discount_amount)
        .bind(template.total)
        .bind(template.max_invoices)
        .bind(Json(&template.items))
        .bind(&template.notes)
        .bind(&template.terms)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("update template", e))?;

        timer.observe_duration();
        Ok(saved)
    }

    #[instrument(skip(self))]
    async fn delete_template(&self, template_id: Uuid) -> Result<bool, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_template"])
            .start_timer();

        let result = sqlx::query("DELETE FROM recurring_templates WHERE template_id = $1")
            .bind(template_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete template", e))?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    #[instrument(
        skip(self, commit),
        fields(template_id = %commit.template_id, expected_version = commit.expected_version)
    )]
    async fn commit_generation(
        &self,
        commit: &GenerationCommit,
    ) -> Result<Option<GeneratedInvoice>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["commit_generation"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))?;

        // Claim the template version; a concurrent winner leaves zero rows here.
        let advanced = sqlx::query(
            r#"
            UPDATE recurring_templates
            SET invoices_generated = invoices_generated + 1,
                next_invoice_date = $3,
                version = version + 1,
                updated_utc = NOW()
            WHERE template_id = $1 AND version = $2 AND status = $4
            "#,
        )
        .bind(commit.template_id)
        .bind(commit.expected_version)
        .bind(commit.next_invoice_date)
        .bind(TemplateStatus::Active.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("advance template", e))?;

        if advanced.rows_affected() == 0 {
            tx.rollback().await.ok();
            timer.observe_duration();
            return Ok(None);
        }

        let draft = &commit.draft;

        // Per-owner counter; the row lock serializes concurrent allocations.
        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO invoice_counters (owner_id, last_number)
            VALUES ($1, (SELECT COUNT(*) FROM invoices WHERE owner_id = $1) + 1)
            ON CONFLICT (owner_id) DO UPDATE
            SET last_number = invoice_counters.last_number + 1
            RETURNING last_number
            "#,
        )
        .bind(draft.owner_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("allocate invoice number", e))?;

        let invoice_number = format_invoice_number(sequence);

        sqlx::query(
            r#"
            INSERT INTO invoices (invoice_id, owner_id, template_id, invoice_number, status, issue_date, client_name, client_email, client_business_name, client_address, client_phone, currency, subtotal, tax_enabled, tax_rate, tax_amount, discount_enabled, discount_amount, total, notes, terms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            "#,
        )
        .bind(draft.invoice_id)
        .bind(draft.owner_id)
        .bind(draft.template_id)
        .bind(&invoice_number)
        .bind(InvoiceStatus::Draft.as_str())
        .bind(draft.issue_date)
        .bind(&draft.client_name)
        .bind(&draft.client_email)
        .bind(&draft.client_business_name)
        .bind(&draft.client_address)
        .bind(&draft.client_phone)
        .bind(&draft.currency)
        .bind(draft.subtotal)
        .bind(draft.tax_enabled)
        .bind(draft.tax_rate)
        .bind(draft.tax_amount)
        .bind(draft.discount_enabled)
        .bind(draft.discount_amount)
        .bind(draft.total)
        .bind(&draft.notes)
        .bind(&draft.terms)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("create invoice", e))?;

        for item in draft.line_items() {
            sqlx::query(
                r#"
                INSERT INTO invoice_line_items (line_item_id, invoice_id, order_index, title, description, hours, rate, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(item.line_item_id)
            .bind(item.invoice_id)
            .bind(item.order_index)
            .bind(&item.title)
            .bind(&item.description)
            .bind(item.hours)
            .bind(item.rate)
            .bind(item.subtotal)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("create invoice line item", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit generation", e))?;

        timer.observe_duration();
        info!(
            invoice_id = %draft.invoice_id,
            invoice_number = %invoice_number,
            "Invoice generated"
        );

        Ok(Some(GeneratedInvoice {
            invoice_id: draft.invoice_id,
            invoice_number,
        }))
    }
}

// =========================================================================
// Invoice Operations
// =========================================================================

#[async_trait]
impl InvoiceStore for Database {
    #[instrument(skip(self))]
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_id = $1"
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get invoice", e))?;

        timer.observe_duration();
        Ok(invoice)
    }

    #[instrument(skip(self))]
    async fn list_line_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceLineItem>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_line_items"])
            .start_timer();

        let items = sqlx::query_as::<_, InvoiceLineItem>(
            r#"
            SELECT line_item_id, invoice_id, order_index, title, description, hours, rate, subtotal
            FROM invoice_line_items
            WHERE invoice_id = $1
            ORDER BY order_index
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list line items", e))?;

        timer.observe_duration();
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn count_invoices(&self, owner_id: Uuid) -> Result<i64, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["count_invoices"])
            .start_timer();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("count invoices", e))?;

        timer.observe_duration();
        Ok(count)
    }
}

#[async_trait]
impl StoreHealth for Database {
    /// Check database health.
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("run health check", e))?;

        timer.observe_duration();
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
