//! Test helper module for billing-service integration tests.
//!
//! Spawns the service on a random port over the in-memory store, or over
//! PostgreSQL in a throwaway schema when `TEST_DATABASE_URL` is set.

#![allow(dead_code)]

use async_trait::async_trait;
use recurring_billing_service::config::BillingConfig;
use chrono::NaiveDate;
use recurring_billing_service::models::{
    CreateRecurringTemplate, Frequency, GeneratedInvoice, GenerationCommit, RecurringTemplate,
    Subscriber, TemplateStatus,
};
use recurring_billing_service::services::{
    BillingError, Database, MemoryStore, RecordingNotifier, Stores, TemplateStore,
};
use recurring_billing_service::startup::Application;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use uuid::Uuid;

// Counter for unique schema names
static SCHEMA_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Database URL for PostgreSQL tests, if one is configured.
pub fn get_test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
}

/// Generate a unique schema name for test isolation.
fn unique_schema_name() -> String {
    let counter = SCHEMA_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("test_billing_{}_{}", std::process::id(), counter)
}

/// Connect to a fresh, migrated schema. Returns `None` when no test
/// database is configured so the caller can skip.
pub async fn test_database() -> Option<Arc<Database>> {
    let Some(base_url) = get_test_database_url() else {
        eprintln!("TEST_DATABASE_URL not set, skipping PostgreSQL test");
        return None;
    };
    let schema_name = unique_schema_name();

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&base_url)
        .await
        .expect("Failed to connect to test database");
    sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema_name))
        .execute(&pool)
        .await
        .ok();
    sqlx::query(&format!("CREATE SCHEMA {}", schema_name))
        .execute(&pool)
        .await
        .expect("Failed to create test schema");
    pool.close().await;

    let separator = if base_url.contains('?') { "&" } else { "?" };
    let url = format!(
        "{}{}options=-c search_path%3D{}",
        base_url, separator, schema_name
    );

    let db = Database::new(&url, 5, 1, Duration::from_secs(5))
        .await
        .expect("Failed to create test database");
    db.run_migrations()
        .await
        .expect("Failed to run migrations");
    Some(Arc::new(db))
}

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub http_address: String,
    pub http_port: u16,
    pub stores: Stores,
    pub notifier: Arc<RecordingNotifier>,
    pub client: reqwest::Client,
}

impl TestApp {
    /// Spawn a new test application on a random port.
    pub async fn spawn() -> Self {
        let stores = Stores::from_backend(Arc::new(MemoryStore::new()), Duration::from_secs(2));
        Self::spawn_with_stores(stores).await
    }

    /// Spawn over PostgreSQL, or `None` when no test database is configured.
    pub async fn spawn_postgres() -> Option<(Self, Arc<Database>)> {
        let db = test_database().await?;
        let stores = Stores::from_backend(db.clone(), Duration::from_secs(5));
        Some((Self::spawn_with_stores(stores).await, db))
    }

    /// Spawn over caller supplied stores, e.g. a store wrapper that
    /// coordinates concurrent requests.
    pub async fn spawn_with_stores(stores: Stores) -> Self {
        let notifier = Arc::new(RecordingNotifier::new());
        let config = BillingConfig::in_memory();

        let app = Application::build_with_stores(config, stores.clone(), notifier.clone())
            .await
            .expect("Failed to build application");
        let http_port = app.http_port();
        let http_address = format!("http://127.0.0.1:{}", http_port);

        tokio::spawn(async move {
            let _ = app.run_until_stopped().await;
        });

        let client = reqwest::Client::new();
        wait_for_server(&client, &http_address).await;

        Self {
            http_address,
            http_port,
            stores,
            notifier,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.http_address, path)
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn patch_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .patch(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Register a free-tier subscriber directly in the store.
    pub async fn seed_subscriber(&self, email: &str) -> Uuid {
        let subscriber = Subscriber::new(Uuid::new_v4(), Some(email.to_string()), None);
        self.stores
            .subscribers
            .upsert_subscriber(&subscriber)
            .await
            .expect("Failed to seed subscriber");
        subscriber.subscriber_id
    }

    /// Create a template over HTTP and return its JSON body.
    pub async fn create_template(&self, body: &Value) -> Value {
        let response = self.post_json("/api/recurring-invoices", body).await;
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.expect("Failed to parse template")
    }
}

/// Holds every reader of a template until all parties have read it, so
/// concurrent generations start from the same version.
pub struct BarrierTemplates {
    inner: Arc<dyn TemplateStore>,
    barrier: Barrier,
}

impl BarrierTemplates {
    pub fn new(inner: Arc<dyn TemplateStore>, parties: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(parties),
        }
    }
}

#[async_trait]
impl TemplateStore for BarrierTemplates {
    async fn create_template(
        &self,
        input: &CreateRecurringTemplate,
    ) -> Result<RecurringTemplate, BillingError> {
        self.inner.create_template(input).await
    }

    async fn get_template(
        &self,
        template_id: Uuid,
    ) -> Result<Option<RecurringTemplate>, BillingError> {
        let template = self.inner.get_template(template_id).await;
        self.barrier.wait().await;
        template
    }

    async fn list_templates(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<RecurringTemplate>, BillingError> {
        self.inner.list_templates(owner_id).await
    }

    async fn save_template(
        &self,
        template: &RecurringTemplate,
        expected_version: i64,
    ) -> Result<Option<RecurringTemplate>, BillingError> {
        self.inner.save_template(template, expected_version).await
    }

    async fn delete_template(&self, template_id: Uuid) -> Result<bool, BillingError> {
        self.inner.delete_template(template_id).await
    }

    async fn commit_generation(
        &self,
        commit: &GenerationCommit,
    ) -> Result<Option<GeneratedInvoice>, BillingError> {
        self.inner.commit_generation(commit).await
    }
}

/// Active monthly template starting on 2024-01-31.
pub fn template_input(owner_id: Uuid) -> CreateRecurringTemplate {
    let start = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
    CreateRecurringTemplate {
        owner_id,
        template_name: "Retainer".to_string(),
        client_name: "Acme".to_string(),
        client_email: "ap@acme.test".to_string(),
        client_business_name: None,
        client_address: None,
        client_phone: None,
        frequency: Frequency::Monthly,
        start_date: start,
        next_invoice_date: start,
        end_date: None,
        status: TemplateStatus::Active,
        currency: "INR".to_string(),
        subtotal: Decimal::from(100),
        tax_enabled: false,
        tax_rate: Decimal::ZERO,
        tax_amount: Decimal::ZERO,
        discount_enabled: false,
        discount_amount: Decimal::ZERO,
        total: Decimal::from(100),
        max_invoices: None,
        items: vec![],
        notes: None,
        terms: None,
    }
}

/// Minimal valid template payload.
pub fn template_body(owner: Uuid, frequency: &str, start: &str) -> Value {
    json!({
        "user_id": owner,
        "template_name": "Monthly retainer",
        "client_name": "Acme",
        "client_email": "ap@acme.test",
        "client_business_name": "Acme Ltd",
        "frequency": frequency,
        "start_date": start,
        "subtotal": "300",
        "total": "300",
        "items": [
            {"title": "Design", "hours": "2", "rate": "100", "subtotal": "200"},
            {"title": "Hosting", "rate": "100", "subtotal": "100"}
        ],
        "notes": "Thanks",
        "terms": "Net 15"
    })
}

async fn wait_for_server(client: &reqwest::Client, address: &str) {
    for _ in 0..50 {
        if let Ok(response) = client.get(format!("{}/health", address)).send().await {
            if response.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Server at {} did not become healthy", address);
}
