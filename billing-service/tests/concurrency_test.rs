//! Concurrent generation against the same schedule window.

mod common;

use chrono::NaiveDate;
use common::{template_body, template_input, BarrierTemplates, TestApp};
use futures::future::join_all;
use recurring_billing_service::services::{InvoiceStore, MemoryStore, Stores, TemplateStore};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_generation_commits_once() {
    let memory = Arc::new(MemoryStore::new());
    let mut stores = Stores::from_backend(memory.clone(), Duration::from_secs(5));
    stores.templates = Arc::new(BarrierTemplates::new(memory.clone(), 2));
    let app = TestApp::spawn_with_stores(stores).await;

    let owner = Uuid::new_v4();
    let template = memory.create_template(&template_input(owner)).await.unwrap();
    let path = format!("/api/recurring-invoices/{}/generate", template.template_id);

    let body_a = json!({});
    let body_b = json!({});
    let (first, second) = tokio::join!(
        app.post_json(&path, &body_a),
        app.post_json(&path, &body_b)
    );
    let mut statuses = vec![first.status().as_u16(), second.status().as_u16()];
    statuses.sort_unstable();
    assert_eq!(statuses, vec![200, 400]);

    let after = memory.get_template(template.template_id).await.unwrap().unwrap();
    assert_eq!(after.invoices_generated, 1);
    assert_eq!(
        after.next_invoice_date,
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
    );
    assert_eq!(memory.count_invoices(owner).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_templates_get_distinct_numbers() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();

    let mut ids = Vec::new();
    for _ in 0..4 {
        let created = app
            .create_template(&template_body(owner, "weekly", "2024-06-03"))
            .await;
        ids.push(created["template_id"].as_str().unwrap().to_string());
    }

    let requests = ids.iter().map(|id| {
        let path = format!("/api/recurring-invoices/{}/generate", id);
        let app = &app;
        async move { app.post_json(&path, &json!({})).await }
    });
    let mut numbers = HashSet::new();
    for response in join_all(requests).await {
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        numbers.insert(body["invoice_number"].as_str().unwrap().to_string());
    }

    let expected: HashSet<String> = (1..=4).map(|n| format!("INV-{:04}", n)).collect();
    assert_eq!(numbers, expected);
}
