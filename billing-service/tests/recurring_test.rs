//! Recurring template and invoice generation tests.

mod common;

use common::{template_body, TestApp};
use serde_json::{json, Value};
use uuid::Uuid;

async fn generate(app: &TestApp, template_id: &str) -> reqwest::Response {
    app.post_json(
        &format!("/api/recurring-invoices/{}/generate", template_id),
        &json!({}),
    )
    .await
}

#[tokio::test]
async fn create_list_get_and_delete_template() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();

    let created = app
        .create_template(&template_body(owner, "monthly", "2024-01-31"))
        .await;
    let id = created["template_id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "active");
    assert_eq!(created["currency"], "INR");
    assert_eq!(created["next_invoice_date"], "2024-01-31");
    assert_eq!(created["invoices_generated"], 0);

    let listed: Vec<Value> = app
        .get(&format!("/api/recurring-invoices?user_id={}", owner))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let other: Vec<Value> = app
        .get(&format!("/api/recurring-invoices?user_id={}", Uuid::new_v4()))
        .await
        .json()
        .await
        .unwrap();
    assert!(other.is_empty());

    let response = app.get(&format!("/api/recurring-invoices/{}", id)).await;
    assert_eq!(response.status().as_u16(), 200);

    let response = app.delete(&format!("/api/recurring-invoices/{}", id)).await;
    assert_eq!(response.status().as_u16(), 204);

    let response = app.get(&format!("/api/recurring-invoices/{}", id)).await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn create_template_validation() {
    let app = TestApp::spawn().await;

    let mut body = template_body(Uuid::new_v4(), "monthly", "2024-01-01");
    body["client_email"] = json!("nope");
    let response = app.post_json("/api/recurring-invoices", &body).await;
    assert_eq!(response.status().as_u16(), 400);

    let mut body = template_body(Uuid::new_v4(), "fortnightly", "2024-01-01");
    body["client_email"] = json!("ap@acme.test");
    let response = app.post_json("/api/recurring-invoices", &body).await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .client
        .post(app.url("/api/recurring-invoices"))
        .header("content-type", "application/json")
        .body("{\"user_id\":")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = app.get("/api/recurring-invoices?user_id=not-a-uuid").await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn patch_cannot_move_schedule_backward() {
    let app = TestApp::spawn().await;
    let created = app
        .create_template(&template_body(Uuid::new_v4(), "quarterly", "2024-04-01"))
        .await;
    let id = created["template_id"].as_str().unwrap();

    let response = app
        .patch_json(
            &format!("/api/recurring-invoices/{}", id),
            &json!({"next_invoice_date": "2024-03-01"}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .patch_json(
            &format!("/api/recurring-invoices/{}", id),
            &json!({"template_name": "Quarterly support", "status": "paused"}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["template_name"], "Quarterly support");
    assert_eq!(updated["status"], "paused");
    assert_eq!(updated["next_invoice_date"], "2024-04-01");
}

#[tokio::test]
async fn generation_numbers_invoices_per_owner() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();

    let monthly = app
        .create_template(&template_body(owner, "monthly", "2024-01-31"))
        .await;
    let monthly_id = monthly["template_id"].as_str().unwrap();

    let mut numbers = Vec::new();
    for _ in 0..3 {
        let response = generate(&app, monthly_id).await;
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        numbers.push(body["invoice_number"].as_str().unwrap().to_string());
    }
    assert_eq!(numbers, vec!["INV-0001", "INV-0002", "INV-0003"]);

    let after: Value = app
        .get(&format!("/api/recurring-invoices/{}", monthly_id))
        .await
        .json()
        .await
        .unwrap();
    // Jan 31 -> Feb 29 -> Mar 29 -> Apr 29
    assert_eq!(after["next_invoice_date"], "2024-04-29");
    assert_eq!(after["invoices_generated"], 3);

    let yearly = app
        .create_template(&template_body(owner, "yearly", "2024-03-01"))
        .await;
    let yearly_id = yearly["template_id"].as_str().unwrap();

    let response = generate(&app, yearly_id).await;
    assert_eq!(response.status().as_u16(), 200);
    let generated: Value = response.json().await.unwrap();
    assert_eq!(generated["invoice_number"], "INV-0004");

    let template: Value = app
        .get(&format!("/api/recurring-invoices/{}", yearly_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(template["next_invoice_date"], "2025-03-01");
    assert_eq!(template["invoices_generated"], 1);

    let invoice: Value = app
        .get(&format!(
            "/api/invoices/{}",
            generated["invoice_id"].as_str().unwrap()
        ))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(invoice["status"], "draft");
    assert_eq!(invoice["issue_date"], "2024-03-01");
    assert_eq!(invoice["invoice_number"], "INV-0004");
    assert_eq!(invoice["template_id"], yearly_id);
    assert_eq!(invoice["client_name"], "Acme");

    let items = invoice["line_items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["order_index"], 0);
    assert_eq!(items[0]["title"], "Design");
    assert_eq!(items[1]["order_index"], 1);
    assert_eq!(items[1]["title"], "Hosting");
}

#[tokio::test]
async fn other_owners_have_independent_numbering() {
    let app = TestApp::spawn().await;

    for _ in 0..2 {
        let template = app
            .create_template(&template_body(Uuid::new_v4(), "weekly", "2024-06-03"))
            .await;
        let response = generate(&app, template["template_id"].as_str().unwrap()).await;
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["invoice_number"], "INV-0001");
    }
}

#[tokio::test]
async fn generation_rejects_paused_and_unknown_templates() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();

    let mut body = template_body(owner, "monthly", "2024-05-01");
    body["status"] = json!("paused");
    let paused = app.create_template(&body).await;
    let id = paused["template_id"].as_str().unwrap();

    let response = generate(&app, id).await;
    assert_eq!(response.status().as_u16(), 400);

    let unchanged: Value = app
        .get(&format!("/api/recurring-invoices/{}", id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(unchanged["next_invoice_date"], "2024-05-01");
    assert_eq!(unchanged["invoices_generated"], 0);

    let response = generate(&app, &Uuid::new_v4().to_string()).await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app.get(&format!("/api/invoices/{}", Uuid::new_v4())).await;
    assert_eq!(response.status().as_u16(), 404);
}
