use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::InvoiceResponse;
use crate::services::BillingError;
use crate::startup::AppState;

/// Invoice snapshot with its ordered line items.
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let stores = &state.stores;
    let invoice = stores
        .bounded("get_invoice", stores.invoices.get_invoice(invoice_id))
        .await?
        .ok_or_else(|| BillingError::NotFound("Invoice".to_string()))?;
    let line_items = stores
        .bounded("list_line_items", stores.invoices.list_line_items(invoice_id))
        .await?;

    Ok(Json(InvoiceResponse {
        invoice,
        line_items,
    }))
}
