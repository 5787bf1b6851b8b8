//! Plan purchase and payment callback handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use super::json_body;
use crate::dtos::{InitiatePurchaseRequest, OkResponse, PaymentCallbackRequest, PurchaseResponse};
use crate::services::{metrics::record_error, BillingError};
use crate::startup::AppState;

/// Record a purchase intent before redirecting to the payment provider.
pub async fn initiate_purchase(
    State(state): State<AppState>,
    payload: Result<Json<InitiatePurchaseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PurchaseResponse>), AppError> {
    let request = json_body(payload)?;
    let intent = request.into_intent()?;

    tracing::info!(order_id = %intent.order_id, plan = %intent.plan, "Initiating purchase");

    let purchase = state.ledger.initiate(intent).await.map_err(|e| {
        record_error(e.kind(), "initiate_purchase");
        e
    })?;

    Ok((
        StatusCode::CREATED,
        Json(PurchaseResponse { ok: true, purchase }),
    ))
}

/// Payment provider status callback. Repeats for settled orders succeed.
pub async fn payment_callback(
    State(state): State<AppState>,
    payload: Result<Json<PaymentCallbackRequest>, JsonRejection>,
) -> Result<Json<OkResponse>, AppError> {
    let request = json_body(payload)?;
    let order_id = request
        .order_id
        .ok_or_else(|| BillingError::Validation("order_id is required".to_string()))?;
    let status = request
        .status
        .ok_or_else(|| BillingError::Validation("status is required".to_string()))?;

    tracing::info!(order_id = %order_id, status = %status, "Payment callback received");

    state
        .ledger
        .apply_callback(&order_id, &status)
        .await
        .map_err(|e| {
            record_error(e.kind(), "payment_callback");
            e
        })?;

    Ok(Json(OkResponse { ok: true }))
}

pub async fn get_purchase(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<PurchaseResponse>, AppError> {
    let purchase = state.ledger.get(&order_id).await?;
    Ok(Json(PurchaseResponse { ok: true, purchase }))
}
