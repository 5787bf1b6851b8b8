//! HTTP handlers for the recurring billing service.

pub mod health;
pub mod invoices;
pub mod purchases;
pub mod recurring;
pub mod subscribers;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query};
use service_core::error::AppError;

/// Unwrap a JSON body, reporting malformed payloads as 400.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(anyhow::anyhow!(rejection.body_text())))
}

/// Unwrap a query string, reporting malformed parameters as 400.
pub(crate) fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| AppError::BadRequest(anyhow::anyhow!(rejection.body_text())))
}
