//! Recurring template handlers, including invoice generation.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use super::{json_body, query_params};
use crate::dtos::{
    CreateTemplateRequest, GenerateInvoiceResponse, ListTemplatesQuery, UpdateTemplateRequest,
};
use crate::models::RecurringTemplate;
use crate::services::metrics::record_error;
use crate::startup::AppState;

pub async fn list_templates(
    State(state): State<AppState>,
    query: Result<Query<ListTemplatesQuery>, QueryRejection>,
) -> Result<Json<Vec<RecurringTemplate>>, AppError> {
    let query = query_params(query)?;
    let templates = state.templates.list(query.user_id).await?;
    Ok(Json(templates))
}

pub async fn create_template(
    State(state): State<AppState>,
    payload: Result<Json<CreateTemplateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RecurringTemplate>), AppError> {
    let input = json_body(payload)?.into_input()?;
    let template = state.templates.create(input).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn get_template(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
) -> Result<Json<RecurringTemplate>, AppError> {
    Ok(Json(state.templates.get(template_id).await?))
}

pub async fn update_template(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
    payload: Result<Json<UpdateTemplateRequest>, JsonRejection>,
) -> Result<Json<RecurringTemplate>, AppError> {
    let patch = json_body(payload)?.into_patch()?;
    Ok(Json(state.templates.update(template_id, patch).await?))
}

pub async fn delete_template(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.templates.delete(template_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Generate the next invoice from a template.
pub async fn generate_invoice(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
) -> Result<Json<GenerateInvoiceResponse>, AppError> {
    tracing::info!(template_id = %template_id, "Generating invoice from template");

    let generated = state.generator.generate(template_id).await.map_err(|e| {
        record_error(e.kind(), "generate_invoice");
        e
    })?;

    Ok(Json(GenerateInvoiceResponse {
        invoice_id: generated.invoice_id,
        invoice_number: generated.invoice_number,
    }))
}
