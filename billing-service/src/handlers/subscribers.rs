use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::EntitlementResponse;
use crate::services::BillingError;
use crate::startup::AppState;

/// Current plan, expiry and effective feature list of a subscriber.
pub async fn get_entitlement(
    State(state): State<AppState>,
    Path(subscriber_id): Path<Uuid>,
) -> Result<Json<EntitlementResponse>, AppError> {
    let stores = &state.stores;
    let subscriber = stores
        .bounded(
            "get_subscriber",
            stores.subscribers.get_subscriber(subscriber_id),
        )
        .await?
        .ok_or_else(|| BillingError::NotFound("Subscriber".to_string()))?;

    Ok(Json(EntitlementResponse::from_subscriber(
        &subscriber,
        Utc::now(),
    )))
}
