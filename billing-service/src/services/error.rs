use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    StateConflict(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl BillingError {
    /// Short label used for the error metric.
    pub fn kind(&self) -> &'static str {
        match self {
            BillingError::Validation(_) => "validation",
            BillingError::NotFound(_) => "not_found",
            BillingError::Conflict(_) => "conflict",
            BillingError::StateConflict(_) => "state_conflict",
            BillingError::Persistence(_) => "persistence",
        }
    }
}

impl From<validator::ValidationErrors> for BillingError {
    fn from(err: validator::ValidationErrors) -> Self {
        BillingError::Validation(err.to_string())
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Validation(e) => AppError::ValidationError(e),
            BillingError::NotFound(what) => {
                AppError::NotFound(anyhow::anyhow!("{} not found", what))
            }
            BillingError::Conflict(e) => AppError::Conflict(anyhow::anyhow!(e)),
            BillingError::StateConflict(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            BillingError::Persistence(e) => AppError::DatabaseError(e),
        }
    }
}
