//! Error taxonomy shared by the stores, the prediction client and the
//! orchestrator.

use thiserror::Error;

/// Load or save failure from the storage collaborator.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("invalid sort field: {0}")]
    InvalidSort(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Failure of a single prediction run.
#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("prediction service is not configured: {0}")]
    NotConfigured(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("prediction request timed out")]
    Timeout,

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("could not parse prediction response: {0}")]
    Parse(String),

    #[error("prediction violates response schema: {0}")]
    Schema(String),
}

/// Identity lookup found no signed-in user.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("not authenticated")]
pub struct NotAuthenticated;

/// Why one student in a batch did not receive a prediction.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error(transparent)]
    Prediction(#[from] PredictionError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
