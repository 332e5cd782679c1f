use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Merkle error: {0}")]
    Merkle(#[from] MerkleError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Commit error: {0}")]
    Commit(#[from] CommitError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Leaf encoding / tree construction errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MerkleError {
    #[error("Cannot build a tree over zero leaves")]
    EmptyInput,

    #[error("encrypted_ref must be exactly 32 bytes, got {0}")]
    InvalidEncryptedRef(usize),

    #[error("Proof index {index} out of range for {total} leaves")]
    IndexOutOfRange { index: usize, total: usize },
}

/// Recurrence / tick errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid recurrence parameter: {0}")]
    InvalidRecurrenceParameter(String),

    #[error("Exhausted attempts to generate a unique payroll id")]
    IdGenerationExhausted,
}

/// Commitment construction errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommitError {
    #[error("Run is {current}, expected {expected}")]
    InvalidRunState { current: String, expected: String },

    #[error("Commitment set incomplete: expected {expected} items, got {got}")]
    IncompleteCommitment { expected: usize, got: usize },

    #[error("Recipient not part of this run: {0}")]
    UnknownRecipient(String),

    #[error("Missing ciphertext for recipient {0}")]
    MissingCiphertext(String),
}

/// Run / claim state machine errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("No {0} transaction hash recorded for this run")]
    MissingTxReference(&'static str),

    #[error("Receipt not yet available")]
    ReceiptPending,

    #[error("Expected event missing or mismatched: {0}")]
    EventMismatch(String),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::Merkle(e) => (StatusCode::BAD_REQUEST, "INVALID_COMMIT_INPUT", e.to_string()),
            AppError::Schedule(ScheduleError::InvalidRecurrenceParameter(msg)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_RECURRENCE",
                msg.clone(),
            ),
            AppError::Schedule(ScheduleError::IdGenerationExhausted) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ID_GENERATION_EXHAUSTED",
                self.to_string(),
            ),
            AppError::Commit(CommitError::InvalidRunState { .. }) => {
                (StatusCode::CONFLICT, "INVALID_RUN_STATE", self.to_string())
            }
            AppError::Commit(e) => (StatusCode::BAD_REQUEST, "INVALID_COMMIT_SET", e.to_string()),
            AppError::Lifecycle(LifecycleError::ReceiptPending) => (
                StatusCode::CONFLICT,
                "RECEIPT_PENDING",
                "Receipt not yet available, retry later".to_string(),
            ),
            AppError::Lifecycle(e) => (StatusCode::CONFLICT, "LIFECYCLE_ERROR", e.to_string()),
            AppError::InvalidAddress(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_ADDRESS",
                format!("Invalid address: {}", msg),
            ),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::Rpc(format!("HTTP request error: {:?}", error))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("{:?}", error))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
