use crate::models::{OperationResponse, OperationResult};
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, WalletServiceError>;

#[derive(Error, Debug)]
pub enum WalletServiceError {
    #[error("invalid amount")]
    InvalidAmount,

    #[error("invalid operation type: {0}")]
    InvalidOperationType(String),

    #[error("invalid walletId: {0}")]
    InvalidWalletId(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Withdrawal rejected; the payload holds the unchanged balance.
    #[error("insufficient balance in wallet {}", .0.wallet_id)]
    InsufficientFunds(OperationResult),

    #[error("Wallet not found: {0}")]
    WalletNotFound(Uuid),

    #[error("Wallet already exists: {0}")]
    Conflict(Uuid),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ResponseError for WalletServiceError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        match self {
            WalletServiceError::InsufficientFunds(result) => {
                HttpResponse::build(status_code).json(OperationResponse::from(result))
            }
            _ => HttpResponse::build(status_code)
                .content_type("text/plain; charset=utf-8")
                .body(format!("{}\n", self.public_message())),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            WalletServiceError::InvalidAmount => StatusCode::BAD_REQUEST,
            WalletServiceError::InvalidOperationType(_) => StatusCode::BAD_REQUEST,
            WalletServiceError::InvalidWalletId(_) => StatusCode::BAD_REQUEST,
            WalletServiceError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            WalletServiceError::InsufficientFunds(_) => StatusCode::PAYMENT_REQUIRED,
            WalletServiceError::WalletNotFound(_) => StatusCode::NOT_FOUND,
            WalletServiceError::Conflict(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WalletServiceError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WalletServiceError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WalletServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WalletServiceError::Migration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WalletServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl WalletServiceError {
    /// Body text sent to clients. Storage details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            WalletServiceError::InvalidAmount => "invalid amount".to_string(),
            WalletServiceError::InvalidOperationType(_) => "invalid operation type".to_string(),
            WalletServiceError::InvalidWalletId(_) => "invalid walletId".to_string(),
            WalletServiceError::MalformedRequest(reason) => reason.clone(),
            WalletServiceError::InsufficientFunds(_) => "not_enough_money".to_string(),
            WalletServiceError::WalletNotFound(_) => "wallet not found".to_string(),
            _ => "internal error".to_string(),
        }
    }

    /// Label used for the `status` dimension of operation metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            WalletServiceError::InvalidAmount => "invalid_amount",
            WalletServiceError::InvalidOperationType(_) => "invalid_operation_type",
            WalletServiceError::InvalidWalletId(_) => "invalid_wallet_id",
            WalletServiceError::MalformedRequest(_) => "malformed_request",
            WalletServiceError::InsufficientFunds(_) => "insufficient_balance",
            WalletServiceError::WalletNotFound(_) => "not_found",
            WalletServiceError::Conflict(_) => "conflict",
            WalletServiceError::StoreUnavailable(_) => "store_unavailable",
            WalletServiceError::Persistence(_) => "persistence_error",
            WalletServiceError::Database(_) => "database_error",
            WalletServiceError::Migration(_) => "migration_error",
            WalletServiceError::Internal(_) => "internal_error",
        }
    }
}
