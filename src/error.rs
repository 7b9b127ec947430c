use crate::domain::status::JobStatus;
use miette::Diagnostic;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, LogisticsError>;

#[derive(Error, Debug, Diagnostic)]
pub enum LogisticsError {
    #[error("Validation error: {0}")]
    #[diagnostic(code(wastepay::validation))]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    #[diagnostic(code(wastepay::unauthorized))]
    Unauthorized(String),

    #[error("{entity} {id} not found")]
    #[diagnostic(code(wastepay::not_found))]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid status transition from {from} to {to}")]
    #[diagnostic(
        code(wastepay::invalid_transition),
        help("allowed: pending -> assigned, assigned -> in_progress|cancelled, in_progress -> completed|cancelled")
    )]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Invalid state: {0}")]
    #[diagnostic(code(wastepay::invalid_state))]
    InvalidState(String),

    #[error("Job {0} is already assigned to a pickup partner")]
    #[diagnostic(code(wastepay::already_assigned))]
    AlreadyAssigned(Uuid),

    #[error("Insufficient funds: available {available}, requested {requested}")]
    #[diagnostic(code(wastepay::insufficient_funds))]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Wallet {0} is suspended")]
    #[diagnostic(code(wastepay::wallet_suspended))]
    WalletSuspended(Uuid),

    #[error("Invalid amount: {0}")]
    #[diagnostic(code(wastepay::invalid_amount))]
    InvalidAmount(String),

    #[error("Duplicate ledger reference: {0}")]
    #[diagnostic(code(wastepay::duplicate_reference))]
    DuplicateReference(String),

    #[error("Dependency failure: {0}")]
    #[diagnostic(code(wastepay::dependency))]
    DependencyFailure(String),

    #[error("Storage error: {0}")]
    #[diagnostic(code(wastepay::storage))]
    Storage(String),

    #[cfg(feature = "storage-rocksdb")]
    #[error("Database error: {0}")]
    #[diagnostic(code(wastepay::database))]
    Database(#[from] rocksdb::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(wastepay::serialization))]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    #[diagnostic(code(wastepay::csv))]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(wastepay::io))]
    IoError(#[from] std::io::Error),
}

impl LogisticsError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// The HTTP status an API layer should answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ValidationError(_) | Self::InvalidAmount(_) | Self::InvalidTransition { .. } => {
                400
            }
            Self::Unauthorized(_) => 403,
            Self::NotFound { .. } => 404,
            Self::InvalidState(_)
            | Self::AlreadyAssigned(_)
            | Self::InsufficientFunds { .. }
            | Self::WalletSuspended(_)
            | Self::DuplicateReference(_) => 409,
            Self::DependencyFailure(_) => 502,
            _ => 500,
        }
    }

    /// Business-rule violations the caller can act on, as opposed to infrastructure faults.
    pub fn is_business_rule(&self) -> bool {
        self.http_status() < 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(LogisticsError::ValidationError("x".into()).http_status(), 400);
        assert_eq!(LogisticsError::Unauthorized("x".into()).http_status(), 403);
        assert_eq!(LogisticsError::not_found("Collection", "1").http_status(), 404);
        assert_eq!(
            LogisticsError::InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Completed
            }
            .http_status(),
            400
        );
        assert_eq!(
            LogisticsError::InsufficientFunds {
                available: dec!(50),
                requested: dec!(100)
            }
            .http_status(),
            409
        );
        assert_eq!(LogisticsError::DependencyFailure("smtp".into()).http_status(), 502);
        assert_eq!(LogisticsError::Storage("disk".into()).http_status(), 500);
    }

    #[test]
    fn test_business_rule_classification() {
        assert!(LogisticsError::AlreadyAssigned(Uuid::nil()).is_business_rule());
        assert!(!LogisticsError::Storage("disk".into()).is_business_rule());
    }

    #[test]
    fn test_not_found_message() {
        let err = LogisticsError::not_found("Wallet", "abc");
        assert_eq!(err.to_string(), "Wallet abc not found");
    }
}
