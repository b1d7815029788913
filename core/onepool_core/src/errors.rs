//! Core error types.

use thiserror::Error;

use crate::payment::PaymentError;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Contributor {0} has not verified a payment method")]
    NotVerified(String),

    #[error("Pool {pool_id} is locked: {reason}")]
    PoolLocked {
        pool_id: String,
        reason: &'static str,
    },

    #[error("Pool not found: {0}")]
    PoolNotFound(String),

    #[error("Contributor {contributor_id} not found in pool {pool_id}")]
    ContributorNotFound {
        pool_id: String,
        contributor_id: String,
    },

    #[error("Business not found: {0}")]
    BusinessNotFound(String),

    #[error("Business {0} has no connected payment account")]
    NotConnected(String),

    #[error("Subscription template not found: {0}")]
    TemplateNotFound(String),

    #[error("Pool {pool_id} kept changing underneath; gave up after {attempts} attempts")]
    Conflict { pool_id: String, attempts: usize },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Payment gateway error: {0}")]
    Payment(#[from] PaymentError),
}

impl Error {
    /// Stable machine-readable identifier for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::NotVerified(_) => "not_verified",
            Self::PoolLocked { .. } => "pool_locked",
            Self::PoolNotFound(_) => "pool_not_found",
            Self::ContributorNotFound { .. } => "contributor_not_found",
            Self::BusinessNotFound(_) => "business_not_found",
            Self::NotConnected(_) => "not_connected",
            Self::TemplateNotFound(_) => "template_not_found",
            Self::Conflict { .. } => "conflict",
            Self::Store(_) => "store_error",
            Self::Payment(_) => "payment_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
