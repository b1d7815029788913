//! Payment-processor gateway contract.
//!
//! The core never charges anyone through this trait. It only needs the
//! connect handshake (to link a business to a processor account) and the
//! dashboard login link; verification and charge results arrive as
//! settlement calls on [`crate::PoolManager`].

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment processor rejected the request: {0}")]
    Rejected(String),

    #[error("Payment processor unreachable: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// OAuth authorize URL; `business_id` travels back as the `state` parameter.
    async fn generate_connect_url(
        &self,
        business_id: &str,
        redirect_uri: &str,
    ) -> Result<String, PaymentError>;

    /// Exchange an authorization code for the connected account id.
    async fn exchange_auth_code(&self, code: &str) -> Result<String, PaymentError>;

    /// One-time dashboard login URL for a connected account.
    async fn create_login_link(&self, account_id: &str) -> Result<String, PaymentError>;
}
