//! Stripe Connect client, the payment gateway behind [`PaymentGateway`].
//!
//! ## Resilience
//!
//! * Exponential back-off is applied on rate-limit (429), server errors and
//!   transport failures, up to [`MAX_BACKOFF_SECS`] seconds between tries.
//! * A request handler is waiting on the result, so retries stop after
//!   [`MAX_ATTEMPTS`] and the last failure is surfaced.

use std::time::Duration;

use async_trait::async_trait;
use onepool_core::{PaymentError, PaymentGateway};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;

const MAX_BACKOFF_SECS: u64 = 8;
const INITIAL_BACKOFF_SECS: u64 = 1;
const MAX_ATTEMPTS: u32 = 4;

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

/// `POST /oauth/token` answers with either the account or an OAuth error.
#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    stripe_user_id: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginLinkResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

// ─────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    api_url: String,
    connect_url: String,
    client_id: String,
    secret_key: String,
    initial_backoff: Duration,
}

impl StripeGateway {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            api_url: config.stripe_api_url.trim_end_matches('/').to_string(),
            connect_url: config.stripe_connect_url.trim_end_matches('/').to_string(),
            client_id: config.stripe_client_id.clone(),
            secret_key: config.stripe_secret_key.clone(),
            initial_backoff: Duration::from_secs(INITIAL_BACKOFF_SECS),
        }
    }

    #[cfg(test)]
    fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Send the request built by `build`, retrying transient failures.
    async fn send_with_backoff<F>(&self, what: &str, build: F) -> Result<Response, PaymentError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut backoff = self.initial_backoff;
        let max_backoff = Duration::from_secs(MAX_BACKOFF_SECS);
        let mut attempt = 1;

        loop {
            match build().send().await {
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!("Stripe {what} request failed (will retry in {backoff:?}): {e}");
                }
                Err(e) => return Err(PaymentError::Transport(Box::new(e))),
                Ok(resp) => {
                    let status = resp.status();
                    let transient =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !transient || attempt >= MAX_ATTEMPTS {
                        return Ok(resp);
                    }
                    warn!("Stripe {what} returned {status} (will retry in {backoff:?})");
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(max_backoff);
            attempt += 1;
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn generate_connect_url(
        &self,
        business_id: &str,
        redirect_uri: &str,
    ) -> Result<String, PaymentError> {
        let url = Url::parse_with_params(
            &format!("{}/oauth/authorize", self.connect_url),
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("scope", "read_write"),
                ("redirect_uri", redirect_uri),
                ("state", business_id),
            ],
        )
        .map_err(|e| PaymentError::Rejected(format!("invalid connect URL: {e}")))?;
        Ok(url.into())
    }

    async fn exchange_auth_code(&self, code: &str) -> Result<String, PaymentError> {
        let endpoint = format!("{}/oauth/token", self.connect_url);
        let resp = self
            .send_with_backoff("token exchange", || {
                self.client.post(&endpoint).form(&[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("client_secret", self.secret_key.as_str()),
                ])
            })
            .await?;

        let body: OAuthTokenResponse = resp.json().await.map_err(transport)?;
        match (body.stripe_user_id, body.error) {
            (Some(account_id), None) => {
                debug!(account_id = %account_id, "Stripe account connected");
                Ok(account_id)
            }
            (_, error) => Err(PaymentError::Rejected(
                body.error_description
                    .or(error)
                    .unwrap_or_else(|| "token exchange returned no account".to_string()),
            )),
        }
    }

    async fn create_login_link(&self, account_id: &str) -> Result<String, PaymentError> {
        let endpoint = format!("{}/v1/accounts/{account_id}/login_links", self.api_url);
        let resp = self
            .send_with_backoff("login link", || {
                self.client.post(&endpoint).bearer_auth(&self.secret_key)
            })
            .await?;

        if !resp.status().is_success() {
            return Err(rejection(resp).await);
        }
        let body: LoginLinkResponse = resp.json().await.map_err(transport)?;
        Ok(body.url)
    }
}

fn transport(e: reqwest::Error) -> PaymentError {
    PaymentError::Transport(Box::new(e))
}

/// Turn a non-success API response into a rejection, keeping Stripe's message.
async fn rejection(resp: Response) -> PaymentError {
    let status = resp.status();
    let message = match resp.json::<ApiErrorBody>().await {
        Ok(ApiErrorBody { error }) => error
            .message
            .or(error.kind)
            .unwrap_or_else(|| status.to_string()),
        Err(_) => status.to_string(),
    };
    PaymentError::Rejected(message)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
