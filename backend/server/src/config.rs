//! Application configuration loaded from environment variables.

use crate::errors::{Result, ServerError};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Origin of the web app, used to build payment and collector links
    pub public_base_url: String,
    /// Stripe Connect platform client id (`ca_…`)
    pub stripe_client_id: String,
    /// Stripe secret key used for server-side calls
    pub stripe_secret_key: String,
    /// Stripe REST API base URL
    pub stripe_api_url: String,
    /// Stripe Connect OAuth base URL
    pub stripe_connect_url: String,
    /// Timeout applied to every outbound HTTP request
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./onepool.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| ServerError::Config("Invalid API_PORT".to_string()))?,
            public_base_url: env_var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string())
                .trim_end_matches('/')
                .to_string(),
            stripe_client_id: env_var("STRIPE_CLIENT_ID").map_err(|_| {
                ServerError::Config("STRIPE_CLIENT_ID environment variable is required".to_string())
            })?,
            stripe_secret_key: env_var("STRIPE_SECRET_KEY").map_err(|_| {
                ServerError::Config(
                    "STRIPE_SECRET_KEY environment variable is required".to_string(),
                )
            })?,
            stripe_api_url: env_var("STRIPE_API_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            stripe_connect_url: env_var("STRIPE_CONNECT_URL")
                .unwrap_or_else(|_| "https://connect.stripe.com".to_string()),
            http_timeout_secs: env_var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ServerError::Config("Invalid HTTP_TIMEOUT_SECS".to_string()))?,
        })
    }

    /// Where Stripe sends the business back after the OAuth consent screen.
    pub fn default_connect_redirect(&self) -> String {
        format!("{}/connect-stripe", self.public_base_url)
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ServerError::Config(format!("Missing env var: {key}")))
}
