//! OnePool server entry point.
//!
//! Exposes the pool settlement API over Axum. Pools and businesses live in
//! SQLite; the payment processor is Stripe Connect. Contributor verification
//! and charge results are posted back to the settlement endpoints.

mod api;
mod config;
mod db;
mod errors;
mod events;
mod export;
mod links;
mod payments;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use db::SqliteStore;
use payments::StripeGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;
    let store = Arc::new(SqliteStore::new(pool));

    // Outbound client for the payment processor.
    let client = Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;
    let payments = Arc::new(StripeGateway::new(client, &config));

    let state = Arc::new(api::ApiState::new(store, payments, &config));

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
