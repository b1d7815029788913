//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use onepool_core::{
    allocation::{self, parse_amount, AllocationSummary},
    templates::{builtin_templates, SubscriptionTemplate},
    Business, BusinessAggregator, BusinessDirectory, BusinessStats, Contributor, Error as CoreError,
    NewPool, PaymentGateway, Pool, PoolManager, Settle, Settlement, Transition,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::warn;

use crate::config::Config;
use crate::db::{self, SqliteStore};
use crate::errors::{Result, ServerError};
use crate::events::{self, EventRecord, PoolEvent};
use crate::export;
use crate::links;

pub struct ApiState {
    pub manager: PoolManager,
    pub aggregator: BusinessAggregator,
    pub directory: BusinessDirectory,
    pub db: SqlitePool,
    pub public_base_url: String,
    pub connect_redirect: String,
}

impl ApiState {
    pub fn new(store: Arc<SqliteStore>, payments: Arc<dyn PaymentGateway>, config: &Config) -> Self {
        Self {
            manager: PoolManager::new(store.clone()),
            aggregator: BusinessAggregator::new(store.clone()),
            directory: BusinessDirectory::new(store.clone(), payments),
            db: store.connection().clone(),
            public_base_url: config.public_base_url.clone(),
            connect_redirect: config.default_connect_redirect(),
        }
    }

    /// Activity logging never fails the request that triggered it.
    async fn record(&self, events: Vec<PoolEvent>) {
        if events.is_empty() {
            return;
        }
        if let Err(e) = db::insert_events(&self.db, &events).await {
            warn!("Failed to record {} pool event(s): {e}", events.len());
        }
    }

    fn pool_response(&self, pool: Pool) -> Result<PoolResponse> {
        Ok(PoolResponse {
            allocation: allocation::summarize(&pool.contributors, pool.total_amount),
            payment_link: links::payment_link(&self.public_base_url, &pool.id, None)?,
            collector_link: links::collector_link(
                &self.public_base_url,
                &pool.id,
                Some(pool.total_amount),
            )?,
            pool,
        })
    }
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/templates", get(list_templates))
        .route("/pools", post(create_pool))
        .route("/pools/:id", get(get_pool))
        .route("/pools/:id/contributors", put(update_contributors))
        .route("/pools/:id/split", post(split_evenly))
        .route("/pools/:id/contributors/:cid/settle", post(settle_contributor))
        .route("/pools/:id/payments", post(process_payments))
        .route("/pools/:id/events", get(get_pool_events))
        .route("/businesses", post(register_business))
        .route("/businesses/:id", get(get_business))
        .route("/businesses/:id/pools", get(list_business_pools))
        .route("/businesses/:id/stats", get(business_stats))
        .route("/businesses/:id/export", get(export_business_pools))
        .route("/businesses/:id/connect", get(connect_url))
        .route("/connect/callback", get(connect_callback))
        .route("/businesses/:id/login-link", get(login_link))
        .with_state(state)
}

fn now_ts() -> i64 {
    Utc::now().timestamp()
}

// ─────────────────────────────────────────────────────────
// Request shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePoolRequest {
    /// Number or decimal string; ignored when `template` is set.
    pub total_amount: Option<Value>,
    pub subscription_name: Option<String>,
    pub template: Option<String>,
    #[serde(default)]
    pub contributors: Vec<Contributor>,
    pub business_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateContributorsRequest {
    pub contributors: Vec<Contributor>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentsRequest {
    #[serde(default)]
    pub contributor_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterBusinessRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub redirect_uri: Option<String>,
}

/// What Stripe appends to the redirect URI after the consent screen.
#[derive(Debug, Deserialize)]
pub struct ConnectCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

fn amount_from_json(value: &Value) -> Result<Decimal> {
    match value {
        Value::String(s) => Ok(parse_amount(s)?),
        Value::Number(n) => Ok(parse_amount(&n.to_string())?),
        other => Err(CoreError::InvalidAmount(format!("expected a number, got {other}")).into()),
    }
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolResponse {
    #[serde(flatten)]
    pub pool: Pool,
    pub allocation: AllocationSummary,
    pub payment_link: String,
    pub collector_link: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResponse {
    pub pool: PoolResponse,
    pub transitions: Vec<Transition>,
    pub completed_now: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolListResponse {
    pub count: usize,
    pub pools: Vec<Pool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub pool_id: String,
    pub count: usize,
    pub events: Vec<EventRecord>,
}

#[derive(Serialize)]
pub struct UrlResponse {
    pub url: String,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /templates`
pub async fn list_templates() -> Json<Vec<SubscriptionTemplate>> {
    Json(builtin_templates())
}

/// `POST /pools`
///
/// Creates a pool either from a template key or from an explicit total.
pub async fn create_pool(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<CreatePoolRequest>,
) -> Result<(StatusCode, Json<PoolResponse>)> {
    if let Some(business_id) = &req.business_id {
        state.directory.get(business_id).await?;
    }

    let id = match req.template.as_deref() {
        Some(key) => {
            state
                .manager
                .create_from_template(key, req.contributors, req.business_id)
                .await?
        }
        None => {
            let raw = req.total_amount.as_ref().ok_or_else(|| {
                CoreError::InvalidAmount("totalAmount is required".to_string())
            })?;
            state
                .manager
                .create_pool(NewPool {
                    total_amount: amount_from_json(raw)?,
                    subscription_name: req.subscription_name,
                    contributors: req.contributors,
                    business_id: req.business_id,
                })
                .await?
        }
    };

    let pool = state.manager.get_pool(&id).await?;
    state.record(vec![PoolEvent::created(&pool, now_ts())]).await;
    Ok((StatusCode::CREATED, Json(state.pool_response(pool)?)))
}

/// `GET /pools/:id`
pub async fn get_pool(
    State(state): State<Arc<ApiState>>,
    Path(pool_id): Path<String>,
) -> Result<Json<PoolResponse>> {
    let pool = state.manager.get_pool(&pool_id).await?;
    Ok(Json(state.pool_response(pool)?))
}

/// `PUT /pools/:id/contributors`
pub async fn update_contributors(
    State(state): State<Arc<ApiState>>,
    Path(pool_id): Path<String>,
    Json(req): Json<UpdateContributorsRequest>,
) -> Result<Json<PoolResponse>> {
    let pool = state
        .manager
        .update_contributors(&pool_id, req.contributors)
        .await?;
    state
        .record(vec![PoolEvent::roster_updated(&pool, now_ts())])
        .await;
    Ok(Json(state.pool_response(pool)?))
}

/// `POST /pools/:id/split`
pub async fn split_evenly(
    State(state): State<Arc<ApiState>>,
    Path(pool_id): Path<String>,
) -> Result<Json<PoolResponse>> {
    let pool = state.manager.split_evenly(&pool_id).await?;
    state
        .record(vec![PoolEvent::roster_updated(&pool, now_ts())])
        .await;
    Ok(Json(state.pool_response(pool)?))
}

/// `POST /pools/:id/contributors/:cid/settle`
///
/// Applies a payment-gateway result (`{"verified": true}` and/or
/// `{"paid": true}`) to one contributor.
pub async fn settle_contributor(
    State(state): State<Arc<ApiState>>,
    Path((pool_id, contributor_id)): Path<(String, String)>,
    Json(settle): Json<Settle>,
) -> Result<Json<SettlementResponse>> {
    let settlement = state
        .manager
        .settle_contributor(&pool_id, &contributor_id, settle)
        .await?;
    settlement_response(&state, settlement).await
}

/// `POST /pools/:id/payments`
///
/// Charges verified contributors. An empty body or empty id list means all.
pub async fn process_payments(
    State(state): State<Arc<ApiState>>,
    Path(pool_id): Path<String>,
    body: Option<Json<ProcessPaymentsRequest>>,
) -> Result<Json<SettlementResponse>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let settlement = state
        .manager
        .process_verified_payments(&pool_id, &req.contributor_ids)
        .await?;
    settlement_response(&state, settlement).await
}

async fn settlement_response(
    state: &ApiState,
    settlement: Settlement,
) -> Result<Json<SettlementResponse>> {
    state
        .record(events::from_settlement(&settlement, now_ts()))
        .await;
    Ok(Json(SettlementResponse {
        transitions: settlement.transitions,
        completed_now: settlement.completed_now,
        pool: state.pool_response(settlement.pool)?,
    }))
}

/// `GET /pools/:id/events`
pub async fn get_pool_events(
    State(state): State<Arc<ApiState>>,
    Path(pool_id): Path<String>,
) -> Result<Json<EventsResponse>> {
    state.manager.get_pool(&pool_id).await?;
    let events = db::get_events_for_pool(&state.db, &pool_id).await?;
    Ok(Json(EventsResponse {
        pool_id,
        count: events.len(),
        events,
    }))
}

/// `POST /businesses`
pub async fn register_business(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<RegisterBusinessRequest>,
) -> Result<(StatusCode, Json<Business>)> {
    let business = state.directory.register(&req.name, &req.email).await?;
    Ok((StatusCode::CREATED, Json(business)))
}

/// `GET /businesses/:id`
pub async fn get_business(
    State(state): State<Arc<ApiState>>,
    Path(business_id): Path<String>,
) -> Result<Json<Business>> {
    Ok(Json(state.directory.get(&business_id).await?))
}

/// `GET /businesses/:id/pools`
pub async fn list_business_pools(
    State(state): State<Arc<ApiState>>,
    Path(business_id): Path<String>,
) -> Result<Json<PoolListResponse>> {
    state.directory.get(&business_id).await?;
    let pools = state.manager.list_business_pools(&business_id).await?;
    Ok(Json(PoolListResponse {
        count: pools.len(),
        pools,
    }))
}

/// `GET /businesses/:id/stats`
pub async fn business_stats(
    State(state): State<Arc<ApiState>>,
    Path(business_id): Path<String>,
) -> Result<Json<BusinessStats>> {
    state.directory.get(&business_id).await?;
    Ok(Json(
        state.aggregator.stats_for_business(&business_id).await?,
    ))
}

/// `GET /businesses/:id/export`
pub async fn export_business_pools(
    State(state): State<Arc<ApiState>>,
    Path(business_id): Path<String>,
) -> Result<impl IntoResponse> {
    state.directory.get(&business_id).await?;
    let pools = state.manager.list_business_pools(&business_id).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export::export_filename(Utc::now())
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export::pools_to_csv(&pools),
    ))
}

/// `GET /businesses/:id/connect`
pub async fn connect_url(
    State(state): State<Arc<ApiState>>,
    Path(business_id): Path<String>,
    Query(query): Query<ConnectQuery>,
) -> Result<Json<UrlResponse>> {
    let redirect_uri = query
        .redirect_uri
        .unwrap_or_else(|| state.connect_redirect.clone());
    let url = state
        .directory
        .connect_url(&business_id, &redirect_uri)
        .await?;
    Ok(Json(UrlResponse { url }))
}

/// `GET /connect/callback`
pub async fn connect_callback(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ConnectCallbackQuery>,
) -> Result<Json<Business>> {
    if let Some(error) = query.error {
        return Err(ServerError::Core(CoreError::InvalidOperation(format!(
            "connect was declined: {}",
            query.error_description.unwrap_or(error)
        ))));
    }
    let (Some(code), Some(business_id)) = (query.code, query.state) else {
        return Err(ServerError::Core(CoreError::InvalidOperation(
            "callback needs both code and state".to_string(),
        )));
    };
    Ok(Json(
        state.directory.complete_connect(&code, &business_id).await?,
    ))
}

/// `GET /businesses/:id/login-link`
pub async fn login_link(
    State(state): State<Arc<ApiState>>,
    Path(business_id): Path<String>,
) -> Result<Json<UrlResponse>> {
    let url = state.directory.login_link(&business_id).await?;
    Ok(Json(UrlResponse { url }))
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
