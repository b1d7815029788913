//! Migrations, the SQLite persistence gateway and the pool activity log.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use onepool_core::{Business, BusinessStore, Contributor, Pool, PoolStatus, PoolStore, StoreError};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::errors::Result;
use crate::events::{EventRecord, PoolEvent};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    // Make sure the file is created if it doesn't exist yet.
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    let url = if url.contains('?') || url.contains(":memory:") {
        url
    } else {
        format!("{url}?mode=rwc")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied successfully");
    Ok(())
}

fn corrupt(what: String) -> StoreError {
    StoreError::Backend(what.into())
}

fn from_millis(ms: i64) -> std::result::Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| corrupt(format!("invalid timestamp {ms}")))
}

// ─────────────────────────────────────────────────────────
// Row shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct PoolRow {
    id: String,
    created_at: i64,
    total_amount: String,
    subscription_name: String,
    business_id: Option<String>,
    status: String,
    contributors: String,
    version: i64,
}

impl TryFrom<PoolRow> for Pool {
    type Error = StoreError;

    fn try_from(row: PoolRow) -> std::result::Result<Self, Self::Error> {
        let contributors: Vec<Contributor> =
            serde_json::from_str(&row.contributors).map_err(StoreError::backend)?;
        Ok(Pool {
            created_at: from_millis(row.created_at)?,
            total_amount: Decimal::from_str(&row.total_amount).map_err(StoreError::backend)?,
            status: PoolStatus::from_str(&row.status).map_err(corrupt)?,
            subscription_name: row.subscription_name,
            business_id: row.business_id,
            contributors,
            version: row.version as u64,
            id: row.id,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BusinessRow {
    id: String,
    name: String,
    email: String,
    stripe_account_id: Option<String>,
    stripe_connected: bool,
    created_at: i64,
}

impl TryFrom<BusinessRow> for Business {
    type Error = StoreError;

    fn try_from(row: BusinessRow) -> std::result::Result<Self, Self::Error> {
        Ok(Business {
            id: row.id,
            name: row.name,
            email: row.email,
            stripe_account_id: row.stripe_account_id,
            stripe_connected: row.stripe_connected,
            created_at: from_millis(row.created_at)?,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Persistence gateway
// ─────────────────────────────────────────────────────────

/// Pools and businesses in SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn connection(&self) -> &SqlitePool {
        &self.pool
    }

    /// Tell a missing row apart from a stale version after a guarded
    /// update touched nothing.
    async fn explain_missed_write(
        &self,
        id: &str,
        expected: u64,
    ) -> std::result::Result<StoreError, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM pools WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(match row {
            None => StoreError::NotFound(id.to_string()),
            Some((found,)) => StoreError::VersionConflict {
                pool_id: id.to_string(),
                expected,
                found: found as u64,
            },
        })
    }
}

const POOL_COLUMNS: &str = "id, created_at, total_amount, subscription_name, business_id, \
                            status, contributors, version";

#[async_trait]
impl PoolStore for SqliteStore {
    async fn create(&self, pool: Pool) -> std::result::Result<String, StoreError> {
        let id = onepool_core::storage::new_record_id();
        let contributors =
            serde_json::to_string(&pool.contributors).map_err(StoreError::backend)?;
        sqlx::query(
            r#"
            INSERT INTO pools
                (id, created_at, total_amount, subscription_name, business_id,
                 status, contributors, version)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&id)
        .bind(pool.created_at.timestamp_millis())
        .bind(pool.total_amount.to_string())
        .bind(&pool.subscription_name)
        .bind(&pool.business_id)
        .bind(pool.status.as_str())
        .bind(contributors)
        .bind(pool.version as i64)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(id)
    }

    async fn get(&self, id: &str) -> std::result::Result<Option<Pool>, StoreError> {
        let row = sqlx::query_as::<_, PoolRow>(&format!(
            "SELECT {POOL_COLUMNS} FROM pools WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        row.map(Pool::try_from).transpose()
    }

    async fn replace_contributors(
        &self,
        id: &str,
        expected_version: u64,
        contributors: &[Contributor],
        status: PoolStatus,
    ) -> std::result::Result<u64, StoreError> {
        let json = serde_json::to_string(contributors).map_err(StoreError::backend)?;
        let updated = sqlx::query(
            r#"
            UPDATE pools
            SET    contributors = ?1, status = ?2, version = version + 1
            WHERE  id = ?3 AND version = ?4
            "#,
        )
        .bind(json)
        .bind(status.as_str())
        .bind(id)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?
        .rows_affected();

        if updated == 0 {
            return Err(self.explain_missed_write(id, expected_version).await?);
        }
        Ok(expected_version + 1)
    }

    async fn set_status(
        &self,
        id: &str,
        expected_version: u64,
        status: PoolStatus,
    ) -> std::result::Result<u64, StoreError> {
        let updated = sqlx::query(
            "UPDATE pools SET status = ?1, version = version + 1 WHERE id = ?2 AND version = ?3",
        )
        .bind(status.as_str())
        .bind(id)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?
        .rows_affected();

        if updated == 0 {
            return Err(self.explain_missed_write(id, expected_version).await?);
        }
        Ok(expected_version + 1)
    }

    async fn query_by_business(
        &self,
        business_id: &str,
    ) -> std::result::Result<Vec<Pool>, StoreError> {
        let rows = sqlx::query_as::<_, PoolRow>(&format!(
            r#"
            SELECT {POOL_COLUMNS}
            FROM   pools
            WHERE  business_id = ?1
            ORDER  BY created_at DESC, id ASC
            "#
        ))
        .bind(business_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        rows.into_iter().map(Pool::try_from).collect()
    }
}

#[async_trait]
impl BusinessStore for SqliteStore {
    async fn create_business(&self, business: Business) -> std::result::Result<String, StoreError> {
        let id = onepool_core::storage::new_record_id();
        sqlx::query(
            r#"
            INSERT INTO businesses
                (id, name, email, stripe_account_id, stripe_connected, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&id)
        .bind(&business.name)
        .bind(&business.email)
        .bind(&business.stripe_account_id)
        .bind(business.stripe_connected)
        .bind(business.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(id)
    }

    async fn get_business(&self, id: &str) -> std::result::Result<Option<Business>, StoreError> {
        let row = sqlx::query_as::<_, BusinessRow>(
            r#"
            SELECT id, name, email, stripe_account_id, stripe_connected, created_at
            FROM   businesses
            WHERE  id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        row.map(Business::try_from).transpose()
    }

    async fn set_stripe_account(
        &self,
        id: &str,
        account_id: &str,
    ) -> std::result::Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE businesses SET stripe_account_id = ?1, stripe_connected = 1 WHERE id = ?2",
        )
        .bind(account_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Event writes
// ─────────────────────────────────────────────────────────

/// Append a batch of pool events.
pub async fn insert_events(pool: &SqlitePool, events: &[PoolEvent]) -> Result<usize> {
    let mut count = 0usize;
    for ev in events {
        let rows_affected = sqlx::query(
            r#"
            INSERT INTO pool_events
                (event_type, pool_id, contributor_id, amount, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&ev.event_type)
        .bind(&ev.pool_id)
        .bind(&ev.contributor_id)
        .bind(&ev.amount)
        .bind(ev.timestamp)
        .execute(pool)
        .await?
        .rows_affected();

        count += rows_affected as usize;
    }
    Ok(count)
}

// ─────────────────────────────────────────────────────────
// Event reads
// ─────────────────────────────────────────────────────────

/// Fetch all events for a given pool, oldest first.
pub async fn get_events_for_pool(pool: &SqlitePool, pool_id: &str) -> Result<Vec<EventRecord>> {
    let rows = sqlx::query_as::<_, EventRecord>(
        r#"
        SELECT id, event_type, pool_id, contributor_id, amount, timestamp, created_at
        FROM   pool_events
        WHERE  pool_id = ?1
        ORDER  BY id ASC
        "#,
    )
    .bind(pool_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
