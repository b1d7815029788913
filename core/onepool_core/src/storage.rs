//! # Storage
//!
//! The persistence gateway the core talks to. Everything here is a narrow
//! load/save contract; the core never sees a database handle.
//!
//! ## Pool documents
//!
//! | Operation               | Writes                    | Guard                       |
//! |-------------------------|---------------------------|-----------------------------|
//! | `create`                | whole document            | none, id is assigned here   |
//! | `replace_contributors`  | `contributors` + `status` | `version == expected`       |
//! | `set_status`            | `status`                  | `version == expected`       |
//!
//! Both guarded writes bump `version` by one and return the new value. A
//! stale `expected_version` yields [`StoreError::VersionConflict`] instead of
//! silently overwriting a concurrent update.
//!
//! ## Businesses
//!
//! Businesses are independent records. Pools reference them by id; nothing
//! cascades between the two.
//!
//! [`MemoryStore`] implements both traits in process and is what the tests
//! run against.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::types::{Business, Contributor, Pool, PoolStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Version conflict on pool {pool_id}: expected {expected}, found {found}")]
    VersionConflict {
        pool_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}

#[async_trait]
pub trait PoolStore: Send + Sync {
    /// Persist a new pool. The `id` on the input is ignored; the assigned id
    /// is returned.
    async fn create(&self, pool: Pool) -> Result<String, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Pool>, StoreError>;

    /// Compare-and-swap write of the mutable part of a pool.
    async fn replace_contributors(
        &self,
        id: &str,
        expected_version: u64,
        contributors: &[Contributor],
        status: PoolStatus,
    ) -> Result<u64, StoreError>;

    /// Compare-and-swap write of the status alone.
    async fn set_status(
        &self,
        id: &str,
        expected_version: u64,
        status: PoolStatus,
    ) -> Result<u64, StoreError>;

    /// Pools owned by `business_id`, newest first.
    async fn query_by_business(&self, business_id: &str) -> Result<Vec<Pool>, StoreError>;
}

#[async_trait]
pub trait BusinessStore: Send + Sync {
    async fn create_business(&self, business: Business) -> Result<String, StoreError>;

    async fn get_business(&self, id: &str) -> Result<Option<Business>, StoreError>;

    /// Record a connected payment-processor account and mark it connected.
    async fn set_stripe_account(&self, id: &str, account_id: &str) -> Result<(), StoreError>;
}

/// Generate a record id.
pub fn new_record_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// ── In-memory gateway ────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    pools: Mutex<HashMap<String, Pool>>,
    businesses: Mutex<HashMap<String, Business>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_version(pool: &Pool, expected: u64) -> Result<(), StoreError> {
    if pool.version != expected {
        return Err(StoreError::VersionConflict {
            pool_id: pool.id.clone(),
            expected,
            found: pool.version,
        });
    }
    Ok(())
}

#[async_trait]
impl PoolStore for MemoryStore {
    async fn create(&self, mut pool: Pool) -> Result<String, StoreError> {
        let id = new_record_id();
        pool.id = id.clone();
        self.pools.lock().await.insert(id.clone(), pool);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<Pool>, StoreError> {
        Ok(self.pools.lock().await.get(id).cloned())
    }

    async fn replace_contributors(
        &self,
        id: &str,
        expected_version: u64,
        contributors: &[Contributor],
        status: PoolStatus,
    ) -> Result<u64, StoreError> {
        let mut pools = self.pools.lock().await;
        let pool = pools
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        check_version(pool, expected_version)?;
        pool.contributors = contributors.to_vec();
        pool.status = status;
        pool.version += 1;
        Ok(pool.version)
    }

    async fn set_status(
        &self,
        id: &str,
        expected_version: u64,
        status: PoolStatus,
    ) -> Result<u64, StoreError> {
        let mut pools = self.pools.lock().await;
        let pool = pools
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        check_version(pool, expected_version)?;
        pool.status = status;
        pool.version += 1;
        Ok(pool.version)
    }

    async fn query_by_business(&self, business_id: &str) -> Result<Vec<Pool>, StoreError> {
        let mut pools: Vec<Pool> = self
            .pools
            .lock()
            .await
            .values()
            .filter(|p| p.business_id.as_deref() == Some(business_id))
            .cloned()
            .collect();
        pools.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(pools)
    }
}

#[async_trait]
impl BusinessStore for MemoryStore {
    async fn create_business(&self, mut business: Business) -> Result<String, StoreError> {
        let id = new_record_id();
        business.id = id.clone();
        self.businesses.lock().await.insert(id.clone(), business);
        Ok(id)
    }

    async fn get_business(&self, id: &str) -> Result<Option<Business>, StoreError> {
        Ok(self.businesses.lock().await.get(id).cloned())
    }

    async fn set_stripe_account(&self, id: &str, account_id: &str) -> Result<(), StoreError> {
        let mut businesses = self.businesses.lock().await;
        let business = businesses
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        business.stripe_account_id = Some(account_id.to_string());
        business.stripe_connected = true;
        Ok(())
    }
}
