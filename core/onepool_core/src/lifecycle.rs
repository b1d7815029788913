//! Pool lifecycle: creation, contributor edits and settlement.
//!
//! Every mutation follows the same shape: load the pool, compute the new
//! contributor list locally, derive the status, then write both back with a
//! compare-and-swap on `version`. A version conflict means someone else
//! wrote in between; the mutation is recomputed against the fresh document
//! (up to [`MAX_WRITE_ATTEMPTS`] times) so no update is lost.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::allocation::{self, check_amount, AllocationSummary};
use crate::contributor::{ContributorEvent, ContributorState, Transition};
use crate::errors::{Error, Result};
use crate::storage::{new_record_id, PoolStore, StoreError};
use crate::templates::find_template;
use crate::types::{Contributor, NewPool, Pool, PoolStatus, Settle};

/// Label used when a pool is created without one.
pub const DEFAULT_LABEL: &str = "Payment";

pub const MAX_WRITE_ATTEMPTS: usize = 3;

/// Outcome of a settlement call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub pool: Pool,
    /// Contributor transitions applied by this call, in list order.
    pub transitions: Vec<Transition>,
    /// True when this call moved the pool to `Completed`.
    pub completed_now: bool,
}

/// `Completed` once a non-empty roster has fully paid. Terminal states stick.
pub fn derive_status(current: PoolStatus, contributors: &[Contributor]) -> PoolStatus {
    match current {
        PoolStatus::Completed | PoolStatus::Cancelled => current,
        PoolStatus::Active if all_paid(contributors) => PoolStatus::Completed,
        PoolStatus::Active => PoolStatus::Active,
    }
}

fn all_paid(contributors: &[Contributor]) -> bool {
    !contributors.is_empty() && contributors.iter().all(|c| c.has_paid)
}

/// Short id for contributors added without one.
fn new_contributor_id() -> String {
    let mut id = new_record_id();
    id.truncate(8);
    id
}

/// Amount and id checks shared by create and update. Settlement flags are
/// cleared: they only ever come from gateway results on stored state.
fn normalize_roster(contributors: Vec<Contributor>) -> Result<Vec<Contributor>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(contributors.len());
    for mut c in contributors {
        check_amount(c.amount, &format!("amount of contributor '{}'", c.name))?;
        c.has_verified = false;
        c.has_paid = false;
        if c.id.trim().is_empty() {
            c.id = new_contributor_id();
        }
        if !seen.insert(c.id.clone()) {
            return Err(Error::InvalidOperation(format!(
                "duplicate contributor id '{}'",
                c.id
            )));
        }
        out.push(c);
    }
    Ok(out)
}

/// The new roster a collector asked for, with settlement flags taken from
/// the stored pool rather than from the request.
fn merge_roster(pool: &Pool, incoming: Vec<Contributor>) -> Result<Vec<Contributor>> {
    if pool.status.is_terminal() {
        return Err(Error::PoolLocked {
            pool_id: pool.id.clone(),
            reason: "pool is no longer active",
        });
    }

    let incoming = normalize_roster(incoming)?;

    if pool.is_roster_locked() {
        let before: HashSet<&str> = pool.contributors.iter().map(|c| c.id.as_str()).collect();
        let after: HashSet<&str> = incoming.iter().map(|c| c.id.as_str()).collect();
        if before != after {
            return Err(Error::PoolLocked {
                pool_id: pool.id.clone(),
                reason: "contributors cannot be added or removed after a verification",
            });
        }
    }

    incoming
        .into_iter()
        .map(|mut c| {
            if let Some(stored) = pool.contributor(&c.id) {
                if stored.has_verified && stored.amount != c.amount {
                    return Err(Error::PoolLocked {
                        pool_id: pool.id.clone(),
                        reason: "a verified contributor's amount cannot change",
                    });
                }
                c.has_verified = stored.has_verified;
                c.has_paid = stored.has_paid;
            }
            Ok(c)
        })
        .collect()
}

/// Owns pool status. Constructed with the persistence gateway it writes to.
#[derive(Clone)]
pub struct PoolManager {
    store: Arc<dyn PoolStore>,
}

impl PoolManager {
    pub fn new(store: Arc<dyn PoolStore>) -> Self {
        Self { store }
    }

    /// Register a new pool and return its id. New pools are always
    /// `Active` with every contributor unverified.
    pub async fn create_pool(&self, new_pool: NewPool) -> Result<String> {
        let total_amount = check_amount(new_pool.total_amount, "total amount")?;
        if total_amount.is_zero() {
            return Err(Error::InvalidAmount(
                "total amount must be positive (got 0)".to_string(),
            ));
        }

        let contributors = normalize_roster(new_pool.contributors)?;
        let subscription_name = new_pool
            .subscription_name
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LABEL.to_string());

        let pool = Pool {
            id: String::new(),
            created_at: Utc::now(),
            total_amount,
            subscription_name,
            status: PoolStatus::Active,
            contributors,
            business_id: new_pool.business_id,
            version: 0,
        };

        let id = self.store.create(pool).await?;
        info!(pool_id = %id, %total_amount, "Pool created");
        Ok(id)
    }

    /// Start a pool from a built-in subscription template.
    pub async fn create_from_template(
        &self,
        key: &str,
        contributors: Vec<Contributor>,
        business_id: Option<String>,
    ) -> Result<String> {
        let template =
            find_template(key).ok_or_else(|| Error::TemplateNotFound(key.to_string()))?;
        self.create_pool(NewPool {
            total_amount: template.amount,
            subscription_name: Some(template.name.to_string()),
            contributors,
            business_id,
        })
        .await
    }

    pub async fn get_pool(&self, pool_id: &str) -> Result<Pool> {
        self.store
            .get(pool_id)
            .await?
            .ok_or_else(|| Error::PoolNotFound(pool_id.to_string()))
    }

    pub async fn allocation(&self, pool_id: &str) -> Result<AllocationSummary> {
        let pool = self.get_pool(pool_id).await?;
        Ok(allocation::summarize(&pool.contributors, pool.total_amount))
    }

    /// Pools owned by a business, newest first.
    pub async fn list_business_pools(&self, business_id: &str) -> Result<Vec<Pool>> {
        Ok(self.store.query_by_business(business_id).await?)
    }

    /// Replace the whole contributor list.
    pub async fn update_contributors(
        &self,
        pool_id: &str,
        contributors: Vec<Contributor>,
    ) -> Result<Pool> {
        let settlement = self
            .write_with_retry(pool_id, |pool| {
                Ok((merge_roster(pool, contributors.clone())?, Vec::new()))
            })
            .await?;
        debug!(
            pool_id,
            contributors = settlement.pool.contributors.len(),
            "Contributors replaced"
        );
        Ok(settlement.pool)
    }

    /// Split the total evenly over the current contributors, residual cents
    /// included.
    pub async fn split_evenly(&self, pool_id: &str) -> Result<Pool> {
        let settlement = self
            .write_with_retry(pool_id, |pool| {
                let split = allocation::split_evenly(&pool.contributors, pool.total_amount)?;
                Ok((merge_roster(pool, split)?, Vec::new()))
            })
            .await?;
        Ok(settlement.pool)
    }

    /// Apply a gateway result to one contributor.
    pub async fn settle_contributor(
        &self,
        pool_id: &str,
        contributor_id: &str,
        settle: Settle,
    ) -> Result<Settlement> {
        self.write_with_retry(pool_id, |pool| {
            if pool.status == PoolStatus::Cancelled {
                return Ok((pool.contributors.clone(), Vec::new()));
            }

            let mut contributors = pool.contributors.clone();
            let contributor = contributors
                .iter_mut()
                .find(|c| c.id == contributor_id)
                .ok_or_else(|| Error::ContributorNotFound {
                    pool_id: pool.id.clone(),
                    contributor_id: contributor_id.to_string(),
                })?;

            let mut transitions = Vec::new();
            if settle.verified {
                transitions.extend(contributor.apply(ContributorEvent::Verify)?);
            }
            if settle.paid {
                transitions.extend(contributor.apply(ContributorEvent::Charge)?);
            }
            Ok((contributors, transitions))
        })
        .await
    }

    /// Charge every verified, unpaid contributor in `contributor_ids` (all of
    /// them when empty). Everyone else is left alone.
    pub async fn process_verified_payments(
        &self,
        pool_id: &str,
        contributor_ids: &[String],
    ) -> Result<Settlement> {
        self.write_with_retry(pool_id, |pool| {
            if pool.status == PoolStatus::Cancelled {
                return Ok((pool.contributors.clone(), Vec::new()));
            }

            let mut contributors = pool.contributors.clone();
            let mut transitions = Vec::new();
            for contributor in contributors.iter_mut() {
                let selected =
                    contributor_ids.is_empty() || contributor_ids.contains(&contributor.id);
                if selected && contributor.state() == ContributorState::Verified {
                    transitions.extend(contributor.apply(ContributorEvent::Charge)?);
                }
            }
            Ok((contributors, transitions))
        })
        .await
    }

    /// Load, mutate, derive status and CAS-write, retrying on conflicts.
    async fn write_with_retry<F>(&self, pool_id: &str, mut mutate: F) -> Result<Settlement>
    where
        F: FnMut(&Pool) -> Result<(Vec<Contributor>, Vec<Transition>)> + Send,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut pool = self.get_pool(pool_id).await?;
            let (contributors, transitions) = mutate(&pool)?;
            let status = derive_status(pool.status, &contributors);

            if contributors == pool.contributors && status == pool.status {
                return Ok(Settlement {
                    pool,
                    transitions,
                    completed_now: false,
                });
            }

            match self
                .store
                .replace_contributors(pool_id, pool.version, &contributors, status)
                .await
            {
                Ok(version) => {
                    let completed_now =
                        status == PoolStatus::Completed && pool.status != PoolStatus::Completed;
                    for t in &transitions {
                        info!(
                            pool_id,
                            contributor_id = %t.contributor_id,
                            from = ?t.from,
                            to = ?t.to,
                            "Contributor settled"
                        );
                    }
                    if completed_now {
                        info!(pool_id, "Pool completed");
                    }
                    pool.contributors = contributors;
                    pool.status = status;
                    pool.version = version;
                    return Ok(Settlement {
                        pool,
                        transitions,
                        completed_now,
                    });
                }
                Err(StoreError::VersionConflict { expected, found, .. }) => {
                    warn!(
                        pool_id,
                        attempt, expected, found, "Concurrent pool write detected; retrying"
                    );
                }
                Err(StoreError::NotFound(_)) => {
                    return Err(Error::PoolNotFound(pool_id.to_string()))
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::Conflict {
            pool_id: pool_id.to_string(),
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }
}
