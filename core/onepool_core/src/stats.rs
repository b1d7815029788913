//! Business dashboard statistics, derived from pools on every call.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::errors::Result;
use crate::storage::PoolStore;
use crate::types::{Pool, PoolStatus};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessStats {
    pub total_pools: usize,
    pub active_pools: usize,
    pub completed_pools: usize,
    pub total_amount: Decimal,
    /// Sum of the shares of contributors who have paid.
    pub collected_amount: Decimal,
    pub total_contributors: usize,
    pub verified_contributors: usize,
    pub paid_contributors: usize,
}

/// Money totals saturate at `Decimal::MAX` rather than overflowing.
pub fn compute_stats(pools: &[Pool]) -> BusinessStats {
    pools.iter().fold(BusinessStats::default(), |mut acc, pool| {
        acc.total_pools += 1;
        match pool.status {
            PoolStatus::Active => acc.active_pools += 1,
            PoolStatus::Completed => acc.completed_pools += 1,
            PoolStatus::Cancelled => {}
        }
        acc.total_amount = acc.total_amount.saturating_add(pool.total_amount);

        for c in &pool.contributors {
            acc.total_contributors += 1;
            if c.has_verified {
                acc.verified_contributors += 1;
            }
            if c.has_paid {
                acc.paid_contributors += 1;
                acc.collected_amount = acc.collected_amount.saturating_add(c.amount);
            }
        }
        acc
    })
}

/// Read side over a business's pools. Holds no state of its own.
#[derive(Clone)]
pub struct BusinessAggregator {
    store: Arc<dyn PoolStore>,
}

impl BusinessAggregator {
    pub fn new(store: Arc<dyn PoolStore>) -> Self {
        Self { store }
    }

    pub async fn stats_for_business(&self, business_id: &str) -> Result<BusinessStats> {
        let pools = self.store.query_by_business(business_id).await?;
        Ok(compute_stats(&pools))
    }
}
