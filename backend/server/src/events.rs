//! Pool activity events recorded alongside every successful mutation.
//!
//! These are derived from core results (created pools, replaced rosters,
//! contributor transitions, completion) and are never read back by the core.

use onepool_core::{ContributorState, Pool, Settlement, Transition};
use serde::{Deserialize, Serialize};

/// All recognised pool event kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A pool was created.
    PoolCreated,
    /// The collector replaced the contributor list.
    ContributorsUpdated,
    /// A contributor's payment method was verified.
    ContributorVerified,
    /// A contributor was charged their share.
    ContributorPaid,
    /// The last contributor paid.
    PoolCompleted,
}

impl EventKind {
    pub fn from_transition(transition: &Transition) -> Option<Self> {
        match transition.to {
            ContributorState::Verified => Some(Self::ContributorVerified),
            ContributorState::Paid => Some(Self::ContributorPaid),
            ContributorState::Unverified => None,
        }
    }

    /// Return a short identifier string suitable for storage in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PoolCreated => "pool_created",
            Self::ContributorsUpdated => "contributors_updated",
            Self::ContributorVerified => "contributor_verified",
            Self::ContributorPaid => "contributor_paid",
            Self::PoolCompleted => "pool_completed",
        }
    }
}

/// A pool event, ready to be stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEvent {
    pub event_type: String,
    pub pool_id: String,
    pub contributor_id: Option<String>,
    pub amount: Option<String>,
    pub timestamp: i64,
}

impl PoolEvent {
    fn new(kind: EventKind, pool: &Pool, timestamp: i64) -> Self {
        Self {
            event_type: kind.as_str().to_string(),
            pool_id: pool.id.clone(),
            contributor_id: None,
            amount: None,
            timestamp,
        }
    }

    pub fn created(pool: &Pool, timestamp: i64) -> Self {
        Self {
            amount: Some(pool.total_amount.to_string()),
            ..Self::new(EventKind::PoolCreated, pool, timestamp)
        }
    }

    pub fn roster_updated(pool: &Pool, timestamp: i64) -> Self {
        Self::new(EventKind::ContributorsUpdated, pool, timestamp)
    }
}

/// Events for every transition in a settlement, followed by completion.
pub fn from_settlement(settlement: &Settlement, timestamp: i64) -> Vec<PoolEvent> {
    let pool = &settlement.pool;
    let mut events: Vec<PoolEvent> = settlement
        .transitions
        .iter()
        .filter_map(|t| {
            let kind = EventKind::from_transition(t)?;
            let amount = pool.contributor(&t.contributor_id).map(|c| c.amount.to_string());
            Some(PoolEvent {
                contributor_id: Some(t.contributor_id.clone()),
                amount,
                ..PoolEvent::new(kind, pool, timestamp)
            })
        })
        .collect();

    if settlement.completed_now {
        events.push(PoolEvent {
            amount: Some(pool.total_amount.to_string()),
            ..PoolEvent::new(EventKind::PoolCompleted, pool, timestamp)
        });
    }
    events
}

/// A raw event record as stored in / read from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: i64,
    pub event_type: String,
    pub pool_id: String,
    pub contributor_id: Option<String>,
    pub amount: Option<String>,
    pub timestamp: i64,
    pub created_at: i64,
}
