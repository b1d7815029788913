//! # Types
//!
//! Shared data structures used across all modules of OnePool.
//!
//! ## Design decisions
//!
//! ### Pool document
//!
//! A [`Pool`] is persisted as a single document: the immutable header
//! (`id`, `created_at`, `total_amount`, `subscription_name`, `business_id`)
//! plus the mutable part (`contributors`, `status`). Only the mutable part is
//! ever rewritten, and every rewrite bumps `version` so the persistence
//! gateway can reject stale writes.
//!
//! ### Status as a Finite-State Machine
//!
//! [`PoolStatus`] enforces a strict forward-only lifecycle:
//!
//! ```text
//! Active ──► Completed
//!    └─────► Cancelled
//! ```
//!
//! `Completed` is derived from the contributor list (everyone paid) and is
//! never set by a client. `Cancelled` is only ever written by an external
//! collaborator through the persistence gateway.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a pool.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    /// Collecting verifications and payments.
    #[default]
    Active,
    /// Every contributor has paid.
    Completed,
    /// Withdrawn by an external collaborator; no further processing.
    Cancelled,
}

impl PoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// `Completed` and `Cancelled` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown pool status '{other}'")),
        }
    }
}

/// A named participant owing a share of a pool's total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contributor {
    /// Unique within a pool. Blank ids are replaced on write.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Allocated share, two decimal places.
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub has_verified: bool,
    #[serde(default)]
    pub has_paid: bool,
}

impl Contributor {
    /// A fresh, unverified contributor.
    pub fn new(id: impl Into<String>, name: impl Into<String>, amount: Decimal) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            amount,
            has_verified: false,
            has_paid: false,
        }
    }
}

/// A single payment-splitting request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Target amount, always strictly positive.
    pub total_amount: Decimal,
    /// Display label, e.g. "Netflix".
    pub subscription_name: String,
    /// Display order only.
    pub contributors: Vec<Contributor>,
    pub business_id: Option<String>,
    pub status: PoolStatus,
    /// Bumped on every write of `contributors`/`status`.
    pub version: u64,
}

impl Pool {
    pub fn contributor(&self, contributor_id: &str) -> Option<&Contributor> {
        self.contributors.iter().find(|c| c.id == contributor_id)
    }

    /// True once any contributor has verified; the contributor set is then
    /// closed to additions and removals.
    pub fn is_roster_locked(&self) -> bool {
        self.contributors.iter().any(|c| c.has_verified)
    }
}

/// Input for [`crate::PoolManager::create_pool`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewPool {
    pub total_amount: Decimal,
    /// Falls back to `"Payment"` when blank.
    pub subscription_name: Option<String>,
    pub contributors: Vec<Contributor>,
    pub business_id: Option<String>,
}

/// Settlement request for a single contributor. `false` means "no event",
/// never a regression.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settle {
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub paid: bool,
}

impl Settle {
    pub fn verified() -> Self {
        Self {
            verified: true,
            paid: false,
        }
    }

    pub fn paid() -> Self {
        Self {
            verified: false,
            paid: true,
        }
    }
}

/// An entity that owns pools and can connect a payment-processor account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    pub id: String,
    pub name: String,
    pub email: String,
    pub stripe_account_id: Option<String>,
    /// Only set by a completed connect handshake.
    pub stripe_connected: bool,
    pub created_at: DateTime<Utc>,
}
