//! # OnePool Core
//!
//! The pool allocation and contributor-settlement model behind OnePool: a
//! collector asks for a fixed total, splits it among named contributors, and
//! each contributor verifies a payment method and is then charged their
//! share.
//!
//! | Phase        | Entry Point(s)                                              |
//! |--------------|-------------------------------------------------------------|
//! | Allocation   | [`allocation::remaining`], [`allocation::distribute_evenly`], [`allocation::can_finalize`] |
//! | Registration | [`PoolManager::create_pool`], [`PoolManager::create_from_template`] |
//! | Editing      | [`PoolManager::update_contributors`], [`PoolManager::split_evenly`] |
//! | Settlement   | [`PoolManager::settle_contributor`], [`PoolManager::process_verified_payments`] |
//! | Businesses   | [`BusinessDirectory`]                                       |
//! | Queries      | [`PoolManager::get_pool`], [`BusinessAggregator::stats_for_business`] |
//!
//! ## Architecture
//!
//! Persistence is fully delegated to a [`PoolStore`] / [`BusinessStore`]
//! and the payment processor to a [`PaymentGateway`]; both are handed in at
//! construction time. The core does no I/O of its own.

pub mod allocation;
pub mod business;
pub mod contributor;
mod errors;
pub mod lifecycle;
pub mod payment;
pub mod stats;
pub mod storage;
pub mod templates;
mod types;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_settlement;

pub use allocation::AllocationSummary;
pub use business::BusinessDirectory;
pub use contributor::{ContributorEvent, ContributorState, Transition};
pub use errors::{Error, Result};
pub use lifecycle::{PoolManager, Settlement};
pub use payment::{PaymentError, PaymentGateway};
pub use stats::{compute_stats, BusinessAggregator, BusinessStats};
pub use storage::{BusinessStore, MemoryStore, PoolStore, StoreError};
pub use types::{Business, Contributor, NewPool, Pool, PoolStatus, Settle};
