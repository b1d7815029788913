#![allow(dead_code)]

use rust_decimal::Decimal;

use crate::types::{Pool, PoolStatus};

/// INV-1: A contributor can only have paid after verifying.
pub fn assert_paid_implies_verified(pool: &Pool) {
    for c in &pool.contributors {
        assert!(
            !c.has_paid || c.has_verified,
            "INV-1 violated: contributor {} in pool {} paid without verifying",
            c.id,
            pool.id
        );
    }
}

/// INV-2: Pool total must always be positive.
pub fn assert_total_positive(pool: &Pool) {
    assert!(
        pool.total_amount > Decimal::ZERO,
        "INV-2 violated: pool {} has non-positive total ({})",
        pool.id,
        pool.total_amount
    );
}

/// INV-3: Contributor amounts are never negative.
pub fn assert_amounts_non_negative(pool: &Pool) {
    for c in &pool.contributors {
        assert!(
            c.amount >= Decimal::ZERO,
            "INV-3 violated: contributor {} has negative amount ({})",
            c.id,
            c.amount
        );
    }
}

/// INV-4: An active or completed pool is completed exactly when a non-empty
/// roster has fully paid.
pub fn assert_status_matches_roster(pool: &Pool) {
    if pool.status == PoolStatus::Cancelled {
        return;
    }
    let all_paid = !pool.contributors.is_empty() && pool.contributors.iter().all(|c| c.has_paid);
    assert_eq!(
        pool.status == PoolStatus::Completed,
        all_paid,
        "INV-4 violated: pool {} is {:?} but all_paid={}",
        pool.id,
        pool.status,
        all_paid
    );
}

/// INV-5: Contributor ids are unique within a pool.
pub fn assert_unique_contributor_ids(pool: &Pool) {
    let mut ids: Vec<&str> = pool.contributors.iter().map(|c| c.id.as_str()).collect();
    ids.sort_unstable();
    let before = ids.len();
    ids.dedup();
    assert_eq!(
        before,
        ids.len(),
        "INV-5 violated: pool {} has duplicate contributor ids",
        pool.id
    );
}

/// INV-6: Status transition validity. Only forward transitions are allowed:
///   Active    -> Completed | Cancelled
///   Completed -> (none)
///   Cancelled -> (none)
pub fn assert_valid_status_transition(from: &PoolStatus, to: &PoolStatus) {
    let valid = from == to
        || matches!(
            (from, to),
            (PoolStatus::Active, PoolStatus::Completed) | (PoolStatus::Active, PoolStatus::Cancelled)
        );

    assert!(
        valid,
        "INV-6 violated: invalid status transition from {:?} to {:?}",
        from, to
    );
}

/// INV-7: Settlement never touches the pool header or regresses a contributor.
pub fn assert_settlement_monotonic(before: &Pool, after: &Pool) {
    assert_eq!(before.id, after.id, "INV-7 violated: pool id changed");
    assert_eq!(
        before.total_amount, after.total_amount,
        "INV-7 violated: pool total changed"
    );
    assert_eq!(
        before.created_at, after.created_at,
        "INV-7 violated: pool created_at changed"
    );
    for prev in &before.contributors {
        if let Some(next) = after.contributor(&prev.id) {
            assert!(
                next.state() >= prev.state(),
                "INV-7 violated: contributor {} regressed from {:?} to {:?}",
                prev.id,
                prev.state(),
                next.state()
            );
            if prev.has_verified {
                assert_eq!(
                    prev.amount, next.amount,
                    "INV-7 violated: verified contributor {} changed amount",
                    prev.id
                );
            }
        }
    }
    assert_valid_status_transition(&before.status, &after.status);
}

/// INV-8: Versions only move forward.
pub fn assert_version_monotonic(before: u64, after: u64) {
    assert!(
        after >= before,
        "INV-8 violated: version decreased from {} to {}",
        before,
        after
    );
}

/// Run all stateless pool invariants.
pub fn assert_all_pool_invariants(pool: &Pool) {
    assert_paid_implies_verified(pool);
    assert_total_positive(pool);
    assert_amounts_non_negative(pool);
    assert_status_matches_roster(pool);
    assert_unique_contributor_ids(pool);
}
