use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::invariants::{
    assert_all_pool_invariants, assert_settlement_monotonic, assert_version_monotonic,
};
use crate::lifecycle::MAX_WRITE_ATTEMPTS;
use crate::storage::{MemoryStore, PoolStore, StoreError};
use crate::{
    compute_stats, Contributor, ContributorState, Error, NewPool, Pool, PoolManager, PoolStatus,
    Settle,
};

fn setup() -> (Arc<MemoryStore>, PoolManager) {
    let store = Arc::new(MemoryStore::new());
    let manager = PoolManager::new(store.clone());
    (store, manager)
}

fn person(id: &str, amount: Decimal) -> Contributor {
    Contributor::new(id, id.to_uppercase(), amount)
}

fn with_flags(id: &str, amount: Decimal, verified: bool, paid: bool) -> Contributor {
    Contributor {
        has_verified: verified,
        has_paid: paid,
        ..person(id, amount)
    }
}

async fn create(manager: &PoolManager, total: Decimal, contributors: Vec<Contributor>) -> String {
    manager
        .create_pool(NewPool {
            total_amount: total,
            contributors,
            ..NewPool::default()
        })
        .await
        .unwrap()
}

/// Store a pool as-is, settlement flags included. The manager never accepts
/// flags from callers, so pre-settled rosters go straight to the store.
async fn seed(store: &MemoryStore, total: Decimal, contributors: Vec<Contributor>) -> String {
    store
        .create(Pool {
            id: String::new(),
            created_at: Utc::now(),
            total_amount: total,
            subscription_name: "Payment".to_string(),
            contributors,
            business_id: None,
            status: PoolStatus::Active,
            version: 0,
        })
        .await
        .unwrap()
}

/// The 90.00 pool: one verified, one already paid, one untouched.
async fn ninety_pool(store: &MemoryStore) -> String {
    seed(
        store,
        dec!(90),
        vec![
            with_flags("a", dec!(30), true, false),
            with_flags("b", dec!(30), true, true),
            with_flags("c", dec!(30), false, false),
        ],
    )
    .await
}

// ── create ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_pool_starts_active() {
    let (_, manager) = setup();
    let id = create(&manager, dec!(100), vec![]).await;
    let pool = manager.get_pool(&id).await.unwrap();

    assert_eq!(pool.id, id);
    assert_eq!(pool.status, PoolStatus::Active);
    assert_eq!(pool.subscription_name, "Payment");
    assert_eq!(pool.version, 0);
    assert!(pool.contributors.is_empty());
}

#[tokio::test]
async fn test_create_pool_rejects_non_positive_total() {
    let (_, manager) = setup();
    for total in [dec!(0), dec!(-5), dec!(0.004)] {
        let err = manager
            .create_pool(NewPool {
                total_amount: total,
                ..NewPool::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)), "total {total}");
    }
}

#[tokio::test]
async fn test_create_pool_ignores_client_settlement_flags() {
    let (_, manager) = setup();
    let id = create(
        &manager,
        dec!(100),
        vec![
            with_flags("a", dec!(100), true, true),
            with_flags("b", dec!(0), false, true),
        ],
    )
    .await;

    let pool = manager.get_pool(&id).await.unwrap();
    assert_eq!(pool.status, PoolStatus::Active);
    assert!(pool
        .contributors
        .iter()
        .all(|c| c.state() == ContributorState::Unverified));
    assert_eq!(compute_stats(&[pool.clone()]).collected_amount, Decimal::ZERO);
    assert_all_pool_invariants(&pool);
}

#[tokio::test]
async fn test_create_pool_rejects_sub_cent_and_oversized_totals() {
    let (_, manager) = setup();
    for total in [dec!(10.005), dec!(1000000000.01)] {
        let err = manager
            .create_pool(NewPool {
                total_amount: total,
                ..NewPool::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)), "total {total}");
    }
}

#[tokio::test]
async fn test_update_rejects_amounts_that_cannot_be_charged() {
    let (_, manager) = setup();
    let id = create(&manager, dec!(100), vec![]).await;

    // three sub-cent shares would round to an exact-looking allocation
    let err = manager
        .update_contributors(
            &id,
            vec![
                person("a", dec!(33.333)),
                person("b", dec!(33.333)),
                person("c", dec!(33.334)),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAmount(_)));

    let huge = dec!(50000000000000000000000000000);
    let err = manager
        .update_contributors(&id, vec![person("a", huge), person("b", huge)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAmount(_)));

    let pool = manager.get_pool(&id).await.unwrap();
    assert_eq!(pool.version, 0);
    assert!(!manager.allocation(&id).await.unwrap().can_finalize);
}

#[tokio::test]
async fn test_create_from_template() {
    let (_, manager) = setup();
    let id = manager
        .create_from_template("spotify", vec![], Some("biz".to_string()))
        .await
        .unwrap();
    let pool = manager.get_pool(&id).await.unwrap();
    assert_eq!(pool.total_amount, dec!(9.99));
    assert_eq!(pool.subscription_name, "Spotify");
    assert_eq!(pool.business_id.as_deref(), Some("biz"));

    let err = manager
        .create_from_template("hbo", vec![], None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TemplateNotFound(_)));
}

#[tokio::test]
async fn test_missing_pool() {
    let (_, manager) = setup();
    assert!(matches!(
        manager.get_pool("nope").await.unwrap_err(),
        Error::PoolNotFound(_)
    ));
    assert!(matches!(
        manager
            .settle_contributor("nope", "a", Settle::verified())
            .await
            .unwrap_err(),
        Error::PoolNotFound(_)
    ));
}

// ── update ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_update_contributors_replaces_the_list() {
    let (_, manager) = setup();
    let id = create(&manager, dec!(100), vec![person("a", dec!(100))]).await;

    let pool = manager
        .update_contributors(&id, vec![person("b", dec!(60)), person("c", dec!(40))])
        .await
        .unwrap();

    let ids: Vec<&str> = pool.contributors.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);
    assert_eq!(pool.version, 1);
    assert_all_pool_invariants(&pool);
}

#[tokio::test]
async fn test_update_cannot_forge_settlement_flags() {
    let (_, manager) = setup();
    let id = create(&manager, dec!(10), vec![person("a", dec!(10))]).await;

    let pool = manager
        .update_contributors(&id, vec![with_flags("a", dec!(10), true, true)])
        .await
        .unwrap();

    assert_eq!(pool.contributors[0].state(), ContributorState::Unverified);
    assert_eq!(pool.status, PoolStatus::Active);
}

#[tokio::test]
async fn test_roster_locks_after_first_verification() {
    let (_, manager) = setup();
    let id = create(
        &manager,
        dec!(20),
        vec![person("a", dec!(10)), person("b", dec!(10))],
    )
    .await;
    manager
        .settle_contributor(&id, "a", Settle::verified())
        .await
        .unwrap();

    // adding someone
    let err = manager
        .update_contributors(
            &id,
            vec![
                person("a", dec!(10)),
                person("b", dec!(5)),
                person("c", dec!(5)),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PoolLocked { .. }));

    // changing the verified contributor's share
    let err = manager
        .update_contributors(&id, vec![person("a", dec!(12)), person("b", dec!(8))])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PoolLocked { .. }));

    // the unverified contributor can still be edited
    let pool = manager
        .update_contributors(&id, vec![person("a", dec!(10)), person("b", dec!(9.5))])
        .await
        .unwrap();
    assert_eq!(pool.contributors[1].amount, dec!(9.5));
    assert!(pool.contributors[0].has_verified);
}

#[tokio::test]
async fn test_update_rejected_once_completed() {
    let (_, manager) = setup();
    let id = create(&manager, dec!(10), vec![person("a", dec!(10))]).await;
    manager
        .settle_contributor(
            &id,
            "a",
            Settle {
                verified: true,
                paid: true,
            },
        )
        .await
        .unwrap();

    let err = manager
        .update_contributors(&id, vec![person("a", dec!(10))])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PoolLocked { .. }));
}

#[tokio::test]
async fn test_split_evenly_persists_exact_allocation() {
    let (_, manager) = setup();
    let id = create(
        &manager,
        dec!(100),
        vec![
            person("a", Decimal::ZERO),
            person("b", Decimal::ZERO),
            person("c", Decimal::ZERO),
        ],
    )
    .await;

    let pool = manager.split_evenly(&id).await.unwrap();
    let amounts: Vec<Decimal> = pool.contributors.iter().map(|c| c.amount).collect();
    assert_eq!(amounts, vec![dec!(33.34), dec!(33.33), dec!(33.33)]);

    let summary = manager.allocation(&id).await.unwrap();
    assert!(summary.remaining.is_zero());
    assert!(summary.can_finalize);
}

#[tokio::test]
async fn test_split_evenly_without_contributors() {
    let (_, manager) = setup();
    let id = create(&manager, dec!(50), vec![]).await;
    assert!(matches!(
        manager.split_evenly(&id).await.unwrap_err(),
        Error::InvalidOperation(_)
    ));
}

// ── settle ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_charge_before_verification_is_rejected() {
    let (_, manager) = setup();
    let id = create(&manager, dec!(10), vec![person("a", dec!(10))]).await;

    let err = manager
        .settle_contributor(&id, "a", Settle::paid())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotVerified(_)));

    let pool = manager.get_pool(&id).await.unwrap();
    assert_eq!(pool.version, 0);
}

#[tokio::test]
async fn test_unknown_contributor() {
    let (_, manager) = setup();
    let id = create(&manager, dec!(10), vec![person("a", dec!(10))]).await;
    let err = manager
        .settle_contributor(&id, "zz", Settle::verified())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ContributorNotFound { .. }));
}

#[tokio::test]
async fn test_verification_is_idempotent() {
    let (_, manager) = setup();
    let id = create(&manager, dec!(10), vec![person("a", dec!(10))]).await;

    let first = manager
        .settle_contributor(&id, "a", Settle::verified())
        .await
        .unwrap();
    let second = manager
        .settle_contributor(&id, "a", Settle::verified())
        .await
        .unwrap();

    assert_eq!(first.transitions.len(), 1);
    assert!(second.transitions.is_empty());
    assert_eq!(first.pool, second.pool);
    assert_eq!(second.pool.version, 1);
}

#[tokio::test]
async fn test_last_payment_completes_pool() {
    let (_, manager) = setup();
    let id = create(
        &manager,
        dec!(20),
        vec![person("a", dec!(10)), person("b", dec!(10))],
    )
    .await;
    let both = Settle {
        verified: true,
        paid: true,
    };

    let first = manager.settle_contributor(&id, "a", both).await.unwrap();
    assert_eq!(first.pool.status, PoolStatus::Active);
    assert!(!first.completed_now);

    let before = first.pool.clone();
    let last = manager.settle_contributor(&id, "b", both).await.unwrap();
    assert_eq!(last.transitions.len(), 2);
    assert!(last.completed_now);
    assert_eq!(last.pool.status, PoolStatus::Completed);
    assert_settlement_monotonic(&before, &last.pool);
    assert_version_monotonic(before.version, last.pool.version);
    assert_all_pool_invariants(&last.pool);
}

#[tokio::test]
async fn test_cancelled_pool_is_left_alone() {
    let (store, manager) = setup();
    let id = create(&manager, dec!(10), vec![person("a", dec!(10))]).await;
    store
        .set_status(&id, 0, PoolStatus::Cancelled)
        .await
        .unwrap();

    let settlement = manager
        .settle_contributor(&id, "a", Settle::verified())
        .await
        .unwrap();
    assert!(settlement.transitions.is_empty());
    assert_eq!(settlement.pool.status, PoolStatus::Cancelled);
    assert!(!settlement.pool.contributors[0].has_verified);

    let processed = manager.process_verified_payments(&id, &[]).await.unwrap();
    assert!(processed.transitions.is_empty());

    assert!(matches!(
        manager
            .update_contributors(&id, vec![person("a", dec!(10))])
            .await
            .unwrap_err(),
        Error::PoolLocked { .. }
    ));
}

// ── process payments ─────────────────────────────────────────────────

#[tokio::test]
async fn test_process_verified_payments_scenario() {
    let (store, manager) = setup();
    let id = ninety_pool(&store).await;
    let before = manager.get_pool(&id).await.unwrap();

    let settlement = manager.process_verified_payments(&id, &[]).await.unwrap();

    assert_eq!(settlement.transitions.len(), 1);
    assert_eq!(settlement.transitions[0].contributor_id, "a");
    assert_eq!(settlement.pool.status, PoolStatus::Active);
    assert_eq!(compute_stats(&[settlement.pool.clone()]).paid_contributors, 2);
    assert!(!settlement.pool.contributor("c").unwrap().has_paid);
    assert_settlement_monotonic(&before, &settlement.pool);

    // third contributor verifies, then gets paid
    manager
        .settle_contributor(&id, "c", Settle::verified())
        .await
        .unwrap();
    let done = manager.process_verified_payments(&id, &[]).await.unwrap();
    assert!(done.completed_now);
    assert_eq!(done.pool.status, PoolStatus::Completed);
    assert_all_pool_invariants(&done.pool);
}

#[tokio::test]
async fn test_process_verified_payments_honours_filter() {
    let (store, manager) = setup();
    let id = seed(
        &store,
        dec!(20),
        vec![
            with_flags("a", dec!(10), true, false),
            with_flags("b", dec!(10), true, false),
        ],
    )
    .await;

    let settlement = manager
        .process_verified_payments(&id, &["b".to_string(), "ghost".to_string()])
        .await
        .unwrap();

    assert_eq!(settlement.transitions.len(), 1);
    assert!(!settlement.pool.contributor("a").unwrap().has_paid);
    assert!(settlement.pool.contributor("b").unwrap().has_paid);
}

// ── concurrency ──────────────────────────────────────────────────────

/// Lets a competing settlement land between the manager's read and write.
struct InterleavingStore {
    inner: Arc<MemoryStore>,
    competing_contributor: String,
    interleaved: AtomicBool,
    writes: AtomicUsize,
}

#[async_trait]
impl PoolStore for InterleavingStore {
    async fn create(&self, pool: Pool) -> Result<String, StoreError> {
        self.inner.create(pool).await
    }

    async fn get(&self, id: &str) -> Result<Option<Pool>, StoreError> {
        self.inner.get(id).await
    }

    async fn replace_contributors(
        &self,
        id: &str,
        expected_version: u64,
        contributors: &[Contributor],
        status: PoolStatus,
    ) -> Result<u64, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if !self.interleaved.swap(true, Ordering::SeqCst) {
            let competitor = PoolManager::new(self.inner.clone());
            competitor
                .settle_contributor(id, &self.competing_contributor, Settle::verified())
                .await
                .map_err(StoreError::backend)?;
        }
        self.inner
            .replace_contributors(id, expected_version, contributors, status)
            .await
    }

    async fn set_status(
        &self,
        id: &str,
        expected_version: u64,
        status: PoolStatus,
    ) -> Result<u64, StoreError> {
        self.inner.set_status(id, expected_version, status).await
    }

    async fn query_by_business(&self, business_id: &str) -> Result<Vec<Pool>, StoreError> {
        self.inner.query_by_business(business_id).await
    }
}

#[tokio::test]
async fn test_interleaved_settlements_do_not_lose_updates() {
    let inner = Arc::new(MemoryStore::new());
    let setup_manager = PoolManager::new(inner.clone());
    let id = create(
        &setup_manager,
        dec!(20),
        vec![person("a", dec!(10)), person("b", dec!(10))],
    )
    .await;

    let store = Arc::new(InterleavingStore {
        inner: inner.clone(),
        competing_contributor: "b".to_string(),
        interleaved: AtomicBool::new(false),
        writes: AtomicUsize::new(0),
    });
    let manager = PoolManager::new(store.clone());

    let settlement = manager
        .settle_contributor(&id, "a", Settle::verified())
        .await
        .unwrap();

    assert!(settlement.pool.contributor("a").unwrap().has_verified);
    assert!(settlement.pool.contributor("b").unwrap().has_verified);
    assert_eq!(settlement.pool.version, 2);
    assert_eq!(store.writes.load(Ordering::SeqCst), 2);

    let stored = inner.get(&id).await.unwrap().unwrap();
    assert_eq!(stored, settlement.pool);
}

/// Every write loses the race.
struct AlwaysStaleStore {
    inner: MemoryStore,
}

#[async_trait]
impl PoolStore for AlwaysStaleStore {
    async fn create(&self, pool: Pool) -> Result<String, StoreError> {
        self.inner.create(pool).await
    }

    async fn get(&self, id: &str) -> Result<Option<Pool>, StoreError> {
        self.inner.get(id).await
    }

    async fn replace_contributors(
        &self,
        id: &str,
        expected_version: u64,
        _contributors: &[Contributor],
        _status: PoolStatus,
    ) -> Result<u64, StoreError> {
        Err(StoreError::VersionConflict {
            pool_id: id.to_string(),
            expected: expected_version,
            found: expected_version + 1,
        })
    }

    async fn set_status(
        &self,
        id: &str,
        expected_version: u64,
        status: PoolStatus,
    ) -> Result<u64, StoreError> {
        self.inner.set_status(id, expected_version, status).await
    }

    async fn query_by_business(&self, business_id: &str) -> Result<Vec<Pool>, StoreError> {
        self.inner.query_by_business(business_id).await
    }
}

#[tokio::test]
async fn test_gives_up_after_repeated_conflicts() {
    let store = Arc::new(AlwaysStaleStore {
        inner: MemoryStore::new(),
    });
    let manager = PoolManager::new(store);
    let id = create(&manager, dec!(10), vec![person("a", dec!(10))]).await;

    let err = manager
        .settle_contributor(&id, "a", Settle::verified())
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Conflict { attempts, .. } if attempts == MAX_WRITE_ATTEMPTS)
    );
}
