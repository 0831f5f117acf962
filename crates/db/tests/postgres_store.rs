//! Postgres store integration tests.
//!
//! Require `DATABASE_URL` pointing at a scratch Postgres instance:
//! `cargo test -p artgen-db -- --ignored`.

use artgen_core::credits::CreditReason;
use artgen_core::status::GenerationStatus;
use artgen_db::models::credit::{DeltaOutcome, NewLedgerEntry};
use artgen_db::models::generation::{GenerationFilter, GenerationPatch, NewGeneration};
use artgen_db::{LedgerStore, PgLedgerStore, PgRecordStore, RecordStore};
use assert_matches::assert_matches;
use sqlx::PgPool;

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_status_lookup_seeded(pool: PgPool) {
    artgen_db::health_check(&pool).await.unwrap();

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM generation_statuses")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 4);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_debit_and_refund_roundtrip(pool: PgPool) {
    let store = PgLedgerStore::new(pool);
    store.open_account(1).await.unwrap();
    store
        .apply_delta(&NewLedgerEntry::credit(1, 40, CreditReason::Purchase, "top-up"))
        .await
        .unwrap();

    let debit = NewLedgerEntry::debit(1, 30, CreditReason::Usage, "flux flux-pro generation");
    let outcome = store.apply_delta(&debit).await.unwrap();
    assert_matches!(outcome, DeltaOutcome::Applied { new_balance: 10, .. });

    let again = store.apply_delta(&debit).await.unwrap();
    assert_eq!(again, DeltaOutcome::Insufficient { available: 10 });

    store
        .apply_delta(&NewLedgerEntry::credit(1, 30, CreditReason::Refund, "refund"))
        .await
        .unwrap();
    assert_eq!(store.balance(1).await.unwrap(), 40);

    let entries = store.entries(1, 10).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].reason, CreditReason::Refund);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_missing_account_is_not_found(pool: PgPool) {
    let store = PgLedgerStore::new(pool);
    let err = store
        .apply_delta(&NewLedgerEntry::debit(7, 1, CreditReason::Usage, "x"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_generation_cas_transitions(pool: PgPool) {
    let store = PgRecordStore::new(pool);
    let record = store
        .insert(&NewGeneration {
            owner_id: 1,
            prompt: "harbour at night".into(),
            provider: "flux".into(),
            model: "flux-pro".into(),
            style: Some("noir".into()),
            credits_reserved: 10,
        })
        .await
        .unwrap();
    assert_eq!(record.status, GenerationStatus::Pending);

    let processing = GenerationPatch::transition(GenerationStatus::Processing).with_task_id("t-9");
    store.update(record.id, &processing).await.unwrap().unwrap();

    let completed = GenerationPatch::transition(GenerationStatus::Completed);
    let done = store.update(record.id, &completed).await.unwrap().unwrap();
    assert!(done.completed_at.is_some());
    assert_eq!(done.task_id.as_deref(), Some("t-9"));

    let failed = GenerationPatch::transition(GenerationStatus::Failed).with_error("late");
    assert!(store.update(record.id, &failed).await.unwrap().is_none());

    let listed = store
        .list_for_owner(
            1,
            &GenerationFilter {
                status: Some(GenerationStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let stats = store.stats_for_owner(1).await.unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.credits_used, 10);
}
