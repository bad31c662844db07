//! Withdrawal lifecycle properties: minimum, debit-on-create,
//! refund-on-reject, at-most-once decisions, admin gate, audit trail.

use adgram_ledger::MIN_WITHDRAW_SUBUNITS;
use adgram_ledger::ledger::LedgerError;
use adgram_ledger::store::Store;
use adgram_ledger::store::memory::MemStore;
use adgram_ledger::types::{Decision, Profile, WithdrawalStatus};
use adgram_ledger::workflow;

const ADMIN: i64 = 777;

fn profile(name: &str) -> Profile {
    Profile {
        display_name: name.to_owned(),
        username: None,
        photo_url: None,
    }
}

/// Logs a user in and hands them a starting balance.
async fn funded_user(store: &MemStore, id: i64, balance: i64) {
    store
        .authenticate_user(id, profile("user"), None)
        .await
        .unwrap();
    let mut user = store.user(id).await.unwrap().unwrap();
    user.balance_subunits = balance;
    store.seed_user(user).await;
}

async fn seed_admin(store: &MemStore, id: i64) {
    store
        .authenticate_user(id, profile("admin"), None)
        .await
        .unwrap();
    let mut user = store.user(id).await.unwrap().unwrap();
    user.is_admin = true;
    store.seed_user(user).await;
}

#[tokio::test]
async fn below_minimum_is_rejected_without_side_effects() {
    let store = MemStore::new();
    funded_user(&store, 1, 500_000).await;

    let err = store
        .create_withdrawal(1, 99.999, "binance-1".to_owned())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::MinimumNotMet));

    assert_eq!(store.user(1).await.unwrap().unwrap().balance_subunits, 500_000);
    assert!(store.pending_withdrawals().await.unwrap().is_empty());
}

#[tokio::test]
async fn minimum_amount_debits_exactly() {
    let store = MemStore::new();
    funded_user(&store, 1, 150_000).await;

    let request = store
        .create_withdrawal(1, 100.0, "binance-1".to_owned())
        .await
        .unwrap();
    assert_eq!(request.amount_subunits, MIN_WITHDRAW_SUBUNITS);
    assert_eq!(request.status, WithdrawalStatus::Pending);

    assert_eq!(store.user(1).await.unwrap().unwrap().balance_subunits, 50_000);

    let pending = store.pending_withdrawals().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, request.id);
}

#[tokio::test]
async fn insufficient_balance_creates_nothing() {
    let store = MemStore::new();
    funded_user(&store, 1, 50_000).await;

    let err = store
        .create_withdrawal(1, 100.0, "binance-1".to_owned())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance));

    assert_eq!(store.user(1).await.unwrap().unwrap().balance_subunits, 50_000);
    assert!(store.pending_withdrawals().await.unwrap().is_empty());
}

#[tokio::test]
async fn rejection_refunds_the_exact_amount() {
    let store = MemStore::new();
    seed_admin(&store, ADMIN).await;
    funded_user(&store, 1, 250_000).await;

    let request = store
        .create_withdrawal(1, 120.5, "binance-1".to_owned())
        .await
        .unwrap();
    assert_eq!(request.amount_subunits, 120_500);
    assert_eq!(store.user(1).await.unwrap().unwrap().balance_subunits, 129_500);

    store
        .decide_withdrawal(request.id, Decision::Rejected, ADMIN)
        .await
        .unwrap();

    // Round-trip law: balance is exactly what it was before the request.
    assert_eq!(store.user(1).await.unwrap().unwrap().balance_subunits, 250_000);
    assert!(store.pending_withdrawals().await.unwrap().is_empty());
}

#[tokio::test]
async fn approval_keeps_the_creation_time_debit() {
    let store = MemStore::new();
    seed_admin(&store, ADMIN).await;
    funded_user(&store, 1, 150_000).await;

    let request = store
        .create_withdrawal(1, 100.0, "binance-1".to_owned())
        .await
        .unwrap();
    store
        .decide_withdrawal(request.id, Decision::Approved, ADMIN)
        .await
        .unwrap();

    assert_eq!(store.user(1).await.unwrap().unwrap().balance_subunits, 50_000);
    assert!(store.pending_withdrawals().await.unwrap().is_empty());
}

#[tokio::test]
async fn second_decision_fails_and_does_not_move_money() {
    let store = MemStore::new();
    seed_admin(&store, ADMIN).await;
    funded_user(&store, 1, 150_000).await;

    let request = store
        .create_withdrawal(1, 100.0, "binance-1".to_owned())
        .await
        .unwrap();
    store
        .decide_withdrawal(request.id, Decision::Rejected, ADMIN)
        .await
        .unwrap();
    assert_eq!(store.user(1).await.unwrap().unwrap().balance_subunits, 150_000);

    // Approving after the refund must fail and must not claw anything back;
    // a repeat rejection must not refund twice.
    for decision in [Decision::Approved, Decision::Rejected] {
        let err = store
            .decide_withdrawal(request.id, decision, ADMIN)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyDecided));
    }
    assert_eq!(store.user(1).await.unwrap().unwrap().balance_subunits, 150_000);
}

#[tokio::test]
async fn deciding_an_unknown_request_fails() {
    let store = MemStore::new();
    seed_admin(&store, ADMIN).await;

    let err = store
        .decide_withdrawal(uuid::Uuid::new_v4(), Decision::Approved, ADMIN)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::RequestNotFound));
}

#[tokio::test]
async fn admin_gate_fails_closed() {
    let store = MemStore::new();
    store
        .authenticate_user(1, profile("user"), None)
        .await
        .unwrap();
    seed_admin(&store, ADMIN).await;

    // Unknown caller and plain user are both rejected.
    let err = workflow::ensure_admin(&store, 404).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotAdmin));
    let err = workflow::ensure_admin(&store, 1).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotAdmin));

    workflow::ensure_admin(&store, ADMIN).await.unwrap();
}

#[tokio::test]
async fn every_decision_appends_one_audit_entry() {
    let store = MemStore::new();
    seed_admin(&store, ADMIN).await;
    funded_user(&store, 1, 400_000).await;

    let first = store
        .create_withdrawal(1, 100.0, "binance-1".to_owned())
        .await
        .unwrap();
    let second = store
        .create_withdrawal(1, 100.0, "binance-1".to_owned())
        .await
        .unwrap();

    store
        .decide_withdrawal(first.id, Decision::Approved, ADMIN)
        .await
        .unwrap();
    store
        .decide_withdrawal(second.id, Decision::Rejected, ADMIN)
        .await
        .unwrap();
    // A failed decision appends nothing.
    let _ = store
        .decide_withdrawal(second.id, Decision::Approved, ADMIN)
        .await
        .unwrap_err();

    let audit = store.audit_entries().await;
    assert_eq!(audit.len(), 2);
    assert!(audit.iter().all(|e| e.actor_id == ADMIN));
    assert_eq!(audit[0].request_id, first.id);
    assert_eq!(audit[0].decision, "approved");
    assert_eq!(audit[1].request_id, second.id);
    assert_eq!(audit[1].decision, "rejected");
}
