//! Transactional store abstraction.
//!
//! Every balance-bearing operation runs as one atomic unit against a
//! [`StoreTx`] handle; [`Store`] owns opening, committing and retrying those
//! units. Production uses [`postgres::PgStore`]; tests use
//! [`memory::MemStore`].

pub mod memory;
pub mod postgres;

use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::LedgerError;
use crate::types::{AdCredit, AuditEntry, Decision, Profile, User, WithdrawalRequest};

/// How many times a conflicting transaction body is re-run before the
/// conflict is surfaced as an internal error.
pub const TX_MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrent transaction won the conflicting row; the whole
    /// read-modify-write unit should be retried.
    #[error("transaction conflict")]
    Conflict,
    #[error("malformed row: {0}")]
    Malformed(String),
    #[error(transparent)]
    Backend(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            // 40001 = serialization_failure, 40P01 = deadlock_detected,
            // 23505 = unique_violation (first-login insert race)
            if matches!(db.code().as_deref(), Some("40001" | "40P01" | "23505")) {
                return StoreError::Conflict;
            }
        }
        StoreError::Backend(e)
    }
}

/// Reads and writes available inside one atomic transaction.
///
/// Reads take the row lock the backend needs to serialize concurrent
/// transactions touching the same entity.
#[async_trait]
pub trait StoreTx: Send {
    async fn fetch_user(&mut self, id: i64) -> Result<Option<User>, StoreError>;

    /// Create transition. Fails with [`StoreError::Conflict`] if the row
    /// appeared since the (non-locking) absent read, so the retried body
    /// takes the refresh path instead of clobbering concurrent writes.
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError>;

    /// Update transition. Writes the mutable fields only; `referred_by`,
    /// `is_admin` and `created_at` are structurally untouchable here.
    async fn update_user(&mut self, user: &User) -> Result<(), StoreError>;

    /// Upsert-increment of `balance_subunits`, creating a near-empty row for
    /// an id that never logged in.
    async fn add_balance(&mut self, id: i64, delta: i64) -> Result<(), StoreError>;

    async fn fetch_request(&mut self, id: Uuid)
    -> Result<Option<WithdrawalRequest>, StoreError>;

    async fn insert_request(&mut self, request: &WithdrawalRequest) -> Result<(), StoreError>;

    /// Writes the decision fields (`status`, `decided_at`, `decided_by`).
    async fn update_request(&mut self, request: &WithdrawalRequest) -> Result<(), StoreError>;

    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError>;
}

/// Entry points the HTTP handlers depend on. Each transactional method opens
/// a transaction, runs the shared ledger/workflow body, commits, and retries
/// the whole body on [`StoreError::Conflict`].
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    /// Idempotent login: create on first call, refresh profile afterwards.
    async fn authenticate_user(
        &self,
        id: i64,
        profile: Profile,
        referred_by: Option<i64>,
    ) -> Result<User, LedgerError>;

    /// Plain (non-locking) read of a user row.
    async fn user(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn credit_for_ad(&self, id: i64) -> Result<AdCredit, LedgerError>;

    async fn create_withdrawal(
        &self,
        user_id: i64,
        amount_tokens: f64,
        binance_uid: String,
    ) -> Result<WithdrawalRequest, LedgerError>;

    async fn decide_withdrawal(
        &self,
        request_id: Uuid,
        decision: Decision,
        admin_id: i64,
    ) -> Result<(), LedgerError>;

    /// Snapshot of all pending withdrawal requests, order unspecified.
    async fn pending_withdrawals(&self) -> Result<Vec<WithdrawalRequest>, StoreError>;
}

/// Re-runs `op` while it fails with a retryable conflict, up to
/// [`TX_MAX_RETRIES`] extra attempts.
pub(crate) async fn with_retry<T, F, Fut>(op: F) -> Result<T, LedgerError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut attempts = 0;
    loop {
        match op().await {
            Err(LedgerError::Store(StoreError::Conflict)) if attempts < TX_MAX_RETRIES => {
                attempts += 1;
                tracing::debug!(attempts, "retrying conflicting transaction");
            }
            other => return other,
        }
    }
}
