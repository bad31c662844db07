//! In-memory store. A transaction clones the state behind the mutex, runs
//! the shared body against the clone, and writes it back only on success, so
//! a failed operation leaves nothing behind. Holding the lock for the whole
//! body gives the same serialization the Postgres row locks do.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ledger::{self, LedgerError};
use crate::store::{Store, StoreError, StoreTx};
use crate::types::{
    AdCredit, AuditEntry, Decision, Profile, User, WithdrawalRequest, WithdrawalStatus,
};
use crate::workflow;

#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<MemInner>>,
}

#[derive(Clone, Default)]
struct MemInner {
    users: HashMap<i64, User>,
    requests: HashMap<Uuid, WithdrawalRequest>,
    audit: Vec<AuditEntry>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops a user row in directly, bypassing the login transition. Test
    /// seam for counters and stamps `authenticate_user` cannot produce.
    pub async fn seed_user(&self, user: User) {
        self.inner.lock().await.users.insert(user.id, user);
    }

    /// Copy of the audit log, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().await.audit.clone()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn authenticate_user(
        &self,
        id: i64,
        profile: Profile,
        referred_by: Option<i64>,
    ) -> Result<User, LedgerError> {
        let mut guard = self.inner.lock().await;
        let mut staged = guard.clone();
        let today = ledger::today_stamp_utc();
        let user = ledger::get_or_create(
            &mut MemTx(&mut staged),
            id,
            profile,
            referred_by,
            &today,
            Utc::now(),
        )
        .await?;
        *guard = staged;
        Ok(user)
    }

    async fn user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn credit_for_ad(&self, id: i64) -> Result<AdCredit, LedgerError> {
        let mut guard = self.inner.lock().await;
        let mut staged = guard.clone();
        let today = ledger::today_stamp_utc();
        let credit =
            ledger::credit_for_ad(&mut MemTx(&mut staged), id, &today, Utc::now()).await?;
        *guard = staged;
        Ok(credit)
    }

    async fn create_withdrawal(
        &self,
        user_id: i64,
        amount_tokens: f64,
        binance_uid: String,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let mut guard = self.inner.lock().await;
        let mut staged = guard.clone();
        let request = workflow::create_request(
            &mut MemTx(&mut staged),
            user_id,
            amount_tokens,
            binance_uid,
            Utc::now(),
        )
        .await?;
        *guard = staged;
        Ok(request)
    }

    async fn decide_withdrawal(
        &self,
        request_id: Uuid,
        decision: Decision,
        admin_id: i64,
    ) -> Result<(), LedgerError> {
        let mut guard = self.inner.lock().await;
        let mut staged = guard.clone();
        workflow::decide_request(
            &mut MemTx(&mut staged),
            request_id,
            decision,
            admin_id,
            Utc::now(),
        )
        .await?;
        *guard = staged;
        Ok(())
    }

    async fn pending_withdrawals(&self) -> Result<Vec<WithdrawalRequest>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .requests
            .values()
            .filter(|r| r.status == WithdrawalStatus::Pending)
            .cloned()
            .collect())
    }
}

/// Transaction handle over the staged copy of the state.
struct MemTx<'a>(&'a mut MemInner);

#[async_trait]
impl StoreTx for MemTx<'_> {
    async fn fetch_user(&mut self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.0.users.get(&id).cloned())
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        if self.0.users.contains_key(&user.id) {
            return Err(StoreError::Conflict);
        }
        self.0.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&mut self, user: &User) -> Result<(), StoreError> {
        if let Some(existing) = self.0.users.get_mut(&user.id) {
            existing.display_name = user.display_name.clone();
            existing.username = user.username.clone();
            existing.photo_url = user.photo_url.clone();
            existing.balance_subunits = user.balance_subunits;
            existing.today_ad_count = user.today_ad_count;
            existing.today_stamp = user.today_stamp.clone();
            existing.lifetime_ad_count = user.lifetime_ad_count;
            existing.last_active_at = user.last_active_at;
        }
        Ok(())
    }

    async fn add_balance(&mut self, id: i64, delta: i64) -> Result<(), StoreError> {
        let now = Utc::now();
        let entry = self.0.users.entry(id).or_insert_with(|| User {
            id,
            display_name: String::new(),
            username: None,
            photo_url: None,
            referred_by: None,
            balance_subunits: 0,
            today_ad_count: 0,
            today_stamp: String::new(),
            lifetime_ad_count: 0,
            is_admin: false,
            created_at: now,
            last_active_at: now,
        });
        entry.balance_subunits += delta;
        Ok(())
    }

    async fn fetch_request(
        &mut self,
        id: Uuid,
    ) -> Result<Option<WithdrawalRequest>, StoreError> {
        Ok(self.0.requests.get(&id).cloned())
    }

    async fn insert_request(&mut self, request: &WithdrawalRequest) -> Result<(), StoreError> {
        self.0.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn update_request(&mut self, request: &WithdrawalRequest) -> Result<(), StoreError> {
        if let Some(existing) = self.0.requests.get_mut(&request.id) {
            existing.status = request.status;
            existing.decided_at = request.decided_at;
            existing.decided_by = request.decided_by;
        }
        Ok(())
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.0.audit.push(entry.clone());
        Ok(())
    }
}
