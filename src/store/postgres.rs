//! PostgreSQL store. Row locks (`SELECT ... FOR UPDATE`) serialize
//! concurrent transactions on the same entity; conflict aborts surface as
//! [`StoreError::Conflict`] and the entry points re-run the body.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use crate::ledger::{self, LedgerError};
use crate::store::{Store, StoreError, StoreTx, with_retry};
use crate::types::{AdCredit, AuditEntry, Decision, Profile, User, WithdrawalRequest};
use crate::workflow;

const USER_COLUMNS: &str = "id, display_name, username, photo_url, referred_by, \
     balance_subunits, today_ad_count, today_stamp, lifetime_ad_count, is_admin, \
     created_at, last_active_at";

const REQUEST_COLUMNS: &str = "id, user_id, amount_subunits, amount_tokens, binance_uid, \
     status, created_at, decided_at, decided_by";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.pool).await
    }

    async fn try_authenticate(
        &self,
        id: i64,
        profile: Profile,
        referred_by: Option<i64>,
    ) -> Result<User, LedgerError> {
        let mut tx = PgTx::begin(&self.pool).await?;
        let today = ledger::today_stamp_utc();
        let out = ledger::get_or_create(&mut tx, id, profile, referred_by, &today, Utc::now()).await;
        tx.finish(out).await
    }

    async fn try_credit_for_ad(&self, id: i64) -> Result<AdCredit, LedgerError> {
        let mut tx = PgTx::begin(&self.pool).await?;
        let today = ledger::today_stamp_utc();
        let out = ledger::credit_for_ad(&mut tx, id, &today, Utc::now()).await;
        tx.finish(out).await
    }

    async fn try_create_withdrawal(
        &self,
        user_id: i64,
        amount_tokens: f64,
        binance_uid: String,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let mut tx = PgTx::begin(&self.pool).await?;
        let out =
            workflow::create_request(&mut tx, user_id, amount_tokens, binance_uid, Utc::now())
                .await;
        tx.finish(out).await
    }

    async fn try_decide_withdrawal(
        &self,
        request_id: Uuid,
        decision: Decision,
        admin_id: i64,
    ) -> Result<(), LedgerError> {
        let mut tx = PgTx::begin(&self.pool).await?;
        let out = workflow::decide_request(&mut tx, request_id, decision, admin_id, Utc::now())
            .await;
        tx.finish(out).await
    }
}

#[async_trait]
impl Store for PgStore {
    async fn authenticate_user(
        &self,
        id: i64,
        profile: Profile,
        referred_by: Option<i64>,
    ) -> Result<User, LedgerError> {
        with_retry(|| self.try_authenticate(id, profile.clone(), referred_by)).await
    }

    async fn user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn credit_for_ad(&self, id: i64) -> Result<AdCredit, LedgerError> {
        with_retry(|| self.try_credit_for_ad(id)).await
    }

    async fn create_withdrawal(
        &self,
        user_id: i64,
        amount_tokens: f64,
        binance_uid: String,
    ) -> Result<WithdrawalRequest, LedgerError> {
        with_retry(|| self.try_create_withdrawal(user_id, amount_tokens, binance_uid.clone()))
            .await
    }

    async fn decide_withdrawal(
        &self,
        request_id: Uuid,
        decision: Decision,
        admin_id: i64,
    ) -> Result<(), LedgerError> {
        with_retry(|| self.try_decide_withdrawal(request_id, decision, admin_id)).await
    }

    async fn pending_withdrawals(&self) -> Result<Vec<WithdrawalRequest>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM withdrawal_requests WHERE status = 'pending'"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(request_from_row).collect()
    }
}

/// One open Postgres transaction.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    pub async fn begin(pool: &PgPool) -> Result<Self, StoreError> {
        Ok(Self {
            tx: pool.begin().await?,
        })
    }

    /// Commits on success, rolls back on error. A conflicting commit maps to
    /// the retryable conflict error like any other conflict abort.
    pub async fn finish<T>(self, out: Result<T, LedgerError>) -> Result<T, LedgerError> {
        match out {
            Ok(value) => {
                self.tx.commit().await.map_err(StoreError::from)?;
                Ok(value)
            }
            Err(e) => {
                let _ = self.tx.rollback().await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn fetch_user(&mut self, id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(self.tx.as_mut())
        .await?;
        Ok(user)
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        // Zero rows affected: the row appeared concurrently (login race or a
        // referral upsert). The retried body takes the refresh path.
        let result = sqlx::query(
            "INSERT INTO users (id, display_name, username, photo_url, referred_by, \
               balance_subunits, today_ad_count, today_stamp, lifetime_ad_count, is_admin, \
               created_at, last_active_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(user.id)
        .bind(&user.display_name)
        .bind(&user.username)
        .bind(&user.photo_url)
        .bind(user.referred_by)
        .bind(user.balance_subunits)
        .bind(user.today_ad_count)
        .bind(&user.today_stamp)
        .bind(user.lifetime_ad_count)
        .bind(user.is_admin)
        .bind(user.created_at)
        .bind(user.last_active_at)
        .execute(self.tx.as_mut())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    async fn update_user(&mut self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET \
               display_name = $2, \
               username = $3, \
               photo_url = $4, \
               balance_subunits = $5, \
               today_ad_count = $6, \
               today_stamp = $7, \
               lifetime_ad_count = $8, \
               last_active_at = $9 \
             WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.display_name)
        .bind(&user.username)
        .bind(&user.photo_url)
        .bind(user.balance_subunits)
        .bind(user.today_ad_count)
        .bind(&user.today_stamp)
        .bind(user.lifetime_ad_count)
        .bind(user.last_active_at)
        .execute(self.tx.as_mut())
        .await?;
        Ok(())
    }

    async fn add_balance(&mut self, id: i64, delta: i64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (id, balance_subunits) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE \
               SET balance_subunits = users.balance_subunits + EXCLUDED.balance_subunits",
        )
        .bind(id)
        .bind(delta)
        .execute(self.tx.as_mut())
        .await?;
        Ok(())
    }

    async fn fetch_request(
        &mut self,
        id: Uuid,
    ) -> Result<Option<WithdrawalRequest>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM withdrawal_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(self.tx.as_mut())
        .await?;
        row.as_ref().map(request_from_row).transpose()
    }

    async fn insert_request(&mut self, request: &WithdrawalRequest) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO withdrawal_requests (id, user_id, amount_subunits, amount_tokens, \
               binance_uid, status, created_at, decided_at, decided_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(request.id)
        .bind(request.user_id)
        .bind(request.amount_subunits)
        .bind(request.amount_tokens)
        .bind(&request.binance_uid)
        .bind(request.status.as_str())
        .bind(request.created_at)
        .bind(request.decided_at)
        .bind(request.decided_by)
        .execute(self.tx.as_mut())
        .await?;
        Ok(())
    }

    async fn update_request(&mut self, request: &WithdrawalRequest) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE withdrawal_requests SET status = $2, decided_at = $3, decided_by = $4 \
             WHERE id = $1",
        )
        .bind(request.id)
        .bind(request.status.as_str())
        .bind(request.decided_at)
        .bind(request.decided_by)
        .execute(self.tx.as_mut())
        .await?;
        Ok(())
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO admin_audit (id, action, actor_id, request_id, decision, at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.id)
        .bind(&entry.action)
        .bind(entry.actor_id)
        .bind(entry.request_id)
        .bind(&entry.decision)
        .bind(entry.at)
        .execute(self.tx.as_mut())
        .await?;
        Ok(())
    }
}

fn request_from_row(row: &PgRow) -> Result<WithdrawalRequest, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(WithdrawalRequest {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        amount_subunits: row.try_get("amount_subunits")?,
        amount_tokens: row.try_get("amount_tokens")?,
        binance_uid: row.try_get("binance_uid")?,
        status: crate::types::WithdrawalStatus::parse(&status)
            .ok_or_else(|| StoreError::Malformed(format!("withdrawal status {status:?}")))?,
        created_at: row.try_get("created_at")?,
        decided_at: row.try_get("decided_at")?,
        decided_by: row.try_get("decided_by")?,
    })
}
