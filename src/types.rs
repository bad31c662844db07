use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A Telegram account together with its reward balance and ad counters.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    /// Telegram user id, used as the primary key.
    pub id: i64,
    pub display_name: String,
    pub username: Option<String>,
    pub photo_url: Option<String>,
    /// Referrer id, set at first login and never overwritten.
    pub referred_by: Option<i64>,
    /// Balance in subunits (1000 subunits = 1 token). Never negative.
    pub balance_subunits: i64,
    /// Ads credited during `today_stamp`.
    pub today_ad_count: i32,
    /// UTC date (`YYYY-MM-DD`) the daily counter is valid for.
    pub today_stamp: String,
    pub lifetime_ad_count: i64,
    /// Admin capability flag, set out-of-band only.
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

/// Mutable profile fields refreshed on every login. Counters, balance and
/// `referred_by` are deliberately absent so a refresh cannot touch them.
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub display_name: String,
    pub username: Option<String>,
    pub photo_url: Option<String>,
}

impl User {
    /// First-login transition: zero counters, referrer fixed for good.
    pub fn new(
        id: i64,
        profile: Profile,
        referred_by: Option<i64>,
        today: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            display_name: profile.display_name,
            username: profile.username,
            photo_url: profile.photo_url,
            referred_by,
            balance_subunits: 0,
            today_ad_count: 0,
            today_stamp: today.to_owned(),
            lifetime_ad_count: 0,
            is_admin: false,
            created_at: now,
            last_active_at: now,
        }
    }

    /// Repeat-login transition: profile fields are last-write-wins.
    pub fn refresh_profile(&mut self, profile: Profile, now: DateTime<Utc>) {
        self.display_name = profile.display_name;
        self.username = profile.username;
        self.photo_url = profile.photo_url;
        self.last_active_at = now;
    }
}

/// Lifecycle state of a withdrawal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WithdrawalStatus::Pending),
            "approved" => Some(WithdrawalStatus::Approved),
            "rejected" => Some(WithdrawalStatus::Rejected),
            _ => None,
        }
    }
}

/// An admin's verdict on a pending withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(Decision::Approved),
            "rejected" => Some(Decision::Rejected),
            _ => None,
        }
    }

    pub fn into_status(self) -> WithdrawalStatus {
        match self {
            Decision::Approved => WithdrawalStatus::Approved,
            Decision::Rejected => WithdrawalStatus::Rejected,
        }
    }
}

/// A withdrawal attempt. The owning user's balance is debited when the
/// request is created and refunded exactly once if it is later rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub user_id: i64,
    pub amount_subunits: i64,
    pub amount_tokens: f64,
    #[serde(rename = "binanceUID")]
    pub binance_uid: String,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<i64>,
}

/// Append-only record of an admin decision. Written in the deciding
/// transaction, never read back by the service.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,
    pub actor_id: i64,
    pub request_id: Uuid,
    pub decision: String,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn decision(
        request: &WithdrawalRequest,
        actor_id: i64,
        decision: Decision,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: "decide_withdraw".to_owned(),
            actor_id,
            request_id: request.id,
            decision: decision.as_str().to_owned(),
            at,
        }
    }
}

/// Outcome of a successful ad credit.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdCredit {
    pub new_balance: i64,
    pub new_today_count: i32,
}
