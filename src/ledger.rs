//! User ledger: balance, ad counters and the daily UTC reset.
//!
//! Every function here is one transaction body, written once against
//! [`StoreTx`] and shared by all store implementations. Callers own the
//! transaction boundary; nothing here commits.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::{StoreError, StoreTx};
use crate::types::{AdCredit, Profile, User};
use crate::{DAILY_LIMIT, REFERRAL_BONUS_SUBUNITS, REWARD_PER_AD_SUBUNITS};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("user {0} not found")]
    UserNotFound(i64),
    #[error("daily ad limit reached")]
    DailyLimitReached,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("withdrawal amount below minimum")]
    MinimumNotMet,
    #[error("withdrawal request not found")]
    RequestNotFound,
    #[error("withdrawal request already decided")]
    AlreadyDecided,
    #[error("caller is not an admin")]
    NotAdmin,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Current UTC calendar date as `YYYY-MM-DD`.
pub fn today_stamp_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Idempotent login transition. A missing row becomes a fresh user carrying
/// `referred_by`; an existing row only gets its profile fields refreshed.
pub async fn get_or_create<T: StoreTx>(
    tx: &mut T,
    id: i64,
    profile: Profile,
    referred_by: Option<i64>,
    today: &str,
    now: DateTime<Utc>,
) -> Result<User, LedgerError> {
    match tx.fetch_user(id).await? {
        Some(mut user) => {
            user.refresh_profile(profile, now);
            tx.update_user(&user).await?;
            Ok(user)
        }
        None => {
            let user = User::new(id, profile, referred_by, today, now);
            tx.insert_user(&user).await?;
            Ok(user)
        }
    }
}

/// Credits one watched ad.
///
/// The stale-stamp reset, the limit check, the counter/balance increments and
/// the referral bonus all happen inside the caller's transaction, so two
/// concurrent calls for the same user serialize and the daily limit holds
/// exactly.
pub async fn credit_for_ad<T: StoreTx>(
    tx: &mut T,
    id: i64,
    today: &str,
    now: DateTime<Utc>,
) -> Result<AdCredit, LedgerError> {
    let mut user = tx
        .fetch_user(id)
        .await?
        .ok_or(LedgerError::UserNotFound(id))?;

    if user.today_stamp != today {
        user.today_ad_count = 0;
        user.today_stamp = today.to_owned();
    }
    if user.today_ad_count >= DAILY_LIMIT {
        return Err(LedgerError::DailyLimitReached);
    }

    user.today_ad_count += 1;
    user.lifetime_ad_count += 1;
    user.balance_subunits += REWARD_PER_AD_SUBUNITS;
    user.last_active_at = now;
    tx.update_user(&user).await?;

    if let Some(referrer) = user.referred_by {
        // Upsert: a referrer who never logged in still accrues the bonus.
        tx.add_balance(referrer, REFERRAL_BONUS_SUBUNITS).await?;
    }

    Ok(AdCredit {
        new_balance: user.balance_subunits,
        new_today_count: user.today_ad_count,
    })
}

/// Subtracts `amount` from the user's balance, failing before any write if
/// the funds are not there. Returns the updated row.
pub async fn debit<T: StoreTx>(tx: &mut T, id: i64, amount: i64) -> Result<User, LedgerError> {
    let mut user = tx
        .fetch_user(id)
        .await?
        .ok_or(LedgerError::UserNotFound(id))?;
    if user.balance_subunits < amount {
        return Err(LedgerError::InsufficientBalance);
    }
    user.balance_subunits -= amount;
    tx.update_user(&user).await?;
    Ok(user)
}

/// Adds `amount` to the user's balance. Used for refunds.
pub async fn credit<T: StoreTx>(tx: &mut T, id: i64, amount: i64) -> Result<(), LedgerError> {
    tx.add_balance(id, amount).await?;
    Ok(())
}
