//! Withdrawal lifecycle: `pending -> approved | rejected`, debit on create,
//! refund on reject, one audit entry per decision. Like the ledger, each
//! function is a transaction body over [`StoreTx`].

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ledger::{self, LedgerError};
use crate::store::{Store, StoreTx};
use crate::types::{AuditEntry, Decision, WithdrawalRequest, WithdrawalStatus};
use crate::{MIN_WITHDRAW_SUBUNITS, SUBUNITS_PER_TOKEN};

/// Integer subunits for a displayed token amount, truncating fractions.
pub fn subunits_from_tokens(amount_tokens: f64) -> i64 {
    (amount_tokens * SUBUNITS_PER_TOKEN as f64).floor() as i64
}

/// Creates a pending request and debits the held amount in the same
/// transaction; both commit together or neither does.
pub async fn create_request<T: StoreTx>(
    tx: &mut T,
    user_id: i64,
    amount_tokens: f64,
    binance_uid: String,
    now: DateTime<Utc>,
) -> Result<WithdrawalRequest, LedgerError> {
    let amount_subunits = subunits_from_tokens(amount_tokens);
    if amount_subunits < MIN_WITHDRAW_SUBUNITS {
        return Err(LedgerError::MinimumNotMet);
    }

    ledger::debit(tx, user_id, amount_subunits).await?;

    let request = WithdrawalRequest {
        id: Uuid::new_v4(),
        user_id,
        amount_subunits,
        amount_tokens,
        binance_uid,
        status: WithdrawalStatus::Pending,
        created_at: now,
        decided_at: None,
        decided_by: None,
    };
    tx.insert_request(&request).await?;
    Ok(request)
}

/// Moves a pending request to its terminal state. Rejection refunds the held
/// amount; a second decision on the same request fails without touching
/// balances.
pub async fn decide_request<T: StoreTx>(
    tx: &mut T,
    request_id: Uuid,
    decision: Decision,
    admin_id: i64,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    let mut request = tx
        .fetch_request(request_id)
        .await?
        .ok_or(LedgerError::RequestNotFound)?;
    if request.status != WithdrawalStatus::Pending {
        return Err(LedgerError::AlreadyDecided);
    }

    request.status = decision.into_status();
    request.decided_at = Some(now);
    request.decided_by = Some(admin_id);
    tx.update_request(&request).await?;

    if decision == Decision::Rejected {
        ledger::credit(tx, request.user_id, request.amount_subunits).await?;
    }

    tx.append_audit(&AuditEntry::decision(&request, admin_id, decision, now))
        .await?;
    Ok(())
}

/// Admin gate. Fails closed: a missing user row is not an admin.
pub async fn ensure_admin<S: Store>(store: &S, caller_id: i64) -> Result<(), LedgerError> {
    match store.user(caller_id).await? {
        Some(user) if user.is_admin => Ok(()),
        _ => Err(LedgerError::NotAdmin),
    }
}
