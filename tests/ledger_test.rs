//! Ledger properties: daily limit, UTC reset, referral bonus, login
//! idempotency. Runs against the in-memory store; the transaction bodies are
//! the same ones the Postgres store executes.

use adgram_ledger::ledger::{self, LedgerError};
use adgram_ledger::store::Store;
use adgram_ledger::store::memory::MemStore;
use adgram_ledger::types::{Profile, User};
use adgram_ledger::{DAILY_LIMIT, REFERRAL_BONUS_SUBUNITS, REWARD_PER_AD_SUBUNITS};

fn profile(name: &str) -> Profile {
    Profile {
        display_name: name.to_owned(),
        username: None,
        photo_url: None,
    }
}

async fn login(store: &MemStore, id: i64, referrer: Option<i64>) -> User {
    store
        .authenticate_user(id, profile("user"), referrer)
        .await
        .unwrap()
}

#[tokio::test]
async fn credits_accrue_until_daily_limit() {
    let store = MemStore::new();
    login(&store, 1, None).await;

    for n in 1..=DAILY_LIMIT {
        let credit = store.credit_for_ad(1).await.unwrap();
        assert_eq!(credit.new_today_count, n);
        assert_eq!(credit.new_balance, n as i64 * REWARD_PER_AD_SUBUNITS);
    }

    let err = store.credit_for_ad(1).await.unwrap_err();
    assert!(matches!(err, LedgerError::DailyLimitReached));

    // The failed credit left nothing behind.
    let user = store.user(1).await.unwrap().unwrap();
    assert_eq!(user.today_ad_count, DAILY_LIMIT);
    assert_eq!(
        user.balance_subunits,
        DAILY_LIMIT as i64 * REWARD_PER_AD_SUBUNITS
    );
    assert_eq!(user.lifetime_ad_count, DAILY_LIMIT as i64);
}

#[tokio::test]
async fn stale_stamp_resets_counter_before_the_limit_check() {
    let store = MemStore::new();
    login(&store, 1, None).await;

    let mut user = store.user(1).await.unwrap().unwrap();
    user.today_ad_count = DAILY_LIMIT;
    user.today_stamp = "2000-01-01".to_owned();
    user.lifetime_ad_count = 200;
    store.seed_user(user).await;

    // Maxed out yesterday, but the first credit of a new day succeeds.
    let credit = store.credit_for_ad(1).await.unwrap();
    assert_eq!(credit.new_today_count, 1);

    let user = store.user(1).await.unwrap().unwrap();
    assert_eq!(user.today_stamp, ledger::today_stamp_utc());
    assert_eq!(user.lifetime_ad_count, 201);
}

#[tokio::test]
async fn referred_user_pays_out_the_referrer() {
    let store = MemStore::new();
    login(&store, 10, None).await;
    login(&store, 11, Some(10)).await;

    for _ in 0..3 {
        store.credit_for_ad(11).await.unwrap();
    }

    let watcher = store.user(11).await.unwrap().unwrap();
    let referrer = store.user(10).await.unwrap().unwrap();
    assert_eq!(watcher.balance_subunits, 3 * REWARD_PER_AD_SUBUNITS);
    assert_eq!(referrer.balance_subunits, 3 * REFERRAL_BONUS_SUBUNITS);
    assert_eq!(referrer.today_ad_count, 0);
}

#[tokio::test]
async fn bonus_for_unknown_referrer_creates_a_near_empty_row() {
    let store = MemStore::new();
    login(&store, 5, Some(999)).await;

    store.credit_for_ad(5).await.unwrap();

    let ghost = store.user(999).await.unwrap().unwrap();
    assert_eq!(ghost.balance_subunits, REFERRAL_BONUS_SUBUNITS);
    assert_eq!(ghost.display_name, "");
    assert_eq!(ghost.lifetime_ad_count, 0);
}

#[tokio::test]
async fn relogin_refreshes_profile_but_nothing_else() {
    let store = MemStore::new();
    login(&store, 1, Some(2)).await;
    store.credit_for_ad(1).await.unwrap();

    // Second login with a new name and a different referrer.
    let user = store
        .authenticate_user(1, profile("renamed"), Some(3))
        .await
        .unwrap();

    assert_eq!(user.display_name, "renamed");
    assert_eq!(user.referred_by, Some(2));
    assert_eq!(user.balance_subunits, REWARD_PER_AD_SUBUNITS);
    assert_eq!(user.today_ad_count, 1);
    assert_eq!(user.lifetime_ad_count, 1);
}

#[tokio::test]
async fn concurrent_credits_at_the_edge_admit_exactly_one() {
    let store = MemStore::new();
    login(&store, 1, None).await;

    let mut user = store.user(1).await.unwrap().unwrap();
    user.today_ad_count = DAILY_LIMIT - 1;
    user.today_stamp = ledger::today_stamp_utc();
    store.seed_user(user).await;

    let (a, b) = tokio::join!(store.credit_for_ad(1), store.credit_for_ad(1));

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    for result in [a, b] {
        if let Err(err) = result {
            assert!(matches!(err, LedgerError::DailyLimitReached));
        }
    }

    let user = store.user(1).await.unwrap().unwrap();
    assert_eq!(user.today_ad_count, DAILY_LIMIT);
}

#[tokio::test]
async fn crediting_an_unknown_user_fails() {
    let store = MemStore::new();
    let err = store.credit_for_ad(42).await.unwrap_err();
    assert!(matches!(err, LedgerError::UserNotFound(42)));
}
