//! Ad-reward ledger backend for a Telegram Mini App: watch ads, earn
//! tokens, withdraw once past the minimum — with the daily limit, balance
//! conservation and at-most-once decisions enforced inside single store
//! transactions.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod responses;
pub mod store;
pub mod types;
pub mod workflow;

use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};

pub use api::{AppState, init_router};
pub use config::Config;
pub use store::postgres::PgStore;

/// Subunits per displayed token.
pub const SUBUNITS_PER_TOKEN: i64 = 1000;
/// Reward for one watched ad (0.5 token).
pub const REWARD_PER_AD_SUBUNITS: i64 = 500;
/// Referrer's cut per watched ad: 10% of the reward, rounded.
pub const REFERRAL_BONUS_SUBUNITS: i64 = 50;
/// Maximum ads credited per user per UTC day.
pub const DAILY_LIMIT: i32 = 25;
/// Smallest withdrawable amount (100 tokens).
pub const MIN_WITHDRAW_SUBUNITS: i64 = 100 * SUBUNITS_PER_TOKEN;

/// Initializes the database pool.
pub async fn init_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await
        .context("Failed to connect to Postgres")?;
    Ok(pool)
}
