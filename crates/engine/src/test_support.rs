//! Shared fixtures for engine tests

use chrono::Utc;
use sqlx::SqlitePool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turfpoint_core::{NewSpot, TransactionKind};
use turfpoint_persistence::sqlite as db;
use turfpoint_persistence::Database;

/// Route engine logs through the test harness; repeat calls are no-ops
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "turfpoint_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Fresh migrated in-memory database
pub async fn test_pool() -> SqlitePool {
    init_logging();
    let database = Database::connect_in_memory()
        .await
        .expect("in-memory database");
    database.pool().clone()
}

/// Registered user with a funded wallet and a reconciling ledger
pub async fn seed_user(pool: &SqlitePool, user_id: &str, balance: i64) {
    let now = Utc::now();
    let mut conn = pool.acquire().await.expect("connection");
    db::create_user(&mut conn, user_id, user_id, None, now)
        .await
        .expect("seed user");
    db::create_wallet(&mut conn, user_id, balance)
        .await
        .expect("seed wallet");
    if balance != 0 {
        db::log_transaction(
            &mut conn,
            user_id,
            balance,
            TransactionKind::Initial,
            "Starting balance",
            now,
        )
        .await
        .expect("seed ledger");
    }
}

/// Spot with a full budget; pass `None` for a game-seeded spot nobody
/// owns or collects tax on
pub async fn seed_spot(
    pool: &SqlitePool,
    creator: Option<&str>,
    budget: f64,
    rate_per_minute: f64,
    tax_rate: f64,
) -> i64 {
    let mut conn = pool.acquire().await.expect("connection");
    db::create_spot(
        &mut conn,
        &NewSpot {
            name: "Fountain".into(),
            latitude: 52.52,
            longitude: 13.405,
            budget,
            rate_per_minute,
            tax_rate,
        },
        creator,
        Utc::now(),
    )
    .await
    .expect("seed spot")
}

/// Open a visit directly, skipping check-in validation
pub async fn open_visit_for(pool: &SqlitePool, spot_id: i64, user_id: &str) -> i64 {
    let mut conn = pool.acquire().await.expect("connection");
    db::open_visit(&mut conn, spot_id, user_id, Utc::now())
        .await
        .expect("seed visit")
}
