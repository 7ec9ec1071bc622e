//! Database connection and initialization

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use turfpoint_core::{Error, Result};

/// Database wrapper for SQLite operations
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to database at the given path, creating if necessary
    pub async fn connect(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::DatabaseError(e.to_string()))?;
        }

        let path_str = path.to_string_lossy();
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path_str))
            .map_err(|e| Error::DatabaseError(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Connect to in-memory database (for testing).
    ///
    /// Limited to a single connection: every `:memory:` connection is
    /// its own empty database, so the pool must reuse one.
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                xp INTEGER NOT NULL DEFAULT 0,
                level INTEGER NOT NULL DEFAULT 1,
                push_token TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(username)
            );

            CREATE TABLE IF NOT EXISTS wallets (
                user_id TEXT PRIMARY KEY,
                balance INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (user_id) REFERENCES users(user_id)
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                amount INTEGER NOT NULL,
                kind TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(user_id)
            );

            CREATE TABLE IF NOT EXISTS spots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                creator_id TEXT,
                owner_id TEXT,
                total_points REAL NOT NULL,
                remaining_points REAL NOT NULL,
                rate_per_minute REAL NOT NULL,
                tax_rate REAL NOT NULL DEFAULT 0.0,
                activity INTEGER NOT NULL DEFAULT 0,
                level INTEGER NOT NULL DEFAULT 1,
                shield_until TIMESTAMP,
                boost_until TIMESTAMP,
                boost_tax_rate REAL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS visits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                spot_id INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                checked_in_at TIMESTAMP NOT NULL,
                checked_out_at TIMESTAMP,
                earned_points REAL NOT NULL DEFAULT 0.0,
                last_heartbeat_at TIMESTAMP NOT NULL,
                FOREIGN KEY (spot_id) REFERENCES spots(id),
                FOREIGN KEY (user_id) REFERENCES users(user_id)
            );

            CREATE TABLE IF NOT EXISTS weekly_spot_points (
                spot_id INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                week_start DATE NOT NULL,
                points INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (spot_id, user_id, week_start),
                FOREIGN KEY (spot_id) REFERENCES spots(id),
                FOREIGN KEY (user_id) REFERENCES users(user_id)
            );

            CREATE TABLE IF NOT EXISTS quests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                condition_type TEXT NOT NULL,
                threshold INTEGER NOT NULL,
                reward_points INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS user_quests (
                user_id TEXT NOT NULL,
                quest_id INTEGER NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'in_progress',
                completed_at TIMESTAMP,
                PRIMARY KEY (user_id, quest_id),
                FOREIGN KEY (user_id) REFERENCES users(user_id),
                FOREIGN KEY (quest_id) REFERENCES quests(id)
            );

            CREATE TABLE IF NOT EXISTS badges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL,
                threshold INTEGER NOT NULL,
                title TEXT NOT NULL,
                UNIQUE(category, threshold)
            );

            CREATE TABLE IF NOT EXISTS user_badges (
                user_id TEXT NOT NULL,
                badge_id INTEGER NOT NULL,
                unlocked_at TIMESTAMP NOT NULL,
                PRIMARY KEY (user_id, badge_id),
                FOREIGN KEY (user_id) REFERENCES users(user_id),
                FOREIGN KEY (badge_id) REFERENCES badges(id)
            );

            CREATE TABLE IF NOT EXISTS payments (
                intent_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                points INTEGER NOT NULL,
                consumed_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(user_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        // ── Indexes ────────────────────────────────────────────────────
        // One open visit per user; check-in closes the previous one first
        sqlx::query(
            r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_visits_user_open
               ON visits (user_id)
               WHERE checked_out_at IS NULL"#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_visits_spot ON visits (spot_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions (user_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
