//! Accounts - registration, wallet funding, purchase crediting
//!
//! Identity comes from outside; this module owns what happens once a
//! trusted user id shows up: the one-time starting grant, the ledger,
//! and turning payment intents into points exactly once.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, instrument};
use turfpoint_core::{Error, Result, Transaction, TransactionKind, User};
use turfpoint_persistence::sqlite as db;

use crate::external::{PaymentGateway, PaymentIntentStatus};

/// Tuning for account lifecycle
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Wallet grant on registration. Example: 500
    pub starting_balance: i64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            starting_balance: 500,
        }
    }
}

/// Registers users and keeps their wallets honest
pub struct AccountManager {
    pool: SqlitePool,
    config: AccountConfig,
    gateway: Arc<dyn PaymentGateway>,
}

impl AccountManager {
    pub fn new(pool: SqlitePool, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self::with_config(pool, gateway, AccountConfig::default())
    }

    pub fn with_config(
        pool: SqlitePool,
        gateway: Arc<dyn PaymentGateway>,
        config: AccountConfig,
    ) -> Self {
        Self {
            pool,
            config,
            gateway,
        }
    }

    /// Register a user and fund their wallet with the starting grant.
    ///
    /// The user row, the wallet, and the `initial` ledger entry commit
    /// together; a taken id or username rejects with no partial rows.
    #[instrument(skip(self, push_token))]
    pub async fn register(
        &self,
        user_id: &str,
        username: &str,
        push_token: Option<&str>,
    ) -> Result<User> {
        if user_id.trim().is_empty() || username.trim().is_empty() {
            return Err(Error::InvalidData(
                "user id and username must not be empty".into(),
            ));
        }

        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        if db::get_user(&mut *tx, user_id).await?.is_some() {
            return Err(Error::AlreadyRegistered(user_id.to_string()));
        }
        if db::username_taken(&mut *tx, username).await? {
            return Err(Error::AlreadyRegistered(username.to_string()));
        }

        db::create_user(&mut *tx, user_id, username, push_token, now).await?;
        db::create_wallet(&mut *tx, user_id, self.config.starting_balance).await?;
        db::log_transaction(
            &mut *tx,
            user_id,
            self.config.starting_balance,
            TransactionKind::Initial,
            "Starting balance",
            now,
        )
        .await?;

        let user = db::get_user(&mut *tx, user_id)
            .await?
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        info!(
            "Registered {} ('{}') with {} starting points",
            user_id, username, self.config.starting_balance
        );
        Ok(user)
    }

    /// Credit a succeeded payment intent, at most once ever.
    ///
    /// The gateway is asked outside the transaction; the unique intent
    /// row inside it is what makes retries and races safe.
    #[instrument(skip(self))]
    pub async fn purchase_points(&self, user_id: &str, intent_id: &str) -> Result<i64> {
        let status = self.gateway.intent_status(intent_id).await?;
        let points = match status {
            PaymentIntentStatus::Succeeded { points } => points,
            PaymentIntentStatus::Pending | PaymentIntentStatus::Failed => {
                return Err(Error::PaymentNotSucceeded(intent_id.to_string()));
            }
        };
        if points <= 0 {
            return Err(Error::InvalidData(format!(
                "payment intent '{intent_id}' bought no points"
            )));
        }

        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        if db::get_user(&mut *tx, user_id).await?.is_none() {
            return Err(Error::UserNotFound(user_id.to_string()));
        }
        if !db::consume_intent(&mut *tx, intent_id, user_id, points, now).await? {
            return Err(Error::PaymentAlreadyConsumed(intent_id.to_string()));
        }

        db::credit_wallet(&mut *tx, user_id, points).await?;
        db::log_transaction(
            &mut *tx,
            user_id,
            points,
            TransactionKind::Earn,
            &format!("Point purchase ({intent_id})"),
            now,
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        info!("Credited {} points to {} from intent {}", points, user_id, intent_id);
        Ok(points)
    }

    /// Current wallet balance
    pub async fn balance(&self, user_id: &str) -> Result<i64> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;
        db::get_balance(&mut conn, user_id)
            .await?
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))
    }

    /// Ledger page, newest first
    pub async fn history(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Transaction>> {
        db::list_transactions(&self.pool, user_id, limit, offset).await
    }
}
