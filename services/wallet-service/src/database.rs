use crate::errors::{Result, WalletServiceError};
use crate::models::Wallet;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Persistent wallet storage.
///
/// Balance mutations go through a [`WalletTransaction`]; `get` is a plain
/// point read with no locking. One store instance is built at startup and
/// shared by every request.
#[async_trait]
pub trait WalletStore: Send + Sync + 'static {
    type Transaction: WalletTransaction;

    /// Open a transaction. Fails with `StoreUnavailable`.
    async fn begin(&self) -> Result<Self::Transaction>;

    /// Non-transactional read. Fails with `WalletNotFound`.
    async fn get(&self, wallet_id: Uuid) -> Result<Wallet>;

    /// Short backend name reported by the health endpoint.
    fn backend(&self) -> &'static str;
}

/// A single open transaction against a [`WalletStore`].
///
/// `commit` and `rollback` consume the handle. A handle dropped without
/// being committed is rolled back, so every early return and every
/// cancelled request releases its row locks and discards its writes.
#[async_trait]
pub trait WalletTransaction: Send {
    /// Read the wallet and hold an exclusive lock on it until the
    /// transaction ends. Fails with `WalletNotFound`.
    async fn get_for_update(&mut self, wallet_id: Uuid) -> Result<Wallet>;

    /// Insert a new wallet. Fails with `Conflict` if the id exists.
    async fn create(&mut self, wallet: &Wallet) -> Result<()>;

    /// Fails with `WalletNotFound`.
    async fn update_balance(&mut self, wallet_id: Uuid, balance: i64) -> Result<()>;

    /// Fails with `Persistence`; the caller must assume nothing was written.
    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// PostgreSQL backend
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout_secs: u64,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| WalletServiceError::StoreUnavailable(e.to_string()))?;

        Ok(Database { pool })
    }

    /// Apply the bundled schema migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl WalletStore for Database {
    type Transaction = PgWalletTransaction;

    async fn begin(&self) -> Result<PgWalletTransaction> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| WalletServiceError::StoreUnavailable(e.to_string()))?;

        Ok(PgWalletTransaction { tx })
    }

    async fn get(&self, wallet_id: Uuid) -> Result<Wallet> {
        sqlx::query_as::<_, Wallet>(
            r#"
            SELECT wallet_id, balance
            FROM wallets
            WHERE wallet_id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(WalletServiceError::WalletNotFound(wallet_id))
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

/// Open PostgreSQL transaction. sqlx rolls it back on drop.
pub struct PgWalletTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl WalletTransaction for PgWalletTransaction {
    async fn get_for_update(&mut self, wallet_id: Uuid) -> Result<Wallet> {
        sqlx::query_as::<_, Wallet>(
            r#"
            SELECT wallet_id, balance
            FROM wallets
            WHERE wallet_id = $1
            FOR UPDATE
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(WalletServiceError::WalletNotFound(wallet_id))
    }

    async fn create(&mut self, wallet: &Wallet) -> Result<()> {
        // ON CONFLICT keeps the transaction usable when a concurrent
        // transaction inserted the same id first.
        let result = sqlx::query(
            r#"
            INSERT INTO wallets (wallet_id, balance)
            VALUES ($1, $2)
            ON CONFLICT (wallet_id) DO NOTHING
            "#,
        )
        .bind(wallet.wallet_id)
        .bind(wallet.balance)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WalletServiceError::Conflict(wallet.wallet_id));
        }

        Ok(())
    }

    async fn update_balance(&mut self, wallet_id: Uuid, balance: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = $1
            WHERE wallet_id = $2
            "#,
        )
        .bind(balance)
        .bind(wallet_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WalletServiceError::WalletNotFound(wallet_id));
        }

        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| WalletServiceError::Persistence(e.to_string()))
    }

    async fn rollback(self) -> Result<()> {
        debug!("Rolling back wallet transaction");
        self.tx.rollback().await?;
        Ok(())
    }
}
