use crate::database::{WalletStore, WalletTransaction};
use crate::errors::{Result, WalletServiceError};
use crate::models::Wallet;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

/// In-process wallet store with the same locking semantics as the
/// PostgreSQL backend: one exclusive row lock per wallet id, held until the
/// owning transaction commits, rolls back or is dropped.
#[derive(Clone, Default)]
pub struct InMemoryWalletStore {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    wallets: RwLock<HashMap<Uuid, i64>>,
    row_locks: Mutex<HashMap<Uuid, Arc<RowLock<()>>>>,
    fail_commits: AtomicBool,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail until switched off again.
    pub fn set_fail_commits(&self, fail: bool) {
        self.shared.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of committed wallets
    pub fn len(&self) -> usize {
        self.shared.wallets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        Ok(InMemoryTransaction {
            shared: self.shared.clone(),
            held: HashMap::new(),
            staged: HashMap::new(),
        })
    }

    async fn get(&self, wallet_id: Uuid) -> Result<Wallet> {
        self.shared
            .wallets
            .read()
            .get(&wallet_id)
            .map(|&balance| Wallet { wallet_id, balance })
            .ok_or(WalletServiceError::WalletNotFound(wallet_id))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    held: HashMap<Uuid, OwnedMutexGuard<()>>,
    staged: HashMap<Uuid, i64>,
}

impl InMemoryTransaction {
    /// Blocks until no other transaction holds the row.
    async fn lock_row(&mut self, wallet_id: Uuid) {
        if self.held.contains_key(&wallet_id) {
            return;
        }

        let lock = self.shared.row_locks.lock().entry(wallet_id).or_default().clone();
        let guard = lock.lock_owned().await;
        self.held.insert(wallet_id, guard);
    }

    fn current_balance(&self, wallet_id: Uuid) -> Option<i64> {
        self.staged
            .get(&wallet_id)
            .copied()
            .or_else(|| self.shared.wallets.read().get(&wallet_id).copied())
    }
}

impl Drop for InMemoryTransaction {
    /// Releases the row guards and forgets locks nobody else references.
    /// Waiters hold a clone of the lock, so their entries survive.
    fn drop(&mut self) {
        let ids: Vec<Uuid> = self.held.keys().copied().collect();
        self.held.clear();

        let mut locks = self.shared.row_locks.lock();
        for id in ids {
            if locks.get(&id).map_or(false, |lock| Arc::strong_count(lock) == 1) {
                locks.remove(&id);
            }
        }
    }
}

#[async_trait]
impl WalletTransaction for InMemoryTransaction {
    async fn get_for_update(&mut self, wallet_id: Uuid) -> Result<Wallet> {
        self.lock_row(wallet_id).await;

        self.current_balance(wallet_id)
            .map(|balance| Wallet { wallet_id, balance })
            .ok_or(WalletServiceError::WalletNotFound(wallet_id))
    }

    async fn create(&mut self, wallet: &Wallet) -> Result<()> {
        self.lock_row(wallet.wallet_id).await;

        if self.current_balance(wallet.wallet_id).is_some() {
            return Err(WalletServiceError::Conflict(wallet.wallet_id));
        }

        self.staged.insert(wallet.wallet_id, wallet.balance);
        Ok(())
    }

    async fn update_balance(&mut self, wallet_id: Uuid, balance: i64) -> Result<()> {
        self.lock_row(wallet_id).await;

        if self.current_balance(wallet_id).is_none() {
            return Err(WalletServiceError::WalletNotFound(wallet_id));
        }

        self.staged.insert(wallet_id, balance);
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        if self.shared.fail_commits.load(Ordering::SeqCst) {
            warn!("Simulated commit failure, discarding {} staged writes", self.staged.len());
            return Err(WalletServiceError::Persistence(
                "simulated commit failure".to_string(),
            ));
        }

        let staged = std::mem::take(&mut self.staged);
        self.shared.wallets.write().extend(staged);
        // Row locks are released when `self` drops, after the writes land.
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        debug!(
            "Rolling back in-memory transaction ({} staged writes)",
            self.staged.len()
        );
        Ok(())
    }
}
