use crate::database::{WalletStore, WalletTransaction};
use crate::errors::{Result, WalletServiceError};
use crate::metrics;
use crate::models::{OperationKind, OperationResult, OperationStatus, Wallet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Applies deposits and withdrawals to wallets.
///
/// Each operation runs in its own store transaction and serializes with
/// other operations on the same wallet through the store's row lock.
/// Operations on different wallets never wait on each other.
pub struct WalletService<S: WalletStore> {
    store: Arc<S>,
}

impl<S: WalletStore> WalletService<S> {
    pub fn new(store: Arc<S>) -> Self {
        WalletService { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Validate and apply one operation.
    ///
    /// Checks the amount, then the operation type, before touching storage.
    pub async fn process_operation(
        &self,
        wallet_id: Uuid,
        operation_type: &str,
        amount_cents: i64,
    ) -> Result<OperationResult> {
        if amount_cents <= 0 {
            metrics::record_rejection(operation_type, "invalid_amount");
            return Err(WalletServiceError::InvalidAmount);
        }

        let kind = operation_type.parse::<OperationKind>().map_err(|e| {
            metrics::record_rejection(operation_type, "invalid_operation_type");
            e
        })?;

        self.execute(wallet_id, kind, amount_cents).await
    }

    /// Apply an already-validated operation.
    pub async fn execute(
        &self,
        wallet_id: Uuid,
        kind: OperationKind,
        amount_cents: i64,
    ) -> Result<OperationResult> {
        if amount_cents <= 0 {
            return Err(WalletServiceError::InvalidAmount);
        }

        let started = Instant::now();
        let outcome = self.apply(wallet_id, kind, amount_cents).await;
        metrics::record_operation(kind, &outcome, started.elapsed());

        match &outcome {
            Ok(result) => info!(
                "{} of {} cents on wallet {} committed, balance {}",
                kind, amount_cents, wallet_id, result.balance_cents
            ),
            Err(WalletServiceError::InsufficientFunds(result)) => warn!(
                "{} of {} cents on wallet {} rejected: balance {}",
                kind, amount_cents, wallet_id, result.balance_cents
            ),
            Err(e) => error!(
                "{} of {} cents on wallet {} failed: {}",
                kind, amount_cents, wallet_id, e
            ),
        }

        outcome
    }

    async fn apply(
        &self,
        wallet_id: Uuid,
        kind: OperationKind,
        amount_cents: i64,
    ) -> Result<OperationResult> {
        // Dropping `tx` on any early return rolls it back.
        let mut tx = self.store.begin().await?;

        let wallet = Self::lock_or_create(&mut tx, wallet_id).await?;

        let new_balance = match kind {
            OperationKind::Deposit => wallet
                .balance
                .checked_add(amount_cents)
                .ok_or(WalletServiceError::InvalidAmount)?,
            OperationKind::Withdraw => {
                if wallet.balance < amount_cents {
                    // Also discards a wallet created above. A failed rollback
                    // still leaves nothing committed, so the rejection stands.
                    if let Err(e) = tx.rollback().await {
                        warn!("Rollback after rejected withdrawal on {} failed: {}", wallet_id, e);
                    }
                    return Err(WalletServiceError::InsufficientFunds(OperationResult {
                        wallet_id,
                        balance_cents: wallet.balance,
                        status: OperationStatus::InsufficientBalance,
                    }));
                }
                wallet.balance - amount_cents
            }
        };

        tx.update_balance(wallet_id, new_balance).await?;
        tx.commit().await?;

        Ok(OperationResult {
            wallet_id,
            balance_cents: new_balance,
            status: OperationStatus::Success,
        })
    }

    /// Lock the wallet row, creating a zero-balance wallet on first use.
    async fn lock_or_create(tx: &mut S::Transaction, wallet_id: Uuid) -> Result<Wallet> {
        match tx.get_for_update(wallet_id).await {
            Ok(wallet) => Ok(wallet),
            Err(WalletServiceError::WalletNotFound(_)) => {
                let wallet = Wallet::empty(wallet_id);
                match tx.create(&wallet).await {
                    Ok(()) => {
                        debug!("Created wallet {}", wallet_id);
                        Ok(wallet)
                    }
                    // A concurrent transaction created it first; its row is
                    // visible and lockable now.
                    Err(WalletServiceError::Conflict(_)) => tx.get_for_update(wallet_id).await,
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Current committed balance, without locking.
    pub async fn get_balance(&self, wallet_id: Uuid) -> Result<Wallet> {
        let outcome = self.store.get(wallet_id).await;
        metrics::record_balance_query(&outcome);
        outcome
    }
}
