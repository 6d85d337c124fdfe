use crate::domain::money::Balance;
use crate::domain::ports::{TransactionStoreRef, WalletStoreRef};
use crate::domain::transaction::{Transaction, TransactionKind};
use crate::domain::wallet::{OwnerId, Wallet};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Durable, transactional view over wallets and their transaction log.
///
/// Every balance mutation in the system passes through [`LedgerService::append`];
/// no other component writes a wallet balance. Mutations are serialized per
/// wallet so concurrent debits and credits never interleave into a lost
/// update.
pub struct LedgerService {
    wallets: WalletStoreRef,
    transactions: TransactionStoreRef,
    // One async mutex per owner; the registry itself is touched only long
    // enough to clone the owner's lock handle.
    locks: Mutex<HashMap<OwnerId, Arc<Mutex<()>>>>,
}

impl LedgerService {
    pub fn new(wallets: WalletStoreRef, transactions: TransactionStoreRef) -> Self {
        Self {
            wallets,
            transactions,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, owner: &OwnerId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(*owner).or_default().clone()
    }

    /// Current balance, creating a zero-balance wallet on first access.
    /// Never fails with "wallet not found".
    pub async fn balance(&self, owner: &OwnerId) -> Result<Balance> {
        let lock = self.lock_for(owner).await;
        let _guard = lock.lock().await;

        match self.wallets.get(owner).await? {
            Some(wallet) => Ok(wallet.balance),
            None => {
                let wallet = Wallet::new(*owner);
                self.wallets.put(wallet.clone()).await?;
                Ok(wallet.balance)
            }
        }
    }

    /// Appends a ledger entry and updates the wallet balance atomically
    /// with respect to other mutations of the same wallet.
    ///
    /// `amount` is signed: positive credits, negative debits. Debits that
    /// would drive the balance negative are rejected with
    /// `InsufficientFunds` and leave the wallet untouched. Deposits must be
    /// positive and every other kind negative; a mismatched sign is a
    /// caller bug reported as a validation error.
    pub async fn append(
        &self,
        owner: OwnerId,
        amount: i64,
        kind: TransactionKind,
        payment_request_id: Option<Uuid>,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(PaymentError::ValidationError(
                "transaction amount must be non-zero".to_string(),
            ));
        }
        if kind.is_credit() != (amount > 0) {
            return Err(PaymentError::ValidationError(format!(
                "amount sign does not match transaction kind {kind:?}"
            )));
        }

        let lock = self.lock_for(&owner).await;
        let _guard = lock.lock().await;

        let mut wallet = self
            .wallets
            .get(&owner)
            .await?
            .unwrap_or_else(|| Wallet::new(owner));

        if amount < 0 && wallet.balance.minor_units() + amount < 0 {
            return Err(PaymentError::InsufficientFunds {
                available: wallet.balance.minor_units(),
                requested: -amount,
            });
        }

        wallet.balance += Balance::new(amount);
        let tx = Transaction {
            id: Uuid::new_v4(),
            owner,
            amount,
            kind,
            payment_request_id,
            created_at: Utc::now(),
            balance_after: wallet.balance,
        };

        self.transactions.append(tx.clone()).await?;
        self.wallets.put(wallet).await?;

        debug!(owner = %owner, amount, kind = ?kind, "ledger entry appended");
        Ok(tx)
    }

    /// Page of the owner's transactions, newest first.
    pub async fn list(
        &self,
        owner: &OwnerId,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Transaction>> {
        self.transactions.list(owner, page, page_size).await
    }

    /// The deposit a committed payment produced, if it was already applied.
    pub async fn deposit_for(&self, payment_request_id: Uuid) -> Result<Option<Transaction>> {
        self.transactions
            .find_by_payment_request(payment_request_id)
            .await
    }

    /// Balance recomputed from the transaction log. The cached wallet
    /// balance is a projection of this sum and never the source of truth.
    pub async fn replayed_balance(&self, owner: &OwnerId) -> Result<Balance> {
        Ok(Balance::new(self.transactions.sum_for(owner).await?))
    }

    pub async fn wallets(&self) -> Result<Vec<Wallet>> {
        self.wallets.all().await
    }
}
