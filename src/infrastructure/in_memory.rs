use crate::domain::idempotency::{IdempotencyRecord, PaymentOutcome};
use crate::domain::payment_request::PaymentRequest;
use crate::domain::ports::{
    IdempotencyStore, PaymentRequestStore, TransactionStore, WalletStore,
};
use crate::domain::transaction::Transaction;
use crate::domain::wallet::{OwnerId, Wallet};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory wallet store.
///
/// Uses `Arc<RwLock<HashMap<OwnerId, Wallet>>>` for shared concurrent
/// access. Ideal for tests and the replay CLI where persistence is not
/// required.
#[derive(Default, Clone)]
pub struct InMemoryWalletStore {
    wallets: Arc<RwLock<HashMap<OwnerId, Wallet>>>,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn get(&self, owner: &OwnerId) -> Result<Option<Wallet>> {
        let wallets = self.wallets.read().await;
        Ok(wallets.get(owner).cloned())
    }

    async fn put(&self, wallet: Wallet) -> Result<()> {
        let mut wallets = self.wallets.write().await;
        wallets.insert(wallet.owner, wallet);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Wallet>> {
        let wallets = self.wallets.read().await;
        Ok(wallets.values().cloned().collect())
    }
}

/// A thread-safe in-memory transaction log. Entries keep insertion order,
/// which is also commit order because the ledger serializes per wallet.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<Vec<Transaction>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn append(&self, tx: Transaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        transactions.push(tx);
        Ok(())
    }

    async fn list(
        &self,
        owner: &OwnerId,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .iter()
            .rev()
            .filter(|tx| tx.owner == *owner)
            .skip(page * page_size)
            .take(page_size)
            .cloned()
            .collect())
    }

    async fn find_by_payment_request(
        &self,
        payment_request_id: Uuid,
    ) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .iter()
            .find(|tx| tx.payment_request_id == Some(payment_request_id))
            .cloned())
    }

    async fn sum_for(&self, owner: &OwnerId) -> Result<i64> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .iter()
            .filter(|tx| tx.owner == *owner)
            .map(|tx| tx.amount)
            .sum())
    }
}

/// A thread-safe in-memory payment request tracker.
#[derive(Default, Clone)]
pub struct InMemoryPaymentRequestStore {
    requests: Arc<RwLock<HashMap<Uuid, PaymentRequest>>>,
}

impl InMemoryPaymentRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentRequestStore for InMemoryPaymentRequestStore {
    async fn insert(&self, request: PaymentRequest) -> Result<()> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id) {
            return Err(PaymentError::StorageError(format!(
                "payment request {} already exists",
                request.id
            )));
        }
        requests.insert(request.id, request);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PaymentRequest>> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id).cloned())
    }

    async fn update(&self, request: PaymentRequest) -> Result<()> {
        let mut requests = self.requests.write().await;
        if !requests.contains_key(&request.id) {
            return Err(PaymentError::StorageError(format!(
                "payment request {} does not exist",
                request.id
            )));
        }
        requests.insert(request.id, request);
        Ok(())
    }

    async fn update_if_unresolved(&self, request: PaymentRequest) -> Result<bool> {
        let mut requests = self.requests.write().await;
        let stored = requests.get(&request.id).ok_or_else(|| {
            PaymentError::StorageError(format!(
                "payment request {} does not exist",
                request.id
            ))
        })?;
        if stored.is_terminal() {
            return Ok(false);
        }
        requests.insert(request.id, request);
        Ok(true)
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<PaymentRequest>> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .find(|r| r.gateway_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn list_unresolved(
        &self,
        checked_before: DateTime<Utc>,
    ) -> Result<Vec<PaymentRequest>> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .filter(|r| !r.is_terminal() && r.last_checked_at <= checked_before)
            .cloned()
            .collect())
    }
}

/// In-memory idempotency registry.
///
/// The claim is an insert-if-absent performed under the map's single write
/// lock, so it succeeds exactly once per reference however many tasks race.
#[derive(Default, Clone)]
pub struct InMemoryIdempotencyStore {
    records: Arc<RwLock<HashMap<String, IdempotencyRecord>>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn try_claim(&self, reference: &str) -> Result<bool> {
        let mut records = self.records.write().await;
        if records.contains_key(reference) {
            return Ok(false);
        }
        records.insert(reference.to_string(), IdempotencyRecord::claim(reference));
        Ok(true)
    }

    async fn record_outcome(
        &self,
        reference: &str,
        payment_request_id: Option<Uuid>,
        outcome: PaymentOutcome,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(reference).ok_or_else(|| {
            PaymentError::StorageError(format!("no idempotency claim for reference {reference}"))
        })?;
        record.payment_request_id = payment_request_id;
        record.outcome = Some(outcome);
        Ok(())
    }

    async fn get(&self, reference: &str) -> Result<Option<IdempotencyRecord>> {
        let records = self.records.read().await;
        Ok(records.get(reference).cloned())
    }

    async fn unresolved(&self) -> Result<Vec<IdempotencyRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| !r.is_resolved())
            .cloned()
            .collect())
    }
}
