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
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for wallet states.
pub const CF_WALLETS: &str = "wallets";
/// Column Family for the append-only transaction log.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for payment requests, keyed by id.
pub const CF_PAYMENT_REQUESTS: &str = "payment_requests";
/// Column Family mapping gateway references to payment request ids.
pub const CF_PAYMENT_REFS: &str = "payment_refs";
/// Column Family for idempotency claims, keyed by gateway reference.
pub const CF_IDEMPOTENCY: &str = "idempotency";

/// Persistent store implementation backed by RocksDB.
///
/// One database holds all four stores in separate column families, with
/// JSON values. Transaction keys are `owner|reversed-timestamp|id`, so a
/// prefix scan over an owner yields entries newest first.
///
/// `Clone` shares the underlying `Arc<DB>`. The idempotency claim and all
/// payment request writes run their read-then-write under store-level
/// mutexes; the process owning the database is the single writer, which is
/// what makes those checks atomic.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    claim_lock: Arc<Mutex<()>>,
    request_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the given path, ensuring all
    /// required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [
            CF_WALLETS,
            CF_TRANSACTIONS,
            CF_PAYMENT_REQUESTS,
            CF_PAYMENT_REFS,
            CF_IDEMPOTENCY,
        ]
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
        .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;
        Ok(Self {
            db: Arc::new(db),
            claim_lock: Arc::new(Mutex::new(())),
            request_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::StorageError(format!("column family {name} not found")))
    }

    fn transaction_key(tx: &Transaction) -> Vec<u8> {
        // Reversed millisecond timestamp makes prefix scans newest-first.
        let reversed = u64::MAX - tx.created_at.timestamp_millis() as u64;
        format!("{}|{reversed:020}|{}", tx.owner, tx.id).into_bytes()
    }

    fn owner_prefix(owner: &OwnerId) -> Vec<u8> {
        format!("{owner}|").into_bytes()
    }

    fn scan_owner(&self, owner: &OwnerId) -> Result<Vec<Transaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let prefix = Self::owner_prefix(owner);
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut transactions = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            transactions.push(serde_json::from_slice(&value)?);
        }
        Ok(transactions)
    }
}

#[async_trait]
impl WalletStore for RocksDBStore {
    async fn get(&self, owner: &OwnerId) -> Result<Option<Wallet>> {
        let cf = self.cf(CF_WALLETS)?;
        match self.db.get_cf(cf, owner.to_string().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, wallet: Wallet) -> Result<()> {
        let cf = self.cf(CF_WALLETS)?;
        let key = wallet.owner.to_string();
        let value = serde_json::to_vec(&wallet)?;
        self.db.put_cf(cf, key.as_bytes(), value)?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Wallet>> {
        let cf = self.cf(CF_WALLETS)?;
        let mut wallets = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            wallets.push(serde_json::from_slice(&value)?);
        }
        Ok(wallets)
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn append(&self, tx: Transaction) -> Result<()> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let key = Self::transaction_key(&tx);
        let value = serde_json::to_vec(&tx)?;
        self.db.put_cf(cf, key, value)?;
        Ok(())
    }

    async fn list(
        &self,
        owner: &OwnerId,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Transaction>> {
        let transactions = self.scan_owner(owner)?;
        Ok(transactions
            .into_iter()
            .skip(page * page_size)
            .take(page_size)
            .collect())
    }

    async fn find_by_payment_request(
        &self,
        payment_request_id: Uuid,
    ) -> Result<Option<Transaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let tx: Transaction = serde_json::from_slice(&value)?;
            if tx.payment_request_id == Some(payment_request_id) {
                return Ok(Some(tx));
            }
        }
        Ok(None)
    }

    async fn sum_for(&self, owner: &OwnerId) -> Result<i64> {
        Ok(self.scan_owner(owner)?.iter().map(|tx| tx.amount).sum())
    }
}

#[async_trait]
impl PaymentRequestStore for RocksDBStore {
    async fn insert(&self, request: PaymentRequest) -> Result<()> {
        let cf = self.cf(CF_PAYMENT_REQUESTS)?;
        if self.db.get_cf(cf, request.id.as_bytes())?.is_some() {
            return Err(PaymentError::StorageError(format!(
                "payment request {} already exists",
                request.id
            )));
        }
        let value = serde_json::to_vec(&request)?;
        self.db.put_cf(cf, request.id.as_bytes(), value)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PaymentRequest>> {
        let cf = self.cf(CF_PAYMENT_REQUESTS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, request: PaymentRequest) -> Result<()> {
        let _guard = self.request_lock.lock().await;

        let cf = self.cf(CF_PAYMENT_REQUESTS)?;
        if self.db.get_cf(cf, request.id.as_bytes())?.is_none() {
            return Err(PaymentError::StorageError(format!(
                "payment request {} does not exist",
                request.id
            )));
        }
        let value = serde_json::to_vec(&request)?;
        self.db.put_cf(cf, request.id.as_bytes(), value)?;

        // Keep the reference index current once the gateway has assigned one.
        if let Some(reference) = &request.gateway_reference {
            let refs = self.cf(CF_PAYMENT_REFS)?;
            self.db
                .put_cf(refs, reference.as_bytes(), request.id.as_bytes())?;
        }
        Ok(())
    }

    async fn update_if_unresolved(&self, request: PaymentRequest) -> Result<bool> {
        let _guard = self.request_lock.lock().await;

        let cf = self.cf(CF_PAYMENT_REQUESTS)?;
        let Some(bytes) = self.db.get_cf(cf, request.id.as_bytes())? else {
            return Err(PaymentError::StorageError(format!(
                "payment request {} does not exist",
                request.id
            )));
        };
        let stored: PaymentRequest = serde_json::from_slice(&bytes)?;
        if stored.is_terminal() {
            return Ok(false);
        }
        let value = serde_json::to_vec(&request)?;
        self.db.put_cf(cf, request.id.as_bytes(), value)?;

        if let Some(reference) = &request.gateway_reference {
            let refs = self.cf(CF_PAYMENT_REFS)?;
            self.db
                .put_cf(refs, reference.as_bytes(), request.id.as_bytes())?;
        }
        Ok(true)
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<PaymentRequest>> {
        let refs = self.cf(CF_PAYMENT_REFS)?;
        let Some(id_bytes) = self.db.get_cf(refs, reference.as_bytes())? else {
            return Ok(None);
        };
        let id = Uuid::from_slice(&id_bytes)
            .map_err(|e| PaymentError::StorageError(format!("corrupt reference index: {e}")))?;
        PaymentRequestStore::get(self, id).await
    }

    async fn list_unresolved(
        &self,
        checked_before: DateTime<Utc>,
    ) -> Result<Vec<PaymentRequest>> {
        let cf = self.cf(CF_PAYMENT_REQUESTS)?;
        let mut requests = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let request: PaymentRequest = serde_json::from_slice(&value)?;
            if !request.is_terminal() && request.last_checked_at <= checked_before {
                requests.push(request);
            }
        }
        Ok(requests)
    }
}

#[async_trait]
impl IdempotencyStore for RocksDBStore {
    async fn try_claim(&self, reference: &str) -> Result<bool> {
        let _guard = self.claim_lock.lock().await;

        let cf = self.cf(CF_IDEMPOTENCY)?;
        if self.db.get_cf(cf, reference.as_bytes())?.is_some() {
            return Ok(false);
        }
        let record = IdempotencyRecord::claim(reference);
        let value = serde_json::to_vec(&record)?;
        self.db.put_cf(cf, reference.as_bytes(), value)?;
        Ok(true)
    }

    async fn record_outcome(
        &self,
        reference: &str,
        payment_request_id: Option<Uuid>,
        outcome: PaymentOutcome,
    ) -> Result<()> {
        let cf = self.cf(CF_IDEMPOTENCY)?;
        let bytes = self.db.get_cf(cf, reference.as_bytes())?.ok_or_else(|| {
            PaymentError::StorageError(format!("no idempotency claim for reference {reference}"))
        })?;
        let mut record: IdempotencyRecord = serde_json::from_slice(&bytes)?;
        record.payment_request_id = payment_request_id;
        record.outcome = Some(outcome);
        let value = serde_json::to_vec(&record)?;
        self.db.put_cf(cf, reference.as_bytes(), value)?;
        Ok(())
    }

    async fn get(&self, reference: &str) -> Result<Option<IdempotencyRecord>> {
        let cf = self.cf(CF_IDEMPOTENCY)?;
        match self.db.get_cf(cf, reference.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn unresolved(&self) -> Result<Vec<IdempotencyRecord>> {
        let cf = self.cf(CF_IDEMPOTENCY)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let record: IdempotencyRecord = serde_json::from_slice(&value)?;
            if !record.is_resolved() {
                records.push(record);
            }
        }
        Ok(records)
    }
}
