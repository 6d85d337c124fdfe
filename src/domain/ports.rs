//! Port traits implemented by the infrastructure adapters.
//!
//! The application services only ever see these interfaces; storage engines
//! and the real gateway live behind them.

use crate::domain::idempotency::{IdempotencyRecord, PaymentOutcome};
use crate::domain::money::Amount;
use crate::domain::payment_request::PaymentRequest;
use crate::domain::transaction::Transaction;
use crate::domain::wallet::{OwnerId, Wallet};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub type WalletStoreRef = Arc<dyn WalletStore>;
pub type TransactionStoreRef = Arc<dyn TransactionStore>;
pub type PaymentRequestStoreRef = Arc<dyn PaymentRequestStore>;
pub type IdempotencyStoreRef = Arc<dyn IdempotencyStore>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;

#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn get(&self, owner: &OwnerId) -> Result<Option<Wallet>>;
    async fn put(&self, wallet: Wallet) -> Result<()>;
    async fn all(&self) -> Result<Vec<Wallet>>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn append(&self, tx: Transaction) -> Result<()>;

    /// Page of the owner's transactions, newest first. Pages are 0-based.
    async fn list(&self, owner: &OwnerId, page: usize, page_size: usize)
    -> Result<Vec<Transaction>>;

    /// The transaction a committed payment produced, if any. This is the
    /// applied-effect probe the recovery path uses to stay idempotent.
    async fn find_by_payment_request(&self, payment_request_id: Uuid)
    -> Result<Option<Transaction>>;

    /// Sum of all signed amounts for the owner; the rebuildable projection
    /// the cached wallet balance must always equal.
    async fn sum_for(&self, owner: &OwnerId) -> Result<i64>;
}

#[async_trait]
pub trait PaymentRequestStore: Send + Sync {
    async fn insert(&self, request: PaymentRequest) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<PaymentRequest>>;
    async fn update(&self, request: PaymentRequest) -> Result<()>;

    /// Writes the request only while the stored row is still non-terminal,
    /// atomically with respect to other request writes. Returns `false`
    /// and leaves the row untouched when the stored state is terminal.
    /// Guards writers holding a stale snapshot (the reconciliation sweep)
    /// from overwriting a resolution that committed mid-sweep.
    async fn update_if_unresolved(&self, request: PaymentRequest) -> Result<bool>;

    async fn find_by_reference(&self, reference: &str) -> Result<Option<PaymentRequest>>;

    /// Non-terminal requests whose `last_checked_at` is older than the
    /// cutoff; the reconciliation poller's work queue.
    async fn list_unresolved(&self, checked_before: DateTime<Utc>)
    -> Result<Vec<PaymentRequest>>;
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomic insert-if-absent keyed by the gateway reference. Returns
    /// `true` exactly once per reference no matter how many callers race;
    /// implementations must enforce this with a storage-level uniqueness
    /// guarantee, not an unguarded check-then-act.
    async fn try_claim(&self, reference: &str) -> Result<bool>;

    /// Attaches the resolved outcome to an existing claim.
    async fn record_outcome(
        &self,
        reference: &str,
        payment_request_id: Option<Uuid>,
        outcome: PaymentOutcome,
    ) -> Result<()>;

    async fn get(&self, reference: &str) -> Result<Option<IdempotencyRecord>>;

    /// Claims without a recorded outcome: work for the recovery sweep.
    async fn unresolved(&self) -> Result<Vec<IdempotencyRecord>>;
}

/// Synchronous acknowledgment returned by the gateway's initiate endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayAck {
    pub reference: String,
    pub metadata: Option<serde_json::Value>,
}

/// Answer from the gateway's status-check endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayStatus {
    /// STK prompt still on the payer's phone.
    Pending,
    Succeeded { amount: Amount },
    Failed { reason: String },
    /// The gateway has no record of the reference (sandbox gap, purge).
    Unknown,
}

/// The mobile-money provider, consumed as an opaque API.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Starts an STK-Push charge. This is the only caller-blocking call in
    /// the core; failures surface as `GatewayUnavailable`.
    async fn initiate(&self, request: &PaymentRequest) -> Result<GatewayAck>;

    async fn query_status(&self, reference: &str) -> Result<GatewayStatus>;
}
