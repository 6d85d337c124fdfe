use thiserror::Error;

/// Errors produced by the wallet and payment reconciliation core.
///
/// Callers of job/subscription debits only ever observe `InsufficientFunds`
/// or success; gateway-internal failures stay inside the commit and
/// reconciliation paths.
#[derive(Error, Debug)]
pub enum PaymentError {
    /// A debit would drive the wallet balance negative. Expected and final;
    /// callers must not retry.
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: i64 },

    /// A callback or poll result references a payment request we have no
    /// record of. Acknowledged and logged, never retried by us.
    #[error("Unknown payment request for reference {0}")]
    UnknownPaymentRequest(String),

    /// Transient gateway failure. The poller retries on its next interval;
    /// webhook deliveries wait for the gateway's own retry.
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// An illegal payment request state transition was attempted.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

pub type Result<T> = std::result::Result<T, PaymentError>;
