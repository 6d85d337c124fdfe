//! Domain layer: money value objects, wallet and ledger entities, the
//! payment request state machine, and the port traits adapters implement.

pub mod idempotency;
pub mod money;
pub mod payment_request;
pub mod ports;
pub mod transaction;
pub mod wallet;
