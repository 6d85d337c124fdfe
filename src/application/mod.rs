//! Application layer orchestrating the domain ports.
//!
//! `LedgerService` is the single choke point for balance mutation,
//! `PaymentEngine` owns payment initiation and the shared idempotent commit
//! path, and `Reconciler` sweeps pending requests the webhook never
//! resolved.

pub mod engine;
pub mod ledger;
pub mod reconciler;
