//! Wallet and mobile-money reconciliation core for the fundi marketplace.
//!
//! Tracks a ledger balance per owner (client or fundi), initiates STK-Push
//! charges through a payment gateway, consumes gateway callbacks, and
//! reconciles payments whose callback never arrived. Every balance mutation
//! funnels through a single append operation, and every asynchronous
//! resolution funnels through a single idempotency-guarded commit, so
//! duplicated or racing deliveries apply exactly once.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
