use crate::domain::money::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The resolved outcome of a gateway charge, as delivered by a webhook or
/// discovered by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum PaymentOutcome {
    Succeeded { amount: Amount },
    Failed,
}

/// Write-once record keyed by the gateway reference.
///
/// The claim (row insertion) is the linchpin that makes webhook delivery
/// and polling safe to race: the store guarantees it succeeds exactly once
/// per reference. A record whose `outcome` is still `None` is a claim whose
/// effects may not have been applied; the recovery sweep completes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub reference: String,
    pub payment_request_id: Option<Uuid>,
    pub outcome: Option<PaymentOutcome>,
    pub claimed_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn claim(reference: &str) -> Self {
        Self {
            reference: reference.to_string(),
            payment_request_id: None,
            outcome: None,
            claimed_at: Utc::now(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }
}
