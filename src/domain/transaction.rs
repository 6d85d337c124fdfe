use crate::domain::money::Balance;
use crate::domain::wallet::OwnerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    JobPayment,
    SubscriptionCharge,
}

impl TransactionKind {
    /// Deposits credit the wallet; every other kind debits it.
    pub fn is_credit(&self) -> bool {
        matches!(self, TransactionKind::Deposit)
    }
}

/// An immutable ledger entry. Append-only: nothing is ever updated or
/// deleted, and the wallet balance is by definition the sum of its entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub owner: OwnerId,
    /// Signed minor units: positive for credits, negative for debits.
    pub amount: i64,
    pub kind: TransactionKind,
    /// Set for deposits that originated from a mobile-money payment.
    pub payment_request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Audit snapshot of the balance after this entry was applied. Never
    /// used as a source of truth.
    pub balance_after: Balance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&TransactionKind::JobPayment).unwrap(),
            "\"job_payment\""
        );
        let kind: TransactionKind = serde_json::from_str("\"subscription_charge\"").unwrap();
        assert_eq!(kind, TransactionKind::SubscriptionCharge);
    }

    #[test]
    fn test_only_deposits_are_credits() {
        assert!(TransactionKind::Deposit.is_credit());
        assert!(!TransactionKind::Withdrawal.is_credit());
        assert!(!TransactionKind::JobPayment.is_credit());
        assert!(!TransactionKind::SubscriptionCharge.is_credit());
    }
}
