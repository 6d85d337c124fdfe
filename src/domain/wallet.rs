use crate::domain::money::Balance;
use crate::error::PaymentError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currency used when a wallet is created lazily.
pub const DEFAULT_CURRENCY: &str = "KES";

/// Identity of a wallet owner: a client or a fundi, mutually exclusive.
///
/// Renders as `client:42` / `fundi:7`, which is also the serialized form
/// used in replay files and as the store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OwnerId {
    Client(u64),
    Fundi(u64),
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerId::Client(id) => write!(f, "client:{id}"),
            OwnerId::Fundi(id) => write!(f, "fundi:{id}"),
        }
    }
}

impl FromStr for OwnerId {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s.split_once(':').ok_or_else(|| {
            PaymentError::ValidationError(format!(
                "owner must look like client:<id> or fundi:<id>, got {s:?}"
            ))
        })?;
        let id: u64 = id.parse().map_err(|_| {
            PaymentError::ValidationError(format!("owner id is not a number: {s:?}"))
        })?;
        match kind {
            "client" => Ok(OwnerId::Client(id)),
            "fundi" => Ok(OwnerId::Fundi(id)),
            other => Err(PaymentError::ValidationError(format!(
                "unknown owner kind {other:?}"
            ))),
        }
    }
}

impl TryFrom<String> for OwnerId {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OwnerId> for String {
    fn from(owner: OwnerId) -> Self {
        owner.to_string()
    }
}

/// A wallet: one per owner, created lazily at zero on first balance query
/// or payment.
///
/// The cached balance is a materialized projection over the transaction
/// log; it can always be rebuilt by replaying the wallet's transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub owner: OwnerId,
    pub balance: Balance,
    pub currency: String,
}

impl Wallet {
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            balance: Balance::ZERO,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_id_roundtrip() {
        let owner: OwnerId = "client:42".parse().unwrap();
        assert_eq!(owner, OwnerId::Client(42));
        assert_eq!(owner.to_string(), "client:42");

        let owner: OwnerId = "fundi:7".parse().unwrap();
        assert_eq!(owner, OwnerId::Fundi(7));
    }

    #[test]
    fn test_owner_id_rejects_garbage() {
        assert!("client".parse::<OwnerId>().is_err());
        assert!("client:abc".parse::<OwnerId>().is_err());
        assert!("admin:1".parse::<OwnerId>().is_err());
    }

    #[test]
    fn test_owner_id_serde_as_string() {
        let json = serde_json::to_string(&OwnerId::Fundi(9)).unwrap();
        assert_eq!(json, "\"fundi:9\"");
        let back: OwnerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OwnerId::Fundi(9));
    }

    #[test]
    fn test_new_wallet_is_zero() {
        let wallet = Wallet::new(OwnerId::Client(1));
        assert_eq!(wallet.balance, Balance::ZERO);
        assert_eq!(wallet.currency, DEFAULT_CURRENCY);
    }
}
