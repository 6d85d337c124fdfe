use crate::domain::money::Amount;
use crate::domain::transaction::TransactionKind;
use crate::domain::wallet::OwnerId;
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};

/// Scripted answer for the sandbox gateway's status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedStatus {
    Success,
    Failed,
    Unknown,
}

/// One line of a replay file.
///
/// The binary replays a stream of these through the engine: payment
/// initiations, raw gateway callbacks, wallet debits, scripted gateway
/// resolutions, and on-demand reconciliation sweeps.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplayEvent {
    Initiate {
        owner: OwnerId,
        amount: Amount,
        phone: String,
    },
    /// Raw gateway callback body, handed to the webhook receiver verbatim.
    Callback { payload: serde_json::Value },
    Debit {
        owner: OwnerId,
        amount: Amount,
        kind: TransactionKind,
    },
    /// Scripts what the sandbox gateway's status endpoint will answer for a
    /// reference (stands in for the real provider resolving the charge).
    Resolve {
        reference: String,
        status: ResolvedStatus,
        #[serde(default)]
        amount: Option<Amount>,
        #[serde(default)]
        reason: Option<String>,
    },
    Reconcile,
}

/// Reads replay events from a JSON-lines source.
///
/// Wraps any `Read` and yields one `Result<ReplayEvent>` per non-empty
/// line, so large files stream without loading into memory.
pub struct EventReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> EventReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    pub fn events(self) -> impl Iterator<Item = Result<ReplayEvent>> {
        self.reader.lines().filter_map(|line| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => {
                Some(serde_json::from_str(&line).map_err(PaymentError::SerializationError))
            }
            Err(e) => Some(Err(PaymentError::IoError(e))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_valid_stream() {
        let data = concat!(
            "{\"op\":\"initiate\",\"owner\":\"client:1\",\"amount\":30000,\"phone\":\"+254700000001\"}\n",
            "\n",
            "{\"op\":\"debit\",\"owner\":\"client:1\",\"amount\":500,\"kind\":\"job_payment\"}\n",
            "{\"op\":\"reconcile\"}\n",
        );
        let reader = EventReader::new(data.as_bytes());
        let events: Vec<Result<ReplayEvent>> = reader.events().collect();

        assert_eq!(events.len(), 3);
        match events[0].as_ref().unwrap() {
            ReplayEvent::Initiate { owner, amount, .. } => {
                assert_eq!(*owner, OwnerId::Client(1));
                assert_eq!(amount.minor_units(), 30000);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            events[1].as_ref().unwrap(),
            ReplayEvent::Debit {
                kind: TransactionKind::JobPayment,
                ..
            }
        ));
        assert!(matches!(events[2].as_ref().unwrap(), ReplayEvent::Reconcile));
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "{\"op\":\"initiate\"}\n{\"op\":\"reconcile\"}\n";
        let reader = EventReader::new(data.as_bytes());
        let events: Vec<Result<ReplayEvent>> = reader.events().collect();

        assert!(events[0].is_err());
        assert!(events[1].is_ok());
    }

    #[test]
    fn test_resolve_event_with_optional_fields() {
        let line = "{\"op\":\"resolve\",\"reference\":\"SBX-1\",\"status\":\"failed\",\"reason\":\"user cancelled\"}";
        let event: ReplayEvent = serde_json::from_str(line).unwrap();
        match event {
            ReplayEvent::Resolve {
                reference,
                status,
                amount,
                reason,
            } => {
                assert_eq!(reference, "SBX-1");
                assert_eq!(status, ResolvedStatus::Failed);
                assert_eq!(amount, None);
                assert_eq!(reason.as_deref(), Some("user cancelled"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
