use crate::application::engine::{CommitDisposition, PaymentEngine};
use crate::domain::idempotency::PaymentOutcome;
use crate::domain::money::Amount;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Status field of a gateway callback. Anything other than these two
/// variants fails deserialization; the payload is rejected as malformed
/// instead of being coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CallbackStatus {
    Success,
    Failed,
}

/// Strictly validated gateway callback body.
///
/// Wire shape: `{referenceId, status: Success|Failed, amount, currency,
/// payerPhone, timestamp}` with the amount in minor units. The positive
/// `Amount` type rejects zero and negative charges at parse time.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCallback {
    pub reference_id: String,
    pub status: CallbackStatus,
    pub amount: Amount,
    pub currency: String,
    #[serde(default)]
    pub payer_phone: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Acknowledgment returned to the gateway. Once a payload parsed, the
/// delivery is always acked; the disposition says what it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookAck {
    pub reference: String,
    pub disposition: CommitDisposition,
}

/// Consumes gateway callbacks and funnels them into the shared commit path.
///
/// Duplicate deliveries and unknown references are successes here: the
/// gateway retries aggressively on anything that looks like an error, so a
/// redelivered callback must be a cheap ack, never a failure. The only
/// error this returns is a malformed payload (the HTTP layer's one non-2xx
/// case); payload authenticity is owned by the excluded auth layer.
pub struct WebhookReceiver {
    engine: Arc<PaymentEngine>,
}

impl WebhookReceiver {
    pub fn new(engine: Arc<PaymentEngine>) -> Self {
        Self { engine }
    }

    pub fn parse(raw: &[u8]) -> Result<GatewayCallback> {
        serde_json::from_slice(raw).map_err(|e| {
            PaymentError::ValidationError(format!("malformed gateway callback: {e}"))
        })
    }

    pub async fn handle(&self, raw: &[u8]) -> Result<WebhookAck> {
        let callback = Self::parse(raw)?;
        self.handle_callback(callback).await
    }

    pub async fn handle_callback(&self, callback: GatewayCallback) -> Result<WebhookAck> {
        let outcome = match callback.status {
            CallbackStatus::Success => PaymentOutcome::Succeeded {
                amount: callback.amount,
            },
            CallbackStatus::Failed => PaymentOutcome::Failed,
        };

        let disposition = self
            .engine
            .commit_payment(&callback.reference_id, outcome)
            .await?;

        info!(
            reference = %callback.reference_id,
            status = ?callback.status,
            disposition = ?disposition,
            "webhook delivery handled"
        );
        Ok(WebhookAck {
            reference: callback.reference_id,
            disposition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ledger::LedgerService;
    use crate::domain::money::Balance;
    use crate::domain::wallet::OwnerId;
    use crate::infrastructure::in_memory::{
        InMemoryIdempotencyStore, InMemoryPaymentRequestStore, InMemoryTransactionStore,
        InMemoryWalletStore,
    };
    use crate::infrastructure::sandbox::SandboxGateway;

    fn receiver() -> (WebhookReceiver, Arc<PaymentEngine>) {
        let ledger = Arc::new(LedgerService::new(
            Arc::new(InMemoryWalletStore::new()),
            Arc::new(InMemoryTransactionStore::new()),
        ));
        let engine = Arc::new(PaymentEngine::new(
            ledger,
            Arc::new(InMemoryPaymentRequestStore::new()),
            Arc::new(InMemoryIdempotencyStore::new()),
            Arc::new(SandboxGateway::new()),
        ));
        (WebhookReceiver::new(engine.clone()), engine)
    }

    #[test]
    fn test_parse_valid_success_payload() {
        let raw = br#"{
            "referenceId": "WS123",
            "status": "Success",
            "amount": 30000,
            "currency": "KES",
            "payerPhone": "+254700000001",
            "timestamp": "2024-05-01T10:00:00Z"
        }"#;
        let callback = WebhookReceiver::parse(raw).unwrap();
        assert_eq!(callback.reference_id, "WS123");
        assert_eq!(callback.status, CallbackStatus::Success);
        assert_eq!(callback.amount.minor_units(), 30000);
    }

    #[test]
    fn test_parse_rejects_unknown_status() {
        let raw = br#"{"referenceId":"X","status":"Processing","amount":5,"currency":"KES"}"#;
        assert!(matches!(
            WebhookReceiver::parse(raw),
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_positive_amount() {
        let raw = br#"{"referenceId":"X","status":"Success","amount":0,"currency":"KES"}"#;
        assert!(WebhookReceiver::parse(raw).is_err());

        let raw = br#"{"referenceId":"X","status":"Success","amount":-10,"currency":"KES"}"#;
        assert!(WebhookReceiver::parse(raw).is_err());
    }

    #[test]
    fn test_parse_rejects_garbage_body() {
        assert!(WebhookReceiver::parse(b"not json").is_err());
        assert!(WebhookReceiver::parse(b"{}").is_err());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_acks_as_duplicate() {
        let (receiver, engine) = receiver();
        let owner = OwnerId::Client(1);
        engine
            .initiate_payment(owner, Amount::new(300).unwrap(), "+254700000001")
            .await
            .unwrap();

        let raw =
            br#"{"referenceId":"SBX-1","status":"Success","amount":300,"currency":"KES"}"#;
        let first = receiver.handle(raw).await.unwrap();
        let second = receiver.handle(raw).await.unwrap();

        assert_eq!(first.disposition, CommitDisposition::Applied);
        assert_eq!(second.disposition, CommitDisposition::Duplicate);
        assert_eq!(
            engine.ledger().balance(&owner).await.unwrap(),
            Balance::new(300)
        );
    }

    #[tokio::test]
    async fn test_unknown_reference_still_acks() {
        let (receiver, _engine) = receiver();
        let raw =
            br#"{"referenceId":"GHOST","status":"Success","amount":100,"currency":"KES"}"#;
        let ack = receiver.handle(raw).await.unwrap();
        assert_eq!(ack.disposition, CommitDisposition::Unknown);
    }
}
