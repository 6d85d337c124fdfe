use crate::domain::payment_request::PaymentRequest;
use crate::domain::ports::{GatewayAck, GatewayStatus, PaymentGateway};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Scriptable stand-in for the mobile-money provider.
///
/// Acknowledges every push with a deterministic `SBX-n` reference and
/// answers status checks from a scriptable map. Tests and the replay CLI
/// drive it through [`SandboxGateway::resolve`]; `set_unavailable` makes
/// both endpoints fail to exercise the transient-outage paths.
#[derive(Default)]
pub struct SandboxGateway {
    next_reference: AtomicU64,
    unavailable: AtomicBool,
    statuses: Arc<RwLock<HashMap<String, GatewayStatus>>>,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts what `query_status` answers for a reference from now on.
    pub async fn resolve(&self, reference: &str, status: GatewayStatus) {
        let mut statuses = self.statuses.write().await;
        statuses.insert(reference.to_string(), status);
    }

    /// Drops all record of a reference, simulating a gateway-side purge.
    pub async fn forget(&self, reference: &str) {
        let mut statuses = self.statuses.write().await;
        statuses.remove(reference);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(PaymentError::GatewayUnavailable(
                "sandbox gateway offline".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn initiate(&self, request: &PaymentRequest) -> Result<GatewayAck> {
        self.check_available()?;

        let n = self.next_reference.fetch_add(1, Ordering::SeqCst) + 1;
        let reference = format!("SBX-{n}");

        let mut statuses = self.statuses.write().await;
        statuses.insert(reference.clone(), GatewayStatus::Pending);

        Ok(GatewayAck {
            reference,
            metadata: Some(json!({
                "sandbox": true,
                "phone": request.payer_phone,
                "amount": request.amount.minor_units(),
            })),
        })
    }

    async fn query_status(&self, reference: &str) -> Result<GatewayStatus> {
        self.check_available()?;

        let statuses = self.statuses.read().await;
        Ok(statuses
            .get(reference)
            .cloned()
            .unwrap_or(GatewayStatus::Unknown))
    }
}
