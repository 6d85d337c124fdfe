use crate::domain::money::Amount;
use crate::domain::wallet::{DEFAULT_CURRENCY, OwnerId};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of an STK-Push charge.
///
/// `Initiated -> Pending -> { Succeeded | Failed | Expired }`. The three
/// right-hand states are terminal: once reached, no callback or poll result
/// may mutate the request again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRequestState {
    Initiated,
    Pending,
    Succeeded,
    Failed,
    Expired,
}

impl PaymentRequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentRequestState::Succeeded
                | PaymentRequestState::Failed
                | PaymentRequestState::Expired
        )
    }
}

impl fmt::Display for PaymentRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentRequestState::Initiated => "initiated",
            PaymentRequestState::Pending => "pending",
            PaymentRequestState::Succeeded => "succeeded",
            PaymentRequestState::Failed => "failed",
            PaymentRequestState::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// A tracked in-flight STK-Push charge.
///
/// Created by the initiator, mutated only through the transition methods
/// below, never deleted (kept for audit and idempotent replay).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: Uuid,
    pub owner: OwnerId,
    pub amount: Amount,
    pub currency: String,
    pub payer_phone: String,
    /// Assigned by the gateway when it acknowledges the push request.
    pub gateway_reference: Option<String>,
    pub state: PaymentRequestState,
    pub created_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
    /// Raw gateway response body, kept verbatim for audit.
    pub gateway_metadata: Option<serde_json::Value>,
}

impl PaymentRequest {
    pub fn new(owner: OwnerId, amount: Amount, payer_phone: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner,
            amount,
            currency: DEFAULT_CURRENCY.to_string(),
            payer_phone: payer_phone.to_string(),
            gateway_reference: None,
            state: PaymentRequestState::Initiated,
            created_at: now,
            last_checked_at: now,
            gateway_metadata: None,
        }
    }

    /// Gateway acknowledged the push request: `Initiated -> Pending`.
    pub fn acknowledge(&mut self, reference: String) -> Result<()> {
        self.transition(PaymentRequestState::Initiated, PaymentRequestState::Pending)?;
        self.gateway_reference = Some(reference);
        Ok(())
    }

    /// The charge resolved successfully: `Pending -> Succeeded`.
    pub fn succeed(&mut self) -> Result<()> {
        self.transition(PaymentRequestState::Pending, PaymentRequestState::Succeeded)
    }

    /// The gateway reported failure: `Pending -> Failed`.
    pub fn fail(&mut self) -> Result<()> {
        self.transition(PaymentRequestState::Pending, PaymentRequestState::Failed)
    }

    /// Timed out without resolution. Allowed from `Pending`, and from
    /// `Initiated` when the gateway never acknowledged the push (such a
    /// request has no reference and can only expire).
    pub fn expire(&mut self) -> Result<()> {
        match self.state {
            PaymentRequestState::Initiated | PaymentRequestState::Pending => {
                self.state = PaymentRequestState::Expired;
                self.last_checked_at = Utc::now();
                Ok(())
            }
            from => Err(PaymentError::InvalidTransition {
                from: from.to_string(),
                to: PaymentRequestState::Expired.to_string(),
            }),
        }
    }

    /// Records a reconciliation probe without changing state.
    pub fn touch_checked(&mut self) {
        self.last_checked_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn transition(&mut self, from: PaymentRequestState, to: PaymentRequestState) -> Result<()> {
        if self.state != from {
            return Err(PaymentError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        self.last_checked_at = Utc::now();
        Ok(())
    }
}
