use crate::application::ledger::LedgerService;
use crate::domain::idempotency::PaymentOutcome;
use crate::domain::money::Amount;
use crate::domain::payment_request::{PaymentRequest, PaymentRequestState};
use crate::domain::ports::{
    GatewayStatus, IdempotencyStoreRef, PaymentGatewayRef, PaymentRequestStoreRef,
};
use crate::domain::transaction::TransactionKind;
use crate::domain::wallet::OwnerId;
use crate::error::{PaymentError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a commit attempt did with a gateway resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitDisposition {
    /// First delivery: the ledger and state machine were updated.
    Applied,
    /// The reference was already claimed, or the request already terminal.
    Duplicate,
    /// No payment request matches the reference.
    Unknown,
}

/// Orchestrates the payment lifecycle: initiating STK-Push charges and
/// committing their asynchronous resolutions exactly once.
///
/// The webhook receiver and the reconciliation poller both converge on
/// [`PaymentEngine::commit_payment`]; the idempotency claim taken there is
/// the only coordination between them.
pub struct PaymentEngine {
    ledger: Arc<LedgerService>,
    requests: PaymentRequestStoreRef,
    idempotency: IdempotencyStoreRef,
    gateway: PaymentGatewayRef,
    // One async mutex per gateway reference: the claim admits a reference
    // into the apply step once, but recovery re-drives the same claim, so
    // overlapping sweeps must not interleave inside it.
    apply_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PaymentEngine {
    pub fn new(
        ledger: Arc<LedgerService>,
        requests: PaymentRequestStoreRef,
        idempotency: IdempotencyStoreRef,
        gateway: PaymentGatewayRef,
    ) -> Self {
        Self {
            ledger,
            requests,
            idempotency,
            gateway,
            apply_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn apply_lock(&self, reference: &str) -> Arc<Mutex<()>> {
        let mut locks = self.apply_locks.lock().await;
        locks.entry(reference.to_string()).or_default().clone()
    }

    pub fn ledger(&self) -> &LedgerService {
        &self.ledger
    }

    /// Starts an STK-Push charge for the owner and returns the payment
    /// request id as the caller's correlation handle.
    ///
    /// The gateway call is the only blocking step; once it acknowledges,
    /// the charge is in flight on the payer's phone and cannot be
    /// cancelled. If the gateway is unavailable the request stays
    /// `Initiated` (no reference) and can only expire later.
    pub async fn initiate_payment(
        &self,
        owner: OwnerId,
        amount: Amount,
        payer_phone: &str,
    ) -> Result<Uuid> {
        if payer_phone.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "payer phone must not be empty".to_string(),
            ));
        }

        // Initiating a payment counts as first wallet access.
        self.ledger.balance(&owner).await?;

        let mut request = PaymentRequest::new(owner, amount, payer_phone);
        self.requests.insert(request.clone()).await?;

        let ack = self.gateway.initiate(&request).await?;
        request.acknowledge(ack.reference.clone())?;
        request.gateway_metadata = ack.metadata;
        self.requests.update(request.clone()).await?;

        info!(
            request = %request.id,
            owner = %owner,
            amount = %amount,
            reference = %ack.reference,
            "STK push initiated"
        );
        Ok(request.id)
    }

    pub async fn payment_status(&self, id: Uuid) -> Result<PaymentRequestState> {
        let request = self
            .requests
            .get(id)
            .await?
            .ok_or_else(|| PaymentError::UnknownPaymentRequest(id.to_string()))?;
        Ok(request.state)
    }

    /// The shared commit path for webhook deliveries and poll results.
    ///
    /// Claims the gateway reference first (first caller wins, everyone else
    /// is a cheap duplicate), then applies the outcome: a succeeded charge
    /// appends exactly one deposit and moves the request to `Succeeded`; a
    /// failed one only moves the state. Duplicates and unknown references
    /// are successes, not errors, because gateways retry on anything else.
    pub async fn commit_payment(
        &self,
        reference: &str,
        outcome: PaymentOutcome,
    ) -> Result<CommitDisposition> {
        if !self.idempotency.try_claim(reference).await? {
            debug!(reference, "duplicate delivery ignored");
            return Ok(CommitDisposition::Duplicate);
        }
        self.apply_claimed(reference, outcome).await
    }

    /// Applies an outcome for a reference whose claim this process already
    /// holds. Safe to re-run: the applied-effect probe keeps a crash
    /// between the ledger append and the state transition from ever
    /// double-crediting, and the per-reference lock keeps concurrent
    /// re-drives (two overlapping sweeps, or a sweep racing the first
    /// delivery) from both passing the probe.
    async fn apply_claimed(
        &self,
        reference: &str,
        outcome: PaymentOutcome,
    ) -> Result<CommitDisposition> {
        let lock = self.apply_lock(reference).await;
        let _guard = lock.lock().await;

        let Some(mut request) = self.requests.find_by_reference(reference).await? else {
            warn!(reference, "resolution for unknown payment request");
            self.idempotency
                .record_outcome(reference, None, outcome)
                .await?;
            return Ok(CommitDisposition::Unknown);
        };

        if request.is_terminal() {
            debug!(
                reference,
                request = %request.id,
                state = %request.state,
                "resolution for terminal request ignored"
            );
            self.idempotency
                .record_outcome(reference, Some(request.id), outcome)
                .await?;
            return Ok(CommitDisposition::Duplicate);
        }

        match outcome {
            PaymentOutcome::Succeeded { amount } => {
                if amount != request.amount {
                    warn!(
                        reference,
                        request = %request.id,
                        requested = %request.amount,
                        charged = %amount,
                        "gateway amount differs from requested amount"
                    );
                }
                if self.ledger.deposit_for(request.id).await?.is_none() {
                    self.ledger
                        .append(
                            request.owner,
                            amount.minor_units(),
                            TransactionKind::Deposit,
                            Some(request.id),
                        )
                        .await?;
                }
                request.succeed()?;
            }
            PaymentOutcome::Failed => {
                request.fail()?;
            }
        }

        self.requests.update(request.clone()).await?;
        self.idempotency
            .record_outcome(reference, Some(request.id), outcome)
            .await?;

        info!(
            reference,
            request = %request.id,
            state = %request.state,
            "payment resolution committed"
        );
        Ok(CommitDisposition::Applied)
    }

    /// Completes claims whose effects were never applied (a crash between
    /// the claim and the commit). Re-drives the apply step from the
    /// gateway's answer; never re-claims.
    pub async fn recover_claimed(&self) -> Result<usize> {
        let mut completed = 0;
        for record in self.idempotency.unresolved().await? {
            match self.gateway.query_status(&record.reference).await {
                Ok(GatewayStatus::Succeeded { amount }) => {
                    self.apply_claimed(&record.reference, PaymentOutcome::Succeeded { amount })
                        .await?;
                    completed += 1;
                }
                Ok(GatewayStatus::Failed { reason }) => {
                    debug!(reference = %record.reference, reason, "recovering failed charge");
                    self.apply_claimed(&record.reference, PaymentOutcome::Failed)
                        .await?;
                    completed += 1;
                }
                Ok(GatewayStatus::Pending) | Ok(GatewayStatus::Unknown) => {
                    // Not resolvable yet; the claim stays open for the next sweep.
                }
                Err(e) => {
                    warn!(reference = %record.reference, error = %e, "recovery status check failed");
                }
            }
        }
        if completed > 0 {
            info!(completed, "recovered claimed-but-unapplied payments");
        }
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Balance;
    use crate::infrastructure::in_memory::{
        InMemoryIdempotencyStore, InMemoryPaymentRequestStore, InMemoryTransactionStore,
        InMemoryWalletStore,
    };
    use crate::infrastructure::sandbox::SandboxGateway;

    fn engine_with_gateway() -> (Arc<PaymentEngine>, Arc<SandboxGateway>) {
        let ledger = Arc::new(LedgerService::new(
            Arc::new(InMemoryWalletStore::new()),
            Arc::new(InMemoryTransactionStore::new()),
        ));
        let gateway = Arc::new(SandboxGateway::new());
        let engine = Arc::new(PaymentEngine::new(
            ledger,
            Arc::new(InMemoryPaymentRequestStore::new()),
            Arc::new(InMemoryIdempotencyStore::new()),
            gateway.clone(),
        ));
        (engine, gateway)
    }

    fn amount(v: i64) -> Amount {
        Amount::new(v).unwrap()
    }

    #[tokio::test]
    async fn test_initiate_moves_request_to_pending() {
        let (engine, _gateway) = engine_with_gateway();
        let id = engine
            .initiate_payment(OwnerId::Client(1), amount(300), "+254700000001")
            .await
            .unwrap();

        assert_eq!(
            engine.payment_status(id).await.unwrap(),
            PaymentRequestState::Pending
        );
        // Initiation creates the wallet but credits nothing.
        assert_eq!(
            engine.ledger().balance(&OwnerId::Client(1)).await.unwrap(),
            Balance::ZERO
        );
    }

    #[tokio::test]
    async fn test_duplicate_deliveries_credit_once() {
        let (engine, _gateway) = engine_with_gateway();
        let owner = OwnerId::Client(1);
        let id = engine
            .initiate_payment(owner, amount(300), "+254700000001")
            .await
            .unwrap();

        let outcome = PaymentOutcome::Succeeded { amount: amount(300) };
        let first = engine.commit_payment("SBX-1", outcome).await.unwrap();
        let second = engine.commit_payment("SBX-1", outcome).await.unwrap();
        let third = engine.commit_payment("SBX-1", outcome).await.unwrap();

        assert_eq!(first, CommitDisposition::Applied);
        assert_eq!(second, CommitDisposition::Duplicate);
        assert_eq!(third, CommitDisposition::Duplicate);

        assert_eq!(
            engine.ledger().balance(&owner).await.unwrap(),
            Balance::new(300)
        );
        let deposits = engine.ledger().deposit_for(id).await.unwrap();
        assert!(deposits.is_some());
        assert_eq!(engine.ledger().list(&owner, 0, 10).await.unwrap().len(), 1);
        assert_eq!(
            engine.payment_status(id).await.unwrap(),
            PaymentRequestState::Succeeded
        );
    }

    #[tokio::test]
    async fn test_racing_commits_credit_once() {
        let (engine, _gateway) = engine_with_gateway();
        let owner = OwnerId::Fundi(8);
        engine
            .initiate_payment(owner, amount(1_000), "+254700000002")
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .commit_payment(
                        "SBX-1",
                        PaymentOutcome::Succeeded {
                            amount: amount(1_000),
                        },
                    )
                    .await
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == CommitDisposition::Applied {
                applied += 1;
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(
            engine.ledger().balance(&owner).await.unwrap(),
            Balance::new(1_000)
        );
    }

    #[tokio::test]
    async fn test_failed_outcome_has_no_ledger_effect() {
        let (engine, _gateway) = engine_with_gateway();
        let owner = OwnerId::Client(2);
        let id = engine
            .initiate_payment(owner, amount(300), "+254700000003")
            .await
            .unwrap();

        let disposition = engine
            .commit_payment("SBX-1", PaymentOutcome::Failed)
            .await
            .unwrap();
        assert_eq!(disposition, CommitDisposition::Applied);

        assert_eq!(
            engine.payment_status(id).await.unwrap(),
            PaymentRequestState::Failed
        );
        assert_eq!(engine.ledger().balance(&owner).await.unwrap(), Balance::ZERO);
        assert!(engine.ledger().deposit_for(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminal_request_never_mutates_again() {
        let (engine, _gateway) = engine_with_gateway();
        let owner = OwnerId::Client(3);
        let id = engine
            .initiate_payment(owner, amount(300), "+254700000004")
            .await
            .unwrap();

        engine
            .commit_payment("SBX-1", PaymentOutcome::Failed)
            .await
            .unwrap();

        // A success delivered later under a fresh reference-claim must not
        // revive the failed request. Simulate by clearing nothing: the same
        // reference is already claimed, so this is a duplicate either way.
        let disposition = engine
            .commit_payment("SBX-1", PaymentOutcome::Succeeded { amount: amount(300) })
            .await
            .unwrap();
        assert_eq!(disposition, CommitDisposition::Duplicate);
        assert_eq!(
            engine.payment_status(id).await.unwrap(),
            PaymentRequestState::Failed
        );
        assert_eq!(engine.ledger().balance(&owner).await.unwrap(), Balance::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_reference_is_acknowledged() {
        let (engine, _gateway) = engine_with_gateway();

        let disposition = engine
            .commit_payment(
                "NO-SUCH-REF",
                PaymentOutcome::Succeeded { amount: amount(50) },
            )
            .await
            .unwrap();
        assert_eq!(disposition, CommitDisposition::Unknown);

        // A redelivery of the same junk reference is now a plain duplicate.
        let disposition = engine
            .commit_payment(
                "NO-SUCH-REF",
                PaymentOutcome::Succeeded { amount: amount(50) },
            )
            .await
            .unwrap();
        assert_eq!(disposition, CommitDisposition::Duplicate);
    }

    #[tokio::test]
    async fn test_initiate_surfaces_gateway_unavailable() {
        let (engine, gateway) = engine_with_gateway();
        gateway.set_unavailable(true);

        let err = engine
            .initiate_payment(OwnerId::Client(4), amount(300), "+254700000005")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::GatewayUnavailable(_)));
    }

    #[tokio::test]
    async fn test_concurrent_recovery_sweeps_credit_once() {
        let (engine, gateway) = engine_with_gateway();
        let owner = OwnerId::Client(7);
        let id = engine
            .initiate_payment(owner, amount(400), "+254700000007")
            .await
            .unwrap();

        // A claim whose effects were never applied; every racing sweep
        // below re-drives it.
        assert!(engine.idempotency.try_claim("SBX-1").await.unwrap());
        gateway
            .resolve("SBX-1", GatewayStatus::Succeeded { amount: amount(400) })
            .await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move { engine.recover_claimed().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(
            engine.ledger().balance(&owner).await.unwrap(),
            Balance::new(400)
        );
        assert_eq!(engine.ledger().list(&owner, 0, 10).await.unwrap().len(), 1);
        assert_eq!(
            engine.payment_status(id).await.unwrap(),
            PaymentRequestState::Succeeded
        );
    }

    #[tokio::test]
    async fn test_recover_completes_claimed_but_unapplied() {
        let (engine, gateway) = engine_with_gateway();
        let owner = OwnerId::Client(6);
        let id = engine
            .initiate_payment(owner, amount(700), "+254700000006")
            .await
            .unwrap();

        // Simulate a crash after the claim: consume the claim without
        // applying anything.
        assert!(
            engine
                .idempotency
                .try_claim("SBX-1")
                .await
                .unwrap()
        );
        assert_eq!(
            engine
                .commit_payment("SBX-1", PaymentOutcome::Succeeded { amount: amount(700) })
                .await
                .unwrap(),
            CommitDisposition::Duplicate
        );
        assert_eq!(engine.ledger().balance(&owner).await.unwrap(), Balance::ZERO);

        // The gateway knows the charge went through; recovery applies it.
        gateway.resolve("SBX-1", GatewayStatus::Succeeded { amount: amount(700) }).await;
        let completed = engine.recover_claimed().await.unwrap();
        assert_eq!(completed, 1);
        assert_eq!(
            engine.ledger().balance(&owner).await.unwrap(),
            Balance::new(700)
        );
        assert_eq!(
            engine.payment_status(id).await.unwrap(),
            PaymentRequestState::Succeeded
        );
    }
}
