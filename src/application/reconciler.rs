use crate::application::engine::{CommitDisposition, PaymentEngine};
use crate::domain::idempotency::PaymentOutcome;
use crate::domain::ports::{GatewayStatus, PaymentGatewayRef, PaymentRequestStoreRef};
use crate::domain::payment_request::PaymentRequest;
use crate::error::Result;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tuning for the reconciliation sweep.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How often the background loop runs a sweep.
    pub poll_interval: Duration,
    /// Requests are re-checked only once their `last_checked_at` is older
    /// than this.
    pub check_interval: Duration,
    /// Pending requests the gateway no longer knows about expire after this.
    pub pending_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            check_interval: Duration::from_secs(60),
            pending_timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// Outcome summary of one reconciliation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: usize,
    pub applied: usize,
    pub duplicates: usize,
    pub expired: usize,
    pub errors: usize,
    pub recovered: usize,
}

/// Fallback path for payments whose webhook never arrived.
///
/// Sweeps non-terminal payment requests past the check interval, asks the
/// gateway what became of them, and feeds resolved outcomes through the
/// same idempotent commit the webhook uses. One request's gateway failure
/// never aborts reconciliation of the others.
pub struct Reconciler {
    engine: Arc<PaymentEngine>,
    requests: PaymentRequestStoreRef,
    gateway: PaymentGatewayRef,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        engine: Arc<PaymentEngine>,
        requests: PaymentRequestStoreRef,
        gateway: PaymentGatewayRef,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            engine,
            requests,
            gateway,
            config,
        }
    }

    /// One sweep: recovery first, then status checks for stale requests.
    /// Also invocable on demand by a caller impatient for their payment.
    pub async fn reconcile_pending(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        match self.engine.recover_claimed().await {
            Ok(recovered) => report.recovered = recovered,
            Err(e) => {
                warn!(error = %e, "recovery sweep failed");
                report.errors += 1;
            }
        }

        let cutoff = Utc::now()
            - ChronoDuration::seconds(self.config.check_interval.as_secs() as i64);
        let stale = self.requests.list_unresolved(cutoff).await?;

        for request in stale {
            report.checked += 1;
            self.reconcile_one(request, &mut report).await;
        }

        info!(
            checked = report.checked,
            applied = report.applied,
            duplicates = report.duplicates,
            expired = report.expired,
            errors = report.errors,
            recovered = report.recovered,
            "reconciliation sweep finished"
        );
        Ok(report)
    }

    async fn reconcile_one(&self, request: PaymentRequest, report: &mut ReconcileReport) {
        let Some(reference) = request.gateway_reference.clone() else {
            // The gateway never acknowledged this one; it has no reference
            // to query and can only expire.
            if self.past_timeout(&request) {
                self.expire(request.id, report).await;
            }
            return;
        };

        let status = match self.gateway.query_status(&reference).await {
            Ok(status) => status,
            Err(e) => {
                warn!(reference, error = %e, "gateway status check failed");
                report.errors += 1;
                return;
            }
        };

        let outcome = match status {
            GatewayStatus::Succeeded { amount } => PaymentOutcome::Succeeded { amount },
            GatewayStatus::Failed { reason } => {
                debug!(reference, reason, "gateway reported failure");
                PaymentOutcome::Failed
            }
            GatewayStatus::Pending => {
                self.touch(request.id, &reference, report).await;
                return;
            }
            GatewayStatus::Unknown => {
                if self.past_timeout(&request) {
                    self.expire(request.id, report).await;
                } else {
                    self.touch(request.id, &reference, report).await;
                }
                return;
            }
        };

        match self.engine.commit_payment(&reference, outcome).await {
            Ok(CommitDisposition::Applied) => report.applied += 1,
            Ok(_) => report.duplicates += 1,
            Err(e) => {
                warn!(reference, error = %e, "commit from reconciliation failed");
                report.errors += 1;
            }
        }
    }

    /// Records a status probe against the freshly stored row. The snapshot
    /// this sweep iterates is stale by the time the gateway answers: a
    /// webhook can commit the payment during the status check, and writing
    /// the old clone back would overwrite that resolution.
    async fn touch(&self, id: Uuid, reference: &str, report: &mut ReconcileReport) {
        let mut current = match self.requests.get(id).await {
            Ok(Some(current)) => current,
            Ok(None) => return,
            Err(e) => {
                warn!(reference, error = %e, "failed to re-read payment request");
                report.errors += 1;
                return;
            }
        };
        if current.is_terminal() {
            debug!(reference, "request resolved during status check");
            return;
        }
        current.touch_checked();
        if let Err(e) = self.requests.update_if_unresolved(current).await {
            warn!(reference, error = %e, "failed to record status check");
            report.errors += 1;
        }
    }

    async fn expire(&self, id: Uuid, report: &mut ReconcileReport) {
        // Same staleness hazard as `touch`: expire the stored row, not the
        // sweep's snapshot, and let the store reject a write that lost the
        // race with a commit.
        let mut current = match self.requests.get(id).await {
            Ok(Some(current)) => current,
            Ok(None) => return,
            Err(e) => {
                warn!(request = %id, error = %e, "failed to re-read payment request");
                report.errors += 1;
                return;
            }
        };
        if current.is_terminal() {
            debug!(request = %id, state = %current.state, "expiry skipped");
            report.duplicates += 1;
            return;
        }
        if let Err(e) = current.expire() {
            debug!(request = %id, error = %e, "expiry skipped");
            report.duplicates += 1;
            return;
        }
        match self.requests.update_if_unresolved(current).await {
            Ok(true) => {
                info!(request = %id, "payment request expired without resolution");
                report.expired += 1;
            }
            Ok(false) => {
                debug!(request = %id, "expiry skipped");
                report.duplicates += 1;
            }
            Err(e) => {
                warn!(request = %id, error = %e, "failed to persist expiry");
                report.errors += 1;
            }
        }
    }

    fn past_timeout(&self, request: &PaymentRequest) -> bool {
        let age = Utc::now() - request.created_at;
        age > ChronoDuration::seconds(self.config.pending_timeout.as_secs() as i64)
    }

    /// Background sweep loop. Runs until the shutdown channel flips to
    /// `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown_rx: tokio::sync::watch::Receiver<bool>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.config.poll_interval, "reconciler started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile_pending().await {
                        warn!(error = %e, "reconciliation sweep failed");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("reconciler shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }
}
