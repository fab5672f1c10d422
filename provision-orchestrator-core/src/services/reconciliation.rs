//! Reconciliation scheduler
//!
//! Periodic read-then-delegate sweep: `sync` every active or suspended service and feed
//! discrepancies back through the orchestrator under the service lease. Pending domain
//! orders with a transfer in flight are polled with `transfer_sync` instead. Never calls
//! a mutating module operation itself.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::watch;

use super::lease::ServiceLease;
use super::orchestrator::LifecycleOrchestrator;
use crate::error::CoreResult;
use crate::settings::ReconciliationSettings;
use crate::types::{
    CallScope, Discrepancy, Operation, ProvisioningEvent, Service, ServiceState, SyncStatus,
    TransferState, TransitionReason, TransitionRequest,
};

/// Counts for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub checked: usize,
    /// Lifecycle transitions enqueued from a discrepancy.
    pub transitioned: usize,
    pub expiry_updated: usize,
    /// Skipped because another transition held the lease.
    pub busy: usize,
    /// No `sync` capability or no external id yet.
    pub unsupported: usize,
    pub failed: usize,
    /// Discrepancies reported but not acted on.
    pub mismatches: usize,
    pub deferred_flushed: usize,
}

enum Verdict {
    Busy,
    Unsupported,
    Failed,
    Checked {
        transitioned: bool,
        expiry_updated: bool,
        mismatch: bool,
    },
}

pub struct ReconciliationScheduler {
    orchestrator: Arc<LifecycleOrchestrator>,
    settings: ReconciliationSettings,
}

impl ReconciliationScheduler {
    #[must_use]
    pub fn new(orchestrator: Arc<LifecycleOrchestrator>, settings: ReconciliationSettings) -> Self {
        Self {
            orchestrator,
            settings,
        }
    }

    /// Runs passes on the configured interval until `shutdown` turns true.
    pub async fn run_forever(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_pass().await {
                        log::error!("Reconciliation pass failed: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        log::info!("Reconciliation scheduler stopped");
                        return;
                    }
                }
            }
        }
    }

    /// One sweep over all active and suspended services and all pending transfers.
    pub async fn run_pass(&self) -> CoreResult<ReconciliationReport> {
        let ctx = self.orchestrator.context();
        let mut report = ReconciliationReport {
            deferred_flushed: self.flush_deferred().await,
            ..ReconciliationReport::default()
        };

        let services = ctx
            .service_repository
            .find_by_states(&[ServiceState::Active, ServiceState::Suspended, ServiceState::Pending])
            .await?
            .into_iter()
            .filter(|s| s.state != ServiceState::Pending || s.pending_transfer().is_some());
        let verdicts: Vec<Verdict> = stream::iter(services)
            .map(|service| self.reconcile(service))
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        for verdict in verdicts {
            match verdict {
                Verdict::Busy => report.busy += 1,
                Verdict::Unsupported => report.unsupported += 1,
                Verdict::Failed => report.failed += 1,
                Verdict::Checked {
                    transitioned,
                    expiry_updated,
                    mismatch,
                } => {
                    report.checked += 1;
                    report.transitioned += usize::from(transitioned);
                    report.expiry_updated += usize::from(expiry_updated);
                    report.mismatches += usize::from(mismatch);
                }
            }
        }

        ctx.leases.prune();
        log::info!(
            "Reconciliation pass: {} checked, {} transitioned, {} expiry updated, {} busy, {} unsupported, {} failed, {} mismatches, {} deferred writes flushed",
            report.checked,
            report.transitioned,
            report.expiry_updated,
            report.busy,
            report.unsupported,
            report.failed,
            report.mismatches,
            report.deferred_flushed
        );
        Ok(report)
    }

    /// Re-applies queued local writes. Busy services keep theirs for the next pass.
    async fn flush_deferred(&self) -> usize {
        let ctx = self.orchestrator.context();
        let mut flushed = 0;
        for write in ctx.deferred_writes.snapshot() {
            let id = write.service.id.clone();
            let Some(_lease) = ctx.leases.try_acquire(&id) else {
                continue;
            };
            match ctx.service_repository.find_by_id(&id).await {
                Ok(Some(stored)) if stored.version >= write.service.version => {
                    log::debug!("Deferred write for service {id} superseded by version {}", stored.version);
                    ctx.deferred_writes.settle(&id, stored.version);
                    continue;
                }
                Err(e) => {
                    ctx.deferred_writes.record_failure(&id, &e.to_string());
                    continue;
                }
                Ok(_) => {}
            }
            match ctx.service_repository.save(&write.service).await {
                Ok(()) => {
                    if let Some(settled) = ctx.deferred_writes.settle(&id, write.service.version) {
                        if let Some(change) = settled.event {
                            ctx.publish(ProvisioningEvent::StateChanged(change));
                        }
                    }
                    log::info!(
                        "Applied deferred write for service {id} (version {}, {} earlier attempt(s))",
                        write.service.version,
                        write.attempts
                    );
                    flushed += 1;
                }
                Err(e) => {
                    log::warn!("Deferred write for service {id} failed again: {e}");
                    ctx.deferred_writes.record_failure(&id, &e.to_string());
                }
            }
        }
        flushed
    }

    async fn reconcile(&self, listed: Service) -> Verdict {
        let ctx = self.orchestrator.context();
        let Some(lease) = ctx.leases.try_acquire(&listed.id) else {
            log::debug!("Service {} is busy, skipping this pass", listed.id);
            return Verdict::Busy;
        };

        // 持有租约后重新读取
        let service = match ctx.get_service(&listed.id).await {
            Ok(service) => service,
            Err(e) => {
                log::error!("Cannot load service {}: {e}", listed.id);
                return Verdict::Failed;
            }
        };
        if let Some(transfer_id) = service.pending_transfer().map(str::to_string) {
            return self.reconcile_transfer(&lease, &service, transfer_id).await;
        }
        if !service.state.is_reconciled() {
            return Verdict::Checked {
                transitioned: false,
                expiry_updated: false,
                mismatch: false,
            };
        }
        let Some(external_id) = service.external_id.clone() else {
            return Verdict::Unsupported;
        };
        let resolved = match ctx.resolve_module(&service).await {
            Ok(resolved) => resolved,
            Err(e) => {
                log::warn!("Cannot resolve module for service {}: {e}", service.id);
                return Verdict::Failed;
            }
        };
        if !resolved.supports(Operation::Sync) {
            return Verdict::Unsupported;
        }

        let id = external_id.clone();
        let synced = self
            .orchestrator
            .call_logger()
            .invoke(
                &CallScope::service(&service.id),
                &resolved,
                Operation::Sync,
                &serde_json::json!({ "externalId": external_id }),
                move |m, call_ctx| async move { m.sync(&call_ctx, &id).await },
            )
            .await;
        let status = match synced {
            Ok(status) => status,
            Err(failure) if failure.is_not_found() => {
                log::warn!(
                    "Service {} is {} locally but {external_id} does not exist at {}",
                    service.id,
                    service.state,
                    failure.provider
                );
                return Verdict::Checked {
                    transitioned: false,
                    expiry_updated: false,
                    mismatch: true,
                };
            }
            Err(failure) => {
                log::warn!("Sync of service {} failed: {failure}", service.id);
                return Verdict::Failed;
            }
        };

        self.apply(&lease, &service, &status).await
    }

    /// Polls a transfer-in. Completion activates the order without a module call;
    /// a failed transfer moves it to `failed`.
    async fn reconcile_transfer(&self, lease: &ServiceLease, service: &Service, transfer_id: String) -> Verdict {
        let ctx = self.orchestrator.context();
        let resolved = match ctx.resolve_module(service).await {
            Ok(resolved) => resolved,
            Err(e) => {
                log::warn!("Cannot resolve module for service {}: {e}", service.id);
                return Verdict::Failed;
            }
        };
        if !resolved.supports(Operation::TransferSync) {
            return Verdict::Unsupported;
        }

        let payload = serde_json::json!({ "transferId": transfer_id });
        let id = transfer_id.clone();
        let status = match self
            .orchestrator
            .call_logger()
            .invoke(
                &CallScope::service(&service.id),
                &resolved,
                Operation::TransferSync,
                &payload,
                move |m, call_ctx| async move { m.transfer_sync(&call_ctx, &id).await },
            )
            .await
        {
            Ok(status) => status,
            Err(failure) => {
                log::warn!("Transfer status of service {} unavailable: {failure}", service.id);
                return Verdict::Failed;
            }
        };

        match status.state {
            TransferState::Pending => {
                log::debug!("Transfer {transfer_id} of service {} still pending", service.id);
                Verdict::Checked {
                    transitioned: false,
                    expiry_updated: false,
                    mismatch: false,
                }
            }
            TransferState::Completed => {
                let request = TransitionRequest::new(
                    &service.id,
                    ServiceState::Active,
                    TransitionReason::Reconciliation {
                        discrepancy: Discrepancy::TransferCompleted,
                    },
                )
                .already_applied();
                let transitioned = match self.orchestrator.run_locked(lease, request).await {
                    Ok(outcome) => outcome.applied,
                    Err(e) => {
                        log::error!("Activating transferred service {} failed: {e}", service.id);
                        return Verdict::Failed;
                    }
                };
                let mut expiry_updated = false;
                if let Some(expiry) = status.expiry_date {
                    match self.orchestrator.update_expiry_locked(lease, &service.id, expiry).await {
                        Ok(_) => expiry_updated = true,
                        Err(e) => {
                            log::error!("Failed to update expiry of service {}: {e}", service.id);
                            return Verdict::Failed;
                        }
                    }
                }
                log::info!("Transfer {transfer_id} completed, service {} is active", service.id);
                Verdict::Checked {
                    transitioned,
                    expiry_updated,
                    mismatch: false,
                }
            }
            TransferState::Failed => {
                let detail = status.detail.as_deref().unwrap_or("transfer failed");
                if let Err(e) = self
                    .orchestrator
                    .fail_transfer_locked(lease, &service.id, detail)
                    .await
                {
                    log::error!("Recording failed transfer of service {} failed: {e}", service.id);
                    return Verdict::Failed;
                }
                Verdict::Checked {
                    transitioned: true,
                    expiry_updated: false,
                    mismatch: false,
                }
            }
        }
    }

    /// Acts on one sync result. Only lifecycle transitions through the orchestrator.
    async fn apply(&self, lease: &ServiceLease, service: &Service, status: &SyncStatus) -> Verdict {
        let mut transitioned = false;
        let mut mismatch = false;

        let discrepancy = if status.transferred_away {
            Some((ServiceState::Terminated, Discrepancy::TransferredAway))
        } else if status.expired && service.state == ServiceState::Active {
            Some((ServiceState::Suspended, Discrepancy::Expired))
        } else {
            None
        };

        if let Some((target, discrepancy)) = discrepancy {
            let mut request = TransitionRequest::new(
                &service.id,
                target,
                TransitionReason::Reconciliation { discrepancy },
            );
            // 域名已转出：远端已不存在，不再调用 terminate
            if discrepancy == Discrepancy::TransferredAway {
                request = request.already_applied();
            }
            log::info!(
                "Service {}: provider reports {discrepancy:?}, moving {} -> {target}",
                service.id,
                service.state
            );
            match self.orchestrator.run_locked(lease, request).await {
                Ok(outcome) => transitioned = outcome.applied,
                Err(e) => {
                    log::error!("Reconciliation transition for service {} failed: {e}", service.id);
                    return Verdict::Failed;
                }
            }
        } else if !status.active && service.state == ServiceState::Active {
            log::warn!(
                "Service {} is active locally but inactive at the provider; not acting on it",
                service.id
            );
            mismatch = true;
        } else if status.active && service.state == ServiceState::Suspended {
            log::warn!(
                "Service {} is suspended locally but active at the provider; not acting on it",
                service.id
            );
            mismatch = true;
        }

        let mut expiry_updated = false;
        if let Some(remote) = status.expiry_date {
            let drift = service.expiry_drift_days(Some(remote));
            if drift.is_none_or(|days| days > self.settings.expiry_tolerance_days) {
                match self
                    .orchestrator
                    .update_expiry_locked(lease, &service.id, remote)
                    .await
                {
                    Ok(_) => expiry_updated = true,
                    Err(e) => {
                        log::error!("Failed to update expiry of service {}: {e}", service.id);
                        return Verdict::Failed;
                    }
                }
            }
        }

        Verdict::Checked {
            transitioned,
            expiry_updated,
            mismatch,
        }
    }
}
