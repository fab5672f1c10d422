//! Lifecycle orchestrator
//!
//! Executes lifecycle transitions against the bound module, one transition per service
//! at a time. A transition holds the service lease from its first read to its last
//! write, retries included, so a second request always sees the first one's result.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use provision_orchestrator_module::LookupCache;

use super::call_logger::CallLogger;
use super::deferred::DeferredWrite;
use super::lease::ServiceLease;
use super::retry::RetryPolicy;
use super::ServiceContext;
use crate::error::{CallFailure, CoreError, CoreResult};
use crate::registry::ResolvedModule;
use crate::types::{
    CallScope, CreateAccountRequest, CreatedAccount, Discrepancy, ErrorCategory, FailureDetail,
    NewService, Operation, OperatorAlert, ProvisioningEvent, RemotePolicy, RenewOutcome,
    ResourceChange, Service, ServiceCategory, ServiceState, StateChange, TransferRequest,
    TransferStarted, TransitionOutcome, TransitionPlan, TransitionReason, TransitionRequest,
    TRANSFER_ID_META,
};

/// Handle to a transition accepted by [`LifecycleOrchestrator::request_transition`].
#[derive(Debug)]
pub struct TransitionTicket {
    pub transition_id: Uuid,
    pub service_id: String,
    handle: JoinHandle<CoreResult<TransitionOutcome>>,
}

impl TransitionTicket {
    /// Waits for the worker to finish.
    pub async fn wait(self) -> CoreResult<TransitionOutcome> {
        self.handle
            .await
            .map_err(|e| CoreError::WorkerFailed(e.to_string()))?
    }
}

/// One remote call a transition needs.
enum LifecycleCall {
    Create(CreateAccountRequest),
    Suspend,
    Unsuspend,
    Terminate,
    ChangeResources(ResourceChange),
    ChangeCredential(String),
    Renew(u32),
    Transfer(TransferRequest),
}

impl LifecycleCall {
    fn operation(&self) -> Operation {
        match self {
            Self::Create(_) => Operation::CreateAccount,
            Self::Suspend => Operation::SuspendAccount,
            Self::Unsuspend => Operation::UnsuspendAccount,
            Self::Terminate => Operation::TerminateAccount,
            Self::ChangeResources(_) => Operation::ChangeResources,
            Self::ChangeCredential(_) => Operation::ChangeCredential,
            Self::Renew(_) => Operation::Renew,
            Self::Transfer(_) => Operation::TransferDomain,
        }
    }

    fn for_transition(operation: Operation, service: &Service) -> CoreResult<Self> {
        match operation {
            Operation::CreateAccount => Ok(Self::Create(service.resources.clone())),
            Operation::SuspendAccount => Ok(Self::Suspend),
            Operation::UnsuspendAccount => Ok(Self::Unsuspend),
            Operation::TerminateAccount => Ok(Self::Terminate),
            // 转入需要授权码，由 start_transfer 提交，由对账完成
            Operation::TransferDomain => Err(CoreError::Validation(match service.pending_transfer() {
                Some(id) => format!(
                    "transfer {id} of service {} is in progress and completes through reconciliation",
                    service.id
                ),
                None => format!(
                    "service {} is a transfer-in; resubmit it with its authorisation code",
                    service.id
                ),
            })),
            other => Err(CoreError::Validation(format!(
                "{other} is not a lifecycle transition"
            ))),
        }
    }

    /// Values to redact from this call's records.
    fn secrets(&self, service: &Service) -> Vec<String> {
        let mut secrets: Vec<String> = service.resources.password.iter().cloned().collect();
        match self {
            Self::ChangeCredential(secret) => secrets.push(secret.clone()),
            Self::Transfer(request) => secrets.push(request.auth_code.clone()),
            _ => {}
        }
        secrets
    }
}

enum RemoteEffect {
    Created(CreatedAccount),
    Acked,
    Renewed(RenewOutcome),
    TransferStarted(TransferStarted),
}

/// Result of the ambiguity check that precedes a repeated create.
enum Probe {
    /// The resource exists under this id.
    Exists(String),
    Absent,
    /// The provider cannot be asked.
    Unknown,
}

/// Calls made for one transition share its id and lookup cache.
struct TransitionScope {
    service_id: String,
    transition_id: Uuid,
    secrets: Vec<String>,
    cache: Arc<LookupCache>,
}

impl TransitionScope {
    fn attempt(&self, attempt: u32) -> CallScope {
        CallScope {
            service_id: Some(self.service_id.clone()),
            transition_id: Some(self.transition_id),
            attempt,
            secrets: self.secrets.clone(),
            cache: Arc::clone(&self.cache),
        }
    }
}

struct Driven {
    result: Result<RemoteEffect, CallFailure>,
    calls: u32,
    attempts: u32,
}

fn external_id_payload(external_id: &str) -> serde_json::Value {
    serde_json::json!({ "externalId": external_id })
}

/// Lifecycle orchestrator
pub struct LifecycleOrchestrator {
    ctx: Arc<ServiceContext>,
    call_logger: Arc<CallLogger>,
    retry: RetryPolicy,
}

impl LifecycleOrchestrator {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>, call_logger: Arc<CallLogger>, retry: RetryPolicy) -> Self {
        Self {
            ctx,
            call_logger,
            retry,
        }
    }

    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.ctx
    }

    pub fn call_logger(&self) -> &Arc<CallLogger> {
        &self.call_logger
    }

    /// Creates a `pending` service for a paid order.
    ///
    /// The product must be active; the service is bound to the product's module for
    /// the rest of its life.
    pub async fn register_service(&self, new: NewService) -> CoreResult<Service> {
        if new.client_id.trim().is_empty() {
            return Err(CoreError::Validation("client id is required".to_string()));
        }
        if new.resources.domain.trim().is_empty() {
            return Err(CoreError::Validation("domain is required".to_string()));
        }
        let product = self.ctx.module_registry.product(&new.product_id).await?;
        if !product.active {
            return Err(CoreError::ProductInactive(product.id));
        }

        let now = Utc::now();
        let service = Service {
            id: Uuid::new_v4().to_string(),
            client_id: new.client_id,
            product_id: product.id,
            module_id: product.module_id,
            category: product.category,
            state: ServiceState::Pending,
            external_id: None,
            provider_meta: BTreeMap::new(),
            resources: new.resources,
            expiry_date: new.expiry_date,
            suspension_reason: None,
            failure: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.ctx.service_repository.save(&service).await?;
        log::info!(
            "Registered service {} for client {} on product {}",
            service.id,
            service.client_id,
            service.product_id
        );
        Ok(service)
    }

    /// Decides how a service reaches `target` from where it is.
    ///
    /// A failed service is planned from the state its failure interrupted.
    pub fn plan(service: &Service, target: ServiceState) -> CoreResult<TransitionPlan> {
        use ServiceState::{Active, Failed, Pending, Suspended, Terminated};

        let current = service.effective_state();
        let plan = match (current, target) {
            (_, Pending | Failed) => {
                return Err(CoreError::Validation(format!(
                    "'{target}' cannot be requested as a target state"
                )))
            }
            (Terminated, Terminated) => TransitionPlan::NoOp,
            (Terminated, _) => {
                return Err(CoreError::InvalidTransition {
                    from: Terminated,
                    to: target,
                })
            }
            (Pending, Active) if service.is_transfer_in() => {
                TransitionPlan::Remote(Operation::TransferDomain)
            }
            (Pending, Active) => TransitionPlan::Remote(Operation::CreateAccount),
            (Pending, Terminated) if service.external_id.is_none() => TransitionPlan::LocalOnly,
            (Pending | Active | Suspended, Terminated) => {
                TransitionPlan::Remote(Operation::TerminateAccount)
            }
            (Active, Active) | (Suspended, Suspended) => TransitionPlan::NoOp,
            (Active, Suspended) => TransitionPlan::Remote(Operation::SuspendAccount),
            (Suspended, Active) => TransitionPlan::Remote(Operation::UnsuspendAccount),
            (from, to) => return Err(CoreError::InvalidTransition { from, to }),
        };
        // 已在目标状态的失败服务：只清除失败标记
        if service.state == Failed && plan == TransitionPlan::NoOp {
            return Ok(TransitionPlan::LocalOnly);
        }
        Ok(plan)
    }

    /// Billing entry point. Validates against the current state, then runs the
    /// transition on its own worker.
    pub async fn request_transition(
        self: &Arc<Self>,
        service_id: &str,
        target: ServiceState,
        reason: TransitionReason,
    ) -> CoreResult<TransitionTicket> {
        let service = self.ctx.get_service(service_id).await?;
        if let TransitionPlan::Remote(operation) = Self::plan(&service, target)? {
            LifecycleCall::for_transition(operation, &service)?;
            let resolved = self.ctx.resolve_module(&service).await?;
            if operation == Operation::CreateAccount {
                resolved.require(operation)?;
            }
        }

        let request = TransitionRequest::new(service_id, target, reason);
        let transition_id = request.id;
        log::info!(
            "Accepted transition {transition_id}: service {service_id} -> {target} ({})",
            request.reason
        );
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.execute(request).await });
        Ok(TransitionTicket {
            transition_id,
            service_id: service_id.to_string(),
            handle,
        })
    }

    /// Runs a transition on the caller's task, waiting for the service lease.
    pub async fn execute(&self, request: TransitionRequest) -> CoreResult<TransitionOutcome> {
        let lease = self.ctx.leases.acquire(&request.service_id).await;
        self.run_locked(&lease, request).await
    }

    /// Runs a transition under a lease the caller already holds.
    pub async fn run_locked(
        &self,
        lease: &ServiceLease,
        request: TransitionRequest,
    ) -> CoreResult<TransitionOutcome> {
        check_lease(lease, &request.service_id)?;
        let service = self.ctx.get_service(&request.service_id).await?;
        let from = service.state;

        let (service, applied, module_calls) = match Self::plan(&service, request.target)? {
            TransitionPlan::NoOp => {
                log::debug!("Service {} already {}", service.id, request.target);
                (service, false, 0)
            }
            TransitionPlan::LocalOnly => (self.commit(service, &request, None, false).await?, true, 0),
            TransitionPlan::Remote(_) if request.remote == RemotePolicy::AlreadyApplied => {
                (self.commit(service, &request, None, true).await?, true, 0)
            }
            TransitionPlan::Remote(operation) => {
                let resolved = self.ctx.resolve_module(&service).await?;
                if !resolved.supports(operation) {
                    if !matches!(
                        operation,
                        Operation::SuspendAccount
                            | Operation::UnsuspendAccount
                            | Operation::TerminateAccount
                    ) {
                        return Err(CoreError::CapabilityNotSupported {
                            module: resolved.module_id().to_string(),
                            operation,
                        });
                    }
                    log::info!(
                        "Module {} has no {operation}; applying {} -> {} to service {} locally",
                        resolved.module_id(),
                        from,
                        request.target,
                        service.id
                    );
                    (self.commit(service, &request, None, false).await?, true, 0)
                } else {
                    let call = LifecycleCall::for_transition(operation, &service)?;
                    let driven = self.drive(&service, &resolved, request.id, &call).await;
                    match driven.result {
                        Ok(effect) => (
                            self.commit(service, &request, Some(effect), true).await?,
                            true,
                            driven.calls,
                        ),
                        Err(failure) => {
                            return Err(self
                                .fail(service, &request, &resolved, failure, driven.attempts)
                                .await)
                        }
                    }
                }
            }
        };

        Ok(TransitionOutcome {
            transition_id: request.id,
            from,
            service,
            applied,
            module_calls,
        })
    }

    /// Resize / package change. Only an active service can be resized; on failure the
    /// state and the resource snapshot are left unchanged.
    pub async fn change_resources(&self, service_id: &str, change: ResourceChange) -> CoreResult<Service> {
        if change.options.is_empty() {
            return Err(CoreError::Validation("no resource options to change".to_string()));
        }
        let lease = self.ctx.leases.acquire(service_id).await;
        let mut service = self.ctx.get_service(service_id).await?;
        if service.state != ServiceState::Active {
            return Err(CoreError::InvalidTransition {
                from: service.state,
                to: ServiceState::Active,
            });
        }
        let call = LifecycleCall::ChangeResources(change.clone());
        self.invoke_on_service(&lease, &service, &call).await?;

        service.resources.options.extend(change.options);
        touch(&mut service);
        self.persist(&service, None, true).await?;
        Ok(service)
    }

    /// Sets a new account password / secret.
    pub async fn change_credential(&self, service_id: &str, new_secret: &str) -> CoreResult<Service> {
        if new_secret.is_empty() {
            return Err(CoreError::Validation("new secret is empty".to_string()));
        }
        let lease = self.ctx.leases.acquire(service_id).await;
        let mut service = self.ctx.get_service(service_id).await?;
        if !service.state.is_reconciled() {
            return Err(CoreError::Validation(format!(
                "cannot change the credential of a {} service",
                service.state
            )));
        }
        let call = LifecycleCall::ChangeCredential(new_secret.to_string());
        self.invoke_on_service(&lease, &service, &call).await?;

        service.resources.password = Some(new_secret.to_string());
        touch(&mut service);
        self.persist(&service, None, true).await?;
        Ok(service)
    }

    /// Renews a domain registration.
    pub async fn renew(&self, service_id: &str, years: u32) -> CoreResult<Service> {
        if years == 0 || years > 10 {
            return Err(CoreError::Validation(format!(
                "renewal period must be 1-10 years, got {years}"
            )));
        }
        let lease = self.ctx.leases.acquire(service_id).await;
        let mut service = self.ctx.get_service(service_id).await?;
        if service.category != ServiceCategory::Domain {
            return Err(CoreError::Validation(format!(
                "service {service_id} is not a domain"
            )));
        }
        if !service.state.is_reconciled() {
            return Err(CoreError::Validation(format!(
                "cannot renew a {} domain",
                service.state
            )));
        }
        let effect = self
            .invoke_on_service(&lease, &service, &LifecycleCall::Renew(years))
            .await?;

        let old = service.expiry_date;
        if let RemoteEffect::Renewed(RenewOutcome {
            expiry_date: Some(date),
        }) = effect
        {
            service.expiry_date = Some(date);
        }
        touch(&mut service);
        self.persist(&service, None, true).await?;
        if let Some(new) = service.expiry_date.filter(|d| Some(*d) != old) {
            self.ctx.publish(ProvisioningEvent::ExpiryUpdated {
                service_id: service.id.clone(),
                old,
                new,
            });
        }
        Ok(service)
    }

    /// Submits a transfer-in for a pending domain order.
    ///
    /// The service stays `pending` with the transfer id in its provider data until
    /// reconciliation sees the transfer complete or fail. A rejected submission leaves
    /// the service untouched.
    pub async fn start_transfer(&self, service_id: &str, auth_code: &str) -> CoreResult<Service> {
        let auth_code = auth_code.trim();
        if auth_code.is_empty() {
            return Err(CoreError::Validation("authorisation code is required".to_string()));
        }
        let _lease = self.ctx.leases.acquire(service_id).await;
        let mut service = self.ctx.get_service(service_id).await?;
        if service.category != ServiceCategory::Domain {
            return Err(CoreError::Validation(format!(
                "service {service_id} is not a domain"
            )));
        }
        if let Some(id) = service.pending_transfer() {
            return Err(CoreError::Validation(format!(
                "transfer {id} of service {service_id} is already in progress"
            )));
        }
        if service.effective_state() != ServiceState::Pending || service.external_id.is_some() {
            return Err(CoreError::Validation(format!(
                "cannot transfer in a {} domain",
                service.state
            )));
        }
        let resolved = self.ctx.resolve_module(&service).await?;
        resolved.require(Operation::TransferDomain)?;

        let call = LifecycleCall::Transfer(TransferRequest {
            domain: service.resources.domain.trim().to_ascii_lowercase(),
            auth_code: auth_code.to_string(),
            years: service.resources.registration_years.unwrap_or(1).max(1),
        });
        let driven = self.drive(&service, &resolved, Uuid::new_v4(), &call).await;
        let effect = driven.result.map_err(|failure| {
            log::error!(
                "Transfer of service {service_id} was not accepted after {} attempt(s): {failure}",
                driven.attempts
            );
            CoreError::ModuleCall(failure)
        })?;
        if let RemoteEffect::TransferStarted(started) = effect {
            service.provider_meta.extend(started.meta);
            service
                .provider_meta
                .insert(TRANSFER_ID_META.to_string(), started.transfer_id);
        }

        let from = service.state;
        service.state = ServiceState::Pending;
        service.failure = None;
        touch(&mut service);
        let change = (from != ServiceState::Pending).then(|| StateChange {
            service_id: service.id.clone(),
            old_state: from,
            new_state: ServiceState::Pending,
            reason: TransitionReason::ManualRetry,
            transition_id: Uuid::new_v4(),
            at: service.updated_at,
        });
        self.persist(&service, change, true).await?;
        log::info!(
            "Transfer {} of {} submitted for service {service_id}",
            service.provider_meta.get(TRANSFER_ID_META).map_or("-", String::as_str),
            service.resources.domain
        );
        Ok(service)
    }

    /// Records a transfer-in the registrar gave up on: the service goes to `failed`
    /// and the transfer id is dropped, so a new transfer can be submitted.
    pub async fn fail_transfer_locked(
        &self,
        lease: &ServiceLease,
        service_id: &str,
        detail: &str,
    ) -> CoreResult<Service> {
        check_lease(lease, service_id)?;
        let mut service = self.ctx.get_service(service_id).await?;
        let Some(transfer_id) = service.pending_transfer().map(str::to_string) else {
            return Ok(service);
        };
        let resolved = self.ctx.resolve_module(&service).await?;
        service.provider_meta.remove(TRANSFER_ID_META);
        let failure = CallFailure {
            provider: resolved.module_id().to_string(),
            operation: Operation::TransferDomain,
            category: ErrorCategory::Rejected,
            code: "TransferFailed".to_string(),
            message: format!("transfer {transfer_id}: {detail}"),
            retry_after: None,
        };
        let request = TransitionRequest::new(
            service_id,
            ServiceState::Active,
            TransitionReason::Reconciliation {
                discrepancy: Discrepancy::TransferFailed,
            },
        );
        self.fail(service, &request, &resolved, failure, 1).await;
        self.ctx.get_service(service_id).await
    }

    /// Corrects the local expiry date from provider truth. No lifecycle change.
    pub async fn update_expiry_locked(
        &self,
        lease: &ServiceLease,
        service_id: &str,
        expiry: NaiveDate,
    ) -> CoreResult<Service> {
        check_lease(lease, service_id)?;
        let mut service = self.ctx.get_service(service_id).await?;
        let old = service.expiry_date;
        if old == Some(expiry) {
            return Ok(service);
        }
        service.expiry_date = Some(expiry);
        touch(&mut service);
        self.persist(&service, None, true).await?;
        self.ctx.publish(ProvisioningEvent::ExpiryUpdated {
            service_id: service.id.clone(),
            old,
            new: expiry,
        });
        Ok(service)
    }

    /// Single capability-checked remote call for an existing resource, under `lease`.
    async fn invoke_on_service(
        &self,
        lease: &ServiceLease,
        service: &Service,
        call: &LifecycleCall,
    ) -> CoreResult<RemoteEffect> {
        check_lease(lease, &service.id)?;
        let resolved = self.ctx.resolve_module(service).await?;
        resolved.require(call.operation())?;
        if service.external_id.is_none() {
            return Err(CoreError::Validation(format!(
                "service {} has no external id yet",
                service.id
            )));
        }
        let driven = self.drive(service, &resolved, Uuid::new_v4(), call).await;
        driven.result.map_err(|failure| {
            log::error!(
                "{} for service {} failed after {} attempt(s): {failure}",
                call.operation(),
                service.id,
                driven.attempts
            );
            CoreError::ModuleCall(failure)
        })
    }

    /// Calls the module until the call succeeds, is rejected, or retries run out.
    ///
    /// Ambiguous creates and terminations are checked with `sync` before they are
    /// repeated; a create whose resource turns out to exist is adopted instead.
    async fn drive(
        &self,
        service: &Service,
        resolved: &ResolvedModule,
        transition_id: Uuid,
        call: &LifecycleCall,
    ) -> Driven {
        let operation = call.operation();
        let external_id = service.external_id.clone().unwrap_or_default();
        let scope = TransitionScope {
            service_id: service.id.clone(),
            transition_id,
            secrets: call.secrets(service),
            cache: Arc::new(LookupCache::default()),
        };
        let mut calls = 0;

        if let LifecycleCall::Create(request) = call {
            if self.has_unresolved_create(&service.id).await {
                log::warn!(
                    "Service {} has an unresolved create; checking the provider first",
                    service.id
                );
                let (probe, probe_calls) = self.probe_existing(&scope.attempt(1), resolved, request).await;
                calls += probe_calls;
                match probe {
                    Probe::Exists(id) => {
                        return Driven {
                            result: Ok(adopt(&service.id, id)),
                            calls,
                            attempts: 0,
                        }
                    }
                    Probe::Absent => {}
                    Probe::Unknown => {
                        return Driven {
                            result: Err(CallFailure {
                                provider: resolved.module_id().to_string(),
                                operation,
                                category: ErrorCategory::Ambiguous,
                                code: "Unresolved".to_string(),
                                message: "an earlier create is unresolved and the provider cannot confirm whether it took effect".to_string(),
                                retry_after: None,
                            }),
                            calls,
                            attempts: 0,
                        }
                    }
                }
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            calls += 1;
            let failure = match self
                .call_once(&scope.attempt(attempt), resolved, &external_id, call)
                .await
            {
                Ok(effect) => {
                    return Driven {
                        result: Ok(effect),
                        calls,
                        attempts: attempt,
                    }
                }
                Err(failure) => failure,
            };

            let retryable = match failure.category {
                ErrorCategory::Rejected => false,
                ErrorCategory::Transient => true,
                ErrorCategory::Ambiguous => match call {
                    LifecycleCall::Create(request) => {
                        let (probe, probe_calls) = self
                            .probe_existing(&scope.attempt(attempt), resolved, request)
                            .await;
                        calls += probe_calls;
                        match probe {
                            Probe::Exists(id) => {
                                return Driven {
                                    result: Ok(adopt(&service.id, id)),
                                    calls,
                                    attempts: attempt,
                                }
                            }
                            Probe::Absent => true,
                            Probe::Unknown => false,
                        }
                    }
                    LifecycleCall::Terminate => {
                        let (gone, check_calls) = self
                            .confirm_gone(&scope.attempt(attempt), resolved, &external_id)
                            .await;
                        calls += check_calls;
                        match gone {
                            Some(true) => {
                                return Driven {
                                    result: Ok(RemoteEffect::Acked),
                                    calls,
                                    attempts: attempt,
                                }
                            }
                            Some(false) => true,
                            None => false,
                        }
                    }
                    LifecycleCall::Suspend
                    | LifecycleCall::Unsuspend
                    | LifecycleCall::ChangeCredential(_) => true,
                    LifecycleCall::ChangeResources(_)
                    | LifecycleCall::Renew(_)
                    | LifecycleCall::Transfer(_) => false,
                },
            };

            if !retryable || !self.retry.allows_retry(attempt) {
                return Driven {
                    result: Err(failure),
                    calls,
                    attempts: attempt,
                };
            }
            let delay = self.retry.delay_after(attempt, failure.retry_after);
            log::warn!(
                "Retrying {operation} for service {} in {delay:?} after attempt {attempt}/{} ({}): {failure}",
                service.id,
                self.retry.max_attempts,
                failure.category
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn call_once(
        &self,
        scope: &CallScope,
        resolved: &ResolvedModule,
        external_id: &str,
        call: &LifecycleCall,
    ) -> Result<RemoteEffect, CallFailure> {
        let logger = &self.call_logger;
        let operation = call.operation();
        let ext = external_id.to_string();
        match call {
            LifecycleCall::Create(request) => {
                let request = request.clone();
                let payload = serde_json::to_value(&request).unwrap_or_default();
                logger
                    .invoke(scope, resolved, operation, &payload, move |m, ctx| async move {
                        m.create_account(&ctx, &request).await
                    })
                    .await
                    .map(RemoteEffect::Created)
            }
            LifecycleCall::Suspend => logger
                .invoke(
                    scope,
                    resolved,
                    operation,
                    &external_id_payload(external_id),
                    move |m, ctx| async move { m.suspend_account(&ctx, &ext).await },
                )
                .await
                .map(|_| RemoteEffect::Acked),
            LifecycleCall::Unsuspend => logger
                .invoke(
                    scope,
                    resolved,
                    operation,
                    &external_id_payload(external_id),
                    move |m, ctx| async move { m.unsuspend_account(&ctx, &ext).await },
                )
                .await
                .map(|_| RemoteEffect::Acked),
            LifecycleCall::Terminate => logger
                .invoke(
                    scope,
                    resolved,
                    operation,
                    &external_id_payload(external_id),
                    move |m, ctx| async move { m.terminate_account(&ctx, &ext).await },
                )
                .await
                .map(|_| RemoteEffect::Acked),
            LifecycleCall::ChangeResources(change) => {
                let change = change.clone();
                let payload = serde_json::json!({ "externalId": external_id, "options": change.options });
                logger
                    .invoke(scope, resolved, operation, &payload, move |m, ctx| async move {
                        m.change_resources(&ctx, &ext, &change).await
                    })
                    .await
                    .map(|_| RemoteEffect::Acked)
            }
            LifecycleCall::ChangeCredential(secret) => {
                let secret = secret.clone();
                let payload = serde_json::json!({ "externalId": external_id, "newSecret": secret });
                logger
                    .invoke(scope, resolved, operation, &payload, move |m, ctx| async move {
                        m.change_credential(&ctx, &ext, &secret).await
                    })
                    .await
                    .map(|_| RemoteEffect::Acked)
            }
            LifecycleCall::Renew(years) => {
                let years = *years;
                let payload = serde_json::json!({ "externalId": external_id, "years": years });
                logger
                    .invoke(scope, resolved, operation, &payload, move |m, ctx| async move {
                        m.renew(&ctx, &ext, years).await
                    })
                    .await
                    .map(RemoteEffect::Renewed)
            }
            LifecycleCall::Transfer(request) => {
                let request = request.clone();
                let payload = serde_json::json!({
                    "domain": request.domain,
                    "years": request.years,
                    "authCode": request.auth_code,
                });
                logger
                    .invoke(scope, resolved, operation, &payload, move |m, ctx| async move {
                        m.transfer_domain(&ctx, &request).await
                    })
                    .await
                    .map(RemoteEffect::TransferStarted)
            }
        }
    }

    async fn has_unresolved_create(&self, service_id: &str) -> bool {
        match self
            .ctx
            .call_log_repository
            .find_unresolved(service_id, Operation::CreateAccount)
            .await
        {
            Ok(records) => !records.is_empty(),
            Err(e) => {
                log::warn!("Cannot read call log for service {service_id}, assuming unresolved: {e}");
                true
            }
        }
    }

    /// Looks for a resource an earlier create may have made.
    async fn probe_existing(
        &self,
        scope: &CallScope,
        resolved: &ResolvedModule,
        request: &CreateAccountRequest,
    ) -> (Probe, u32) {
        let Some(candidate) = resolved.module.probe_external_id(request) else {
            return (Probe::Unknown, 0);
        };
        if !resolved.supports(Operation::Sync) {
            return (Probe::Unknown, 0);
        }
        let id = candidate.clone();
        let result = self
            .call_logger
            .invoke(
                scope,
                resolved,
                Operation::Sync,
                &external_id_payload(&candidate),
                move |m, ctx| async move { m.sync(&ctx, &id).await },
            )
            .await;
        let probe = match result {
            Ok(status) if !status.transferred_away => Probe::Exists(candidate),
            Ok(_) => Probe::Absent,
            Err(failure) if failure.is_not_found() => Probe::Absent,
            Err(_) => Probe::Unknown,
        };
        (probe, 1)
    }

    /// `Some(true)` when the provider no longer has the resource, `None` when it
    /// cannot tell.
    async fn confirm_gone(
        &self,
        scope: &CallScope,
        resolved: &ResolvedModule,
        external_id: &str,
    ) -> (Option<bool>, u32) {
        if !resolved.supports(Operation::Sync) {
            return (None, 0);
        }
        let id = external_id.to_string();
        let result = self
            .call_logger
            .invoke(
                scope,
                resolved,
                Operation::Sync,
                &external_id_payload(external_id),
                move |m, ctx| async move { m.sync(&ctx, &id).await },
            )
            .await;
        let gone = match result {
            Ok(status) => Some(status.transferred_away),
            Err(failure) if failure.is_not_found() => Some(true),
            Err(_) => None,
        };
        (gone, 1)
    }

    /// Writes the target state. A failed write after a remote effect is deferred.
    async fn commit(
        &self,
        mut service: Service,
        request: &TransitionRequest,
        effect: Option<RemoteEffect>,
        remote_applied: bool,
    ) -> CoreResult<Service> {
        let from = service.state;
        if let Some(RemoteEffect::Created(created)) = effect {
            if service.external_id.is_none() {
                service.external_id = Some(created.external_id);
            }
            service.provider_meta.extend(created.meta);
        }
        // 转入完成：域名本身即外部标识
        if request.target == ServiceState::Active && service.pending_transfer().is_some() {
            service.external_id = Some(service.resources.domain.trim().to_ascii_lowercase());
        }
        service.state = request.target;
        service.suspension_reason =
            (request.target == ServiceState::Suspended).then(|| request.reason.clone());
        service.failure = None;
        touch(&mut service);

        let change = StateChange {
            service_id: service.id.clone(),
            old_state: from,
            new_state: request.target,
            reason: request.reason.clone(),
            transition_id: request.id,
            at: service.updated_at,
        };
        self.persist(&service, Some(change), remote_applied).await?;
        Ok(service)
    }

    /// Moves the service to `failed` and surfaces the classified failure.
    async fn fail(
        &self,
        mut service: Service,
        request: &TransitionRequest,
        resolved: &ResolvedModule,
        failure: CallFailure,
        attempts: u32,
    ) -> CoreError {
        let from = service.state;
        let from_state = service.effective_state();
        log::error!(
            "Transition {} of service {} ({from_state} -> {}) failed after {attempts} attempt(s): {failure}",
            request.id,
            service.id,
            request.target
        );

        service.state = ServiceState::Failed;
        service.failure = Some(FailureDetail {
            operation: failure.operation,
            category: failure.category,
            message: failure.to_string(),
            from_state,
            target_state: request.target,
            attempts,
            failed_at: Utc::now(),
        });
        touch(&mut service);

        let change = (from != ServiceState::Failed).then(|| StateChange {
            service_id: service.id.clone(),
            old_state: from,
            new_state: ServiceState::Failed,
            reason: request.reason.clone(),
            transition_id: request.id,
            at: service.updated_at,
        });
        if let Err(e) = self.persist(&service, change, false).await {
            log::error!("Failed to record failure of service {}: {e}", service.id);
        }

        if failure.operation == Operation::TerminateAccount {
            self.ctx
                .publish(ProvisioningEvent::OperatorAlert(OperatorAlert {
                    service_id: service.id.clone(),
                    module_id: resolved.module_id().to_string(),
                    operation: failure.operation,
                    message: failure.to_string(),
                    attempts,
                    at: Utc::now(),
                }));
        }
        CoreError::ModuleCall(failure)
    }

    /// Saves and then announces the change. When the remote side already reflects the
    /// change, a failed save is queued for the next reconciliation pass.
    async fn persist(
        &self,
        service: &Service,
        change: Option<StateChange>,
        remote_applied: bool,
    ) -> CoreResult<()> {
        match self.ctx.service_repository.save(service).await {
            Ok(()) => {
                // 本次写入覆盖了队列中的旧版本
                if let Some(settled) = self.ctx.deferred_writes.settle(&service.id, service.version) {
                    if let Some(earlier) = settled.event {
                        self.ctx.publish(ProvisioningEvent::StateChanged(earlier));
                    }
                }
                if let Some(change) = change {
                    self.ctx.publish(ProvisioningEvent::StateChanged(change));
                }
                Ok(())
            }
            Err(e) if remote_applied => {
                let detail = e.to_string();
                self.ctx.deferred_writes.push(DeferredWrite {
                    service: service.clone(),
                    event: change,
                    error: detail.clone(),
                    queued_at: Utc::now(),
                    attempts: 0,
                });
                Err(CoreError::PersistenceDeferred {
                    service_id: service.id.clone(),
                    detail,
                })
            }
            Err(e) => Err(e),
        }
    }
}

fn touch(service: &mut Service) {
    service.version += 1;
    service.updated_at = Utc::now();
}

fn check_lease(lease: &ServiceLease, service_id: &str) -> CoreResult<()> {
    if lease.service_id() == service_id {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "lease for service {} does not cover service {service_id}",
            lease.service_id()
        )))
    }
}

fn adopt(service_id: &str, external_id: String) -> RemoteEffect {
    log::warn!("Adopting existing resource {external_id} for service {service_id} instead of creating it again");
    RemoteEffect::Created(CreatedAccount {
        external_id,
        meta: BTreeMap::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Harness, StubReply};
    use crate::traits::CallLogRepository;
    use crate::error::ModuleError;
    use crate::types::{Ack, CallOutcome, SyncStatus};
    use std::time::Duration;

    fn timeout_reply() -> StubReply {
        StubReply::Hang(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn scenario_a_create_becomes_active() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.pending_service().await;

        let outcome = h
            .orchestrator
            .request_transition(&service.id, ServiceState::Active, TransitionReason::OrderPaid)
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(outcome.from, ServiceState::Pending);
        assert_eq!(outcome.service.state, ServiceState::Active);
        assert_eq!(outcome.service.external_id.as_deref(), Some("abc123"));
        let records = h.calls.find_by_service(&service.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, Operation::CreateAccount);
        assert_eq!(records[0].outcome, Some(CallOutcome::Success));
        assert_eq!(records[0].transition_id, Some(outcome.transition_id));

        let changes = h.events.state_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_state, ServiceState::Pending);
        assert_eq!(changes[0].new_state, ServiceState::Active);
    }

    #[tokio::test]
    async fn scenario_b_suspend_succeeds_on_third_attempt() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        h.stub.script(
            Operation::SuspendAccount,
            [timeout_reply(), timeout_reply(), StubReply::Ack(Ack::done())],
        );

        let outcome = h
            .orchestrator
            .request_transition(&service.id, ServiceState::Suspended, TransitionReason::InvoiceOverdue)
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(outcome.service.state, ServiceState::Suspended);
        assert_eq!(
            outcome.service.suspension_reason,
            Some(TransitionReason::InvoiceOverdue)
        );
        assert_eq!(outcome.module_calls, 3);
        let records = h.calls.find_by_service(&service.id).await.unwrap();
        let outcomes: Vec<_> = records.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                Some(CallOutcome::Ambiguous),
                Some(CallOutcome::Ambiguous),
                Some(CallOutcome::Success)
            ]
        );
        assert_eq!(records[2].attempt, 3);
    }

    #[tokio::test]
    async fn suspending_twice_is_not_an_error() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        let first = h
            .orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Suspended, TransitionReason::InvoiceOverdue))
            .await
            .unwrap();
        let second = h
            .orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Suspended, TransitionReason::InvoiceOverdue))
            .await
            .unwrap();

        assert!(first.applied);
        assert!(!second.applied);
        assert_eq!(second.service.state, ServiceState::Suspended);
        // the second request is a no-op locally and never reaches the module
        assert_eq!(h.stub.calls(Operation::SuspendAccount), 1);
    }

    #[tokio::test]
    async fn already_suspended_at_provider_commits_suspended() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        h.stub.script(
            Operation::SuspendAccount,
            [StubReply::Ack(Ack::already("User is already suspended"))],
        );

        let outcome = h
            .orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Suspended, TransitionReason::InvoiceOverdue))
            .await
            .unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.service.state, ServiceState::Suspended);
        assert!(outcome.service.failure.is_none());

        let records = h.calls.find_by_service(&service.id).await.unwrap();
        let suspend = records
            .iter()
            .find(|r| r.operation == Operation::SuspendAccount)
            .unwrap();
        assert_eq!(suspend.outcome, Some(CallOutcome::Success));
        assert!(matches!(
            suspend.normalization,
            Some(crate::types::Normalization::AlreadyInState { .. })
        ));
    }

    #[tokio::test]
    async fn ambiguous_create_is_not_duplicated() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.pending_service().await;
        h.stub.script(Operation::CreateAccount, [timeout_reply()]);
        h.stub.set_probe(Some("abc123"));
        h.stub.set_sync(Some(SyncStatus {
            active: true,
            ..SyncStatus::default()
        }));

        let outcome = h
            .orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Active, TransitionReason::OrderPaid))
            .await
            .unwrap();

        assert_eq!(outcome.service.state, ServiceState::Active);
        assert_eq!(outcome.service.external_id.as_deref(), Some("abc123"));
        assert_eq!(h.stub.calls(Operation::CreateAccount), 1);
        assert_eq!(h.stub.calls(Operation::Sync), 1);
        assert_eq!(outcome.module_calls, 2);
    }

    #[tokio::test]
    async fn ambiguous_create_is_retried_when_nothing_exists() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.pending_service().await;
        h.stub.script(Operation::CreateAccount, [timeout_reply()]);
        h.stub.set_probe(Some("abc123"));
        h.stub.set_sync(None);

        let outcome = h
            .orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Active, TransitionReason::OrderPaid))
            .await
            .unwrap();

        assert_eq!(outcome.service.state, ServiceState::Active);
        assert_eq!(h.stub.calls(Operation::CreateAccount), 2);
    }

    #[tokio::test]
    async fn retry_after_failed_create_checks_provider_first() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.pending_service().await;
        // 无法探测 → 失败，留下一条 ambiguous 记录
        h.stub.script(Operation::CreateAccount, [timeout_reply()]);
        let err = h
            .orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Active, TransitionReason::OrderPaid))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ModuleCall(ref f) if f.category == ErrorCategory::Ambiguous));
        let failed = h.ctx.get_service(&service.id).await.unwrap();
        assert_eq!(failed.state, ServiceState::Failed);
        assert_eq!(failed.effective_state(), ServiceState::Pending);

        // 管理员重试：先 sync，资源已存在则直接采用
        h.stub.set_probe(Some("abc123"));
        h.stub.set_sync(Some(SyncStatus {
            active: true,
            ..SyncStatus::default()
        }));
        let outcome = h
            .orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Active, TransitionReason::ManualRetry))
            .await
            .unwrap();
        assert_eq!(outcome.from, ServiceState::Failed);
        assert_eq!(outcome.service.state, ServiceState::Active);
        assert!(outcome.service.failure.is_none());
        assert_eq!(h.stub.calls(Operation::CreateAccount), 1);
    }

    #[tokio::test]
    async fn rejected_suspend_fails_without_retry() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        h.stub.script(
            Operation::SuspendAccount,
            [StubReply::Fail(ModuleError::Unknown {
                provider: "stub".into(),
                raw_code: None,
                raw_message: "User is a reseller".into(),
            })],
        );

        let err = h
            .orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Suspended, TransitionReason::InvoiceOverdue))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "at stub, suspendAccount failed: User is a reseller");
        assert_eq!(h.stub.calls(Operation::SuspendAccount), 1);

        let failed = h.ctx.get_service(&service.id).await.unwrap();
        let detail = failed.failure.unwrap();
        assert_eq!(detail.from_state, ServiceState::Active);
        assert_eq!(detail.target_state, ServiceState::Suspended);
        assert_eq!(detail.category, ErrorCategory::Rejected);
    }

    #[tokio::test]
    async fn transient_failures_exhaust_retries() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        let network = || {
            StubReply::Fail(ModuleError::NetworkError {
                provider: "stub".into(),
                detail: "connection refused".into(),
            })
        };
        h.stub.script(
            Operation::UnsuspendAccount,
            (0..10).map(|_| network()).collect::<Vec<_>>(),
        );
        h.orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Suspended, TransitionReason::InvoiceOverdue))
            .await
            .unwrap();

        let err = h
            .orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Active, TransitionReason::PaymentReceived))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ModuleCall(ref f) if f.category == ErrorCategory::Transient));
        assert_eq!(h.stub.calls(Operation::UnsuspendAccount), h.max_attempts);
        assert_eq!(
            h.ctx.get_service(&service.id).await.unwrap().state,
            ServiceState::Failed
        );
    }

    #[tokio::test]
    async fn failed_termination_alerts_an_operator() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        h.stub.script(
            Operation::TerminateAccount,
            [StubReply::Fail(ModuleError::InvalidParameter {
                provider: "stub".into(),
                param: "user".into(),
                detail: "account is locked".into(),
            })],
        );

        h.orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Terminated, TransitionReason::Cancellation))
            .await
            .unwrap_err();

        let alerts = h.events.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].operation, Operation::TerminateAccount);
        assert!(alerts[0].message.contains("account is locked"));
    }

    #[tokio::test]
    async fn ambiguous_terminate_of_a_vanished_resource_succeeds() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        h.stub.script(Operation::TerminateAccount, [timeout_reply()]);
        h.stub.set_sync(None);

        let outcome = h
            .orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Terminated, TransitionReason::Cancellation))
            .await
            .unwrap();
        assert_eq!(outcome.service.state, ServiceState::Terminated);
        assert_eq!(h.stub.calls(Operation::TerminateAccount), 1);
    }

    #[tokio::test]
    async fn terminated_is_terminal() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        h.orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Terminated, TransitionReason::Cancellation))
            .await
            .unwrap();

        for target in [ServiceState::Active, ServiceState::Suspended] {
            let err = h
                .orchestrator
                .request_transition(&service.id, target, TransitionReason::PaymentReceived)
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidTransition { from: ServiceState::Terminated, .. }));
        }
        let again = h
            .orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Terminated, TransitionReason::Cancellation))
            .await
            .unwrap();
        assert!(!again.applied);
    }

    #[tokio::test]
    async fn pending_and_failed_cannot_be_requested() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        for target in [ServiceState::Pending, ServiceState::Failed] {
            let err = h
                .orchestrator
                .request_transition(&service.id, target, TransitionReason::AdminAction { note: None })
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn cancelled_order_terminates_locally() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.pending_service().await;
        let outcome = h
            .orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Terminated, TransitionReason::Cancellation))
            .await
            .unwrap();
        assert_eq!(outcome.service.state, ServiceState::Terminated);
        assert_eq!(outcome.module_calls, 0);
    }

    #[tokio::test]
    async fn registrar_without_suspend_is_suspended_locally() {
        let h = Harness::with_category(
            &[Operation::CreateAccount, Operation::Sync, Operation::Renew],
            ServiceCategory::Domain,
        )
        .await;
        let service = h.active_service().await;

        // 资源变更没有本地回退，必须在派发前拒绝
        let change = ResourceChange {
            options: BTreeMap::from([("package".to_string(), "gold".to_string())]),
        };
        let err = h
            .orchestrator
            .change_resources(&service.id, change)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::CapabilityNotSupported {
                operation: Operation::ChangeResources,
                ..
            }
        ));
        assert_eq!(h.stub.calls(Operation::ChangeResources), 0);

        let outcome = h
            .orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Suspended, TransitionReason::InvoiceOverdue))
            .await
            .unwrap();
        assert_eq!(outcome.service.state, ServiceState::Suspended);
        assert_eq!(h.stub.calls(Operation::SuspendAccount), 0);
    }

    #[tokio::test]
    async fn conflicting_requests_are_serialised() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;

        // 持有租约，使两个请求按提交顺序排队
        let lease = h.ctx.leases.acquire(&service.id).await;
        let suspend = h
            .orchestrator
            .request_transition(&service.id, ServiceState::Suspended, TransitionReason::InvoiceOverdue)
            .await
            .unwrap();
        tokio::task::yield_now().await;
        let unsuspend = h
            .orchestrator
            .request_transition(&service.id, ServiceState::Active, TransitionReason::PaymentReceived)
            .await
            .unwrap();
        tokio::task::yield_now().await;
        drop(lease);

        let first = suspend.wait().await.unwrap();
        let second = unsuspend.wait().await.unwrap();
        assert_eq!(first.from, ServiceState::Active);
        assert_eq!(first.service.state, ServiceState::Suspended);
        // the second transition saw the first one's result, not the stale read
        assert_eq!(second.from, ServiceState::Suspended);
        assert_eq!(second.service.state, ServiceState::Active);
        assert_eq!(h.stub.calls(Operation::SuspendAccount), 1);
        assert_eq!(h.stub.calls(Operation::UnsuspendAccount), 1);
        assert_eq!(second.service.version, service.version + 2);
    }

    #[tokio::test]
    async fn failed_local_write_is_deferred_not_undone() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        h.services.set_save_error(Some("disk full".to_string())).await;

        let err = h
            .orchestrator
            .execute(TransitionRequest::new(&service.id, ServiceState::Suspended, TransitionReason::InvoiceOverdue))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PersistenceDeferred { .. }));
        assert_eq!(h.stub.calls(Operation::SuspendAccount), 1);
        assert_eq!(h.stub.calls(Operation::UnsuspendAccount), 0);
        assert_eq!(h.ctx.deferred_writes.len(), 1);
        // no event until the write lands
        assert!(h.events.state_changes().is_empty());
        // readers already see the intended state
        assert_eq!(
            h.ctx.get_service(&service.id).await.unwrap().state,
            ServiceState::Suspended
        );
    }

    #[tokio::test]
    async fn resize_failure_leaves_snapshot_unchanged() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        h.stub.script(
            Operation::ChangeResources,
            [StubReply::Fail(ModuleError::PartiallyApplied {
                provider: "stub".into(),
                applied: vec!["package".into()],
                pending: vec!["ip".into()],
                raw_message: "IP not available".into(),
            })],
        );
        let change = ResourceChange {
            options: BTreeMap::from([("package".to_string(), "gold".to_string())]),
        };

        let err = h
            .orchestrator
            .change_resources(&service.id, change.clone())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Partially applied"));
        let unchanged = h.ctx.get_service(&service.id).await.unwrap();
        assert_eq!(unchanged.state, ServiceState::Active);
        assert_eq!(unchanged.resources, service.resources);

        let resized = h.orchestrator.change_resources(&service.id, change).await.unwrap();
        assert_eq!(resized.resources.options.get("package").map(String::as_str), Some("gold"));
    }

    #[tokio::test]
    async fn renew_updates_expiry() {
        let h = Harness::with_category(&Operation::ALL, ServiceCategory::Domain).await;
        let service = h.active_service().await;
        let new_expiry = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        h.stub.set_renewal(Some(new_expiry));

        let renewed = h.orchestrator.renew(&service.id, 1).await.unwrap();
        assert_eq!(renewed.expiry_date, Some(new_expiry));
        assert!(h
            .events
            .all()
            .iter()
            .any(|e| matches!(e, ProvisioningEvent::ExpiryUpdated { new, .. } if *new == new_expiry)));
    }

    #[tokio::test]
    async fn change_credential_redacts_the_new_secret() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        let updated = h
            .orchestrator
            .change_credential(&service.id, "Sup3r-s3cret!")
            .await
            .unwrap();
        assert_eq!(updated.resources.password.as_deref(), Some("Sup3r-s3cret!"));
        let records = h.calls.find_by_service(&service.id).await.unwrap();
        assert!(records.iter().all(|r| !r.request.contains("Sup3r-s3cret!")));
    }

    #[tokio::test]
    async fn inactive_product_refuses_new_services() {
        let h = Harness::new(&Operation::ALL).await;
        h.ctx
            .module_registry
            .set_product_active("p1", false)
            .await
            .unwrap();
        let err = h
            .orchestrator
            .register_service(Harness::new_service())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ProductInactive(_)));
    }

    #[tokio::test]
    async fn transfer_keeps_order_pending_until_it_completes() {
        let h = Harness::with_category(&Operation::ALL, ServiceCategory::Domain).await;
        let service = h.pending_service().await;

        let submitted = h
            .orchestrator
            .start_transfer(&service.id, " EPP-0ld-registrar ")
            .await
            .unwrap();

        assert_eq!(submitted.state, ServiceState::Pending);
        assert_eq!(submitted.pending_transfer(), Some("tr-42"));
        assert_eq!(submitted.external_id, None);
        assert_eq!(submitted.provider_meta.get("OrderID").map(String::as_str), Some("9001"));
        assert_eq!(h.stub.calls(Operation::TransferDomain), 1);
        assert_eq!(h.stub.calls(Operation::CreateAccount), 0);
        assert!(h.events.state_changes().is_empty());

        let records = h.calls.find_by_service(&service.id).await.unwrap();
        assert_eq!(records[0].operation, Operation::TransferDomain);
        assert!(!records[0].request.contains("EPP-0ld-registrar"));

        // 转入进行中：激活请求不得触发注册
        let err = h
            .orchestrator
            .request_transition(&service.id, ServiceState::Active, TransitionReason::OrderPaid)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        let err = h
            .orchestrator
            .start_transfer(&service.id, "EPP-0ld-registrar")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already in progress"));
        assert_eq!(h.stub.calls(Operation::CreateAccount), 0);
        assert_eq!(h.stub.calls(Operation::TransferDomain), 1);
    }

    #[tokio::test]
    async fn rejected_transfer_leaves_order_untouched() {
        let h = Harness::with_category(&Operation::ALL, ServiceCategory::Domain).await;
        let service = h.pending_service().await;
        h.stub.script(
            Operation::TransferDomain,
            [StubReply::Fail(ModuleError::InvalidParameter {
                provider: "stub".to_string(),
                param: "EPPCode".to_string(),
                detail: "Invalid authorisation code".to_string(),
            })],
        );

        let err = h
            .orchestrator
            .start_transfer(&service.id, "wrong-code")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ModuleCall(_)));
        assert_eq!(h.stub.calls(Operation::TransferDomain), 1);
        let stored = h.ctx.get_service(&service.id).await.unwrap();
        assert_eq!(stored.state, ServiceState::Pending);
        assert_eq!(stored.pending_transfer(), None);
        assert_eq!(stored.version, service.version);
    }

    #[tokio::test]
    async fn transfer_needs_a_pending_domain_and_a_code() {
        let h = Harness::with_category(&Operation::ALL, ServiceCategory::Domain).await;
        let active = h.active_service().await;
        let err = h.orchestrator.start_transfer(&active.id, "EPP").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let pending = h.pending_service().await;
        let err = h.orchestrator.start_transfer(&pending.id, "  ").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let hosting = Harness::new(&Operation::ALL).await;
        let service = hosting.pending_service().await;
        let err = hosting.orchestrator.start_transfer(&service.id, "EPP").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(h.stub.calls(Operation::TransferDomain), 0);
        assert_eq!(hosting.stub.calls(Operation::TransferDomain), 0);
    }
}
