//! Admin service
//!
//! Read-only views over services and the call log, plus the two manual actions
//! (retry a failed transition, force SSO). Both go through the same entry points as
//! automated callers.

use std::sync::Arc;

use super::orchestrator::{LifecycleOrchestrator, TransitionTicket};
use super::sso_service::{AuthenticatedSession, SsoIssuer};
use crate::error::{CoreError, CoreResult};
use crate::types::{
    CallRecord, Service, ServiceQuery, ServiceState, SsoToken, TransitionReason,
};

pub struct AdminService {
    orchestrator: Arc<LifecycleOrchestrator>,
    sso: Arc<SsoIssuer>,
}

impl AdminService {
    #[must_use]
    pub fn new(orchestrator: Arc<LifecycleOrchestrator>, sso: Arc<SsoIssuer>) -> Self {
        Self { orchestrator, sso }
    }

    pub async fn list_services(&self, query: &ServiceQuery) -> CoreResult<Vec<Service>> {
        self.orchestrator
            .context()
            .service_repository
            .find(query)
            .await
    }

    /// Includes a write still waiting for reconciliation.
    pub async fn get_service(&self, service_id: &str) -> CoreResult<Service> {
        self.orchestrator.context().get_service(service_id).await
    }

    /// Call records of one service, oldest first.
    pub async fn call_log(&self, service_id: &str) -> CoreResult<Vec<CallRecord>> {
        // 确认 service 存在
        self.get_service(service_id).await?;
        self.orchestrator
            .context()
            .call_log_repository
            .find_by_service(service_id)
            .await
    }

    /// Calls that started and never completed.
    pub async fn open_calls(&self) -> CoreResult<Vec<CallRecord>> {
        self.orchestrator
            .context()
            .call_log_repository
            .find_open()
            .await
    }

    /// Re-runs the transition a failed service was attempting.
    pub async fn retry_transition(&self, service_id: &str, admin: &AuthenticatedSession) -> CoreResult<TransitionTicket> {
        if !admin.is_admin() {
            return Err(CoreError::Forbidden("retry requires an admin session".to_string()));
        }
        let service = self.get_service(service_id).await?;
        let Some(failure) = service.failure.as_ref().filter(|_| service.state == ServiceState::Failed)
        else {
            return Err(CoreError::Validation(format!(
                "service {service_id} is {}, only failed services can be retried",
                service.state
            )));
        };
        log::info!(
            "{} retries {} -> {} for service {service_id} (last error: {})",
            admin.principal,
            failure.from_state,
            failure.target_state,
            failure.message
        );
        self.orchestrator
            .request_transition(service_id, failure.target_state, TransitionReason::ManualRetry)
            .await
    }

    /// Admin login into the service's control panel.
    pub async fn force_sso(&self, service_id: &str, admin: &AuthenticatedSession) -> CoreResult<SsoToken> {
        if !admin.is_admin() {
            return Err(CoreError::Forbidden("force SSO requires an admin session".to_string()));
        }
        self.sso.issue(service_id, admin).await
    }

    /// Local writes waiting for the next reconciliation pass.
    pub fn pending_deferred_writes(&self) -> usize {
        self.orchestrator.context().deferred_writes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModuleError;
    use crate::test_utils::{Harness, StubReply};
    use crate::types::{CallOutcome, Operation};

    fn admin(h: &Harness) -> AdminService {
        let sso = Arc::new(SsoIssuer::new(
            Arc::clone(&h.ctx),
            Arc::clone(h.orchestrator.call_logger()),
        ));
        AdminService::new(Arc::clone(&h.orchestrator), sso)
    }

    fn rejected() -> StubReply {
        StubReply::Fail(ModuleError::Unknown {
            provider: "stub".to_string(),
            raw_code: None,
            raw_message: "User is a reseller".to_string(),
        })
    }

    #[tokio::test]
    async fn retry_resumes_failed_transition() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        h.stub.script(Operation::SuspendAccount, [rejected()]);
        h.orchestrator
            .execute(crate::types::TransitionRequest::new(
                &service.id,
                ServiceState::Suspended,
                TransitionReason::InvoiceOverdue,
            ))
            .await
            .unwrap_err();

        let admin_service = admin(&h);
        let failed = admin_service.get_service(&service.id).await.unwrap();
        assert_eq!(failed.state, ServiceState::Failed);

        let outcome = admin_service
            .retry_transition(&service.id, &AuthenticatedSession::admin("root"))
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(outcome.service.state, ServiceState::Suspended);
        assert!(outcome.service.failure.is_none());
        assert_eq!(h.events.state_changes().last().unwrap().reason, TransitionReason::ManualRetry);

        let log = admin_service.call_log(&service.id).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].outcome, Some(CallOutcome::Success));
        assert!(admin_service.open_calls().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_failed_services_are_retried_by_admins() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        let admin_service = admin(&h);

        let err = admin_service
            .retry_transition(&service.id, &AuthenticatedSession::admin("root"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = admin_service
            .retry_transition(&service.id, &AuthenticatedSession::client("alice", "client-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn force_sso_goes_through_the_issuer() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        let admin_service = admin(&h);

        let token = admin_service
            .force_sso(&service.id, &AuthenticatedSession::admin("root"))
            .await
            .unwrap();
        assert!(token.url().contains("admin=true"));
        assert_eq!(h.stub.calls(Operation::SingleSignOn), 1);

        let listed = admin_service
            .list_services(&ServiceQuery {
                states: vec![ServiceState::Active],
                ..ServiceQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(admin_service.pending_deferred_writes(), 0);
    }

    #[tokio::test]
    async fn call_log_of_unknown_service_is_not_found() {
        let h = Harness::new(&Operation::ALL).await;
        let err = admin(&h).call_log("nope").await.unwrap_err();
        assert!(matches!(err, CoreError::ServiceNotFound(_)));
    }
}
