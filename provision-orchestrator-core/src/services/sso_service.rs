//! SSO token issuer
//!
//! Only serves sessions the caller has already authenticated. Tokens are handed back to the
//! caller and never stored; the call record keeps a truncated reference.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::call_logger::CallLogger;
use super::ServiceContext;
use crate::error::{CoreError, CoreResult};
use crate::types::{CallScope, Operation, Service, SsoToken};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SessionRole {
    /// Client area login, limited to the client's own services.
    Client { client_id: String },
    Admin,
}

/// A session authenticated upstream (client area or admin panel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedSession {
    /// Login name, for the log line.
    pub principal: String,
    pub role: SessionRole,
}

impl AuthenticatedSession {
    pub fn client(principal: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            role: SessionRole::Client {
                client_id: client_id.into(),
            },
        }
    }

    pub fn admin(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            role: SessionRole::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == SessionRole::Admin
    }

    fn may_access(&self, service: &Service) -> bool {
        match &self.role {
            SessionRole::Admin => true,
            SessionRole::Client { client_id } => *client_id == service.client_id,
        }
    }
}

pub struct SsoIssuer {
    ctx: Arc<ServiceContext>,
    call_logger: Arc<CallLogger>,
}

impl SsoIssuer {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>, call_logger: Arc<CallLogger>) -> Self {
        Self { ctx, call_logger }
    }

    /// Issues a one-time login for the service's control panel.
    ///
    /// Single attempt: a failed login is reported, not retried.
    pub async fn issue(&self, service_id: &str, session: &AuthenticatedSession) -> CoreResult<SsoToken> {
        let service = self.ctx.get_service(service_id).await?;
        if !session.may_access(&service) {
            log::warn!(
                "SSO refused: {} does not own service {service_id}",
                session.principal
            );
            return Err(CoreError::Forbidden(format!(
                "service {service_id} does not belong to this client"
            )));
        }
        if !service.state.is_reconciled() {
            return Err(CoreError::Validation(format!(
                "cannot sign in to a {} service",
                service.state
            )));
        }
        let Some(external_id) = service.external_id.clone() else {
            return Err(CoreError::Validation(format!(
                "service {service_id} has not been provisioned"
            )));
        };
        let resolved = self.ctx.resolve_module(&service).await?;
        resolved.require(Operation::SingleSignOn)?;

        let as_admin = session.is_admin();
        let id = external_id.clone();
        let token = self
            .call_logger
            .invoke(
                &CallScope::service(service_id),
                &resolved,
                Operation::SingleSignOn,
                &serde_json::json!({ "externalId": external_id, "asAdmin": as_admin }),
                move |m, call_ctx| async move { m.single_sign_on(&call_ctx, &id, as_admin).await },
            )
            .await?;
        log::info!(
            "Issued SSO for service {service_id} to {} ({})",
            session.principal,
            if as_admin { "admin" } else { "client" }
        );
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModuleError;
    use crate::test_utils::{Harness, StubReply};
    use crate::traits::CallLogRepository;
    use crate::types::{CallOutcome, ErrorCategory};

    fn issuer(h: &Harness) -> SsoIssuer {
        SsoIssuer::new(Arc::clone(&h.ctx), Arc::clone(h.orchestrator.call_logger()))
    }

    #[tokio::test]
    async fn owner_gets_token_and_record_is_truncated() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;

        let token = issuer(&h)
            .issue(&service.id, &AuthenticatedSession::client("alice", "client-1"))
            .await
            .unwrap();
        assert!(token.url().contains("key=one-time-key-0123456789"));
        assert!(token.url().contains("admin=false"));

        let records = h.calls.find_by_service(&service.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, Some(CallOutcome::Success));
        let stored = serde_json::to_string(&records[0]).unwrap();
        assert!(!stored.contains("one-time-key-0123456789"));
    }

    #[tokio::test]
    async fn other_clients_are_forbidden() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;

        let err = issuer(&h)
            .issue(&service.id, &AuthenticatedSession::client("mallory", "client-2"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
        assert_eq!(h.stub.calls(Operation::SingleSignOn), 0);
    }

    #[tokio::test]
    async fn admin_sso_and_capability_check() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        let token = issuer(&h)
            .issue(&service.id, &AuthenticatedSession::admin("root"))
            .await
            .unwrap();
        assert!(token.url().contains("admin=true"));

        let h = Harness::new(&[Operation::CreateAccount, Operation::Sync]).await;
        let service = h.active_service().await;
        let err = issuer(&h)
            .issue(&service.id, &AuthenticatedSession::admin("root"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CapabilityNotSupported { .. }));
    }

    #[tokio::test]
    async fn unprovisioned_service_is_refused() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.pending_service().await;
        let err = issuer(&h)
            .issue(&service.id, &AuthenticatedSession::client("alice", "client-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn provider_failure_is_not_retried() {
        let h = Harness::new(&Operation::ALL).await;
        let service = h.active_service().await;
        h.stub.script(
            Operation::SingleSignOn,
            [StubReply::Fail(ModuleError::NetworkError {
                provider: "stub".to_string(),
                detail: "connection reset".to_string(),
            })],
        );

        let err = issuer(&h)
            .issue(&service.id, &AuthenticatedSession::admin("root"))
            .await
            .unwrap_err();
        let CoreError::ModuleCall(failure) = err else {
            panic!("expected a module failure");
        };
        assert_eq!(failure.category, ErrorCategory::Transient);
        assert_eq!(h.stub.calls(Operation::SingleSignOn), 1);
    }
}
