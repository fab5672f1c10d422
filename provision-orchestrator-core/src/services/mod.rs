//! 业务逻辑服务层

mod admin_service;
mod call_logger;
mod deferred;
mod domain_service;
mod lease;
mod module_service;
mod orchestrator;
mod reconciliation;
mod retry;
mod sso_service;

pub use admin_service::AdminService;
pub use call_logger::{classify, CallLogger, LoggableResult};
pub use deferred::{DeferredWrite, DeferredWriteQueue};
pub use domain_service::DomainService;
pub use lease::{LeaseManager, ServiceLease};
pub use module_service::{ConnectionTest, ModuleService};
pub use orchestrator::{LifecycleOrchestrator, TransitionTicket};
pub use reconciliation::{ReconciliationReport, ReconciliationScheduler};
pub use retry::RetryPolicy;
pub use sso_service::{AuthenticatedSession, SessionRole, SsoIssuer};

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::registry::{ModuleRegistry, ResolvedModule};
use crate::traits::{CallLogRepository, EventSink, ServiceRepository};
use crate::types::{ProvisioningEvent, Service};

/// 服务上下文 - 持有所有依赖
///
/// 平台层需要创建此上下文，并注入平台特定的存储实现。
pub struct ServiceContext {
    /// Service 持久化仓库
    pub service_repository: Arc<dyn ServiceRepository>,
    /// Module call log
    pub call_log_repository: Arc<dyn CallLogRepository>,
    pub module_registry: Arc<ModuleRegistry>,
    /// Notification boundary
    pub event_sink: Arc<dyn EventSink>,
    /// Per-service leases shared by the orchestrator and the reconciliation sweep
    pub leases: Arc<LeaseManager>,
    pub deferred_writes: Arc<DeferredWriteQueue>,
}

impl ServiceContext {
    /// 创建服务上下文
    #[must_use]
    pub fn new(
        service_repository: Arc<dyn ServiceRepository>,
        call_log_repository: Arc<dyn CallLogRepository>,
        module_registry: Arc<ModuleRegistry>,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            service_repository,
            call_log_repository,
            module_registry,
            event_sink,
            leases: Arc::new(LeaseManager::new()),
            deferred_writes: Arc::new(DeferredWriteQueue::new()),
        }
    }

    /// Current view of a service. A write still waiting in the deferred queue wins over
    /// the stored row.
    pub async fn get_service(&self, service_id: &str) -> CoreResult<Service> {
        if let Some(pending) = self.deferred_writes.pending_for(service_id) {
            return Ok(pending);
        }
        self.service_repository
            .find_by_id(service_id)
            .await?
            .ok_or_else(|| CoreError::ServiceNotFound(service_id.to_string()))
    }

    /// Resolves the module bound to a service through its product.
    pub async fn resolve_module(&self, service: &Service) -> CoreResult<ResolvedModule> {
        let resolved = self.module_registry.resolve(&service.product_id).await?;
        if resolved.module_id() != service.module_id {
            return Err(CoreError::Configuration {
                field: "module_id".to_string(),
                reason: format!(
                    "service {} is bound to module '{}' but product '{}' now uses '{}'",
                    service.id,
                    service.module_id,
                    service.product_id,
                    resolved.module_id()
                ),
            });
        }
        Ok(resolved)
    }

    pub fn publish(&self, event: ProvisioningEvent) {
        self.event_sink.publish(event);
    }
}
