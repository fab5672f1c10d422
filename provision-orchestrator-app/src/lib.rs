//! Application bootstrap for Provision Orchestrator.
//!
//! Provides `AppState` (service container), `AppStateBuilder` (adapter injection) and
//! the TOML deployment settings. The `provisiond` binary wires these to the `SQLite`
//! store and runs the reconciliation loop.

pub mod adapters;
pub mod config;

use std::sync::Arc;

use serde::Serialize;

use provision_orchestrator_core::error::{CoreError, CoreResult};
use provision_orchestrator_core::services::{
    AdminService, CallLogger, DomainService, LifecycleOrchestrator, ModuleService,
    ReconciliationScheduler, RetryPolicy, ServiceContext, SsoIssuer,
};
use provision_orchestrator_core::settings::OrchestratorSettings;
use provision_orchestrator_core::traits::{
    CallLogRepository, EventSink, LoggingEventSink, ServiceRepository,
};
use provision_orchestrator_core::ModuleRegistry;

use crate::config::Settings;

/// What the startup sequence loaded.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupReport {
    pub modules_registered: usize,
    pub servers_loaded: usize,
    /// Products whose connection test passed.
    pub active_products: Vec<String>,
    /// Products left inactive: invalid configuration or failed connection test.
    pub inactive_products: Vec<String>,
}

/// Application state.
///
/// Holds all services and the `ServiceContext`. Hosts construct this once at startup
/// via `AppStateBuilder`.
pub struct AppState {
    /// Service context (holds all storage adapters)
    pub ctx: Arc<ServiceContext>,
    pub orchestrator: Arc<LifecycleOrchestrator>,
    pub reconciliation: Arc<ReconciliationScheduler>,
    pub sso_issuer: Arc<SsoIssuer>,
    pub domain_service: DomainService,
    pub module_service: ModuleService,
    pub admin_service: AdminService,
    pub settings: OrchestratorSettings,
}

impl AppState {
    /// Registers the built-in modules, loads servers and products from `settings`
    /// and activates every product whose connection test passes.
    ///
    /// A bad server or product is logged and skipped; startup itself only fails when
    /// module registration does.
    pub async fn run_startup(&self, settings: &Settings) -> CoreResult<StartupReport> {
        let registry = &self.ctx.module_registry;
        let mut report = StartupReport {
            modules_registered: registry.register_builtin_modules().await?,
            ..StartupReport::default()
        };

        for section in &settings.servers {
            let loaded = match section.to_server_config() {
                Ok(server) => registry.upsert_server(server).await,
                Err(e) => Err(e),
            };
            match loaded {
                Ok(()) => report.servers_loaded += 1,
                Err(e) => log::error!("Failed to load server {}: {e}", section.id),
            }
        }

        for section in &settings.products {
            let loaded = match section.to_binding() {
                Ok(binding) => registry.upsert_product(binding).await,
                Err(e) => Err(e),
            };
            if let Err(e) = loaded {
                log::error!("Failed to load product {}: {e}", section.id);
                report.inactive_products.push(section.id.clone());
                continue;
            }

            match self.module_service.activate_product(&section.id).await {
                Ok(test) if test.success => report.active_products.push(section.id.clone()),
                Ok(_) => report.inactive_products.push(section.id.clone()),
                Err(e) => {
                    log::error!("Failed to test product {}: {e}", section.id);
                    report.inactive_products.push(section.id.clone());
                }
            }
        }

        log::info!(
            "Startup complete: {} modules, {} servers, {} active / {} inactive products",
            report.modules_registered,
            report.servers_loaded,
            report.active_products.len(),
            report.inactive_products.len()
        );
        Ok(report)
    }
}

/// Builder for constructing `AppState` with host-specific adapters.
///
/// # Required adapters
/// - `service_repository`: where services are stored
/// - `call_log_repository`: where module calls are recorded
///
/// # Optional
/// - `event_sink`: defaults to `LoggingEventSink`
/// - `module_registry`: defaults to an empty `ModuleRegistry`
/// - `settings`: defaults to `OrchestratorSettings::default()`
#[derive(Default)]
pub struct AppStateBuilder {
    service_repository: Option<Arc<dyn ServiceRepository>>,
    call_log_repository: Option<Arc<dyn CallLogRepository>>,
    event_sink: Option<Arc<dyn EventSink>>,
    module_registry: Option<Arc<ModuleRegistry>>,
    settings: OrchestratorSettings,
}

impl AppStateBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn service_repository(mut self, repo: Arc<dyn ServiceRepository>) -> Self {
        self.service_repository = Some(repo);
        self
    }

    #[must_use]
    pub fn call_log_repository(mut self, repo: Arc<dyn CallLogRepository>) -> Self {
        self.call_log_repository = Some(repo);
        self
    }

    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    #[must_use]
    pub fn module_registry(mut self, registry: Arc<ModuleRegistry>) -> Self {
        self.module_registry = Some(registry);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the `AppState`.
    ///
    /// # Errors
    /// Returns `CoreError::Validation` if required adapters are missing.
    pub fn build(self) -> CoreResult<AppState> {
        let service_repository = self.service_repository.ok_or_else(|| {
            CoreError::Validation("service_repository is required".to_string())
        })?;
        let call_log_repository = self.call_log_repository.ok_or_else(|| {
            CoreError::Validation("call_log_repository is required".to_string())
        })?;
        let event_sink = self
            .event_sink
            .unwrap_or_else(|| Arc::new(LoggingEventSink));
        let module_registry = self
            .module_registry
            .unwrap_or_else(|| Arc::new(ModuleRegistry::new()));

        let ctx = Arc::new(ServiceContext::new(
            service_repository,
            Arc::clone(&call_log_repository),
            module_registry,
            event_sink,
        ));

        let call_logger = Arc::new(CallLogger::new(call_log_repository, &self.settings.timeouts));
        let orchestrator = Arc::new(LifecycleOrchestrator::new(
            Arc::clone(&ctx),
            Arc::clone(&call_logger),
            RetryPolicy::from(&self.settings.retry),
        ));
        let reconciliation = Arc::new(ReconciliationScheduler::new(
            Arc::clone(&orchestrator),
            self.settings.reconciliation.clone(),
        ));
        let sso_issuer = Arc::new(SsoIssuer::new(Arc::clone(&ctx), Arc::clone(&call_logger)));
        let domain_service = DomainService::new(Arc::clone(&ctx), Arc::clone(&call_logger));
        let module_service = ModuleService::new(Arc::clone(&ctx), call_logger);
        let admin_service = AdminService::new(Arc::clone(&orchestrator), Arc::clone(&sso_issuer));

        Ok(AppState {
            ctx,
            orchestrator,
            reconciliation,
            sso_issuer,
            domain_service,
            module_service,
            admin_service,
            settings: self.settings,
        })
    }
}
