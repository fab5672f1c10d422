//! Module service
//!
//! Descriptor listing, WHMCS-shape rendering and product activation.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use provision_orchestrator_module::whmcs;

use super::call_logger::CallLogger;
use super::ServiceContext;
use crate::error::CoreResult;
use crate::types::{CallScope, ModuleConfig, ModuleMetadata, Operation};

/// Result of a `testConnection` against a product's resolved configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTest {
    pub product_id: String,
    pub module_id: String,
    pub success: bool,
    /// `at {provider}, testConnection failed: ...` on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub elapsed_ms: u64,
}

pub struct ModuleService {
    ctx: Arc<ServiceContext>,
    call_logger: Arc<CallLogger>,
}

impl ModuleService {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>, call_logger: Arc<CallLogger>) -> Self {
        Self { ctx, call_logger }
    }

    /// All registered module descriptors, sorted by id.
    pub async fn list_modules(&self) -> Vec<ModuleMetadata> {
        self.ctx.module_registry.descriptors().await
    }

    /// The descriptor in WHMCS shape: `MetaData`, `ConfigOptions` and the entry point
    /// names of its capabilities.
    pub async fn whmcs_descriptor(&self, module_id: &str) -> CoreResult<serde_json::Value> {
        let metadata = self.ctx.module_registry.descriptor(module_id).await?;
        Ok(serde_json::json!({
            "MetaData": whmcs::metadata_array(&metadata),
            "ConfigOptions": whmcs::config_array(&metadata),
            "Functions": whmcs::function_names(&metadata),
        }))
    }

    /// Resolves and validates a product's layered configuration without contacting the
    /// provider.
    pub async fn validate_product(&self, product_id: &str) -> CoreResult<ModuleConfig> {
        let (_, config) = self.ctx.module_registry.resolve_config(product_id).await?;
        Ok(config)
    }

    /// Calls `testConnection` with the product's configuration. Logged, never retried.
    pub async fn test_connection(&self, product_id: &str) -> CoreResult<ConnectionTest> {
        let resolved = self.ctx.module_registry.resolve(product_id).await?;
        let started = Instant::now();
        let result = self
            .call_logger
            .invoke(
                &CallScope::standalone(),
                &resolved,
                Operation::TestConnection,
                &serde_json::json!({ "productId": product_id }),
                |m, call_ctx| async move { m.test_connection(&call_ctx).await },
            )
            .await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        Ok(ConnectionTest {
            product_id: product_id.to_string(),
            module_id: resolved.module_id().to_string(),
            success: result.is_ok(),
            message: result.err().map(|failure| failure.to_string()),
            elapsed_ms,
        })
    }

    /// Activates a product once its connection test passes. A failing product stays
    /// inactive and no new services can be registered for it.
    pub async fn activate_product(&self, product_id: &str) -> CoreResult<ConnectionTest> {
        let test = self.test_connection(product_id).await?;
        if test.success {
            self.ctx
                .module_registry
                .set_product_active(product_id, true)
                .await?;
            log::info!(
                "Product {product_id} activated ({} answered in {}ms)",
                test.module_id,
                test.elapsed_ms
            );
        } else {
            self.ctx
                .module_registry
                .set_product_active(product_id, false)
                .await?;
            log::warn!(
                "Product {product_id} left inactive: {}",
                test.message.as_deref().unwrap_or("connection test failed")
            );
        }
        Ok(test)
    }
}
