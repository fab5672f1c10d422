//! Module registry
//!
//! Maps a product to its module descriptor, its resolved configuration and a module
//! instance. Configuration is layered (module defaults, product overrides, server
//! overrides) and validated here, so a bad value surfaces as
//! [`CoreError::Configuration`] before any remote call.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use provision_orchestrator_module::{
    create_module, get_all_module_metadata, resolve_config, ModuleConfig, ModuleError,
    ModuleMetadata, Operation, ProvisioningModule,
};

use crate::error::{CoreError, CoreResult};
use crate::types::{ProductBinding, ServerConfig};

/// Builds a module instance from resolved configuration.
pub type ModuleConstructor = Arc<
    dyn Fn(&ModuleConfig) -> provision_orchestrator_module::Result<Arc<dyn ProvisioningModule>>
        + Send
        + Sync,
>;

struct RegisteredModule {
    metadata: Arc<ModuleMetadata>,
    constructor: ModuleConstructor,
}

/// A product resolved to a ready module instance.
#[derive(Clone)]
pub struct ResolvedModule {
    pub product_id: String,
    pub metadata: Arc<ModuleMetadata>,
    pub config: ModuleConfig,
    pub module: Arc<dyn ProvisioningModule>,
}

impl ResolvedModule {
    pub fn module_id(&self) -> &str {
        &self.metadata.id
    }

    pub fn supports(&self, operation: Operation) -> bool {
        self.metadata.supports(operation)
    }

    /// Rejects dispatch of an operation the module did not declare.
    pub fn require(&self, operation: Operation) -> CoreResult<()> {
        if self.supports(operation) {
            Ok(())
        } else {
            Err(CoreError::CapabilityNotSupported {
                module: self.metadata.id.clone(),
                operation,
            })
        }
    }
}

impl std::fmt::Debug for ResolvedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedModule")
            .field("product_id", &self.product_id)
            .field("module_id", &self.metadata.id)
            .finish_non_exhaustive()
    }
}

/// Module registry
///
/// Capability sets are fixed when a module is registered; registering the same id
/// twice is rejected.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, RegisteredModule>>,
    servers: RwLock<HashMap<String, ServerConfig>>,
    products: RwLock<HashMap<String, ProductBinding>>,
    resolved: RwLock<HashMap<String, ResolvedModule>>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 module
    pub async fn register_module(
        &self,
        metadata: ModuleMetadata,
        constructor: ModuleConstructor,
    ) -> CoreResult<()> {
        let mut modules = self.modules.write().await;
        if modules.contains_key(&metadata.id) {
            return Err(CoreError::Validation(format!(
                "module '{}' is already registered",
                metadata.id
            )));
        }
        log::info!(
            "Registered module {} ({} capabilities)",
            metadata.id,
            metadata.capabilities.len()
        );
        modules.insert(
            metadata.id.clone(),
            RegisteredModule {
                metadata: Arc::new(metadata),
                constructor,
            },
        );
        Ok(())
    }

    /// Registers every module compiled into the module crate. Ids already registered
    /// are left alone.
    pub async fn register_builtin_modules(&self) -> CoreResult<usize> {
        let mut count = 0;
        for metadata in get_all_module_metadata() {
            if self.modules.read().await.contains_key(&metadata.id) {
                continue;
            }
            let id = metadata.id.clone();
            let constructor: ModuleConstructor = Arc::new(move |config| create_module(&id, config));
            self.register_module(metadata, constructor).await?;
            count += 1;
        }
        Ok(count)
    }

    pub async fn descriptors(&self) -> Vec<ModuleMetadata> {
        let mut all: Vec<ModuleMetadata> = self
            .modules
            .read()
            .await
            .values()
            .map(|m| (*m.metadata).clone())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub async fn descriptor(&self, module_id: &str) -> CoreResult<Arc<ModuleMetadata>> {
        self.modules
            .read()
            .await
            .get(module_id)
            .map(|m| Arc::clone(&m.metadata))
            .ok_or_else(|| CoreError::ModuleNotFound(module_id.to_string()))
    }

    pub async fn server(&self, server_id: &str) -> CoreResult<ServerConfig> {
        self.servers
            .read()
            .await
            .get(server_id)
            .cloned()
            .ok_or_else(|| CoreError::ServerNotFound(server_id.to_string()))
    }

    /// 新增或更新 server，使引用它的 product 缓存失效
    pub async fn upsert_server(&self, server: ServerConfig) -> CoreResult<()> {
        self.descriptor(&server.module_id).await?;
        let server_id = server.id.clone();
        self.servers.write().await.insert(server_id.clone(), server);

        let affected: Vec<String> = self
            .products
            .read()
            .await
            .values()
            .filter(|p| p.server_id.as_deref() == Some(server_id.as_str()))
            .map(|p| p.id.clone())
            .collect();
        let mut resolved = self.resolved.write().await;
        for product_id in affected {
            resolved.remove(&product_id);
        }
        Ok(())
    }

    /// 新增或更新 product 绑定
    ///
    /// The configuration is validated immediately. A changed binding loses its
    /// `active` flag until its connection test passes again.
    pub async fn upsert_product(&self, mut product: ProductBinding) -> CoreResult<()> {
        let metadata = self.descriptor(&product.module_id).await?;
        let server_values = self.server_values_for(&product).await?;
        resolve_config(&metadata, &[&product.overrides, &server_values])?;

        let mut products = self.products.write().await;
        let unchanged_active = products.get(&product.id).is_some_and(|existing| {
            existing.active
                && existing.module_id == product.module_id
                && existing.server_id == product.server_id
                && existing.overrides == product.overrides
        });
        product.active = unchanged_active;
        self.resolved.write().await.remove(&product.id);
        products.insert(product.id.clone(), product);
        Ok(())
    }

    pub async fn set_product_active(&self, product_id: &str, active: bool) -> CoreResult<()> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;
        product.active = active;
        Ok(())
    }

    pub async fn product(&self, product_id: &str) -> CoreResult<ProductBinding> {
        self.products
            .read()
            .await
            .get(product_id)
            .cloned()
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))
    }

    pub async fn products(&self) -> Vec<ProductBinding> {
        let mut all: Vec<ProductBinding> = self.products.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    async fn server_values_for(
        &self,
        product: &ProductBinding,
    ) -> CoreResult<BTreeMap<String, String>> {
        let Some(server_id) = &product.server_id else {
            return Ok(BTreeMap::new());
        };
        let server = self.server(server_id).await?;
        if server.module_id != product.module_id {
            return Err(CoreError::Validation(format!(
                "server '{server_id}' runs module '{}', product '{}' needs '{}'",
                server.module_id, product.id, product.module_id
            )));
        }
        Ok(server.values)
    }

    /// Resolves a product's merged, validated configuration.
    pub async fn resolve_config(&self, product_id: &str) -> CoreResult<(Arc<ModuleMetadata>, ModuleConfig)> {
        let product = self.product(product_id).await?;
        let metadata = self.descriptor(&product.module_id).await?;
        let server_values = self.server_values_for(&product).await?;
        let config = resolve_config(&metadata, &[&product.overrides, &server_values])?;
        Ok((metadata, config))
    }

    /// 解析 product 到 module 实例（带缓存）
    pub async fn resolve(&self, product_id: &str) -> CoreResult<ResolvedModule> {
        if let Some(resolved) = self.resolved.read().await.get(product_id) {
            return Ok(resolved.clone());
        }

        let (metadata, config) = self.resolve_config(product_id).await?;
        let constructor = self
            .modules
            .read()
            .await
            .get(&metadata.id)
            .map(|m| Arc::clone(&m.constructor))
            .ok_or_else(|| CoreError::ModuleNotFound(metadata.id.clone()))?;
        let module = constructor(&config).map_err(|e| construction_error(&metadata.id, e))?;

        let resolved = ResolvedModule {
            product_id: product_id.to_string(),
            metadata,
            config,
            module,
        };
        self.resolved
            .write()
            .await
            .insert(product_id.to_string(), resolved.clone());
        Ok(resolved)
    }
}

/// A module refusing its configuration is a configuration error, not a provider error.
fn construction_error(module_id: &str, error: ModuleError) -> CoreError {
    match error {
        ModuleError::InvalidParameter { param, detail, .. } => CoreError::Configuration {
            field: param,
            reason: detail,
        },
        other => {
            log::error!("Failed to construct module {module_id}: {other}");
            CoreError::Module(other)
        }
    }
}
