//! Module factory functions and metadata.

use std::sync::Arc;

use crate::error::{ModuleError, Result};
use crate::traits::ProvisioningModule;
use crate::types::{ModuleConfig, ModuleMetadata};

#[cfg(feature = "directadmin")]
use crate::modules::DirectAdminModule;
#[cfg(feature = "namecheap")]
use crate::modules::NamecheapModule;

/// Creates a [`ProvisioningModule`] instance for `module_id`.
///
/// `config` should already be resolved against the module's declared fields
/// (see [`resolve_config`](crate::resolve_config)). The returned module is wrapped in
/// `Arc<dyn ProvisioningModule>` so one instance can serve concurrent calls.
///
/// # Examples
///
/// ```rust,no_run
/// use provision_orchestrator_module::{create_module, ModuleConfig};
///
/// let config = ModuleConfig::new()
///     .with("hostname", "da.example.com")
///     .with("username", "admin")
///     .with("password", "secret");
/// let module = create_module("directadmin", &config).unwrap();
/// assert_eq!(module.id(), "directadmin");
/// ```
pub fn create_module(module_id: &str, config: &ModuleConfig) -> Result<Arc<dyn ProvisioningModule>> {
    // 未启用任何 module 时 config 不会被使用
    let _ = config;
    match module_id {
        #[cfg(feature = "directadmin")]
        "directadmin" => Ok(Arc::new(DirectAdminModule::new(config)?)),
        #[cfg(feature = "namecheap")]
        "namecheap" => Ok(Arc::new(NamecheapModule::new(config)?)),
        other => Err(ModuleError::Unsupported {
            provider: other.to_string(),
            operation: "create module (unknown or disabled module id)".to_string(),
        }),
    }
}

/// Returns metadata for all modules enabled via feature flags.
pub fn get_all_module_metadata() -> Vec<ModuleMetadata> {
    vec![
        #[cfg(feature = "directadmin")]
        DirectAdminModule::metadata(),
        #[cfg(feature = "namecheap")]
        NamecheapModule::metadata(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_module_is_unsupported() {
        let err = create_module("cpanel", &ModuleConfig::new()).err();
        assert!(matches!(err, Some(ModuleError::Unsupported { .. })));
    }

    #[cfg(feature = "all-modules")]
    #[test]
    fn metadata_ids_are_unique() {
        let metadata = get_all_module_metadata();
        let mut ids: Vec<_> = metadata.iter().map(|m| m.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), metadata.len());
        assert!(ids.contains(&"directadmin"));
        assert!(ids.contains(&"namecheap"));
    }
}
