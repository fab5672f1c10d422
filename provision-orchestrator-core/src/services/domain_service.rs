//! Domain management pass-through
//!
//! Nameservers, host records, contacts, registrar lock and transfer code of a domain
//! service. Capability-checked, logged through the call logger, one attempt per call.
//! Writes hold the service lease.

use std::future::Future;
use std::sync::Arc;

use super::call_logger::{CallLogger, LoggableResult};
use super::ServiceContext;
use crate::error::{CoreError, CoreResult};
use crate::registry::ResolvedModule;
use crate::types::{
    Ack, CallScope, ContactDetails, DnsHostRecord, Operation, Service, ServiceCategory,
    ServiceState,
};
use provision_orchestrator_module::{CallContext, ProvisioningModule};

/// Registries accept 2 to 13 nameservers.
const MIN_NAMESERVERS: usize = 2;
const MAX_NAMESERVERS: usize = 13;

pub struct DomainService {
    ctx: Arc<ServiceContext>,
    call_logger: Arc<CallLogger>,
}

impl DomainService {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>, call_logger: Arc<CallLogger>) -> Self {
        Self { ctx, call_logger }
    }

    pub async fn get_nameservers(&self, service_id: &str) -> CoreResult<Vec<String>> {
        self.read(service_id, Operation::GetNameservers, |m, ctx, domain| async move {
            m.get_nameservers(&ctx, &domain).await
        })
        .await
    }

    pub async fn save_nameservers(&self, service_id: &str, nameservers: Vec<String>) -> CoreResult<Ack> {
        let nameservers: Vec<String> = nameservers
            .into_iter()
            .map(|ns| ns.trim().trim_end_matches('.').to_ascii_lowercase())
            .filter(|ns| !ns.is_empty())
            .collect();
        if !(MIN_NAMESERVERS..=MAX_NAMESERVERS).contains(&nameservers.len()) {
            return Err(CoreError::Validation(format!(
                "between {MIN_NAMESERVERS} and {MAX_NAMESERVERS} nameservers are required, got {}",
                nameservers.len()
            )));
        }
        let payload = serde_json::json!({ "nameservers": nameservers });
        self.write(service_id, Operation::SaveNameservers, payload, move |m, ctx, domain| async move {
            m.save_nameservers(&ctx, &domain, &nameservers).await
        })
        .await
    }

    pub async fn get_dns_records(&self, service_id: &str) -> CoreResult<Vec<DnsHostRecord>> {
        self.read(service_id, Operation::GetDnsRecords, |m, ctx, domain| async move {
            m.get_dns_records(&ctx, &domain).await
        })
        .await
    }

    /// Replaces the full host record set.
    pub async fn save_dns_records(&self, service_id: &str, records: Vec<DnsHostRecord>) -> CoreResult<Ack> {
        if let Some(bad) = records
            .iter()
            .find(|r| r.host.trim().is_empty() || r.address.trim().is_empty())
        {
            return Err(CoreError::Validation(format!(
                "host record '{}' {} needs a host and an address",
                bad.host, bad.record_type
            )));
        }
        let payload = serde_json::json!({ "records": records });
        self.write(service_id, Operation::SaveDnsRecords, payload, move |m, ctx, domain| async move {
            m.save_dns_records(&ctx, &domain, &records).await
        })
        .await
    }

    pub async fn get_contact_details(&self, service_id: &str) -> CoreResult<ContactDetails> {
        self.read(service_id, Operation::GetContactDetails, |m, ctx, domain| async move {
            m.get_contact_details(&ctx, &domain).await
        })
        .await
    }

    pub async fn save_contact_details(&self, service_id: &str, contact: ContactDetails) -> CoreResult<Ack> {
        let payload = serde_json::to_value(&contact)
            .map_err(|e| CoreError::SerializationError(e.to_string()))?;
        self.write(service_id, Operation::SaveContactDetails, payload, move |m, ctx, domain| async move {
            m.save_contact_details(&ctx, &domain, &contact).await
        })
        .await
    }

    pub async fn get_registrar_lock(&self, service_id: &str) -> CoreResult<bool> {
        self.read(service_id, Operation::GetRegistrarLock, |m, ctx, domain| async move {
            m.get_registrar_lock(&ctx, &domain).await
        })
        .await
    }

    pub async fn save_registrar_lock(&self, service_id: &str, locked: bool) -> CoreResult<Ack> {
        let payload = serde_json::json!({ "locked": locked });
        self.write(service_id, Operation::SaveRegistrarLock, payload, move |m, ctx, domain| async move {
            m.save_registrar_lock(&ctx, &domain, locked).await
        })
        .await
    }

    /// EPP code. The module registers it as a secret, so only its length is recorded.
    pub async fn get_transfer_code(&self, service_id: &str) -> CoreResult<String> {
        self.read(service_id, Operation::GetTransferCode, |m, ctx, domain| async move {
            m.get_transfer_code(&ctx, &domain).await
        })
        .await
    }

    async fn read<T, F, Fut>(&self, service_id: &str, operation: Operation, call: F) -> CoreResult<T>
    where
        T: LoggableResult + Send,
        F: FnOnce(Arc<dyn ProvisioningModule>, Arc<CallContext>, String) -> Fut + Send,
        Fut: Future<Output = provision_orchestrator_module::Result<T>> + Send,
    {
        let service = self.ctx.get_service(service_id).await?;
        let resolved = self.domain_module(&service, operation).await?;
        let payload = serde_json::json!({});
        self.invoke(&service, &resolved, operation, payload, call).await
    }

    async fn write<T, F, Fut>(
        &self,
        service_id: &str,
        operation: Operation,
        payload: serde_json::Value,
        call: F,
    ) -> CoreResult<T>
    where
        T: LoggableResult + Send,
        F: FnOnce(Arc<dyn ProvisioningModule>, Arc<CallContext>, String) -> Fut + Send,
        Fut: Future<Output = provision_orchestrator_module::Result<T>> + Send,
    {
        let _lease = self.ctx.leases.acquire(service_id).await;
        let service = self.ctx.get_service(service_id).await?;
        if service.state != ServiceState::Active {
            return Err(CoreError::Validation(format!(
                "cannot change a {} domain",
                service.state
            )));
        }
        let resolved = self.domain_module(&service, operation).await?;
        let result = self.invoke(&service, &resolved, operation, payload, call).await;
        if result.is_ok() {
            log::info!("{operation} applied to {} (service {service_id})", service.resources.domain);
        }
        result
    }

    async fn domain_module(&self, service: &Service, operation: Operation) -> CoreResult<ResolvedModule> {
        if service.category != ServiceCategory::Domain {
            return Err(CoreError::Validation(format!(
                "service {} is not a domain",
                service.id
            )));
        }
        if !service.state.is_reconciled() {
            return Err(CoreError::Validation(format!(
                "domain of a {} service cannot be managed",
                service.state
            )));
        }
        let resolved = self.ctx.resolve_module(service).await?;
        resolved.require(operation)?;
        Ok(resolved)
    }

    async fn invoke<T, F, Fut>(
        &self,
        service: &Service,
        resolved: &ResolvedModule,
        operation: Operation,
        mut payload: serde_json::Value,
        call: F,
    ) -> CoreResult<T>
    where
        T: LoggableResult + Send,
        F: FnOnce(Arc<dyn ProvisioningModule>, Arc<CallContext>, String) -> Fut + Send,
        Fut: Future<Output = provision_orchestrator_module::Result<T>> + Send,
    {
        let domain = service.resources.domain.clone();
        if let Some(fields) = payload.as_object_mut() {
            fields.insert("domain".to_string(), serde_json::Value::String(domain.clone()));
        }
        self.call_logger
            .invoke(
                &CallScope::service(&service.id),
                resolved,
                operation,
                &payload,
                move |m, ctx| call(m, ctx, domain),
            )
            .await
            .map_err(CoreError::from)
    }
}
