//! 测试辅助模块
//!
//! 提供 mock 实现、可编排的 stub module 和便捷的测试工厂方法。

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;

use provision_orchestrator_module::{
    Ack, CallContext, ConfigField, ContactDetails, CreateAccountRequest, CreatedAccount,
    DnsHostRecord, ModuleConfig, ModuleError, ModuleMetadata, ModuleType, Operation,
    ProvisioningModule, RenewOutcome, ResourceChange, SsoToken, SyncStatus, TransferRequest,
    TransferStarted, TransferStatus,
};

use crate::error::{CoreError, CoreResult};
use crate::registry::{ModuleConstructor, ModuleRegistry, ResolvedModule};
use crate::services::{CallLogger, LifecycleOrchestrator, RetryPolicy, ServiceContext};
use crate::traits::{
    CallLogRepository, EventSink, InMemoryCallLogRepository, ServiceRepository,
};
use crate::types::{
    NewService, OperatorAlert, ProductBinding, ProvisioningEvent, ServerConfig, Service,
    ServiceCategory, ServiceQuery, ServiceState, StateChange,
};

// ===== StubModule =====

/// One scripted answer of the stub.
pub enum StubReply {
    /// Succeed; mutating operations return this ack.
    Ack(Ack),
    Fail(ModuleError),
    /// Sleep, then answer as if unscripted. Longer than the call timeout = a timeout.
    Hang(Duration),
}

/// Scriptable in-memory module.
///
/// Unscripted calls succeed. `sync` answers with the configured status, or
/// `ResourceNotFound` when none is set.
pub struct StubModule {
    scripts: Mutex<HashMap<Operation, VecDeque<StubReply>>>,
    calls: Mutex<HashMap<Operation, u32>>,
    external_id: String,
    sync_status: Mutex<Option<SyncStatus>>,
    probe: Mutex<Option<String>>,
    renewal: Mutex<Option<NaiveDate>>,
    transfer_status: Mutex<TransferStatus>,
}

impl StubModule {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            external_id: "abc123".to_string(),
            sync_status: Mutex::new(Some(SyncStatus {
                active: true,
                ..SyncStatus::default()
            })),
            probe: Mutex::new(None),
            renewal: Mutex::new(None),
            transfer_status: Mutex::new(TransferStatus::default()),
        }
    }

    pub fn script(&self, operation: Operation, replies: impl IntoIterator<Item = StubReply>) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(operation)
            .or_default()
            .extend(replies);
    }

    pub fn calls(&self, operation: Operation) -> u32 {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn set_sync(&self, status: Option<SyncStatus>) {
        *self.sync_status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub fn set_probe(&self, external_id: Option<&str>) {
        *self.probe.lock().unwrap_or_else(PoisonError::into_inner) = external_id.map(str::to_string);
    }

    pub fn set_renewal(&self, expiry: Option<NaiveDate>) {
        *self.renewal.lock().unwrap_or_else(PoisonError::into_inner) = expiry;
    }

    pub fn set_transfer_status(&self, status: TransferStatus) {
        *self.transfer_status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub fn constructor(self: &Arc<Self>) -> ModuleConstructor {
        let stub = Arc::clone(self);
        Arc::new(move |_config: &ModuleConfig| {
            Ok(Arc::clone(&stub) as Arc<dyn ProvisioningModule>)
        })
    }

    /// Counts the call and plays the next scripted reply. `Ok(None)` = unscripted success.
    async fn reply(&self, operation: Operation) -> Result<Option<Ack>, ModuleError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(operation)
            .or_insert(0) += 1;
        let next = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        match next {
            None => Ok(None),
            Some(StubReply::Ack(ack)) => Ok(Some(ack)),
            Some(StubReply::Fail(e)) => Err(e),
            Some(StubReply::Hang(d)) => {
                tokio::time::sleep(d).await;
                Ok(None)
            }
        }
    }

    async fn ack(&self, operation: Operation) -> Result<Ack, ModuleError> {
        Ok(self.reply(operation).await?.unwrap_or_default())
    }
}

#[async_trait]
impl ProvisioningModule for StubModule {
    fn id(&self) -> &'static str {
        "stub"
    }

    fn metadata() -> ModuleMetadata {
        stub_metadata("stub", &Operation::ALL)
    }

    async fn test_connection(&self, _ctx: &CallContext) -> Result<(), ModuleError> {
        self.reply(Operation::TestConnection).await.map(|_| ())
    }

    async fn create_account(
        &self,
        _ctx: &CallContext,
        _request: &CreateAccountRequest,
    ) -> Result<CreatedAccount, ModuleError> {
        self.reply(Operation::CreateAccount).await?;
        Ok(CreatedAccount {
            external_id: self.external_id.clone(),
            meta: BTreeMap::from([("ip".to_string(), "10.0.0.1".to_string())]),
        })
    }

    fn probe_external_id(&self, _request: &CreateAccountRequest) -> Option<String> {
        self.probe.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn sync(&self, _ctx: &CallContext, external_id: &str) -> Result<SyncStatus, ModuleError> {
        self.reply(Operation::Sync).await?;
        self.sync_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| ModuleError::ResourceNotFound {
                provider: "stub".to_string(),
                resource: external_id.to_string(),
                raw_message: None,
            })
    }

    async fn suspend_account(&self, _ctx: &CallContext, _external_id: &str) -> Result<Ack, ModuleError> {
        self.ack(Operation::SuspendAccount).await
    }

    async fn unsuspend_account(&self, _ctx: &CallContext, _external_id: &str) -> Result<Ack, ModuleError> {
        self.ack(Operation::UnsuspendAccount).await
    }

    async fn terminate_account(&self, _ctx: &CallContext, _external_id: &str) -> Result<Ack, ModuleError> {
        self.ack(Operation::TerminateAccount).await
    }

    async fn change_resources(
        &self,
        _ctx: &CallContext,
        _external_id: &str,
        _change: &ResourceChange,
    ) -> Result<Ack, ModuleError> {
        self.ack(Operation::ChangeResources).await
    }

    async fn change_credential(
        &self,
        _ctx: &CallContext,
        _external_id: &str,
        _new_secret: &str,
    ) -> Result<Ack, ModuleError> {
        self.ack(Operation::ChangeCredential).await
    }

    async fn single_sign_on(
        &self,
        _ctx: &CallContext,
        external_id: &str,
        as_admin: bool,
    ) -> Result<SsoToken, ModuleError> {
        self.reply(Operation::SingleSignOn).await?;
        Ok(SsoToken::new(format!(
            "https://panel.example.com/login?user={external_id}&admin={as_admin}&key=one-time-key-0123456789"
        )))
    }

    async fn renew(&self, _ctx: &CallContext, _external_id: &str, _years: u32) -> Result<RenewOutcome, ModuleError> {
        self.reply(Operation::Renew).await?;
        Ok(RenewOutcome {
            expiry_date: *self.renewal.lock().unwrap_or_else(PoisonError::into_inner),
        })
    }

    async fn get_nameservers(&self, _ctx: &CallContext, _domain: &str) -> Result<Vec<String>, ModuleError> {
        self.reply(Operation::GetNameservers).await?;
        Ok(vec!["ns1.example.net".to_string(), "ns2.example.net".to_string()])
    }

    async fn save_nameservers(
        &self,
        _ctx: &CallContext,
        _domain: &str,
        _nameservers: &[String],
    ) -> Result<Ack, ModuleError> {
        self.ack(Operation::SaveNameservers).await
    }

    async fn get_dns_records(&self, _ctx: &CallContext, _domain: &str) -> Result<Vec<DnsHostRecord>, ModuleError> {
        self.reply(Operation::GetDnsRecords).await?;
        Ok(vec![DnsHostRecord {
            host: "@".to_string(),
            record_type: "A".to_string(),
            address: "192.0.2.1".to_string(),
            priority: None,
            ttl: Some(1800),
        }])
    }

    async fn save_dns_records(
        &self,
        _ctx: &CallContext,
        _domain: &str,
        _records: &[DnsHostRecord],
    ) -> Result<Ack, ModuleError> {
        self.ack(Operation::SaveDnsRecords).await
    }

    async fn get_contact_details(&self, _ctx: &CallContext, _domain: &str) -> Result<ContactDetails, ModuleError> {
        self.reply(Operation::GetContactDetails).await?;
        Ok(test_contact())
    }

    async fn save_contact_details(
        &self,
        _ctx: &CallContext,
        _domain: &str,
        _contact: &ContactDetails,
    ) -> Result<Ack, ModuleError> {
        self.ack(Operation::SaveContactDetails).await
    }

    async fn get_registrar_lock(&self, _ctx: &CallContext, _domain: &str) -> Result<bool, ModuleError> {
        self.reply(Operation::GetRegistrarLock).await?;
        Ok(true)
    }

    async fn save_registrar_lock(&self, _ctx: &CallContext, _domain: &str, _locked: bool) -> Result<Ack, ModuleError> {
        self.ack(Operation::SaveRegistrarLock).await
    }

    async fn get_transfer_code(&self, ctx: &CallContext, _domain: &str) -> Result<String, ModuleError> {
        self.reply(Operation::GetTransferCode).await?;
        let code = "EPP-s3cr3t-code".to_string();
        ctx.register_secret(code.as_str());
        Ok(code)
    }

    async fn transfer_domain(&self, ctx: &CallContext, request: &TransferRequest) -> Result<TransferStarted, ModuleError> {
        ctx.register_secret(request.auth_code.as_str());
        self.reply(Operation::TransferDomain).await?;
        Ok(TransferStarted {
            transfer_id: "tr-42".to_string(),
            meta: BTreeMap::from([("OrderID".to_string(), "9001".to_string())]),
        })
    }

    async fn transfer_sync(&self, _ctx: &CallContext, _transfer_id: &str) -> Result<TransferStatus, ModuleError> {
        self.reply(Operation::TransferSync).await?;
        Ok(self.transfer_status.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

/// Descriptor with a required `hostname`, a secret `password` and a `package` field.
pub fn stub_metadata(id: &str, capabilities: &[Operation]) -> ModuleMetadata {
    ModuleMetadata {
        id: id.to_string(),
        display_name: format!("Stub ({id})"),
        api_version: "1.1".to_string(),
        module_type: ModuleType::Server,
        capabilities: capabilities.to_vec(),
        default_non_ssl_port: Some(2222),
        default_ssl_port: Some(2222),
        sso_label: Some("Login to Panel".to_string()),
        admin_sso_label: None,
        config_fields: vec![
            ConfigField::text("hostname", "Hostname").required(),
            ConfigField::password("password", "Password"),
            ConfigField::text("package", "Package"),
        ],
    }
}

pub fn stub_config() -> ModuleConfig {
    let mut config = ModuleConfig::new()
        .with("hostname", "panel.example.com")
        .with("password", "hunter2")
        .with("package", "default");
    config.mark_secret("password");
    config
}

/// A resolved module without going through the registry.
pub fn resolved_stub(stub: &Arc<StubModule>, capabilities: &[Operation]) -> ResolvedModule {
    ResolvedModule {
        product_id: "p1".to_string(),
        metadata: Arc::new(stub_metadata("stub", capabilities)),
        config: stub_config(),
        module: Arc::clone(stub) as Arc<dyn ProvisioningModule>,
    }
}

pub fn test_contact() -> ContactDetails {
    ContactDetails {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        company: None,
        email: "ada@example.com".to_string(),
        phone: "+44.2071234567".to_string(),
        address1: "12 Analytical Row".to_string(),
        address2: None,
        city: "London".to_string(),
        state_province: "London".to_string(),
        postal_code: "N1 9GU".to_string(),
        country: "GB".to_string(),
    }
}

// ===== MockServiceRepository =====

pub struct MockServiceRepository {
    services: RwLock<HashMap<String, Service>>,
    /// 如果 Some，save 时返回此错误（用于测试 deferred write 路径）
    save_error: RwLock<Option<String>>,
}

impl MockServiceRepository {
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            save_error: RwLock::new(None),
        }
    }

    pub async fn set_save_error(&self, err: Option<String>) {
        *self.save_error.write().await = err;
    }
}

#[async_trait]
impl ServiceRepository for MockServiceRepository {
    async fn find_by_id(&self, id: &str) -> CoreResult<Option<Service>> {
        Ok(self.services.read().await.get(id).cloned())
    }

    async fn find(&self, query: &ServiceQuery) -> CoreResult<Vec<Service>> {
        let mut found: Vec<Service> = self
            .services
            .read()
            .await
            .values()
            .filter(|s| query.matches(s))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn save(&self, service: &Service) -> CoreResult<()> {
        if let Some(ref msg) = *self.save_error.read().await {
            return Err(CoreError::StorageError(msg.clone()));
        }
        self.services
            .write()
            .await
            .insert(service.id.clone(), service.clone());
        Ok(())
    }
}

// ===== RecordingEventSink =====

#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<ProvisioningEvent>>,
}

impl RecordingEventSink {
    pub fn all(&self) -> Vec<ProvisioningEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state_changes(&self) -> Vec<StateChange> {
        self.all()
            .into_iter()
            .filter_map(|e| match e {
                ProvisioningEvent::StateChanged(change) => Some(change),
                _ => None,
            })
            .collect()
    }

    pub fn alerts(&self) -> Vec<OperatorAlert> {
        self.all()
            .into_iter()
            .filter_map(|e| match e {
                ProvisioningEvent::OperatorAlert(alert) => Some(alert),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&self, event: ProvisioningEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

// ===== Harness =====

/// Everything wired around one stub module bound to product `p1` on server `srv`.
pub struct Harness {
    pub ctx: Arc<ServiceContext>,
    pub services: Arc<MockServiceRepository>,
    pub calls: Arc<InMemoryCallLogRepository>,
    pub events: Arc<RecordingEventSink>,
    pub stub: Arc<StubModule>,
    pub orchestrator: Arc<LifecycleOrchestrator>,
    pub max_attempts: u32,
}

impl Harness {
    /// Call timeout used by the harness' call logger.
    pub const CALL_TIMEOUT: Duration = Duration::from_millis(50);

    pub async fn new(capabilities: &[Operation]) -> Self {
        Self::with_category(capabilities, ServiceCategory::Hosting).await
    }

    pub async fn with_category(capabilities: &[Operation], category: ServiceCategory) -> Self {
        let stub = Arc::new(StubModule::new());
        let registry = Arc::new(ModuleRegistry::new());
        registry
            .register_module(stub_metadata("stub", capabilities), stub.constructor())
            .await
            .unwrap();
        registry
            .upsert_server(ServerConfig {
                id: "srv".to_string(),
                module_id: "stub".to_string(),
                name: "Panel 1".to_string(),
                values: BTreeMap::from([
                    ("hostname".to_string(), "panel.example.com".to_string()),
                    ("password".to_string(), "hunter2".to_string()),
                ]),
            })
            .await
            .unwrap();
        registry
            .upsert_product(ProductBinding {
                id: "p1".to_string(),
                name: "Starter".to_string(),
                module_id: "stub".to_string(),
                server_id: Some("srv".to_string()),
                category,
                overrides: BTreeMap::from([("package".to_string(), "starter".to_string())]),
                active: false,
            })
            .await
            .unwrap();
        registry.set_product_active("p1", true).await.unwrap();

        let services = Arc::new(MockServiceRepository::new());
        let calls = Arc::new(InMemoryCallLogRepository::new());
        let events = Arc::new(RecordingEventSink::default());
        let ctx = Arc::new(ServiceContext::new(
            Arc::clone(&services) as Arc<dyn ServiceRepository>,
            Arc::clone(&calls) as Arc<dyn CallLogRepository>,
            registry,
            Arc::clone(&events) as Arc<dyn EventSink>,
        ));
        let logger = Arc::new(CallLogger::with_timeout(
            Arc::clone(&calls) as Arc<dyn CallLogRepository>,
            Self::CALL_TIMEOUT,
        ));
        let max_attempts = 4;
        let orchestrator = Arc::new(LifecycleOrchestrator::new(
            Arc::clone(&ctx),
            logger,
            RetryPolicy::immediate(max_attempts),
        ));

        Self {
            ctx,
            services,
            calls,
            events,
            stub,
            orchestrator,
            max_attempts,
        }
    }

    pub fn new_service() -> NewService {
        NewService {
            client_id: "client-1".to_string(),
            product_id: "p1".to_string(),
            resources: CreateAccountRequest {
                domain: "example.com".to_string(),
                username: Some("exampleu".to_string()),
                password: Some("Cr3ate-pass".to_string()),
                contact: test_contact(),
                registration_years: Some(1),
                nameservers: Vec::new(),
                options: BTreeMap::new(),
            },
            expiry_date: None,
        }
    }

    pub async fn pending_service(&self) -> Service {
        self.orchestrator
            .register_service(Self::new_service())
            .await
            .unwrap()
    }

    /// A provisioned service stored directly as `active` with external id `abc123`.
    pub async fn active_service(&self) -> Service {
        let mut service = self.pending_service().await;
        service.state = ServiceState::Active;
        service.external_id = Some("abc123".to_string());
        service.expiry_date = NaiveDate::from_ymd_opt(2027, 6, 1);
        service.version += 1;
        service.updated_at = Utc::now();
        self.services.save(&service).await.unwrap();
        service
    }
}
