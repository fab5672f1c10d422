use async_trait::async_trait;

use crate::context::CallContext;
use crate::error::{ModuleError, Result};
use crate::types::{
    Ack, ContactDetails, CreateAccountRequest, CreatedAccount, DnsHostRecord, ModuleMetadata,
    Operation, RenewOutcome, ResourceChange, SsoToken, SyncStatus, TransferRequest, TransferStarted,
    TransferStatus,
};

/// 原始 API 错误（内部使用）
#[derive(Debug, Clone)]
pub(crate) struct RawApiError {
    /// 错误码（各 Provider 格式不同）
    pub code: Option<String>,
    /// 原始错误消息
    pub message: String,
}

impl RawApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

/// 错误上下文信息（内部使用）
#[derive(Debug, Clone, Default)]
pub(crate) struct ErrorContext {
    /// 被操作的资源（账户名、域名）
    pub resource: Option<String>,
    /// 触发错误的参数
    pub param: Option<String>,
}

impl ErrorContext {
    pub fn resource(resource: impl Into<String>) -> Self {
        Self {
            resource: Some(resource.into()),
            param: None,
        }
    }
}

/// Module 错误映射 Trait（内部使用）
/// 各 adapter 实现此 trait 以将原始 API 错误映射到统一错误类型
pub(crate) trait ModuleErrorMapper {
    fn provider_name(&self) -> &'static str;

    fn map_error(&self, raw: RawApiError, context: ErrorContext) -> ModuleError;

    fn parse_error(&self, detail: impl ToString) -> ModuleError {
        ModuleError::ParseError {
            provider: self.provider_name().to_string(),
            detail: detail.to_string(),
        }
    }

    fn invalid_parameter(&self, param: &str, detail: impl ToString) -> ModuleError {
        ModuleError::InvalidParameter {
            provider: self.provider_name().to_string(),
            param: param.to_string(),
            detail: detail.to_string(),
        }
    }

    fn unknown_error(&self, raw: RawApiError) -> ModuleError {
        ModuleError::Unknown {
            provider: self.provider_name().to_string(),
            raw_code: raw.code,
            raw_message: raw.message,
        }
    }
}

fn unsupported<T>(provider: &str, operation: Operation) -> Result<T> {
    Err(ModuleError::Unsupported {
        provider: provider.to_string(),
        operation: operation.as_str().to_string(),
    })
}

/// Uniform lifecycle contract every provider adapter implements.
///
/// Optional operations default to [`ModuleError::Unsupported`]; a module must only
/// list an operation in [`ModuleMetadata::capabilities`] when it overrides it.
///
/// Mutating operations must be idempotent with respect to the target state: a suspend
/// of an already suspended account returns [`Ack::already`], not an error.
#[async_trait]
pub trait ProvisioningModule: Send + Sync {
    /// Module identifier, equal to `metadata().id`.
    fn id(&self) -> &'static str;

    /// Static module metadata. Callable before an instance exists.
    fn metadata() -> ModuleMetadata
    where
        Self: Sized;

    /// Verifies credentials and reachability.
    async fn test_connection(&self, ctx: &CallContext) -> Result<()>;

    /// Provisions the resource.
    async fn create_account(
        &self,
        ctx: &CallContext,
        request: &CreateAccountRequest,
    ) -> Result<CreatedAccount>;

    /// Identifier a resource created from `request` would carry, if the provider lets
    /// the caller choose it (username, domain name). Used to look for an existing
    /// resource before a create is re-issued after an ambiguous failure.
    fn probe_external_id(&self, request: &CreateAccountRequest) -> Option<String> {
        let _ = request;
        None
    }

    /// Reads ground truth for the resource. Never cached by the module.
    async fn sync(&self, ctx: &CallContext, external_id: &str) -> Result<SyncStatus>;

    async fn suspend_account(&self, ctx: &CallContext, external_id: &str) -> Result<Ack> {
        let _ = (ctx, external_id);
        unsupported(self.id(), Operation::SuspendAccount)
    }

    async fn unsuspend_account(&self, ctx: &CallContext, external_id: &str) -> Result<Ack> {
        let _ = (ctx, external_id);
        unsupported(self.id(), Operation::UnsuspendAccount)
    }

    async fn terminate_account(&self, ctx: &CallContext, external_id: &str) -> Result<Ack> {
        let _ = (ctx, external_id);
        unsupported(self.id(), Operation::TerminateAccount)
    }

    /// Applies a resize. Partial application is reported as
    /// [`ModuleError::PartiallyApplied`].
    async fn change_resources(
        &self,
        ctx: &CallContext,
        external_id: &str,
        change: &ResourceChange,
    ) -> Result<Ack> {
        let _ = (ctx, external_id, change);
        unsupported(self.id(), Operation::ChangeResources)
    }

    async fn change_credential(
        &self,
        ctx: &CallContext,
        external_id: &str,
        new_secret: &str,
    ) -> Result<Ack> {
        let _ = (ctx, external_id, new_secret);
        unsupported(self.id(), Operation::ChangeCredential)
    }

    async fn single_sign_on(
        &self,
        ctx: &CallContext,
        external_id: &str,
        as_admin: bool,
    ) -> Result<SsoToken> {
        let _ = (ctx, external_id, as_admin);
        unsupported(self.id(), Operation::SingleSignOn)
    }

    async fn renew(&self, ctx: &CallContext, external_id: &str, years: u32) -> Result<RenewOutcome> {
        let _ = (ctx, external_id, years);
        unsupported(self.id(), Operation::Renew)
    }

    // ---- domain sub-operations ----

    async fn get_nameservers(&self, ctx: &CallContext, domain: &str) -> Result<Vec<String>> {
        let _ = (ctx, domain);
        unsupported(self.id(), Operation::GetNameservers)
    }

    async fn save_nameservers(
        &self,
        ctx: &CallContext,
        domain: &str,
        nameservers: &[String],
    ) -> Result<Ack> {
        let _ = (ctx, domain, nameservers);
        unsupported(self.id(), Operation::SaveNameservers)
    }

    async fn get_dns_records(&self, ctx: &CallContext, domain: &str) -> Result<Vec<DnsHostRecord>> {
        let _ = (ctx, domain);
        unsupported(self.id(), Operation::GetDnsRecords)
    }

    async fn save_dns_records(
        &self,
        ctx: &CallContext,
        domain: &str,
        records: &[DnsHostRecord],
    ) -> Result<Ack> {
        let _ = (ctx, domain, records);
        unsupported(self.id(), Operation::SaveDnsRecords)
    }

    async fn get_contact_details(&self, ctx: &CallContext, domain: &str) -> Result<ContactDetails> {
        let _ = (ctx, domain);
        unsupported(self.id(), Operation::GetContactDetails)
    }

    async fn save_contact_details(
        &self,
        ctx: &CallContext,
        domain: &str,
        contact: &ContactDetails,
    ) -> Result<Ack> {
        let _ = (ctx, domain, contact);
        unsupported(self.id(), Operation::SaveContactDetails)
    }

    /// Whether transfer lock is enabled.
    async fn get_registrar_lock(&self, ctx: &CallContext, domain: &str) -> Result<bool> {
        let _ = (ctx, domain);
        unsupported(self.id(), Operation::GetRegistrarLock)
    }

    async fn save_registrar_lock(&self, ctx: &CallContext, domain: &str, locked: bool) -> Result<Ack> {
        let _ = (ctx, domain, locked);
        unsupported(self.id(), Operation::SaveRegistrarLock)
    }

    /// Fetches the transfer authorisation (EPP) code.
    async fn get_transfer_code(&self, ctx: &CallContext, domain: &str) -> Result<String> {
        let _ = (ctx, domain);
        unsupported(self.id(), Operation::GetTransferCode)
    }

    /// Submits a transfer-in. Success means the registrar accepted the order, not that
    /// the domain has moved.
    async fn transfer_domain(&self, ctx: &CallContext, request: &TransferRequest) -> Result<TransferStarted> {
        let _ = (ctx, request);
        unsupported(self.id(), Operation::TransferDomain)
    }

    async fn transfer_sync(&self, ctx: &CallContext, transfer_id: &str) -> Result<TransferStatus> {
        let _ = (ctx, transfer_id);
        unsupported(self.id(), Operation::TransferSync)
    }
}
