//! 类型定义模块

mod call_record;
mod event;
mod product;
mod service;
mod transition;

pub use call_record::{CallCompletion, CallOutcome, CallRecord, CallScope};
pub use event::{OperatorAlert, ProvisioningEvent, StateChange};
pub use product::{ProductBinding, ServerConfig};
pub use service::{
    FailureDetail, NewService, Service, ServiceCategory, ServiceQuery, ServiceState,
    TRANSFER_ID_META,
};
pub use transition::{
    Discrepancy, RemotePolicy, TransitionOutcome, TransitionPlan, TransitionReason,
    TransitionRequest,
};

// Re-export module 库的公共类型
pub use provision_orchestrator_module::{
    Ack, ContactDetails, CreateAccountRequest, CreatedAccount, DnsHostRecord, ErrorCategory,
    ModuleConfig, ModuleMetadata, ModuleType, Normalization, Operation, RenewOutcome,
    ResourceChange, SsoToken, SyncStatus, TransferRequest, TransferStarted, TransferState,
    TransferStatus,
};
