//! Call logger
//!
//! Every module invocation goes through [`CallLogger::invoke`]: the request is recorded
//! before the call, the raw exchanges and parsed result after it, and the failure is
//! classified here and nowhere else. Modules only report a category hint.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use provision_orchestrator_module::log_sanitizer::truncate_for_log;
use provision_orchestrator_module::{
    Ack, CallContext, ContactDetails, CreatedAccount, DnsHostRecord, ErrorCategory, Exchange,
    ModuleError, Normalization, Operation, ProvisioningModule, RenewOutcome, SsoToken, SyncStatus,
    TransferStarted, TransferStatus,
};

use crate::error::CallFailure;
use crate::registry::ResolvedModule;
use crate::settings::TimeoutSettings;
use crate::traits::CallLogRepository;
use crate::types::{CallCompletion, CallOutcome, CallRecord, CallScope};

/// How a successful module result is summarised in its call record.
pub trait LoggableResult {
    fn summary(&self) -> String;

    fn normalization(&self) -> Option<&Normalization> {
        None
    }
}

impl LoggableResult for () {
    fn summary(&self) -> String {
        "ok".to_string()
    }
}

impl LoggableResult for Ack {
    fn summary(&self) -> String {
        match &self.normalization {
            None => "ok".to_string(),
            Some(Normalization::AlreadyInState { raw_message }) => {
                format!("ok (already in state: {raw_message})")
            }
            Some(Normalization::AssumedSuccess { rule }) => format!("ok (assumed: {rule})"),
        }
    }

    fn normalization(&self) -> Option<&Normalization> {
        self.normalization.as_ref()
    }
}

impl LoggableResult for CreatedAccount {
    fn summary(&self) -> String {
        format!("externalId={}", self.external_id)
    }
}

impl LoggableResult for SyncStatus {
    fn summary(&self) -> String {
        format!(
            "active={} expired={} transferredAway={} expiry={}",
            self.active,
            self.expired,
            self.transferred_away,
            self.expiry_date
                .map_or_else(|| "-".to_string(), |d| d.to_string())
        )
    }
}

impl LoggableResult for SsoToken {
    fn summary(&self) -> String {
        self.reference()
    }
}

impl LoggableResult for RenewOutcome {
    fn summary(&self) -> String {
        match self.expiry_date {
            Some(date) => format!("renewed until {date}"),
            None => "renewed".to_string(),
        }
    }
}

impl LoggableResult for TransferStarted {
    fn summary(&self) -> String {
        format!("transferId={}", self.transfer_id)
    }
}

impl LoggableResult for TransferStatus {
    fn summary(&self) -> String {
        match &self.detail {
            Some(detail) => format!("transfer {} ({detail})", self.state.as_str()),
            None => format!("transfer {}", self.state.as_str()),
        }
    }
}

impl LoggableResult for Vec<String> {
    fn summary(&self) -> String {
        self.join(", ")
    }
}

impl LoggableResult for Vec<DnsHostRecord> {
    fn summary(&self) -> String {
        format!("{} host records", self.len())
    }
}

impl LoggableResult for ContactDetails {
    fn summary(&self) -> String {
        format!("contact {} {} ({})", self.first_name, self.last_name, self.country)
    }
}

impl LoggableResult for bool {
    fn summary(&self) -> String {
        self.to_string()
    }
}

/// Secret strings (transfer codes): only the length is recorded.
impl LoggableResult for String {
    fn summary(&self) -> String {
        format!("<{} chars>", self.chars().count())
    }
}

/// Final classification of a module failure.
///
/// The module's hint is kept, except that an ambiguous read is just a failed read: it
/// changed nothing and can be retried freely.
pub fn classify(operation: Operation, error: &ModuleError) -> ErrorCategory {
    match error.category_hint() {
        ErrorCategory::Ambiguous if operation.is_read_only() => ErrorCategory::Transient,
        category => category,
    }
}

fn failure_from(
    module_id: &str,
    operation: Operation,
    category: ErrorCategory,
    error: &ModuleError,
    message: String,
) -> CallFailure {
    let retry_after = match error {
        ModuleError::RateLimited { retry_after, .. } => *retry_after,
        _ => None,
    };
    CallFailure {
        provider: module_id.to_string(),
        operation,
        category,
        code: error.code().to_string(),
        message,
        retry_after,
    }
}

fn fingerprint(module_id: &str, operation: Operation, request: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(module_id.as_bytes());
    hasher.update(b"|");
    hasher.update(operation.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(request.as_bytes());
    hex::encode(hasher.finalize())
}

fn render_transcript(exchanges: &[Exchange]) -> String {
    exchanges
        .iter()
        .map(|e| match e.status {
            Some(status) => format!("{} {} -> {status}\n{}", e.method, e.endpoint, e.body),
            None => format!("{} {} -> (no status)\n{}", e.method, e.endpoint, e.body),
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Wraps module calls with the record / classify / complete sequence.
pub struct CallLogger {
    repository: Arc<dyn CallLogRepository>,
    default_timeout: Duration,
    module_timeouts: HashMap<String, Duration>,
}

impl CallLogger {
    pub fn new(repository: Arc<dyn CallLogRepository>, timeouts: &TimeoutSettings) -> Self {
        Self {
            repository,
            default_timeout: timeouts.default_timeout(),
            module_timeouts: timeouts
                .module_timeouts()
                .map(|(id, timeout)| (id.to_string(), timeout))
                .collect(),
        }
    }

    /// Same timeout for every module.
    pub fn with_timeout(repository: Arc<dyn CallLogRepository>, timeout: Duration) -> Self {
        Self {
            repository,
            default_timeout: timeout,
            module_timeouts: HashMap::new(),
        }
    }

    pub fn timeout_for(&self, module_id: &str) -> Duration {
        self.module_timeouts
            .get(module_id)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    pub fn repository(&self) -> &Arc<dyn CallLogRepository> {
        &self.repository
    }

    /// Invokes one module operation and logs it.
    ///
    /// `request` is the logical request payload; it is redacted before it is stored.
    /// An operation the module does not declare is refused without a call or a record.
    pub async fn invoke<T, F, Fut>(
        &self,
        scope: &CallScope,
        resolved: &ResolvedModule,
        operation: Operation,
        request: &serde_json::Value,
        call: F,
    ) -> Result<T, CallFailure>
    where
        T: LoggableResult + Send,
        F: FnOnce(Arc<dyn ProvisioningModule>, Arc<CallContext>) -> Fut + Send,
        Fut: Future<Output = provision_orchestrator_module::Result<T>> + Send,
    {
        let module_id = resolved.module_id().to_string();
        if !resolved.supports(operation) {
            return Err(CallFailure {
                provider: module_id,
                operation,
                category: ErrorCategory::Rejected,
                code: "Unsupported".to_string(),
                message: format!("operation '{operation}' is not a declared capability"),
                retry_after: None,
            });
        }

        let correlation_id = scope.correlation_id();
        let ctx = Arc::new(CallContext::new(correlation_id, Arc::clone(&scope.cache)));
        for secret in resolved.config.secret_values() {
            ctx.register_secret(secret);
        }
        for secret in &scope.secrets {
            ctx.register_secret(secret.as_str());
        }
        if operation.has_secret_response() {
            ctx.mark_response_sensitive();
        }

        let request_text = ctx.redact(&request.to_string());
        let record = CallRecord {
            id: Uuid::new_v4(),
            correlation_id,
            service_id: scope.service_id.clone(),
            transition_id: scope.transition_id,
            module_id: module_id.clone(),
            operation,
            attempt: scope.attempt,
            fingerprint: fingerprint(&module_id, operation, &request_text),
            request: request_text,
            response: None,
            outcome: None,
            result_summary: None,
            error_code: None,
            error_message: None,
            normalization: None,
            started_at: Utc::now(),
            finished_at: None,
        };
        let recorded = match self.repository.insert(&record).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to record {module_id}.{operation} call {}: {e}", record.id);
                // 无记录的写操作不发送：之后无法判定其远端效果
                if !operation.is_read_only() {
                    return Err(CallFailure {
                        provider: module_id,
                        operation,
                        category: ErrorCategory::Transient,
                        code: "CallLogUnavailable".to_string(),
                        message: format!("not sent, the call could not be recorded: {e}"),
                        retry_after: None,
                    });
                }
                false
            }
        };

        log::debug!(
            "[{module_id}] {operation} attempt {} (service {}, correlation {correlation_id})",
            scope.attempt,
            scope.service_id.as_deref().unwrap_or("-")
        );

        let timeout = self.timeout_for(&module_id);
        let result = match tokio::time::timeout(
            timeout,
            call(Arc::clone(&resolved.module), Arc::clone(&ctx)),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ModuleError::Timeout {
                provider: module_id.clone(),
                detail: format!("no answer within {}s", timeout.as_secs_f32()),
            }),
        };

        let transcript = ctx.redact(&render_transcript(&ctx.take_transcript()));
        let (completion, result) = match result {
            Ok(value) => {
                let summary = ctx.redact(&value.summary());
                let normalization = value.normalization().cloned();
                if let Some(Normalization::AssumedSuccess { rule }) = &normalization {
                    log::warn!(
                        "[{module_id}] {operation} success assumed by rule '{rule}' (call {})",
                        record.id
                    );
                }
                let response = if operation.has_secret_response() {
                    Some(format!("[withheld] {summary}"))
                } else {
                    Some(transcript)
                };
                (
                    CallCompletion {
                        outcome: CallOutcome::Success,
                        response,
                        result_summary: Some(summary),
                        error_code: None,
                        error_message: None,
                        normalization,
                        finished_at: Utc::now(),
                    },
                    Ok(value),
                )
            }
            Err(error) => {
                let category = classify(operation, &error);
                let message = ctx.redact(&error.provider_message());
                let level = if error.is_expected() {
                    log::Level::Warn
                } else {
                    log::Level::Error
                };
                log::log!(
                    level,
                    "[{module_id}] {operation} failed ({category}, attempt {}): {}",
                    scope.attempt,
                    truncate_for_log(&message)
                );
                let response = if operation.has_secret_response() {
                    Some("[withheld]".to_string())
                } else {
                    Some(transcript)
                };
                let failure = failure_from(&module_id, operation, category, &error, message.clone());
                (
                    CallCompletion {
                        outcome: CallOutcome::from(category),
                        response,
                        result_summary: None,
                        error_code: Some(error.code().to_string()),
                        error_message: Some(message),
                        normalization: None,
                        finished_at: Utc::now(),
                    },
                    Err(failure),
                )
            }
        };

        if recorded {
            if let Err(e) = self.repository.complete(record.id, &completion).await {
                log::error!("Failed to complete call record {}: {e}", record.id);
            }
        }
        result
    }
}
