use serde::{Deserialize, Serialize};

/// How a failed module call should be treated by the caller's retry policy.
///
/// Modules only report a *hint*; the call wrapper in the orchestrator is the single
/// place where the final classification is made (a local timeout, for example, is
/// always ambiguous regardless of what the module would have said).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Network failure or 5xx before the provider acted. Safe to retry with backoff.
    Transient,
    /// The provider refused the request. Not safe to retry without an operator.
    Rejected,
    /// The request was sent but its outcome is unknown.
    Ambiguous,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Rejected => "rejected",
            Self::Ambiguous => "ambiguous",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for all provider module operations.
///
/// Each variant carries the `provider` that produced it plus variant-specific context.
/// All variants are serializable so call records can store the structured detail.
///
/// # Categories
///
/// - transient: [`NetworkError`](Self::NetworkError), [`RateLimited`](Self::RateLimited),
///   [`ServerError`](Self::ServerError)
/// - ambiguous: [`Timeout`](Self::Timeout), [`ParseError`](Self::ParseError),
///   [`ResponseInterrupted`](Self::ResponseInterrupted)
/// - rejected: everything else
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum ModuleError {
    /// Connection could not be established (DNS failure, refused, TLS handshake).
    NetworkError {
        /// Provider that produced the error.
        provider: String,
        /// Error details.
        detail: String,
    },

    /// The HTTP request timed out after it was sent.
    Timeout {
        /// Provider that produced the error.
        provider: String,
        /// Error details.
        detail: String,
    },

    /// The API rate limit has been exceeded (HTTP 429 or equivalent).
    RateLimited {
        /// Provider that produced the error.
        provider: String,
        /// Suggested wait time in seconds before retrying, if provided by the API.
        retry_after: Option<u64>,
        /// Original error message from the provider API, if available.
        raw_message: Option<String>,
    },

    /// The provider answered with a gateway/unavailable status (502-504).
    ServerError {
        /// Provider that produced the error.
        provider: String,
        /// HTTP status code.
        status: u16,
        /// Error details.
        detail: String,
    },

    /// The configured credentials are invalid or expired.
    InvalidCredentials {
        /// Provider that produced the error.
        provider: String,
        /// Original error message from the provider API, if available.
        raw_message: Option<String>,
    },

    /// A request parameter was refused by the provider or by local validation.
    InvalidParameter {
        /// Provider that produced the error.
        provider: String,
        /// Name of the invalid parameter.
        param: String,
        /// Description of what's wrong.
        detail: String,
    },

    /// The addressed resource (account, domain) does not exist at the provider.
    ResourceNotFound {
        /// Provider that produced the error.
        provider: String,
        /// Identifier of the missing resource.
        resource: String,
        /// Original error message from the provider API, if available.
        raw_message: Option<String>,
    },

    /// A resource with the same identifier already exists.
    ResourceExists {
        /// Provider that produced the error.
        provider: String,
        /// Identifier of the conflicting resource.
        resource: String,
        /// Original error message from the provider API, if available.
        raw_message: Option<String>,
    },

    /// A multi-step change was only partly applied on the provider side.
    ///
    /// Requires manual reconciliation; the module never guesses the resulting state.
    PartiallyApplied {
        /// Provider that produced the error.
        provider: String,
        /// Steps that were confirmed.
        applied: Vec<String>,
        /// Steps that failed or were not attempted.
        pending: Vec<String>,
        /// Original error message from the provider API.
        raw_message: String,
    },

    /// The module does not implement the requested operation.
    Unsupported {
        /// Provider that produced the error.
        provider: String,
        /// Operation name.
        operation: String,
    },

    /// The response could not be parsed.
    ParseError {
        /// Provider that produced the error.
        provider: String,
        /// Details about the parse failure.
        detail: String,
    },

    /// The connection dropped while the response body was being read.
    ResponseInterrupted {
        /// Provider that produced the error.
        provider: String,
        /// Error details.
        detail: String,
    },

    /// An error reported by the provider that is not mapped to a specific variant.
    Unknown {
        /// Provider that produced the error.
        provider: String,
        /// Raw error code from the API, if available.
        raw_code: Option<String>,
        /// Raw error message from the API.
        raw_message: String,
    },
}

impl ModuleError {
    /// Provider identifier carried by every variant.
    pub fn provider(&self) -> &str {
        match self {
            Self::NetworkError { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::ServerError { provider, .. }
            | Self::InvalidCredentials { provider, .. }
            | Self::InvalidParameter { provider, .. }
            | Self::ResourceNotFound { provider, .. }
            | Self::ResourceExists { provider, .. }
            | Self::PartiallyApplied { provider, .. }
            | Self::Unsupported { provider, .. }
            | Self::ParseError { provider, .. }
            | Self::ResponseInterrupted { provider, .. }
            | Self::Unknown { provider, .. } => provider,
        }
    }

    /// The module's own hint about how this failure should be retried.
    #[must_use]
    pub fn category_hint(&self) -> ErrorCategory {
        match self {
            Self::NetworkError { .. } | Self::RateLimited { .. } | Self::ServerError { .. } => {
                ErrorCategory::Transient
            }
            Self::Timeout { .. } | Self::ParseError { .. } | Self::ResponseInterrupted { .. } => {
                ErrorCategory::Ambiguous
            }
            Self::InvalidCredentials { .. }
            | Self::InvalidParameter { .. }
            | Self::ResourceNotFound { .. }
            | Self::ResourceExists { .. }
            | Self::PartiallyApplied { .. }
            | Self::Unsupported { .. }
            | Self::Unknown { .. } => ErrorCategory::Rejected,
        }
    }

    /// 是否为预期行为（用户输入、资源不存在等），用于日志分级。
    ///
    /// 返回 `true` 时应使用 `warn` 级别，`false` 时使用 `error` 级别。
    #[must_use]
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials { .. }
                | Self::InvalidParameter { .. }
                | Self::ResourceNotFound { .. }
                | Self::ResourceExists { .. }
                | Self::Unsupported { .. }
        )
    }

    /// Stable machine-readable code, matching the serde tag.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NetworkError { .. } => "NetworkError",
            Self::Timeout { .. } => "Timeout",
            Self::RateLimited { .. } => "RateLimited",
            Self::ServerError { .. } => "ServerError",
            Self::InvalidCredentials { .. } => "InvalidCredentials",
            Self::InvalidParameter { .. } => "InvalidParameter",
            Self::ResourceNotFound { .. } => "ResourceNotFound",
            Self::ResourceExists { .. } => "ResourceExists",
            Self::PartiallyApplied { .. } => "PartiallyApplied",
            Self::Unsupported { .. } => "Unsupported",
            Self::ParseError { .. } => "ParseError",
            Self::ResponseInterrupted { .. } => "ResponseInterrupted",
            Self::Unknown { .. } => "Unknown",
        }
    }

    /// Message without the `[provider]` prefix.
    pub fn provider_message(&self) -> String {
        match self {
            Self::NetworkError { detail, .. } => format!("Network error: {detail}"),
            Self::Timeout { detail, .. } => format!("Request timeout: {detail}"),
            Self::RateLimited { retry_after, .. } => match retry_after {
                Some(secs) => format!("Rate limited (retry after {secs}s)"),
                None => "Rate limited".to_string(),
            },
            Self::ServerError { status, detail, .. } => format!("HTTP {status}: {detail}"),
            Self::InvalidCredentials { raw_message, .. } => match raw_message {
                Some(msg) => format!("Invalid credentials: {msg}"),
                None => "Invalid credentials".to_string(),
            },
            Self::InvalidParameter { param, detail, .. } => {
                format!("Invalid parameter '{param}': {detail}")
            }
            Self::ResourceNotFound {
                resource,
                raw_message,
                ..
            } => match raw_message {
                Some(msg) => format!("'{resource}' not found: {msg}"),
                None => format!("'{resource}' not found"),
            },
            Self::ResourceExists { resource, .. } => format!("'{resource}' already exists"),
            Self::PartiallyApplied {
                applied,
                pending,
                raw_message,
                ..
            } => format!(
                "Partially applied (applied: [{}], pending: [{}]): {raw_message}",
                applied.join(", "),
                pending.join(", ")
            ),
            Self::Unsupported { operation, .. } => {
                format!("Operation '{operation}' is not supported")
            }
            Self::ParseError { detail, .. } => format!("Parse error: {detail}"),
            Self::ResponseInterrupted { detail, .. } => {
                format!("Response interrupted: {detail}")
            }
            Self::Unknown { raw_message, .. } => raw_message.clone(),
        }
    }
}

impl std::fmt::Display for ModuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.provider(), self.provider_message())
    }
}

impl std::error::Error for ModuleError {}

/// Convenience type alias for `Result<T, ModuleError>`.
pub type Result<T> = std::result::Result<T, ModuleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_network_error() {
        let e = ModuleError::NetworkError {
            provider: "directadmin".to_string(),
            detail: "connection refused".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "[directadmin] Network error: connection refused"
        );
    }

    #[test]
    fn display_invalid_credentials_without_message() {
        let e = ModuleError::InvalidCredentials {
            provider: "namecheap".to_string(),
            raw_message: None,
        };
        assert_eq!(e.to_string(), "[namecheap] Invalid credentials");
    }

    #[test]
    fn display_unknown_uses_raw_message() {
        let e = ModuleError::Unknown {
            provider: "namecheap".to_string(),
            raw_code: Some("2011170".to_string()),
            raw_message: "PromotionCode is invalid".to_string(),
        };
        assert_eq!(e.to_string(), "[namecheap] PromotionCode is invalid");
        assert_eq!(e.provider_message(), "PromotionCode is invalid");
    }

    #[test]
    fn display_partially_applied_lists_steps() {
        let e = ModuleError::PartiallyApplied {
            provider: "directadmin".to_string(),
            applied: vec!["package".to_string()],
            pending: vec!["ip".to_string()],
            raw_message: "IP not available".to_string(),
        };
        assert_eq!(
            e.provider_message(),
            "Partially applied (applied: [package], pending: [ip]): IP not available"
        );
    }

    #[test]
    fn category_hints() {
        let timeout = ModuleError::Timeout {
            provider: "p".into(),
            detail: "d".into(),
        };
        let network = ModuleError::NetworkError {
            provider: "p".into(),
            detail: "d".into(),
        };
        let gateway = ModuleError::ServerError {
            provider: "p".into(),
            status: 503,
            detail: "d".into(),
        };
        let rejected = ModuleError::InvalidParameter {
            provider: "p".into(),
            param: "username".into(),
            detail: "taken".into(),
        };
        assert_eq!(timeout.category_hint(), ErrorCategory::Ambiguous);
        assert_eq!(network.category_hint(), ErrorCategory::Transient);
        assert_eq!(gateway.category_hint(), ErrorCategory::Transient);
        assert_eq!(rejected.category_hint(), ErrorCategory::Rejected);
    }

    #[test]
    fn serde_tag_matches_code() {
        let e = ModuleError::Unsupported {
            provider: "namecheap".into(),
            operation: "SuspendAccount".into(),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["code"], e.code());
        assert_eq!(json["operation"], "SuspendAccount");
    }
}
