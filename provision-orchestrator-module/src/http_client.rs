//! Generic HTTP client tools
//!
//! Reusable request handling shared by the adapters. Each adapter builds its own
//! `RequestBuilder` (auth scheme and encoding differ per provider); this module sends it,
//! maps transport failures onto [`ModuleError`] variants and records the raw exchange
//! into the [`CallContext`] transcript.
//!
//! No retries happen here. Retry policy belongs to the orchestrator, which needs to see
//! every attempt to classify it.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};

use crate::context::{CallContext, Exchange};
use crate::error::{ModuleError, Result};
use crate::utils::log_sanitizer::truncate_for_log;

/// 默认连接超时（秒）
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// 创建带超时配置的 HTTP Client
pub fn create_http_client(provider: &str, request_timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        .timeout(request_timeout)
        .build()
        .map_err(|e| ModuleError::NetworkError {
            provider: provider.to_string(),
            detail: format!("Failed to create HTTP client: {e}"),
        })
}

/// HTTP tool function set
pub struct HttpUtils;

impl HttpUtils {
    /// Performs an HTTP request and returns status code and response text.
    ///
    /// # Arguments
    /// * `ctx` - call context receiving the raw exchange
    /// * `request_builder` - fully configured request (URL, auth, body)
    /// * `provider_name` - provider id, for errors and logs
    /// * `method_name` - `"GET"` / `"POST"`, for logs
    /// * `endpoint` - command or path, for logs. Must not contain credentials.
    ///
    /// # Errors
    /// * connection failures map to `NetworkError` (nothing was sent)
    /// * timeouts map to `Timeout` and broken bodies to `ResponseInterrupted` (outcome unknown)
    /// * HTTP 429 maps to `RateLimited`, 502-504 to `ServerError`
    pub async fn execute_request(
        ctx: &CallContext,
        request_builder: RequestBuilder,
        provider_name: &str,
        method_name: &str,
        endpoint: &str,
    ) -> Result<(u16, String)> {
        log::debug!(
            "[{provider_name}] {method_name} {endpoint} (correlation {})",
            ctx.correlation_id()
        );

        let response = request_builder.send().await.map_err(|e| {
            let error = if e.is_connect() {
                ModuleError::NetworkError {
                    provider: provider_name.to_string(),
                    detail: e.to_string(),
                }
            } else if e.is_timeout() {
                ModuleError::Timeout {
                    provider: provider_name.to_string(),
                    detail: e.to_string(),
                }
            } else {
                ModuleError::ResponseInterrupted {
                    provider: provider_name.to_string(),
                    detail: e.to_string(),
                }
            };
            ctx.record_exchange(Exchange {
                method: method_name.to_string(),
                endpoint: endpoint.to_string(),
                status: None,
                body: error.to_string(),
            });
            error
        })?;

        let status_code = response.status().as_u16();
        log::debug!("[{provider_name}] Response Status: {status_code}");

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body = response.text().await;
        let response_text = match body {
            Ok(text) => text,
            Err(e) => {
                let error = if e.is_timeout() {
                    ModuleError::Timeout {
                        provider: provider_name.to_string(),
                        detail: format!("Timed out reading response body: {e}"),
                    }
                } else {
                    ModuleError::ResponseInterrupted {
                        provider: provider_name.to_string(),
                        detail: format!("Failed to read response body: {e}"),
                    }
                };
                ctx.record_exchange(Exchange {
                    method: method_name.to_string(),
                    endpoint: endpoint.to_string(),
                    status: Some(status_code),
                    body: error.to_string(),
                });
                return Err(error);
            }
        };

        ctx.record_exchange(Exchange {
            method: method_name.to_string(),
            endpoint: endpoint.to_string(),
            status: Some(status_code),
            body: response_text.clone(),
        });

        if status_code == 429 {
            log::warn!("[{provider_name}] Rate limited (HTTP 429), retry_after={retry_after:?}");
            return Err(ModuleError::RateLimited {
                provider: provider_name.to_string(),
                retry_after,
                raw_message: Some(truncate_for_log(&response_text)),
            });
        }

        if matches!(status_code, 502..=504) {
            log::warn!("[{provider_name}] Server error (HTTP {status_code})");
            return Err(ModuleError::ServerError {
                provider: provider_name.to_string(),
                status: status_code,
                detail: truncate_for_log(&response_text),
            });
        }

        if status_code == 401 || status_code == 403 {
            return Err(ModuleError::InvalidCredentials {
                provider: provider_name.to_string(),
                raw_message: Some(format!("HTTP {status_code}")),
            });
        }

        log::debug!(
            "[{provider_name}] Response Body: {}",
            loggable_body(ctx, &response_text)
        );

        Ok((status_code, response_text))
    }
}

/// 调试日志中的响应体：已脱敏并截断，敏感响应只记录长度
fn loggable_body(ctx: &CallContext, body: &str) -> String {
    if ctx.response_is_sensitive() {
        return format!("<withheld, {} bytes>", body.len());
    }
    truncate_for_log(&ctx.redact(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_log_is_redacted() {
        let ctx = CallContext::detached();
        ctx.register_secret("hunter2");
        assert_eq!(loggable_body(&ctx, "passwd=hunter2"), "passwd=***");
    }

    #[test]
    fn sensitive_body_is_withheld_from_log() {
        let ctx = CallContext::detached();
        ctx.mark_response_sensitive();
        let body = "error=0&key=one-time-login-key";
        let logged = loggable_body(&ctx, body);
        assert!(!logged.contains("one-time-login-key"));
        assert_eq!(logged, format!("<withheld, {} bytes>", body.len()));
    }
}
