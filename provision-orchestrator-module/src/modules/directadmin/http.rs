//! DirectAdmin HTTP 请求方法

use crate::context::CallContext;
use crate::error::Result;
use crate::http_client::HttpUtils;
use crate::traits::{ErrorContext, ModuleErrorMapper, RawApiError};

use super::{DirectAdminModule, PROVIDER};

/// A parsed `CMD_API_*` response.
///
/// DirectAdmin answers with url-encoded pairs (`error=0&text=...&details=...`); list
/// commands repeat keys as `list[]=a&list[]=b`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DaResponse {
    pairs: Vec<(String, String)>,
}

impl DaResponse {
    pub fn parse(body: &str) -> Self {
        let pairs = url::form_urlencoded::parse(body.trim().as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Values of a list key, accepting both `list[]` and `list`.
    pub fn list(&self, key: &str) -> Vec<&str> {
        let bracketed = format!("{key}[]");
        self.pairs
            .iter()
            .filter(|(k, _)| *k == bracketed || k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
            .collect()
    }

    pub fn has_status(&self) -> bool {
        self.get("error").is_some()
    }

    /// `error=0`, or a text mentioning success.
    pub fn is_success(&self) -> bool {
        self.get("error") == Some("0")
            || self
                .get("text")
                .is_some_and(|t| t.to_ascii_lowercase().contains("success"))
    }

    /// The provider message: text, then details, then a default.
    pub fn message(&self) -> String {
        self.get("text")
            .filter(|t| !t.is_empty())
            .or_else(|| self.get("details").filter(|d| !d.is_empty()))
            .unwrap_or("Unknown error")
            .to_string()
    }

    /// Text and details joined, for matching.
    pub fn full_message(&self) -> String {
        match (self.get("text"), self.get("details")) {
            (Some(t), Some(d)) if !d.is_empty() => format!("{t}: {d}"),
            _ => self.message(),
        }
    }
}

impl DirectAdminModule {
    /// 执行 CMD_API 请求（不检查业务状态）
    pub(crate) async fn send_command(
        &self,
        ctx: &CallContext,
        command: &str,
        params: &[(&str, &str)],
    ) -> Result<DaResponse> {
        ctx.register_secret(self.admin_password.as_str());
        let url = format!("{}/{command}", self.base_url);
        let request = self
            .client
            .post(&url)
            .basic_auth(&self.admin_user, Some(&self.admin_password))
            .form(params);

        let (_, body) = HttpUtils::execute_request(ctx, request, PROVIDER, "POST", command).await?;

        // 认证失败时 DirectAdmin 返回登录页 HTML 而非 API 响应
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            return Err(crate::error::ModuleError::InvalidCredentials {
                provider: PROVIDER.to_string(),
                raw_message: Some("received an HTML page instead of an API response".to_string()),
            });
        }

        Ok(DaResponse::parse(&body))
    }

    /// 执行 CMD_API 请求并把业务错误映射为 `ModuleError`
    pub(crate) async fn command(
        &self,
        ctx: &CallContext,
        command: &str,
        params: &[(&str, &str)],
        context: ErrorContext,
    ) -> Result<DaResponse> {
        let response = self.send_command(ctx, command, params).await?;
        if response.is_success() {
            return Ok(response);
        }
        log::warn!("[{PROVIDER}] {command} failed: {}", response.full_message());
        Err(self.map_error(RawApiError::new(response.full_message()), context))
    }

    /// Looks up the reseller's first shared IP, memoised in the call's lookup cache.
    pub(crate) async fn shared_ip(&self, ctx: &CallContext) -> Result<Option<String>> {
        let cache_key = format!("shared_ip:{}", self.base_url);
        if let Some(ip) = ctx.cache().get(PROVIDER, &cache_key).await {
            return Ok(Some(ip));
        }
        let response = self
            .command(ctx, "CMD_API_SHOW_RESELLER_IPS", &[], ErrorContext::default())
            .await?;
        let ip = response.list("list").first().map(|ip| (*ip).to_string());
        if let Some(ip) = &ip {
            ctx.cache().put(PROVIDER, &cache_key, ip.clone()).await;
        }
        Ok(ip)
    }
}
