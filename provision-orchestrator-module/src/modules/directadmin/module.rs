//! DirectAdmin ProvisioningModule trait 实现

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::context::CallContext;
use crate::error::{ModuleError, Result};
use crate::modules::common::{message_matches, parse_limit, require_field};
use crate::traits::{ErrorContext, ModuleErrorMapper, ProvisioningModule, RawApiError};
use crate::types::{
    Ack, ConfigField, CreateAccountRequest, CreatedAccount, ModuleMetadata, ModuleType, Operation,
    ResourceChange, SsoToken, SyncStatus, ValueRule,
};

use super::error::NOT_FOUND_HINTS;
use super::{DEFAULT_PORT, DaResponse, DirectAdminModule, PROVIDER};

/// Rule name recorded when a delete response carried no status at all.
pub(crate) const TERMINATE_NO_STATUS_RULE: &str =
    "directadmin.terminate: response without an error field is treated as success";

/// Limit options forwarded on a `customize` resize, with their DirectAdmin names.
const LIMIT_OPTIONS: [(&str, &str); 6] = [
    ("bandwidth", "bandwidth"),
    ("quota", "quota"),
    ("domains", "vdomains"),
    ("subdomains", "nsubdomains"),
    ("emails", "nemails"),
    ("databases", "mysql"),
];

impl DirectAdminModule {
    fn option<'a>(&'a self, request: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
        request
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .or_else(|| self.config.get(key))
    }

    fn flag(&self, key: &str) -> &'static str {
        if self.config.get_bool(key) { "ON" } else { "OFF" }
    }

    /// Reads `suspended` from the user config. `None` if the user is unknown.
    async fn is_suspended(&self, ctx: &CallContext, user: &str) -> Result<Option<bool>> {
        let response = self
            .send_command(ctx, "CMD_API_SHOW_USER_CONFIG", &[("user", user)])
            .await?;
        if let Some(suspended) = response.get("suspended") {
            return Ok(Some(suspended.eq_ignore_ascii_case("yes")));
        }
        if response.has_status() && !response.is_success() {
            if message_matches(&response.full_message(), &NOT_FOUND_HINTS) {
                return Ok(None);
            }
            return Err(self.map_error(
                RawApiError::new(response.full_message()),
                ErrorContext::resource(user),
            ));
        }
        Err(self.parse_error("CMD_API_SHOW_USER_CONFIG response has no 'suspended' field"))
    }

    /// Suspend or unsuspend, treating "already in that state" as success.
    async fn set_suspended(&self, ctx: &CallContext, user: &str, suspend: bool) -> Result<Ack> {
        let action = if suspend {
            ("suspend", "Suspend")
        } else {
            ("unsuspend", "Unsuspend")
        };
        let response = self
            .send_command(
                ctx,
                "CMD_API_SELECT_USERS",
                &[
                    ("location", "CMD_SELECT_USERS"),
                    action,
                    ("select0", user),
                ],
            )
            .await?;
        if let Some(ack) = interpret_suspend(&response) {
            return Ok(ack);
        }

        let message = response.full_message();
        // DirectAdmin 对重复操作的提示文本不稳定，以用户当前状态为准
        if self.is_suspended(ctx, user).await? == Some(suspend) {
            return Ok(Ack::already(message));
        }
        Err(self.map_error(RawApiError::new(message), ErrorContext::resource(user)))
    }

    async fn change_package(&self, ctx: &CallContext, user: &str, package: &str) -> Result<()> {
        self.command(
            ctx,
            "CMD_API_MODIFY_USER",
            &[("action", "package"), ("user", user), ("package", package)],
            ErrorContext {
                resource: Some(user.to_string()),
                param: Some("package".to_string()),
            },
        )
        .await
        .map(|_| ())
    }

    async fn customize_limits(
        &self,
        ctx: &CallContext,
        user: &str,
        limits: &[(&'static str, Option<u64>)],
    ) -> Result<()> {
        let rendered: Vec<(String, String)> = limits
            .iter()
            .flat_map(|(name, limit)| match limit {
                Some(value) => vec![
                    ((*name).to_string(), value.to_string()),
                    (format!("u{name}"), "OFF".to_string()),
                ],
                None => vec![(format!("u{name}"), "ON".to_string())],
            })
            .collect();
        let mut params: Vec<(&str, &str)> = vec![("action", "customize"), ("user", user)];
        params.extend(rendered.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        self.command(
            ctx,
            "CMD_API_MODIFY_USER",
            &params,
            ErrorContext::resource(user),
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl ProvisioningModule for DirectAdminModule {
    fn id(&self) -> &'static str {
        PROVIDER
    }

    fn metadata() -> ModuleMetadata {
        ModuleMetadata {
            id: PROVIDER.to_string(),
            display_name: "DirectAdmin".to_string(),
            api_version: "1.1".to_string(),
            module_type: ModuleType::Server,
            capabilities: vec![
                Operation::TestConnection,
                Operation::CreateAccount,
                Operation::SuspendAccount,
                Operation::UnsuspendAccount,
                Operation::TerminateAccount,
                Operation::ChangeResources,
                Operation::ChangeCredential,
                Operation::Sync,
                Operation::SingleSignOn,
            ],
            default_non_ssl_port: Some(DEFAULT_PORT),
            default_ssl_port: Some(DEFAULT_PORT),
            sso_label: Some("Login to DirectAdmin".to_string()),
            admin_sso_label: Some("Login to DirectAdmin Admin".to_string()),
            config_fields: vec![
                ConfigField::text("hostname", "Server Hostname")
                    .required()
                    .with_rule(ValueRule::Hostname),
                ConfigField::text("port", "Port")
                    .with_default("2222")
                    .with_rule(ValueRule::Port),
                ConfigField::boolean("secure", "Use SSL", true),
                ConfigField::text("username", "Admin / Reseller Username").required(),
                ConfigField::password("password", "Password").required(),
                ConfigField::enumeration("account_level", "Account Level", &["user", "reseller"])
                    .with_description("Create regular users or resellers"),
                ConfigField::text("package", "Package Name")
                    .with_default("default")
                    .with_description("DirectAdmin package assigned on creation"),
                ConfigField::text("ip_address", "IP Address")
                    .with_rule(ValueRule::Ipv4)
                    .with_description("Leave empty to use the first shared reseller IP"),
                ConfigField::text("bandwidth", "Bandwidth (MB)").with_rule(ValueRule::Limit),
                ConfigField::text("quota", "Disk Quota (MB)").with_rule(ValueRule::Limit),
                ConfigField::text("domains", "Max Domains").with_rule(ValueRule::Limit),
                ConfigField::text("subdomains", "Max Subdomains").with_rule(ValueRule::Limit),
                ConfigField::text("emails", "Max Email Accounts").with_rule(ValueRule::Limit),
                ConfigField::text("databases", "Max Databases").with_rule(ValueRule::Limit),
                ConfigField::boolean("php", "PHP Access", true),
                ConfigField::boolean("ssl", "SSL Access", true),
                ConfigField::boolean("ssh", "SSH Access", false),
                ConfigField::boolean("cgi", "CGI Access", false),
            ],
        }
    }

    async fn test_connection(&self, ctx: &CallContext) -> Result<()> {
        let response = self
            .send_command(ctx, "CMD_API_SHOW_ALL_USERS", &[])
            .await?;
        if response.has_status() && !response.is_success() {
            return Err(self.map_error(
                RawApiError::new(response.full_message()),
                ErrorContext::default(),
            ));
        }
        log::debug!(
            "[{PROVIDER}] Connection ok, {} users visible",
            response.list("list").len()
        );
        Ok(())
    }

    fn probe_external_id(&self, request: &CreateAccountRequest) -> Option<String> {
        request.username.clone()
    }

    async fn create_account(
        &self,
        ctx: &CallContext,
        request: &CreateAccountRequest,
    ) -> Result<CreatedAccount> {
        let username = require_field(request.username.as_deref(), PROVIDER, "username")?;
        let password = require_field(request.password.as_deref(), PROVIDER, "password")?;
        let domain = require_field(Some(request.domain.as_str()), PROVIDER, "domain")?;
        ctx.register_secret(password);

        let ip = match self.option(&request.options, "ip_address") {
            Some(ip) => ip.to_string(),
            None => self.shared_ip(ctx).await?.ok_or_else(|| {
                self.invalid_parameter("ip_address", "no IP configured and no shared IP available")
            })?,
        };
        let package = self.option(&request.options, "package").unwrap_or("default");
        let command = if self.config.get("account_level") == Some("reseller") {
            "CMD_API_ACCOUNT_RESELLER"
        } else {
            "CMD_API_ACCOUNT_USER"
        };

        let params = [
            ("action", "create"),
            ("add", "Submit"),
            ("username", username),
            ("email", request.contact.email.as_str()),
            ("passwd", password),
            ("passwd2", password),
            ("domain", domain),
            ("package", package),
            ("ip", ip.as_str()),
            ("notify", "no"),
            ("php", self.flag("php")),
            ("ssl", self.flag("ssl")),
            ("ssh", self.flag("ssh")),
            ("cgi", self.flag("cgi")),
        ];
        self.command(ctx, command, &params, ErrorContext::resource(username))
            .await?;

        log::info!("[{PROVIDER}] Created account {username} for {domain}");
        Ok(CreatedAccount {
            external_id: username.to_string(),
            meta: BTreeMap::from([("ip".to_string(), ip)]),
        })
    }

    async fn sync(&self, ctx: &CallContext, external_id: &str) -> Result<SyncStatus> {
        match self.is_suspended(ctx, external_id).await? {
            Some(suspended) => Ok(SyncStatus {
                active: !suspended,
                expired: false,
                transferred_away: false,
                expiry_date: None,
            }),
            None => Err(ModuleError::ResourceNotFound {
                provider: PROVIDER.to_string(),
                resource: external_id.to_string(),
                raw_message: None,
            }),
        }
    }

    async fn suspend_account(&self, ctx: &CallContext, external_id: &str) -> Result<Ack> {
        self.set_suspended(ctx, external_id, true).await
    }

    async fn unsuspend_account(&self, ctx: &CallContext, external_id: &str) -> Result<Ack> {
        self.set_suspended(ctx, external_id, false).await
    }

    async fn terminate_account(&self, ctx: &CallContext, external_id: &str) -> Result<Ack> {
        let response = self
            .send_command(
                ctx,
                "CMD_API_SELECT_USERS",
                &[
                    ("confirmed", "Confirm"),
                    ("delete", "yes"),
                    ("select0", external_id),
                ],
            )
            .await?;
        interpret_terminate(self, external_id, &response)
    }

    async fn change_resources(
        &self,
        ctx: &CallContext,
        external_id: &str,
        change: &ResourceChange,
    ) -> Result<Ack> {
        let package = change.options.get("package").filter(|p| !p.is_empty());
        let limits: Vec<(&'static str, Option<u64>)> = LIMIT_OPTIONS
            .iter()
            .filter_map(|(option, da_name)| {
                change
                    .options
                    .get(*option)
                    .map(|raw| (*da_name, parse_limit(Some(raw.as_str()))))
            })
            .collect();

        if package.is_none() && limits.is_empty() {
            return Err(self.invalid_parameter(
                "options",
                "no supported resource option (package or limits) given",
            ));
        }

        let mut applied = Vec::new();
        if let Some(package) = package {
            self.change_package(ctx, external_id, package).await?;
            applied.push(format!("package={package}"));
        }
        if !limits.is_empty() {
            if let Err(e) = self.customize_limits(ctx, external_id, &limits).await {
                if applied.is_empty() {
                    return Err(e);
                }
                return Err(ModuleError::PartiallyApplied {
                    provider: PROVIDER.to_string(),
                    applied,
                    pending: limits.iter().map(|(n, _)| (*n).to_string()).collect(),
                    raw_message: e.provider_message(),
                });
            }
        }
        Ok(Ack::done())
    }

    async fn change_credential(
        &self,
        ctx: &CallContext,
        external_id: &str,
        new_secret: &str,
    ) -> Result<Ack> {
        ctx.register_secret(new_secret);
        self.command(
            ctx,
            "CMD_API_USER_PASSWD",
            &[
                ("username", external_id),
                ("passwd", new_secret),
                ("passwd2", new_secret),
            ],
            ErrorContext {
                resource: Some(external_id.to_string()),
                param: Some("password".to_string()),
            },
        )
        .await?;
        Ok(Ack::done())
    }

    async fn single_sign_on(
        &self,
        ctx: &CallContext,
        external_id: &str,
        as_admin: bool,
    ) -> Result<SsoToken> {
        let login_user = if as_admin {
            self.admin_user.as_str()
        } else {
            external_id
        };
        // 登录 key 只有解析后才知道，响应体不进调试日志
        ctx.mark_response_sensitive();
        let response = self
            .command(
                ctx,
                "CMD_API_LOGIN_KEYS",
                &[
                    ("action", "create"),
                    ("type", "one_time_url"),
                    ("username", login_user),
                    ("max_uses", "1"),
                    ("expiry", "5m"),
                ],
                ErrorContext::resource(login_user),
            )
            .await?;

        if let Some(url) = response.get("url").filter(|u| !u.is_empty()) {
            ctx.register_secret(url);
            return Ok(SsoToken::new(url));
        }
        let key = response
            .get("key")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| self.parse_error("CMD_API_LOGIN_KEYS returned neither url nor key"))?;
        ctx.register_secret(key);
        Ok(SsoToken::new(format!(
            "{}/CMD_LOGIN?username={}&key={}",
            self.base_url,
            urlencoding::encode(login_user),
            urlencoding::encode(key)
        )))
    }
}

/// Applies the delete normalisation rules:
///
/// 1. `error=0` or a success text is success.
/// 2. An explicit error saying the user does not exist means the account is already gone.
/// 3. A response with no `error` field at all is treated as success under
///    [`TERMINATE_NO_STATUS_RULE`] and recorded as an assumed success.
/// 4. Any other explicit error is mapped normally.
pub(crate) fn interpret_terminate(
    module: &DirectAdminModule,
    user: &str,
    response: &DaResponse,
) -> Result<Ack> {
    if response.is_success() {
        return Ok(Ack::done());
    }
    let message = response.full_message();
    if message_matches(&message, &NOT_FOUND_HINTS) {
        return Ok(Ack::already(message));
    }
    if !response.has_status() {
        log::warn!("[{PROVIDER}] Delete of {user} returned no status ({message}), assuming success");
        return Ok(Ack::assumed(TERMINATE_NO_STATUS_RULE));
    }
    Err(module.map_error(RawApiError::new(message), ErrorContext::resource(user)))
}

/// Suspend/unsuspend response without a follow-up lookup.
///
/// `None` when the response is an error that does not say the user is already in the
/// requested state; the caller then checks the user's actual state.
pub(crate) fn interpret_suspend(response: &DaResponse) -> Option<Ack> {
    if response.is_success() {
        return Some(Ack::done());
    }
    let message = response.full_message();
    message_matches(&message, &["already suspended", "already active", "not suspended"])
        .then(|| Ack::already(message))
}
