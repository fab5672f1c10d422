use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============ Operations ============

/// Every operation a provider module can declare as a capability.
///
/// The set a module declares in its [`ModuleMetadata`] is fixed at registration time
/// and is the only set the orchestrator is allowed to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    TestConnection,
    CreateAccount,
    SuspendAccount,
    UnsuspendAccount,
    TerminateAccount,
    ChangeResources,
    ChangeCredential,
    Sync,
    SingleSignOn,
    Renew,
    GetNameservers,
    SaveNameservers,
    GetDnsRecords,
    SaveDnsRecords,
    GetContactDetails,
    SaveContactDetails,
    GetRegistrarLock,
    SaveRegistrarLock,
    GetTransferCode,
    TransferDomain,
    TransferSync,
}

impl Operation {
    /// All operations, in declaration order.
    pub const ALL: [Self; 21] = [
        Self::TestConnection,
        Self::CreateAccount,
        Self::SuspendAccount,
        Self::UnsuspendAccount,
        Self::TerminateAccount,
        Self::ChangeResources,
        Self::ChangeCredential,
        Self::Sync,
        Self::SingleSignOn,
        Self::Renew,
        Self::GetNameservers,
        Self::SaveNameservers,
        Self::GetDnsRecords,
        Self::SaveDnsRecords,
        Self::GetContactDetails,
        Self::SaveContactDetails,
        Self::GetRegistrarLock,
        Self::SaveRegistrarLock,
        Self::GetTransferCode,
        Self::TransferDomain,
        Self::TransferSync,
    ];

    /// Stable name used in call records and log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TestConnection => "testConnection",
            Self::CreateAccount => "createAccount",
            Self::SuspendAccount => "suspendAccount",
            Self::UnsuspendAccount => "unsuspendAccount",
            Self::TerminateAccount => "terminateAccount",
            Self::ChangeResources => "changeResources",
            Self::ChangeCredential => "changeCredential",
            Self::Sync => "sync",
            Self::SingleSignOn => "singleSignOn",
            Self::Renew => "renew",
            Self::GetNameservers => "getNameservers",
            Self::SaveNameservers => "saveNameservers",
            Self::GetDnsRecords => "getDnsRecords",
            Self::SaveDnsRecords => "saveDnsRecords",
            Self::GetContactDetails => "getContactDetails",
            Self::SaveContactDetails => "saveContactDetails",
            Self::GetRegistrarLock => "getRegistrarLock",
            Self::SaveRegistrarLock => "saveRegistrarLock",
            Self::GetTransferCode => "getTransferCode",
            Self::TransferDomain => "transferDomain",
            Self::TransferSync => "transferSync",
        }
    }

    /// Parse the name produced by [`as_str`](Self::as_str).
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    /// The conventional WHMCS module function name for this capability.
    ///
    /// Registrar modules use `RegisterDomain`/`RenewDomain` in place of
    /// `CreateAccount`/`Renew`.
    pub fn whmcs_function(self, module_type: ModuleType) -> &'static str {
        match (self, module_type) {
            (Self::TestConnection, _) => "TestConnection",
            (Self::CreateAccount, ModuleType::Registrar) => "RegisterDomain",
            (Self::CreateAccount, ModuleType::Server) => "CreateAccount",
            (Self::SuspendAccount, _) => "SuspendAccount",
            (Self::UnsuspendAccount, _) => "UnsuspendAccount",
            (Self::TerminateAccount, ModuleType::Registrar) => "RequestDelete",
            (Self::TerminateAccount, ModuleType::Server) => "TerminateAccount",
            (Self::ChangeResources, _) => "ChangePackage",
            (Self::ChangeCredential, _) => "ChangePassword",
            (Self::Sync, _) => "Sync",
            (Self::SingleSignOn, _) => "ServiceSingleSignOn",
            (Self::Renew, _) => "RenewDomain",
            (Self::GetNameservers, _) => "GetNameservers",
            (Self::SaveNameservers, _) => "SaveNameservers",
            (Self::GetDnsRecords, _) => "GetDNS",
            (Self::SaveDnsRecords, _) => "SaveDNS",
            (Self::GetContactDetails, _) => "GetContactDetails",
            (Self::SaveContactDetails, _) => "SaveContactDetails",
            (Self::GetRegistrarLock, _) => "GetRegistrarLock",
            (Self::SaveRegistrarLock, _) => "SaveRegistrarLock",
            (Self::GetTransferCode, _) => "GetEPPCode",
            (Self::TransferDomain, _) => "TransferDomain",
            (Self::TransferSync, _) => "TransferSync",
        }
    }

    /// Operations that change nothing on the provider side.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            Self::TestConnection
                | Self::Sync
                | Self::GetNameservers
                | Self::GetDnsRecords
                | Self::GetContactDetails
                | Self::GetRegistrarLock
                | Self::GetTransferCode
                | Self::TransferSync
        )
    }

    /// Operations whose response must never be written to a log in full.
    pub fn has_secret_response(self) -> bool {
        matches!(self, Self::SingleSignOn | Self::GetTransferCode)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Module Metadata ============

/// What a module provisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    /// Hosting control panel or VPS manager.
    Server,
    /// Domain registrar.
    Registrar,
}

/// The input type of a configuration field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Plain text input.
    Text,
    /// Masked/password input. Values are treated as secrets.
    Password,
    /// Yes/no toggle.
    Boolean,
    /// One value out of a fixed option list.
    Enum,
}

/// Extra validation for text fields.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ValueRule {
    /// 1..=65535
    Port,
    /// Bare hostname or IP, no scheme or path.
    Hostname,
    /// Dotted IPv4 address.
    Ipv4,
    /// Integer >= 0, or empty / `unlimited`.
    Limit,
}

/// Definition of a single configuration field declared by a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigField {
    /// Machine-readable field key (e.g., `"api_user"`).
    pub name: String,
    /// Human-readable label.
    pub friendly_name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Allowed values for [`FieldType::Enum`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<ValueRule>,
}

impl ConfigField {
    fn base(name: &str, friendly_name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            friendly_name: friendly_name.to_string(),
            field_type,
            options: Vec::new(),
            default: None,
            description: None,
            required: false,
            rule: None,
        }
    }

    pub fn text(name: &str, friendly_name: &str) -> Self {
        Self::base(name, friendly_name, FieldType::Text)
    }

    pub fn password(name: &str, friendly_name: &str) -> Self {
        Self::base(name, friendly_name, FieldType::Password)
    }

    pub fn boolean(name: &str, friendly_name: &str, default: bool) -> Self {
        Self {
            default: Some(default.to_string()),
            ..Self::base(name, friendly_name, FieldType::Boolean)
        }
    }

    pub fn enumeration(name: &str, friendly_name: &str, options: &[&str]) -> Self {
        Self {
            options: options.iter().map(|o| (*o).to_string()).collect(),
            default: options.first().map(|o| (*o).to_string()),
            ..Self::base(name, friendly_name, FieldType::Enum)
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    #[must_use]
    pub fn with_rule(mut self, rule: ValueRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn is_secret(&self) -> bool {
        self.field_type == FieldType::Password
    }
}

/// Static metadata describing a provider module.
///
/// Obtain via [`ProvisioningModule::metadata()`](crate::ProvisioningModule::metadata) or
/// [`get_all_module_metadata()`](crate::get_all_module_metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleMetadata {
    /// Module identifier (e.g., `"directadmin"`).
    pub id: String,
    pub display_name: String,
    pub api_version: String,
    pub module_type: ModuleType,
    /// Operations this module may be invoked for.
    pub capabilities: Vec<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_non_ssl_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ssl_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_sso_label: Option<String>,
    /// Configuration fields, in display order.
    pub config_fields: Vec<ConfigField>,
}

impl ModuleMetadata {
    pub fn supports(&self, operation: Operation) -> bool {
        self.capabilities.contains(&operation)
    }

    pub fn field(&self, name: &str) -> Option<&ConfigField> {
        self.config_fields.iter().find(|f| f.name == name)
    }
}

// ============ Module Configuration ============

/// Resolved, validated configuration handed to a module constructor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleConfig {
    values: BTreeMap<String, String>,
    #[serde(default)]
    secret_keys: Vec<String>,
}

impl ModuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn mark_secret(&mut self, key: &str) {
        if !self.secret_keys.iter().any(|k| k == key) {
            self.secret_keys.push(key.to_string());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Interprets `true`/`yes`/`on`/`1` as true. Missing keys are false.
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).is_some_and(parse_bool_flag)
    }

    pub fn get_u16(&self, key: &str) -> Option<u16> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    /// Values of every field marked secret, for redaction.
    pub fn secret_values(&self) -> Vec<String> {
        self.secret_keys
            .iter()
            .filter_map(|k| self.get(k))
            .map(ToString::to_string)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.values.iter()
    }
}

pub(crate) fn parse_bool_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "on" | "1"
    )
}

// ============ Operation Inputs ============

/// Contact details of a registrant or account holder.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContactDetails {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub email: String,
    pub phone: String,
    pub address1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    pub city: String,
    pub state_province: String,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2.
    pub country: String,
}

/// Parameters used to create a resource.
///
/// Kept on the service as its resource snapshot, so a create can be re-issued
/// identically and a later resize can be diffed against it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    /// Domain name bound to the service (hosting primary domain or registered domain).
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub contact: ContactDetails,
    /// Registration period for domains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_years: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,
    /// Product options (package, limits) chosen at order time.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// New resource parameters for a resize / package change.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceChange {
    pub options: BTreeMap<String, String>,
}

/// One DNS host record as managed through a registrar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DnsHostRecord {
    /// Host label, `@` for the apex.
    pub host: String,
    pub record_type: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

// ============ Operation Outputs ============

/// How a provider answer was normalised into success.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Normalization {
    /// The provider said the resource was already in the requested state.
    AlreadyInState { raw_message: String },
    /// No explicit status was returned and a documented adapter rule assumed success.
    AssumedSuccess { rule: String },
}

impl Normalization {
    /// Whether success was inferred rather than reported.
    pub fn is_heuristic(&self) -> bool {
        matches!(self, Self::AssumedSuccess { .. })
    }
}

/// Successful answer to a mutating operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization: Option<Normalization>,
}

impl Ack {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn already(raw_message: impl Into<String>) -> Self {
        Self {
            normalization: Some(Normalization::AlreadyInState {
                raw_message: raw_message.into(),
            }),
        }
    }

    pub fn assumed(rule: impl Into<String>) -> Self {
        Self {
            normalization: Some(Normalization::AssumedSuccess { rule: rule.into() }),
        }
    }
}

/// Result of a successful create.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAccount {
    /// Provider-assigned identifier used to address the resource later.
    pub external_id: String,
    /// Extra provider data worth keeping (assigned IP, order id).
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

/// Ground-truth status of a resource as reported by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub active: bool,
    pub expired: bool,
    pub transferred_away: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
}

/// One-time login URL into the provider's control panel.
///
/// Never persisted and never logged in full.
#[derive(Clone, PartialEq, Eq)]
pub struct SsoToken {
    url: String,
}

/// Number of leading characters kept by [`SsoToken::reference`].
const SSO_REFERENCE_CHARS: usize = 24;

impl SsoToken {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn into_url(self) -> String {
        self.url
    }

    /// Truncated form that is safe to record.
    pub fn reference(&self) -> String {
        let prefix: String = self.url.chars().take(SSO_REFERENCE_CHARS).collect();
        format!("{prefix}... [{} chars]", self.url.chars().count())
    }
}

impl std::fmt::Debug for SsoToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoToken")
            .field("url", &self.reference())
            .finish()
    }
}

/// Result of a successful renewal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RenewOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
}

// ============ Domain Transfer ============

/// Transfer-in of a domain registered elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub domain: String,
    /// EPP / authorisation code from the losing registrar. Secret.
    pub auth_code: String,
    /// Years added on completion. Most registries require at least one.
    pub years: u32,
}

/// A transfer the registrar accepted. Completion is polled with `transfer_sync`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferStarted {
    pub transfer_id: String,
    /// Provider data returned with the order (order id, charged amount).
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

/// Where a transfer-in stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    /// Waiting on the losing registrar or the registrant.
    #[default]
    Pending,
    Completed,
    /// Rejected, cancelled or timed out. A new transfer needs a new request.
    Failed,
}

impl TransferState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferStatus {
    pub state: TransferState,
    /// Provider's status text, kept for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// New expiry, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
}
