//! 共享测试工具和辅助函数

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;

use provision_orchestrator_module::{
    CallContext, ContactDetails, CreateAccountRequest, ModuleMetadata, ProvisioningModule,
    create_module, get_all_module_metadata, resolve_config,
};

/// 跳过测试的宏（当环境变量缺失时）
#[macro_export]
macro_rules! skip_if_no_credentials {
    ($($var:expr),+) => {
        $(
            if std::env::var($var).is_err() {
                eprintln!("跳过测试: 缺少环境变量 {}", $var);
                return;
            }
        )+
    };
}

/// 断言 `Option` 为 `Some`，并解包返回内部值（失败则直接让测试失败）。
#[macro_export]
macro_rules! require_some {
    ($expr:expr $(,)?) => {{
        let opt = $expr;
        assert!(opt.is_some(), "expected Some(..), got None");
        let Some(val) = opt else {
            return;
        };
        val
    }};
    ($expr:expr, $($msg:tt)+) => {{
        let opt = $expr;
        assert!(opt.is_some(), "{}", format_args!($($msg)+));
        let Some(val) = opt else {
            return;
        };
        val
    }};
}

/// 断言 `Result` 为 `Ok`，并解包返回内部值（失败则直接让测试失败）。
#[macro_export]
macro_rules! require_ok {
    ($expr:expr $(,)?) => {{
        let res = $expr;
        assert!(res.is_ok(), "expected Ok(..), got {res:?}");
        let Ok(val) = res else {
            return;
        };
        val
    }};
    ($expr:expr, $($msg:tt)+) => {{
        let res = $expr;
        assert!(
            res.is_ok(),
            "{}: {res:?}",
            format_args!($($msg)+)
        );
        let Ok(val) = res else {
            return;
        };
        val
    }};
}

/// 生成唯一的测试账户名（DirectAdmin 用户名最长 10 位）
pub fn generate_test_username() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("t{}", &uuid[..8])
}

pub fn test_contact() -> ContactDetails {
    ContactDetails {
        first_name: "Test".to_string(),
        last_name: "Account".to_string(),
        company: None,
        email: "provisioning-test@example.com".to_string(),
        phone: "+1.5555550100".to_string(),
        address1: "1 Test Street".to_string(),
        address2: None,
        city: "Springfield".to_string(),
        state_province: "IL".to_string(),
        postal_code: "62701".to_string(),
        country: "US".to_string(),
    }
}

pub fn create_request(domain: &str, username: Option<String>) -> CreateAccountRequest {
    CreateAccountRequest {
        domain: domain.to_string(),
        username,
        password: Some(format!("Pw-{}", uuid::Uuid::new_v4().simple())),
        contact: test_contact(),
        registration_years: Some(1),
        nameservers: Vec::new(),
        options: BTreeMap::new(),
    }
}

fn metadata(module_id: &str) -> Option<ModuleMetadata> {
    get_all_module_metadata()
        .into_iter()
        .find(|m| m.id == module_id)
}

/// 测试上下文
pub struct TestContext {
    pub module: Arc<dyn ProvisioningModule>,
    pub call: CallContext,
    pub domain: String,
}

impl TestContext {
    fn build(module_id: &str, pairs: &[(&str, String)], domain: String) -> Option<Self> {
        let server: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        let config = resolve_config(&metadata(module_id)?, &[&server]).ok()?;
        let module = create_module(module_id, &config).ok()?;
        Some(Self {
            module,
            call: CallContext::detached(),
            domain,
        })
    }

    pub fn directadmin() -> Option<Self> {
        let pairs = [
            ("hostname", env::var("DIRECTADMIN_HOST").ok()?),
            ("username", env::var("DIRECTADMIN_USER").ok()?),
            ("password", env::var("DIRECTADMIN_PASSWORD").ok()?),
            (
                "port",
                env::var("DIRECTADMIN_PORT").unwrap_or_else(|_| "2222".to_string()),
            ),
            (
                "package",
                env::var("DIRECTADMIN_PACKAGE").unwrap_or_default(),
            ),
        ];
        let domain = env::var("TEST_DOMAIN").ok()?;
        Self::build("directadmin", &pairs, domain)
    }

    pub fn namecheap() -> Option<Self> {
        let pairs = [
            ("api_user", env::var("NAMECHEAP_API_USER").ok()?),
            ("api_key", env::var("NAMECHEAP_API_KEY").ok()?),
            ("client_ip", env::var("NAMECHEAP_CLIENT_IP").ok()?),
            ("test_mode", "true".to_string()),
        ];
        let domain = env::var("TEST_DOMAIN").ok()?;
        Self::build("namecheap", &pairs, domain)
    }
}
