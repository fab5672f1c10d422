//! Namecheap HTTP 请求方法

use crate::context::CallContext;
use crate::error::{ModuleError, Result};
use crate::http_client::HttpUtils;
use crate::traits::{ErrorContext, ModuleErrorMapper, RawApiError};
use crate::types::ContactDetails;

use super::{NamecheapModule, PROVIDER, XmlNode};

/// Contact roles `domains.create` / `domains.setContacts` require.
const CONTACT_ROLES: [&str; 4] = ["Registrant", "Tech", "Admin", "AuxBilling"];

/// Reads `Status`/`Errors` from an `ApiResponse` document.
///
/// Returns the `CommandResponse` element on success, or the first reported error.
pub(crate) fn command_response(root: XmlNode) -> std::result::Result<XmlNode, RawApiError> {
    let status = root.attr("Status").unwrap_or_default().to_ascii_uppercase();
    if status == "OK" {
        return root
            .children
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case("CommandResponse"))
            .ok_or_else(|| RawApiError::new("response has no CommandResponse element"));
    }
    let error = root.child("Errors").and_then(|e| e.child("Error"));
    Err(match error {
        Some(e) => match e.attr("Number") {
            Some(code) => RawApiError::with_code(code, e.text.trim()),
            None => RawApiError::new(e.text.trim()),
        },
        None => RawApiError::new(format!("API status '{status}' without error details")),
    })
}

/// Splits `example.co.uk` into `("example", "co.uk")`.
pub(crate) fn split_domain(domain: &str) -> Option<(&str, &str)> {
    let domain = domain.trim().trim_end_matches('.');
    domain
        .split_once('.')
        .filter(|(sld, tld)| !sld.is_empty() && !tld.is_empty())
}

/// Renders one contact as the four role-prefixed parameter sets.
pub(crate) fn contact_params(contact: &ContactDetails) -> Vec<(String, String)> {
    let mut params = Vec::with_capacity(CONTACT_ROLES.len() * 11);
    for role in CONTACT_ROLES {
        let mut push = |field: &str, value: &str| {
            params.push((format!("{role}{field}"), value.to_string()));
        };
        push("FirstName", &contact.first_name);
        push("LastName", &contact.last_name);
        push("Address1", &contact.address1);
        if let Some(address2) = &contact.address2 {
            push("Address2", address2);
        }
        push("City", &contact.city);
        push("StateProvince", &contact.state_province);
        push("PostalCode", &contact.postal_code);
        push("Country", &contact.country);
        push("Phone", &contact.phone);
        push("EmailAddress", &contact.email);
        if let Some(company) = &contact.company {
            push("OrganizationName", company);
        }
    }
    params
}

/// Reads a contact block such as `<Registrant>`.
pub(crate) fn parse_contact(node: &XmlNode) -> ContactDetails {
    let text = |name: &str| node.child_text(name).unwrap_or_default().to_string();
    ContactDetails {
        first_name: text("FirstName"),
        last_name: text("LastName"),
        company: node.child_text("OrganizationName").map(ToString::to_string),
        email: text("EmailAddress"),
        phone: text("Phone"),
        address1: text("Address1"),
        address2: node.child_text("Address2").map(ToString::to_string),
        city: text("City"),
        state_province: text("StateProvince"),
        postal_code: text("PostalCode"),
        country: text("Country"),
    }
}

impl NamecheapModule {
    pub(crate) fn sld_tld<'a>(&self, domain: &'a str) -> Result<(&'a str, &'a str)> {
        split_domain(domain)
            .ok_or_else(|| self.invalid_parameter("domain", format!("'{domain}' has no TLD")))
    }

    /// 执行 Namecheap API 命令，业务错误以 `RawApiError` 原样返回
    pub(crate) async fn call_raw(
        &self,
        ctx: &CallContext,
        command: &str,
        params: &[(String, String)],
    ) -> Result<std::result::Result<XmlNode, RawApiError>> {
        ctx.register_secret(self.api_key.as_str());

        let mut query: Vec<(&str, &str)> = vec![
            ("ApiUser", self.api_user.as_str()),
            ("ApiKey", self.api_key.as_str()),
            ("UserName", self.username.as_str()),
            ("ClientIp", self.client_ip.as_str()),
            ("Command", command),
        ];
        query.extend(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let request = self.client.get(self.endpoint).query(&query);
        let (_, body) = HttpUtils::execute_request(ctx, request, PROVIDER, "GET", command).await?;

        let root = XmlNode::parse(&body).map_err(|e| {
            log::error!("[{PROVIDER}] XML 解析失败: {e}");
            self.parse_error(e)
        })?;
        Ok(command_response(root))
    }

    /// 执行 Namecheap API 命令，返回 `CommandResponse` 元素
    pub(crate) async fn call(
        &self,
        ctx: &CallContext,
        command: &str,
        params: &[(String, String)],
        context: ErrorContext,
    ) -> Result<XmlNode> {
        self.call_raw(ctx, command, params).await?.map_err(|raw| {
            log::warn!(
                "[{PROVIDER}] {command} failed: {} {}",
                raw.code.as_deref().unwrap_or("-"),
                raw.message
            );
            self.map_error(raw, context)
        })
    }

    /// Finds the command's result element, e.g. `DomainCreateResult`.
    pub(crate) fn result_node<'a>(&self, response: &'a XmlNode, name: &str) -> Result<&'a XmlNode> {
        response
            .find(name)
            .ok_or_else(|| self.parse_error(format!("missing {name} element")))
    }

    /// Fails unless the result flag attribute is `true`.
    pub(crate) fn require_flag(&self, node: &XmlNode, flag: &str) -> Result<()> {
        if node.attr_true(flag) {
            Ok(())
        } else {
            Err(ModuleError::Unknown {
                provider: PROVIDER.to_string(),
                raw_code: None,
                raw_message: format!("{} returned {flag}=false", node.name),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_returns_command_response() {
        let root = XmlNode::parse(
            r#"<ApiResponse Status="OK"><Errors/><CommandResponse Type="namecheap.users.getBalances"><UserGetBalancesResult Currency="USD"/></CommandResponse></ApiResponse>"#,
        )
        .unwrap();
        let response = command_response(root).unwrap();
        assert!(response.find("UserGetBalancesResult").is_some());
    }

    #[test]
    fn error_response_carries_number() {
        let root = XmlNode::parse(
            r#"<ApiResponse Status="ERROR"><Errors><Error Number="2019166">Domain not found</Error></Errors></ApiResponse>"#,
        )
        .unwrap();
        let raw = command_response(root).unwrap_err();
        assert_eq!(raw.code.as_deref(), Some("2019166"));
        assert_eq!(raw.message, "Domain not found");
    }

    #[test]
    fn split_domain_keeps_multi_label_tld() {
        assert_eq!(split_domain("example.co.uk"), Some(("example", "co.uk")));
        assert_eq!(split_domain("example.com."), Some(("example", "com")));
        assert_eq!(split_domain("localhost"), None);
    }

    #[test]
    fn contact_params_cover_every_role() {
        let contact = ContactDetails {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            phone: "+44.2079460000".into(),
            address1: "1 Main St".into(),
            city: "London".into(),
            state_province: "London".into(),
            postal_code: "N1".into(),
            country: "GB".into(),
            ..Default::default()
        };
        let params = contact_params(&contact);
        for role in CONTACT_ROLES {
            assert!(params.iter().any(|(k, v)| *k == format!("{role}EmailAddress") && v == "ada@example.com"));
        }
        assert!(!params.iter().any(|(k, _)| k.ends_with("OrganizationName")));
    }

    #[test]
    fn parse_contact_block() {
        let node = XmlNode::parse(
            "<Registrant><FirstName>Ada</FirstName><LastName>Lovelace</LastName><Country>GB</Country></Registrant>",
        )
        .unwrap();
        let contact = parse_contact(&node);
        assert_eq!(contact.first_name, "Ada");
        assert_eq!(contact.country, "GB");
        assert_eq!(contact.company, None);
    }
}
