//! Namecheap ProvisioningModule trait 实现

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;

use crate::context::CallContext;
use crate::error::{ModuleError, Result};
use crate::traits::{ErrorContext, ModuleErrorMapper, ProvisioningModule};
use crate::types::{
    Ack, ConfigField, ContactDetails, CreateAccountRequest, CreatedAccount, DnsHostRecord,
    ModuleMetadata, ModuleType, Operation, RenewOutcome, SyncStatus, TransferRequest,
    TransferStarted, TransferState, TransferStatus, ValueRule,
};
use crate::utils::datetime::parse_provider_date;

use super::error::NOT_ASSOCIATED;
use super::http::{contact_params, parse_contact};
use super::{NamecheapModule, PROVIDER, XmlNode};

const DEFAULT_MX_PREF: u16 = 10;
const DEFAULT_TTL: u32 = 1800;

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}

/// Reads `DomainTransferGetStatusResult`.
pub(crate) fn interpret_transfer_status(result: &XmlNode) -> TransferStatus {
    let status = result.attr("Status").unwrap_or_default().trim().to_string();
    let lower = status.to_ascii_lowercase();
    let state = if lower.contains("complet") {
        TransferState::Completed
    } else if ["fail", "cancel", "reject", "timed out", "timeout"]
        .iter()
        .any(|s| lower.contains(s))
    {
        TransferState::Failed
    } else {
        TransferState::Pending
    };
    let detail = result
        .attr("StatusDetail")
        .filter(|d| !d.is_empty())
        .map(ToString::to_string)
        .or_else(|| (!status.is_empty()).then_some(status));
    TransferStatus {
        state,
        detail,
        expiry_date: result
            .attr("ExpireDate")
            .and_then(parse_provider_date)
            .filter(|_| state == TransferState::Completed),
    }
}

/// Reads `DomainGetInfoResult` into a sync status.
pub(crate) fn interpret_info(info: &XmlNode) -> SyncStatus {
    let status = info.attr("Status").unwrap_or_default().to_ascii_lowercase();
    let expiry_date = info
        .find("ExpiredDate")
        .and_then(|n| parse_provider_date(&n.text))
        .or_else(|| info.attr("Expires").and_then(parse_provider_date));
    let past_expiry = expiry_date.is_some_and(|d| d < Utc::now().date_naive());
    let expired = status == "expired" || past_expiry;
    SyncStatus {
        active: matches!(status.as_str(), "ok" | "active" | "locked") && !expired,
        expired,
        transferred_away: false,
        expiry_date,
    }
}

#[async_trait]
impl ProvisioningModule for NamecheapModule {
    fn id(&self) -> &'static str {
        PROVIDER
    }

    fn metadata() -> ModuleMetadata {
        ModuleMetadata {
            id: PROVIDER.to_string(),
            display_name: "Namecheap".to_string(),
            api_version: "1.1".to_string(),
            module_type: ModuleType::Registrar,
            capabilities: vec![
                Operation::TestConnection,
                Operation::CreateAccount,
                Operation::Sync,
                Operation::Renew,
                Operation::GetNameservers,
                Operation::SaveNameservers,
                Operation::GetDnsRecords,
                Operation::SaveDnsRecords,
                Operation::GetContactDetails,
                Operation::SaveContactDetails,
                Operation::GetRegistrarLock,
                Operation::SaveRegistrarLock,
                Operation::GetTransferCode,
                Operation::TransferDomain,
                Operation::TransferSync,
            ],
            default_non_ssl_port: None,
            default_ssl_port: None,
            sso_label: None,
            admin_sso_label: None,
            config_fields: vec![
                ConfigField::text("api_user", "API User").required(),
                ConfigField::password("api_key", "API Key").required(),
                ConfigField::text("username", "Username")
                    .with_description("Account the API acts for. Defaults to the API user"),
                ConfigField::text("client_ip", "Whitelisted Client IP")
                    .required()
                    .with_rule(ValueRule::Ipv4),
                ConfigField::boolean("test_mode", "Sandbox Mode", false),
                ConfigField::boolean("whoisguard", "Free WhoisGuard", true),
                ConfigField::text("promotional_code", "Promotional Code"),
            ],
        }
    }

    async fn test_connection(&self, ctx: &CallContext) -> Result<()> {
        let response = self
            .call(ctx, "namecheap.users.getBalances", &[], ErrorContext::default())
            .await?;
        self.result_node(&response, "UserGetBalancesResult")?;
        Ok(())
    }

    fn probe_external_id(&self, request: &CreateAccountRequest) -> Option<String> {
        Some(request.domain.trim().to_ascii_lowercase())
    }

    async fn create_account(
        &self,
        ctx: &CallContext,
        request: &CreateAccountRequest,
    ) -> Result<CreatedAccount> {
        let domain = request.domain.trim().to_ascii_lowercase();
        self.sld_tld(&domain)?;
        let years = request.registration_years.unwrap_or(1).to_string();

        let mut query = params(&[("DomainName", &domain), ("Years", &years)]);
        query.extend(contact_params(&request.contact));
        if !request.nameservers.is_empty() {
            query.push(("Nameservers".to_string(), request.nameservers.join(",")));
        }
        query.push(("AddFreeWhoisguard".to_string(), yes_no(self.whoisguard)));
        query.push(("WGEnabled".to_string(), yes_no(self.whoisguard)));
        if let Some(code) = &self.promotional_code {
            query.push(("PromotionCode".to_string(), code.clone()));
        }

        let response = self
            .call(
                ctx,
                "namecheap.domains.create",
                &query,
                ErrorContext::resource(&domain),
            )
            .await?;
        let result = self.result_node(&response, "DomainCreateResult")?;
        self.require_flag(result, "Registered")?;

        let meta: BTreeMap<String, String> = ["DomainID", "OrderID", "TransactionID", "ChargedAmount"]
            .into_iter()
            .filter_map(|key| result.attr(key).map(|v| (key.to_string(), v.to_string())))
            .collect();
        log::info!("[{PROVIDER}] Registered {domain} for {years} year(s)");
        Ok(CreatedAccount {
            external_id: domain,
            meta,
        })
    }

    async fn sync(&self, ctx: &CallContext, external_id: &str) -> Result<SyncStatus> {
        let answer = self
            .call_raw(
                ctx,
                "namecheap.domains.getInfo",
                &params(&[("DomainName", external_id)]),
            )
            .await?;
        let response = match answer {
            Ok(response) => response,
            Err(raw) if raw.code.as_deref() == Some(NOT_ASSOCIATED) => {
                log::info!("[{PROVIDER}] {external_id} is no longer in this account");
                return Ok(SyncStatus {
                    transferred_away: true,
                    ..SyncStatus::default()
                });
            }
            Err(raw) => return Err(self.map_error(raw, ErrorContext::resource(external_id))),
        };
        let info = self.result_node(&response, "DomainGetInfoResult")?;
        Ok(interpret_info(info))
    }

    async fn renew(&self, ctx: &CallContext, external_id: &str, years: u32) -> Result<RenewOutcome> {
        let years = years.max(1).to_string();
        let mut query = params(&[("DomainName", external_id), ("Years", &years)]);
        if let Some(code) = &self.promotional_code {
            query.push(("PromotionCode".to_string(), code.clone()));
        }
        let response = self
            .call(
                ctx,
                "namecheap.domains.renew",
                &query,
                ErrorContext::resource(external_id),
            )
            .await?;
        let result = self.result_node(&response, "DomainRenewResult")?;
        self.require_flag(result, "Renew")?;
        Ok(RenewOutcome {
            expiry_date: result
                .find("ExpiredDate")
                .and_then(|n| parse_provider_date(&n.text))
                .or_else(|| result.attr("DomainExpires").and_then(parse_provider_date)),
        })
    }

    async fn get_nameservers(&self, ctx: &CallContext, domain: &str) -> Result<Vec<String>> {
        let (sld, tld) = self.sld_tld(domain)?;
        let response = self
            .call(
                ctx,
                "namecheap.domains.dns.getList",
                &params(&[("SLD", sld), ("TLD", tld)]),
                ErrorContext::resource(domain),
            )
            .await?;
        let result = self.result_node(&response, "DomainDNSGetListResult")?;
        Ok(result
            .children_named("Nameserver")
            .map(|n| n.text.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect())
    }

    async fn save_nameservers(
        &self,
        ctx: &CallContext,
        domain: &str,
        nameservers: &[String],
    ) -> Result<Ack> {
        let (sld, tld) = self.sld_tld(domain)?;
        let list: Vec<&str> = nameservers
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .collect();
        if list.len() < 2 {
            return Err(self.invalid_parameter("nameservers", "at least two nameservers are required"));
        }
        let joined = list.join(",");
        let response = self
            .call(
                ctx,
                "namecheap.domains.dns.setCustom",
                &params(&[("SLD", sld), ("TLD", tld), ("Nameservers", &joined)]),
                ErrorContext::resource(domain),
            )
            .await?;
        let result = self.result_node(&response, "DomainDNSSetCustomResult")?;
        self.require_flag(result, "Updated")?;
        Ok(Ack::done())
    }

    async fn get_dns_records(&self, ctx: &CallContext, domain: &str) -> Result<Vec<DnsHostRecord>> {
        let (sld, tld) = self.sld_tld(domain)?;
        let response = self
            .call(
                ctx,
                "namecheap.domains.dns.getHosts",
                &params(&[("SLD", sld), ("TLD", tld)]),
                ErrorContext::resource(domain),
            )
            .await?;
        let result = self.result_node(&response, "DomainDNSGetHostsResult")?;
        Ok(result
            .children_named("host")
            .map(|h| {
                let record_type = h.attr("Type").unwrap_or_default().to_ascii_uppercase();
                DnsHostRecord {
                    host: h.attr("Name").unwrap_or("@").to_string(),
                    priority: if record_type == "MX" {
                        h.attr("MXPref").and_then(|p| p.parse().ok())
                    } else {
                        None
                    },
                    record_type,
                    address: h.attr("Address").unwrap_or_default().to_string(),
                    ttl: h.attr("TTL").and_then(|t| t.parse().ok()),
                }
            })
            .collect())
    }

    async fn save_dns_records(
        &self,
        ctx: &CallContext,
        domain: &str,
        records: &[DnsHostRecord],
    ) -> Result<Ack> {
        let (sld, tld) = self.sld_tld(domain)?;
        let mut query = params(&[("SLD", sld), ("TLD", tld)]);
        // setHosts 是整体替换，编号从 1 开始
        for (i, record) in records.iter().enumerate() {
            let n = i + 1;
            query.push((format!("HostName{n}"), record.host.clone()));
            query.push((format!("RecordType{n}"), record.record_type.to_ascii_uppercase()));
            query.push((format!("Address{n}"), record.address.clone()));
            query.push((
                format!("MXPref{n}"),
                record.priority.unwrap_or(DEFAULT_MX_PREF).to_string(),
            ));
            query.push((
                format!("TTL{n}"),
                record.ttl.unwrap_or(DEFAULT_TTL).to_string(),
            ));
        }
        if records
            .iter()
            .any(|r| r.record_type.eq_ignore_ascii_case("MX"))
        {
            query.push(("EmailType".to_string(), "MX".to_string()));
        }
        let response = self
            .call(
                ctx,
                "namecheap.domains.dns.setHosts",
                &query,
                ErrorContext::resource(domain),
            )
            .await?;
        let result = self.result_node(&response, "DomainDNSSetHostsResult")?;
        self.require_flag(result, "IsSuccess")?;
        Ok(Ack::done())
    }

    async fn get_contact_details(&self, ctx: &CallContext, domain: &str) -> Result<ContactDetails> {
        let response = self
            .call(
                ctx,
                "namecheap.domains.getContacts",
                &params(&[("DomainName", domain)]),
                ErrorContext::resource(domain),
            )
            .await?;
        let result = self.result_node(&response, "DomainContactsResult")?;
        let registrant = result
            .child("Registrant")
            .ok_or_else(|| self.parse_error("missing Registrant element"))?;
        Ok(parse_contact(registrant))
    }

    async fn save_contact_details(
        &self,
        ctx: &CallContext,
        domain: &str,
        contact: &ContactDetails,
    ) -> Result<Ack> {
        let mut query = params(&[("DomainName", domain)]);
        query.extend(contact_params(contact));
        let response = self
            .call(
                ctx,
                "namecheap.domains.setContacts",
                &query,
                ErrorContext::resource(domain),
            )
            .await?;
        let result = self.result_node(&response, "DomainSetContactResult")?;
        self.require_flag(result, "IsSuccess")?;
        Ok(Ack::done())
    }

    async fn get_registrar_lock(&self, ctx: &CallContext, domain: &str) -> Result<bool> {
        let response = self
            .call(
                ctx,
                "namecheap.domains.getRegistrarLock",
                &params(&[("DomainName", domain)]),
                ErrorContext::resource(domain),
            )
            .await?;
        let result = self.result_node(&response, "DomainGetRegistrarLockResult")?;
        Ok(result.attr_true("RegistrarLockStatus"))
    }

    async fn save_registrar_lock(&self, ctx: &CallContext, domain: &str, locked: bool) -> Result<Ack> {
        let action = if locked { "LOCK" } else { "UNLOCK" };
        let response = self
            .call(
                ctx,
                "namecheap.domains.setRegistrarLock",
                &params(&[("DomainName", domain), ("LockAction", action)]),
                ErrorContext::resource(domain),
            )
            .await?;
        let result = self.result_node(&response, "DomainSetRegistrarLockResult")?;
        self.require_flag(result, "IsSuccess")?;
        Ok(Ack::done())
    }

    async fn get_transfer_code(&self, ctx: &CallContext, domain: &str) -> Result<String> {
        let response = self
            .call(
                ctx,
                "namecheap.domains.getInfo",
                &params(&[("DomainName", domain)]),
                ErrorContext::resource(domain),
            )
            .await?;
        let code = response
            .find("Modificationrights")
            .and_then(|n| n.attr("EPPKey"))
            .filter(|k| !k.is_empty());
        match code {
            Some(code) => {
                ctx.register_secret(code);
                Ok(code.to_string())
            }
            None => Err(ModuleError::Unknown {
                provider: PROVIDER.to_string(),
                raw_code: Some(EPP_UNAVAILABLE.to_string()),
                raw_message: "EPP code is not exposed through the API; it is emailed to the registrant on request".to_string(),
            }),
        }
    }

    async fn transfer_domain(&self, ctx: &CallContext, request: &TransferRequest) -> Result<TransferStarted> {
        let domain = request.domain.trim().to_ascii_lowercase();
        self.sld_tld(&domain)?;
        let auth_code = require_auth_code(request)?;
        ctx.register_secret(auth_code);
        let years = request.years.max(1).to_string();

        let mut query = params(&[("DomainName", &domain), ("Years", &years), ("EPPCode", auth_code)]);
        query.push(("AddFreeWhoisguard".to_string(), yes_no(self.whoisguard)));
        query.push(("WGEnable".to_string(), yes_no(self.whoisguard)));
        if let Some(code) = &self.promotional_code {
            query.push(("PromotionCode".to_string(), code.clone()));
        }
        let response = self
            .call(
                ctx,
                "namecheap.domains.transfer.create",
                &query,
                ErrorContext::resource(&domain),
            )
            .await?;
        let result = self.result_node(&response, "DomainTransferCreateResult")?;
        self.require_flag(result, "Transfer")?;
        let transfer_id = result
            .attr("TransferID")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| self.parse_error("DomainTransferCreateResult has no TransferID"))?;

        let meta: BTreeMap<String, String> = ["OrderID", "TransactionID", "ChargedAmount", "StatusID"]
            .into_iter()
            .filter_map(|key| result.attr(key).map(|v| (key.to_string(), v.to_string())))
            .collect();
        log::info!("[{PROVIDER}] Transfer of {domain} submitted as #{transfer_id}");
        Ok(TransferStarted {
            transfer_id: transfer_id.to_string(),
            meta,
        })
    }

    async fn transfer_sync(&self, ctx: &CallContext, transfer_id: &str) -> Result<TransferStatus> {
        let response = self
            .call(
                ctx,
                "namecheap.domains.transfer.getStatus",
                &params(&[("TransferID", transfer_id)]),
                ErrorContext::resource(transfer_id),
            )
            .await?;
        let result = self.result_node(&response, "DomainTransferGetStatusResult")?;
        Ok(interpret_transfer_status(result))
    }
}

fn require_auth_code(request: &TransferRequest) -> Result<&str> {
    let code = request.auth_code.trim();
    if code.is_empty() {
        return Err(ModuleError::InvalidParameter {
            provider: PROVIDER.to_string(),
            param: "EPPCode".to_string(),
            detail: "a transfer needs the authorisation code of the losing registrar".to_string(),
        });
    }
    Ok(code)
}

/// Marker code for the missing-EPP answer.
const EPP_UNAVAILABLE: &str = "epp-unavailable";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_with_future_expiry_is_active() {
        let info = XmlNode::parse(
            r#"<DomainGetInfoResult Status="Ok" DomainName="example.com"><DomainDetails><ExpiredDate>11/04/2099</ExpiredDate></DomainDetails></DomainGetInfoResult>"#,
        )
        .unwrap();
        let status = interpret_info(&info);
        assert!(status.active);
        assert!(!status.expired);
        assert_eq!(
            status.expiry_date,
            chrono::NaiveDate::from_ymd_opt(2099, 11, 4)
        );
    }

    #[test]
    fn info_with_expired_status() {
        let info = XmlNode::parse(r#"<DomainGetInfoResult Status="Expired"/>"#).unwrap();
        let status = interpret_info(&info);
        assert!(!status.active);
        assert!(status.expired);
    }

    #[test]
    fn past_expiry_date_counts_as_expired() {
        let info = XmlNode::parse(r#"<DomainGetInfoResult Status="Ok" Expires="01/01/2001"/>"#)
            .unwrap();
        assert!(interpret_info(&info).expired);
    }

    #[test]
    fn metadata_has_no_lifecycle_mutations() {
        let meta = NamecheapModule::metadata();
        assert!(!meta.supports(Operation::SuspendAccount));
        assert!(!meta.supports(Operation::TerminateAccount));
        assert!(meta.supports(Operation::GetTransferCode));
        assert!(meta.supports(Operation::TransferDomain));
        assert!(meta.supports(Operation::TransferSync));
        assert_eq!(meta.module_type, ModuleType::Registrar);
    }

    #[test]
    fn completed_transfer_carries_expiry() {
        let result = XmlNode::parse(
            r#"<DomainTransferGetStatusResult TransferID="15" Status="COMPLETED" ExpireDate="11/04/2027"/>"#,
        )
        .unwrap();
        let status = interpret_transfer_status(&result);
        assert_eq!(status.state, TransferState::Completed);
        assert_eq!(status.expiry_date, chrono::NaiveDate::from_ymd_opt(2027, 11, 4));
    }

    #[test]
    fn cancelled_transfer_is_failed_with_detail() {
        let result = XmlNode::parse(
            r#"<DomainTransferGetStatusResult TransferID="15" Status="CANCELLED" StatusDetail="Invalid EPP code"/>"#,
        )
        .unwrap();
        let status = interpret_transfer_status(&result);
        assert_eq!(status.state, TransferState::Failed);
        assert_eq!(status.detail.as_deref(), Some("Invalid EPP code"));
        assert_eq!(status.expiry_date, None);
    }

    #[test]
    fn waiting_transfer_is_pending() {
        let result = XmlNode::parse(
            r#"<DomainTransferGetStatusResult TransferID="15" Status="WAITINGFORAUTH"/>"#,
        )
        .unwrap();
        let status = interpret_transfer_status(&result);
        assert_eq!(status.state, TransferState::Pending);
        assert_eq!(status.detail.as_deref(), Some("WAITINGFORAUTH"));
    }

    #[test]
    fn transfer_without_auth_code_is_rejected_locally() {
        let request = TransferRequest {
            domain: "example.com".to_string(),
            auth_code: "  ".to_string(),
            years: 1,
        };
        let err = require_auth_code(&request).unwrap_err();
        assert!(matches!(err, ModuleError::InvalidParameter { .. }));
    }
}
