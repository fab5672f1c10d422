//! Namecheap error mapping

use crate::error::ModuleError;
use crate::modules::common::message_matches;
use crate::traits::{ErrorContext, ModuleErrorMapper, RawApiError};

use super::{NamecheapModule, PROVIDER};

/// "Domain is not associated with your account": the domain left this reseller.
pub(crate) const NOT_ASSOCIATED: &str = "2016166";

/// Namecheap error code mapping
/// Reference: <https://www.namecheap.com/support/api/error-codes/>
impl ModuleErrorMapper for NamecheapModule {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    fn map_error(&self, raw: RawApiError, context: ErrorContext) -> ModuleError {
        let resource = || {
            context
                .resource
                .clone()
                .unwrap_or_else(|| "<unknown>".to_string())
        };
        match raw.code.as_deref() {
            // 1011102: API key invalid or API access disabled
            // 1011150: RequestIP is not whitelisted
            // 1010104 / 1011104: UserName invalid
            Some("1011102" | "1011150" | "1010104" | "1011104") => {
                ModuleError::InvalidCredentials {
                    provider: PROVIDER.to_string(),
                    raw_message: Some(raw.message),
                }
            }

            // 2019166: Domain not found
            // 2016166: Domain is not associated with your account
            Some("2019166" | NOT_ASSOCIATED) => ModuleError::ResourceNotFound {
                provider: PROVIDER.to_string(),
                resource: resource(),
                raw_message: Some(raw.message),
            },

            // 2015182: contact phone invalid
            // 2015167: years invalid
            // 2011170: promotion code invalid
            // 2030280: TLD not supported
            Some(code @ ("2015182" | "2015167" | "2011170" | "2030280")) => {
                let param = match code {
                    "2015182" => "phone",
                    "2015167" => "years",
                    "2011170" => "promotion_code",
                    _ => "domain",
                };
                ModuleError::InvalidParameter {
                    provider: PROVIDER.to_string(),
                    param: param.to_string(),
                    detail: raw.message,
                }
            }

            _ if message_matches(&raw.message, &["not available", "already registered"]) => {
                ModuleError::ResourceExists {
                    provider: PROVIDER.to_string(),
                    resource: resource(),
                    raw_message: Some(raw.message),
                }
            }
            _ if message_matches(&raw.message, &["not found"]) => ModuleError::ResourceNotFound {
                provider: PROVIDER.to_string(),
                resource: resource(),
                raw_message: Some(raw.message),
            },

            _ => self.unknown_error(raw),
        }
    }
}
