//! DirectAdmin error mapping
//!
//! The legacy API has no error codes, only `text`/`details`, so mapping is done on the
//! message.

use crate::error::ModuleError;
use crate::modules::common::message_matches;
use crate::traits::{ErrorContext, ModuleErrorMapper, RawApiError};

use super::{DirectAdminModule, PROVIDER};

pub(crate) const NOT_FOUND_HINTS: [&str; 4] = [
    "does not exist",
    "doesn't exist",
    "no such user",
    "not a valid user",
];
const EXISTS_HINTS: [&str; 3] = ["already exists", "is taken", "already in use"];
const AUTH_HINTS: [&str; 3] = [
    "you do not have access",
    "invalid login",
    "not authorized",
];
const INVALID_HINTS: [&str; 3] = ["invalid", "is not valid", "must be"];

impl ModuleErrorMapper for DirectAdminModule {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    fn map_error(&self, raw: RawApiError, context: ErrorContext) -> ModuleError {
        let resource = context
            .resource
            .unwrap_or_else(|| "<unknown>".to_string());

        if message_matches(&raw.message, &NOT_FOUND_HINTS) {
            return ModuleError::ResourceNotFound {
                provider: PROVIDER.to_string(),
                resource,
                raw_message: Some(raw.message),
            };
        }
        if message_matches(&raw.message, &EXISTS_HINTS) {
            return ModuleError::ResourceExists {
                provider: PROVIDER.to_string(),
                resource,
                raw_message: Some(raw.message),
            };
        }
        if message_matches(&raw.message, &AUTH_HINTS) {
            return ModuleError::InvalidCredentials {
                provider: PROVIDER.to_string(),
                raw_message: Some(raw.message),
            };
        }
        if message_matches(&raw.message, &INVALID_HINTS) {
            return ModuleError::InvalidParameter {
                provider: PROVIDER.to_string(),
                param: context.param.unwrap_or_else(|| "general".to_string()),
                detail: raw.message,
            };
        }
        self.unknown_error(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModuleConfig;

    fn module() -> DirectAdminModule {
        DirectAdminModule::new(
            &ModuleConfig::new()
                .with("hostname", "da.example.com")
                .with("username", "admin")
                .with("password", "secret"),
        )
        .unwrap()
    }

    #[test]
    fn maps_missing_user() {
        let e = module().map_error(
            RawApiError::new("Unable to suspend: User bob does not exist"),
            ErrorContext::resource("bob"),
        );
        assert!(matches!(e, ModuleError::ResourceNotFound { resource, .. } if resource == "bob"));
    }

    #[test]
    fn maps_taken_username() {
        let e = module().map_error(
            RawApiError::new("That username already exists on the system"),
            ErrorContext::default(),
        );
        assert!(matches!(e, ModuleError::ResourceExists { .. }));
    }

    #[test]
    fn maps_invalid_input() {
        let e = module().map_error(
            RawApiError::new("Invalid email address"),
            ErrorContext::default(),
        );
        assert!(matches!(e, ModuleError::InvalidParameter { .. }));
    }

    #[test]
    fn unknown_fallback() {
        let e = module().map_error(RawApiError::new("Disk full"), ErrorContext::default());
        assert_eq!(e.to_string(), "[directadmin] Disk full");
    }
}
