//! Timestamp helpers shared by the serde layer and the storage adapters.
//!
//! Timestamps are stored and serialized as RFC3339 strings in UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Renders a timestamp the way it is stored.
pub fn format(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parses a stored RFC3339 timestamp.
pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(dt))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let raw = String::deserialize(deserializer)?;
    parse(&raw).ok_or_else(|| Error::custom(format!("Invalid RFC3339 timestamp: {raw}")))
}

/// `Option<DateTime<Utc>>` 版本
pub mod option {
    use super::{format, parse, DateTime, Deserialize, Deserializer, Serializer, Utc};

    pub fn serialize<S>(dt: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match dt {
            Some(dt) => serializer.serialize_some(&format(dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| Error::custom(format!("Invalid RFC3339 timestamp: {raw}"))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_form_parses_back() {
        let now = Utc::now();
        assert_eq!(parse(&format(&now)), Some(now));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse("yesterday"), None);
    }
}
