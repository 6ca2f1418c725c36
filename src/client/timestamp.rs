//! Lenient timestamp decoding.
//!
//! Servers send epoch seconds, but persisted sessions written by other
//! clients may hold RFC 3339 strings. Both decode to epoch seconds.

use chrono::DateTime;
use serde::{Deserialize, Deserializer, de::Error};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Seconds(u64),
    Text(String),
}

/// Parse epoch seconds from a decimal string or an RFC 3339 date-time.
pub fn parse(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<u64>() {
        return Some(secs);
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .and_then(|dt| u64::try_from(dt.timestamp()).ok())
}

/// `deserialize_with` helper accepting a number or a string.
pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Seconds(secs) => Ok(secs),
        RawTimestamp::Text(text) => {
            parse(&text).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", text)))
        }
    }
}
