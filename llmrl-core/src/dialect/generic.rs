//! A configurable dialect for providers that expose a single
//! remaining/limit/reset header triple under arbitrary names (the common
//! case for smaller or self-hosted providers that mimic the shape of
//! OpenAI/Anthropic's headers without matching their names exactly).
//!
//! The reset header is accepted either as an epoch timestamp (seconds, or
//! milliseconds if the value looks too large to be seconds) or as an
//! RFC 3339 string.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

use super::{parse_i64_header, HeaderDialect, LimitSnapshot};

#[derive(Debug, Clone)]
pub struct GenericDialect {
    pub remaining_header: String,
    pub limit_header: String,
    pub reset_header: String,
}

impl Default for GenericDialect {
    fn default() -> Self {
        Self {
            remaining_header: "x-ratelimit-remaining".to_string(),
            limit_header: "x-ratelimit-limit".to_string(),
            reset_header: "x-ratelimit-reset".to_string(),
        }
    }
}

impl GenericDialect {
    pub fn new(
        remaining_header: impl Into<String>,
        limit_header: impl Into<String>,
        reset_header: impl Into<String>,
    ) -> Self {
        Self {
            remaining_header: remaining_header.into().to_ascii_lowercase(),
            limit_header: limit_header.into().to_ascii_lowercase(),
            reset_header: reset_header.into().to_ascii_lowercase(),
        }
    }
}

impl HeaderDialect for GenericDialect {
    fn parse(&self, headers: &HashMap<String, String>) -> LimitSnapshot {
        LimitSnapshot {
            requests_remaining: parse_i64_header(headers, &self.remaining_header),
            requests_limit: parse_i64_header(headers, &self.limit_header),
            tokens_remaining: None,
            tokens_limit: None,
            reset_at: headers
                .get(&self.reset_header)
                .and_then(|v| parse_reset(v)),
            retry_after: self.retry_after(headers),
        }
    }

    fn is_remote_limit(&self, status: u16, _body: Option<&str>) -> bool {
        status == 429
    }
}

fn parse_reset(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(num) = trimmed.parse::<f64>() {
        let secs = if num >= 1e12 { num / 1000.0 } else { num };
        let secs = secs.max(0.0);
        return Some(DateTime::<Utc>::from(
            SystemTime::UNIX_EPOCH + Duration::from_secs_f64(secs),
        ));
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn treats_large_numbers_as_milliseconds() {
        let seconds_epoch = 1_700_000_000.0;
        let millis_epoch = seconds_epoch * 1000.0;
        let from_secs = parse_reset(&seconds_epoch.to_string()).unwrap();
        let from_millis = parse_reset(&millis_epoch.to_string()).unwrap();
        assert_eq!(from_secs.timestamp(), from_millis.timestamp());
    }

    #[test]
    fn custom_header_names_are_lowercased() {
        let dialect = GenericDialect::new("X-Remaining", "X-Limit", "X-Reset");
        assert_eq!(dialect.remaining_header, "x-remaining");
    }
}
