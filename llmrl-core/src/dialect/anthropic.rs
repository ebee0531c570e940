//! Anthropic's `anthropic-ratelimit-*` header family.
//!
//! Reset is an absolute RFC 3339 instant rather than OpenAI's relative
//! duration string. Both `429` (standard rate limit) and `529`
//! (overloaded) are treated as remote-limit signals: the caller should
//! back off and rotate the same as for a plain 429.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{parse_i64_header, HeaderDialect, LimitSnapshot};

#[derive(Debug, Default, Clone, Copy)]
pub struct AnthropicDialect;

impl HeaderDialect for AnthropicDialect {
    fn parse(&self, headers: &HashMap<String, String>) -> LimitSnapshot {
        let reset = headers
            .get("anthropic-ratelimit-requests-reset")
            .or_else(|| headers.get("anthropic-ratelimit-tokens-reset"))
            .and_then(|v| DateTime::parse_from_rfc3339(v.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc));

        LimitSnapshot {
            requests_remaining: parse_i64_header(headers, "anthropic-ratelimit-requests-remaining"),
            requests_limit: parse_i64_header(headers, "anthropic-ratelimit-requests-limit"),
            tokens_remaining: parse_i64_header(headers, "anthropic-ratelimit-tokens-remaining"),
            tokens_limit: parse_i64_header(headers, "anthropic-ratelimit-tokens-limit"),
            reset_at: reset,
            retry_after: self.retry_after(headers),
        }
    }

    fn is_remote_limit(&self, status: u16, _body: Option<&str>) -> bool {
        status == 429 || status == 529
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overloaded_status_counts_as_a_limit() {
        assert!(AnthropicDialect.is_remote_limit(529, None));
        assert!(AnthropicDialect.is_remote_limit(429, None));
        assert!(!AnthropicDialect.is_remote_limit(500, None));
    }

    #[test]
    fn parses_iso8601_reset() {
        let mut headers = HashMap::new();
        headers.insert(
            "anthropic-ratelimit-requests-reset".to_string(),
            "2025-01-01T00:00:00Z".to_string(),
        );
        let snap = AnthropicDialect.parse(&headers);
        assert!(snap.reset_at.is_some());
    }
}
