//! OpenAI's `x-ratelimit-*` header family.
//!
//! Reset headers use a concatenated duration string (`"1h2m3s"`,
//! `"250ms"`) rather than an absolute timestamp. `m` (minutes) and `ms`
//! (milliseconds) are easy to conflate if a scanner only checks for a
//! trailing `'m'`; the two-character suffix is checked first here so the
//! two never collide.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;

use super::{parse_i64_header, HeaderDialect, LimitSnapshot};

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAiDialect;

impl HeaderDialect for OpenAiDialect {
    fn parse(&self, headers: &HashMap<String, String>) -> LimitSnapshot {
        let reset = headers
            .get("x-ratelimit-reset-requests")
            .or_else(|| headers.get("x-ratelimit-reset-tokens"))
            .and_then(|v| parse_duration(v));

        LimitSnapshot {
            requests_remaining: parse_i64_header(headers, "x-ratelimit-remaining-requests"),
            requests_limit: parse_i64_header(headers, "x-ratelimit-limit-requests"),
            tokens_remaining: parse_i64_header(headers, "x-ratelimit-remaining-tokens"),
            tokens_limit: parse_i64_header(headers, "x-ratelimit-limit-tokens"),
            reset_at: reset.map(|d| Utc::now() + chrono::Duration::from_std(d).unwrap_or_default()),
            retry_after: self.retry_after(headers),
        }
    }

    fn is_remote_limit(&self, status: u16, body: Option<&str>) -> bool {
        if status == 429 {
            return true;
        }
        if status == 503 {
            return body
                .map(|b| b.to_ascii_lowercase().contains("rate"))
                .unwrap_or(false);
        }
        false
    }
}

/// Parses durations like `"1h2m3s"`, `"250ms"`, `"6ms"`, `"2m"`.
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut total_secs = 0f64;
    let mut matched_any = false;

    while i < bytes.len() {
        let start = i;
        while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
            i += 1;
        }
        if i == start {
            return None;
        }
        let value: f64 = s[start..i].parse().ok()?;

        if s[i..].starts_with("ms") {
            total_secs += value / 1000.0;
            i += 2;
        } else if i < bytes.len() {
            match bytes[i] {
                b'h' => total_secs += value * 3600.0,
                b'm' => total_secs += value * 60.0,
                b's' => total_secs += value,
                _ => return None,
            }
            i += 1;
        } else {
            return None;
        }
        matched_any = true;
    }

    matched_any.then(|| Duration::from_secs_f64(total_secs.max(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_duration() {
        assert_eq!(parse_duration("1h2m3s"), Some(Duration::from_secs(3723)));
    }

    #[test]
    fn parses_milliseconds_without_colliding_with_minutes() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("6ms"), Some(Duration::from_millis(6)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn status_429_is_always_a_limit() {
        assert!(OpenAiDialect.is_remote_limit(429, None));
        assert!(!OpenAiDialect.is_remote_limit(500, None));
    }
}
