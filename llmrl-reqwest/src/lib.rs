//! A `reqwest`-backed [`Transport`](llmrl_core::transport::Transport)
//! implementation.
//!
//! Follows a safe-logging posture: headers redacted before they ever
//! reach a `tracing` event, a best-effort curl repro line gated behind an
//! env toggle. No internal retry loop — [`crate::transport::Transport`]
//! implementations perform exactly one request per call, since
//! `llmrl-core`'s `RequestEngine` owns retry/backoff/rotation. This
//! transport's only job is to turn one [`TransportRequest`] into one
//! [`TransportResponse`] or [`TransportError`], faithfully, with a
//! debug-level log line for the attempt and the response.

use std::collections::HashMap;
use std::env;

use async_trait::async_trait;
use reqwest::{Client, Method as ReqwestMethod};

use llmrl_core::transport::{Method, Transport, TransportError, TransportRequest, TransportResponse};

const RAW_ENV: &str = "LLMRL_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024;

fn raw_enabled() -> bool {
    matches!(env::var(RAW_ENV).as_deref(), Ok("1") | Ok("true") | Ok("yes"))
}

fn to_reqwest_method(method: Method) -> ReqwestMethod {
    match method {
        Method::Get => ReqwestMethod::GET,
        Method::Post => ReqwestMethod::POST,
        Method::Put => ReqwestMethod::PUT,
        Method::Patch => ReqwestMethod::PATCH,
        Method::Delete => ReqwestMethod::DELETE,
    }
}

/// Renders a best-effort curl command for repro/debug, with the
/// `Authorization` header redacted — never logs the credential even when
/// raw logging is enabled.
fn make_curl(method: Method, url: &str, headers: &HashMap<String, String>, body: &[u8]) -> String {
    let mut parts = vec!["curl".to_string(), format!("-X{}", method.as_str())];
    for (name, value) in headers {
        let shown = if name.eq_ignore_ascii_case("authorization") {
            "Bearer <redacted>".to_string()
        } else {
            value.clone()
        };
        parts.push(format!("-H '{name}: {shown}'"));
    }
    if !body.is_empty() {
        if let Ok(text) = std::str::from_utf8(body) {
            let mut snippet = text.to_string();
            if snippet.len() > RAW_MAX_BODY {
                snippet.truncate(RAW_MAX_BODY);
            }
            parts.push(format!("-d '{}'", snippet.replace('\'', r"'\''")));
        } else {
            parts.push(format!("--data-binary @- # ({} bytes)", body.len()));
        }
    }
    parts.push(format!("'{url}'"));
    parts.join(" ")
}

fn redact_headers_for_log(headers: &HashMap<String, String>) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(k, v)| {
            let shown = if k.eq_ignore_ascii_case("authorization") {
                "Bearer <redacted>".to_string()
            } else {
                v.clone()
            };
            (k.clone(), shown)
        })
        .collect()
}

/// A thin wrapper around `reqwest::Client` implementing
/// [`llmrl_core::transport::Transport`]. Owns no retry state — every
/// [`Transport::request`] call is exactly one HTTP round trip.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn request(&self, req: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(to_reqwest_method(req.method), &req.url)
            .timeout(req.timeout);

        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        if !req.body.is_empty() {
            builder = builder.body(req.body.clone());
        }

        tracing::debug!(
            method = req.method.as_str(),
            url = %req.url,
            headers = ?redact_headers_for_log(&req.headers),
            timeout_ms = req.timeout.as_millis() as u64,
            "llmrl.transport.request.start"
        );

        if raw_enabled() {
            let curl = make_curl(req.method, &req.url, &req.headers, &req.body);
            tracing::debug!(target: "llmrl.transport.raw", %curl, "request");
        }

        let t0 = std::time::Instant::now();
        let response = match builder.send().await {
            Ok(resp) => resp,
            Err(err) => {
                let elapsed = t0.elapsed();
                return if err.is_timeout() {
                    tracing::warn!(url = %req.url, elapsed_ms = elapsed.as_millis() as u64, "llmrl.transport.timeout");
                    Err(TransportError::Timeout(req.timeout))
                } else {
                    tracing::warn!(url = %req.url, error = %err, "llmrl.transport.error");
                    Err(TransportError::Other(err.to_string()))
                };
            }
        };

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_ascii_lowercase(), v.to_str().unwrap_or("").to_string()))
            .collect();

        let body = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(err) => {
                return if err.is_timeout() {
                    Err(TransportError::Timeout(req.timeout))
                } else {
                    Err(TransportError::Other(err.to_string()))
                };
            }
        };

        tracing::debug!(
            status,
            duration_ms = t0.elapsed().as_millis() as u64,
            body_len = body.len(),
            "llmrl.transport.response"
        );

        if raw_enabled() {
            let mut snippet = body.clone();
            let truncated = snippet.len() > RAW_MAX_BODY;
            if truncated {
                snippet.truncate(RAW_MAX_BODY);
            }
            tracing::info!(
                target: "llmrl.transport.raw",
                status,
                body = %String::from_utf8_lossy(&snippet),
                truncated,
                "response"
            );
        }

        Ok(TransportResponse { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curl_redacts_authorization() {
        let mut headers = HashMap::new();
        headers.insert("authorization".to_string(), "Bearer sk-secret".to_string());
        let curl = make_curl(Method::Get, "https://api.openai.com/v1/models", &headers, &[]);
        assert!(!curl.contains("sk-secret"));
        assert!(curl.contains("<redacted>"));
    }
}
