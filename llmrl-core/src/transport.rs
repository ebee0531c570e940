//! The outbound HTTP transport as an injected primitive.
//!
//! [`RequestEngine`](crate::engine::RequestEngine) never talks to a socket
//! directly. It calls a single `request` method on whatever implements
//! [`Transport`], which keeps retry/backoff/rotation logic (this crate's
//! job) separate from wire concerns (the adapter's job, e.g.
//! `llmrl-reqwest`). A hand-written test double implementing this trait is
//! enough to exercise the whole engine without a socket.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// HTTP method used for an outbound call. Kept as a closed enum rather than
/// a string so dialects and the engine can match on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// A single outbound request, as the engine hands it to the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    /// Header names are not normalized here; the transport decides how to
    /// send them. Response headers, by contrast, are always lowercased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub timeout: Duration,
}

/// The transport's view of a completed response. Header keys are always
/// lowercased so dialects never have to worry about case.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }
}

/// Failure modes a transport can report. A timeout is distinguished from
/// every other failure because the engine retries timeouts up to
/// `max_retries` but treats any other transport error as terminal.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("transport timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Other(String),
}

/// The injectable HTTP boundary. Implementations perform exactly one
/// request per call; they must not retry internally, since the engine owns
/// the retry/backoff/rotation loop.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, req: TransportRequest) -> Result<TransportResponse, TransportError>;
}
