//! Engine backends for Quill.
//!
//! # Architecture
//!
//! The orchestrator talks to engines through two narrow trait seams:
//!
//! - [`SpecializedEngine`] - a purpose-built, single-task capability
//!   (summarizer, proofreader, ...) that returns already-structured output.
//!   A device carries zero or more of these.
//! - [`PromptEngine`] / [`PromptSession`] - the general-purpose
//!   instruction-following engine used as the universal fallback. Sessions
//!   are stateful handles keyed by [`PromptConfig`]; the session lifecycle
//!   manager in `quill-engine` owns their reuse and teardown.
//!
//! All trait methods return [`BoxFuture`] so backends stay object-safe and
//! can be swapped for scripted fakes in tests.
//!
//! # Shipped backend
//!
//! [`llama::LlamaServerEngine`] implements [`PromptEngine`] against a local
//! llama.cpp `llama-server` instance: `GET /health` for availability probes
//! and liveness pings, `POST /completion` for one-shot prompts, and the same
//! endpoint with `stream:true` for SSE-delivered incremental generation.
//!
//! # Error Handling
//!
//! Backends never retry. Every failure is mapped to a classified
//! [`EngineError`] (timeouts to `Timeout`, unreachable or loading servers to
//! `Unavailable`, HTTP 429 to `RateLimit`) and the single retry authority in
//! the orchestrator decides what is worth another attempt.

pub mod llama;

use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

pub use futures_util::future::BoxFuture;
use quill_types::{EngineError, EngineKind, OperationOutput, OperationRequest};

/// Deterministic identity of a prompt-session configuration.
///
/// Derived only from the instruction text and sampling temperature, so two
/// requests that want the same framing share one session. SHA-256 based so
/// the key is stable across processes, unlike the seeded std hasher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey([u8; 8]);

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Configuration of a general-purpose engine session: the fixed "system"
/// framing for one operation kind plus its sampling temperature.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptConfig {
    pub instructions: String,
    pub temperature: f32,
}

impl PromptConfig {
    #[must_use]
    pub fn new(instructions: impl Into<String>, temperature: f32) -> Self {
        Self {
            instructions: instructions.into(),
            temperature,
        }
    }

    #[must_use]
    pub fn key(&self) -> SessionKey {
        let mut hasher = Sha256::new();
        hasher.update(self.instructions.as_bytes());
        hasher.update(self.temperature.to_bits().to_le_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; 8];
        key.copy_from_slice(&digest[..8]);
        SessionKey(key)
    }
}

/// A purpose-built single-task engine.
///
/// `is_available` is a probe, not a guarantee: the engine may still fail at
/// `invoke` time, in which case the orchestrator falls back. Probe errors are
/// absorbed into `false` by the implementation.
pub trait SpecializedEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    fn is_available(&self) -> BoxFuture<'_, bool>;

    fn invoke<'a>(
        &'a self,
        request: &'a OperationRequest,
    ) -> BoxFuture<'a, Result<OperationOutput, EngineError>>;
}

/// The general-purpose instruction-following engine.
pub trait PromptEngine: Send + Sync {
    fn is_available(&self) -> BoxFuture<'_, bool>;

    /// Create a fresh session for `config`. Callers go through the session
    /// lifecycle manager rather than calling this directly, so that session
    /// reuse and the at-most-one-creation-per-key invariant hold.
    fn create_session<'a>(
        &'a self,
        config: &'a PromptConfig,
    ) -> BoxFuture<'a, Result<Box<dyn PromptSession>, EngineError>>;
}

/// A stateful handle to a general-purpose engine context.
pub trait PromptSession: Send + Sync {
    /// One-shot prompt returning the full response text.
    fn prompt<'a>(&'a self, input: &'a str) -> BoxFuture<'a, Result<String, EngineError>>;

    /// Incremental prompt. Fragments are sent on `chunks` in arrival order;
    /// the future resolves with the aggregated full text. A dropped receiver
    /// stops delivery but not generation or aggregation.
    fn prompt_streaming<'a>(
        &'a self,
        input: &'a str,
        chunks: mpsc::Sender<String>,
    ) -> BoxFuture<'a, Result<String, EngineError>>;

    /// Cheap liveness probe used before reuse.
    fn ping(&self) -> BoxFuture<'_, Result<(), EngineError>>;

    /// Release backend resources. Must be idempotent.
    fn close(&self) -> BoxFuture<'_, ()>;
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;
const MAX_SSE_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// Hardened HTTP client for local engine servers: bounded connect, no
/// redirects. Plain HTTP is accepted because the peer is loopback.
pub(crate) fn build_http_client() -> Result<reqwest::Client, EngineError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| EngineError::classified(format!("failed to build HTTP client: {e}")))
}

/// Read an error body without letting a hostile server feed us forever.
pub(crate) async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// Pop the next complete SSE event off the front of `buffer`, handling both
/// LF and CRLF delimiters, whichever occurs first.
pub(crate) fn next_sse_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| (p, 4));
    let (pos, delim) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    let event = buffer[..pos].to_vec();
    buffer.drain(..pos + delim);
    Some(event)
}

/// Concatenate the `data:` lines of one SSE event.
pub(crate) fn sse_event_data(event: &str) -> Option<String> {
    let mut data = String::new();
    let mut found = false;
    for line in event.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(rest) = line.strip_prefix("data:") {
            if found {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
            found = true;
        }
    }
    found.then_some(data)
}
