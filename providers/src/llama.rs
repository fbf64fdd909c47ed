//! Prompt engine backed by a local llama.cpp `llama-server`.
//!
//! The server is stateless across requests, so a "session" here is a client
//! side handle carrying its [`PromptConfig`]; the instruction framing is
//! resent with every completion. Availability probes and liveness pings both
//! use `GET /health`, which llama-server answers with 200 once the model is
//! loaded and 503 while it is still loading.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use quill_types::{EngineError, ErrorKind};

use crate::{
    BoxFuture, MAX_SSE_BUFFER_BYTES, PromptConfig, PromptEngine, PromptSession, build_http_client,
    next_sse_event, read_capped_error_body, sse_event_data,
};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_MAX_TOKENS: u32 = 512;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    temperature: f32,
    n_predict: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    #[serde(default)]
    content: String,
    #[serde(default)]
    stop: bool,
}

/// General-purpose prompt engine speaking the llama-server HTTP API.
#[derive(Debug, Clone)]
pub struct LlamaServerEngine {
    base_url: String,
    client: reqwest::Client,
    request_timeout: Duration,
    max_tokens: u32,
}

impl LlamaServerEngine {
    pub fn new(base_url: impl Into<String>) -> Result<Self, EngineError> {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self {
            base_url,
            client: build_http_client()?,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    pub fn local() -> Result<Self, EngineError> {
        Self::new(DEFAULT_BASE_URL)
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    async fn health(&self) -> Result<(), EngineError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error(&self.base_url, &e))?;
        match response.status().as_u16() {
            200 => Ok(()),
            503 => Err(EngineError::unavailable(
                "llama server is still loading the model",
            )),
            status => Err(EngineError::classified(format!(
                "llama server health check failed with HTTP {status}"
            ))),
        }
    }
}

fn transport_error(base_url: &str, error: &reqwest::Error) -> EngineError {
    if error.is_timeout() {
        EngineError::timeout(format!("llama server request timed out ({base_url})"))
    } else if error.is_connect() {
        EngineError::unavailable(format!("llama server unreachable at {base_url}"))
    } else {
        EngineError::classified(format!("llama server request failed: {error}"))
    }
}

async fn status_error(response: reqwest::Response) -> EngineError {
    let status = response.status().as_u16();
    let body = read_capped_error_body(response).await;
    match status {
        429 => EngineError::new(
            ErrorKind::RateLimit,
            format!("llama server rate limited the request: {body}"),
        ),
        503 => EngineError::unavailable("llama server is still loading the model"),
        _ => EngineError::classified(format!("llama server error {status}: {body}")),
    }
}

impl PromptEngine for LlamaServerEngine {
    fn is_available(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match self.health().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(error = %e, "llama server availability probe failed");
                    false
                }
            }
        })
    }

    fn create_session<'a>(
        &'a self,
        config: &'a PromptConfig,
    ) -> BoxFuture<'a, Result<Box<dyn PromptSession>, EngineError>> {
        Box::pin(async move {
            self.health().await?;
            let session: Box<dyn PromptSession> = Box::new(LlamaSession {
                engine: self.clone(),
                config: config.clone(),
            });
            Ok(session)
        })
    }
}

struct LlamaSession {
    engine: LlamaServerEngine,
    config: PromptConfig,
}

impl LlamaSession {
    fn framed_prompt(&self, input: &str) -> String {
        format!("{}\n\n{}", self.config.instructions, input)
    }

    async fn completion(&self, input: &str, stream: bool) -> Result<reqwest::Response, EngineError> {
        let prompt = self.framed_prompt(input);
        let body = CompletionRequest {
            prompt: &prompt,
            temperature: self.config.temperature,
            n_predict: self.engine.max_tokens,
            stream,
        };
        let mut request = self
            .engine
            .client
            .post(format!("{}/completion", self.engine.base_url))
            .json(&body);
        // Streaming reads are bounded per chunk instead; a whole-body timeout
        // would cut long generations short.
        if !stream {
            request = request.timeout(self.engine.request_timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&self.engine.base_url, &e))?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(response)
    }
}

impl PromptSession for LlamaSession {
    fn prompt<'a>(&'a self, input: &'a str) -> BoxFuture<'a, Result<String, EngineError>> {
        Box::pin(async move {
            let response = self.completion(input, false).await?;
            let body: CompletionResponse = response
                .json()
                .await
                .map_err(|e| EngineError::classified(format!("invalid completion payload: {e}")))?;
            Ok(body.content)
        })
    }

    fn prompt_streaming<'a>(
        &'a self,
        input: &'a str,
        chunks: mpsc::Sender<String>,
    ) -> BoxFuture<'a, Result<String, EngineError>> {
        Box::pin(async move {
            use futures_util::StreamExt;

            let response = self.completion(input, true).await?;
            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut aggregated = String::new();
            let mut delivering = true;

            loop {
                let next = tokio::time::timeout(self.engine.request_timeout, stream.next())
                    .await
                    .map_err(|_| EngineError::timeout("llama server stream idle timeout"))?;
                let Some(chunk) = next else { break };
                let chunk =
                    chunk.map_err(|e| transport_error(&self.engine.base_url, &e))?;
                buffer.extend_from_slice(&chunk);
                if buffer.len() > MAX_SSE_BUFFER_BYTES {
                    return Err(EngineError::classified(
                        "llama server stream buffer exceeded maximum size",
                    ));
                }

                while let Some(event) = next_sse_event(&mut buffer) {
                    let Ok(event) = std::str::from_utf8(&event) else {
                        return Err(EngineError::classified(
                            "llama server stream produced invalid UTF-8",
                        ));
                    };
                    let Some(data) = sse_event_data(event) else {
                        continue;
                    };
                    if data == "[DONE]" {
                        return Ok(aggregated);
                    }
                    let payload: StreamPayload = serde_json::from_str(&data).map_err(|e| {
                        EngineError::classified(format!("invalid stream payload: {e}"))
                    })?;
                    if !payload.content.is_empty() {
                        aggregated.push_str(&payload.content);
                        if delivering && chunks.send(payload.content).await.is_err() {
                            // Consumer is gone; keep aggregating silently.
                            delivering = false;
                        }
                    }
                    if payload.stop {
                        return Ok(aggregated);
                    }
                }
            }

            Ok(aggregated)
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(self.engine.health())
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            // No server-side state to release; the session is a client handle.
            tracing::debug!(key = %self.config.key(), "closed llama session");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::ErrorKind;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> PromptConfig {
        PromptConfig::new("Fix grammar, preserve meaning.", 0.2)
    }

    async fn mount_health(server: &MockServer, status: u16) {
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn availability_follows_health_endpoint() {
        let server = MockServer::start().await;
        mount_health(&server, 200).await;
        let engine = LlamaServerEngine::new(server.uri()).unwrap();
        assert!(engine.is_available().await);
    }

    #[tokio::test]
    async fn loading_server_reports_unavailable() {
        let server = MockServer::start().await;
        mount_health(&server, 503).await;
        let engine = LlamaServerEngine::new(server.uri()).unwrap();
        assert!(!engine.is_available().await);

        let err = engine.create_session(&config()).await.err().unwrap();
        assert_eq!(err.kind, ErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn unreachable_server_maps_to_unavailable() {
        let engine = LlamaServerEngine::new("http://127.0.0.1:9").unwrap();
        assert!(!engine.is_available().await);
        let err = engine.create_session(&config()).await.err().unwrap();
        assert_eq!(err.kind, ErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn prompt_sends_instructions_and_returns_content() {
        let server = MockServer::start().await;
        mount_health(&server, 200).await;
        Mock::given(method("POST"))
            .and(path("/completion"))
            .and(body_string_contains("Fix grammar, preserve meaning."))
            .and(body_string_contains("teh quick fox"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "content": "the quick fox" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let engine = LlamaServerEngine::new(server.uri()).unwrap();
        let session = engine.create_session(&config()).await.unwrap();
        let out = session.prompt("teh quick fox").await.unwrap();
        assert_eq!(out, "the quick fox");
    }

    #[tokio::test]
    async fn http_429_maps_to_rate_limit() {
        let server = MockServer::start().await;
        mount_health(&server, 200).await;
        Mock::given(method("POST"))
            .and(path("/completion"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let engine = LlamaServerEngine::new(server.uri()).unwrap();
        let session = engine.create_session(&config()).await.unwrap();
        let err = session.prompt("hi").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimit);
    }

    #[tokio::test]
    async fn streaming_delivers_chunks_in_order_and_aggregates() {
        let server = MockServer::start().await;
        mount_health(&server, 200).await;
        let sse = "data: {\"content\":\"Hel\",\"stop\":false}\n\n\
                   data: {\"content\":\"lo \",\"stop\":false}\n\n\
                   data: {\"content\":\"world\",\"stop\":true}\n\n";
        Mock::given(method("POST"))
            .and(path("/completion"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse.as_bytes(), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let engine = LlamaServerEngine::new(server.uri()).unwrap();
        let session = engine.create_session(&config()).await.unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let aggregated = session.prompt_streaming("say hello", tx).await.unwrap();
        assert_eq!(aggregated, "Hello world");

        let mut received = Vec::new();
        while let Some(chunk) = rx.recv().await {
            received.push(chunk);
        }
        assert_eq!(received, ["Hel", "lo ", "world"]);
    }

    #[tokio::test]
    async fn streaming_survives_dropped_receiver() {
        let server = MockServer::start().await;
        mount_health(&server, 200).await;
        let sse = "data: {\"content\":\"a\",\"stop\":false}\n\n\
                   data: {\"content\":\"b\",\"stop\":true}\n\n";
        Mock::given(method("POST"))
            .and(path("/completion"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse.as_bytes(), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let engine = LlamaServerEngine::new(server.uri()).unwrap();
        let session = engine.create_session(&config()).await.unwrap();
        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let aggregated = session.prompt_streaming("go", tx).await.unwrap();
        assert_eq!(aggregated, "ab");
    }
}
