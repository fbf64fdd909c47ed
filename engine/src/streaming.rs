//! Streaming coordination for long-form generation.
//!
//! Streaming goes straight to the prompt engine; specialized engines only
//! serve the non-streaming path. Session acquisition is retried, but the
//! generation itself runs exactly once so the consumer never sees a chunk
//! twice. Every stream ends with exactly one terminal event.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use quill_types::{EngineError, EngineKind, ErrorKind, OperationRequest};

use crate::orchestrator::Orchestrator;
use crate::parse;
use crate::prompts;

const CHUNK_CHANNEL_CAPACITY: usize = 32;

/// One event on a response stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEvent {
    /// An incremental fragment of the generated text.
    Chunk { data: String },
    /// Terminal: the full cleaned text.
    Complete { data: String },
    /// Terminal: the stream failed.
    Error { error: String },
}

/// A stream event tied to the request it belongs to, so a single channel
/// can multiplex concurrent streams.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEnvelope {
    pub request_id: String,
    #[serde(flatten)]
    pub event: StreamEvent,
}

impl StreamEnvelope {
    fn new(request_id: &str, event: StreamEvent) -> Self {
        Self {
            request_id: request_id.to_owned(),
            event,
        }
    }
}

#[must_use]
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

impl Orchestrator {
    /// Stream one generation, delivering envelopes tagged with `request_id`
    /// on `tx`. A dropped receiver aborts delivery without surfacing an
    /// error; the generation is still left to finish.
    pub async fn stream(
        &self,
        request: OperationRequest,
        request_id: &str,
        tx: mpsc::Sender<StreamEnvelope>,
    ) {
        let started = Instant::now();
        let kind = request.kind();
        match self.stream_inner(&request, &tx, request_id).await {
            Ok(text) => {
                self.usage.record_success(kind);
                self.monitor.record(
                    kind,
                    EngineKind::Prompt,
                    started.elapsed().as_millis() as u64,
                    true,
                );
                let event = StreamEvent::Complete { data: text };
                let _ = tx.send(StreamEnvelope::new(request_id, event)).await;
            }
            Err(e) => {
                self.monitor.record(
                    kind,
                    EngineKind::Prompt,
                    started.elapsed().as_millis() as u64,
                    false,
                );
                tracing::warn!(operation = %kind, request_id, error = %e, "stream failed");
                let event = StreamEvent::Error { error: e.message };
                let _ = tx.send(StreamEnvelope::new(request_id, event)).await;
            }
        }
    }

    async fn stream_inner(
        &self,
        request: &OperationRequest,
        tx: &mpsc::Sender<StreamEnvelope>,
        request_id: &str,
    ) -> Result<String, EngineError> {
        let kind = request.kind();
        if !kind.supports_streaming() {
            return Err(EngineError::validation(format!(
                "The {kind} operation does not support streaming."
            )));
        }
        let plan = prompts::fallback_plan(request, &self.config.tuning).ok_or_else(|| {
            EngineError::unavailable(ErrorKind::Unavailable.user_message())
        })?;
        if plan.input.trim().is_empty() {
            return Err(EngineError::validation("The provided text must not be empty."));
        }

        // Only acquisition is retried. Re-running a generation after chunks
        // have already been delivered would duplicate output.
        let session = self
            .retry
            .execute_unrecorded(kind, || self.sessions().acquire(&plan.config))
            .await?;

        let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(CHUNK_CHANNEL_CAPACITY);
        // No whole-call deadline here: a healthy generation may legitimately
        // outlast the single-call budget. Stalls are policed by the backend's
        // per-chunk idle timeout instead.
        let generation = session.prompt_streaming(&plan.input, chunk_tx);

        let forward = async {
            let mut delivering = true;
            while let Some(data) = chunk_rx.recv().await {
                if delivering {
                    let envelope = StreamEnvelope::new(request_id, StreamEvent::Chunk { data });
                    if tx.send(envelope).await.is_err() {
                        delivering = false;
                    }
                }
            }
        };

        let (outcome, ()) = tokio::join!(generation, forward);
        let raw = outcome?;
        parse::parse_plain_text(&raw)
    }
}
