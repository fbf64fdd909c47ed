//! JSON boundary: untyped request envelopes in, result/stream envelopes out.
//!
//! Host integrations hand requests over as raw JSON. Deserialization
//! failures never panic and never reach the engines; they come back as a
//! normal failure envelope.

use serde_json::Value;
use tokio::sync::mpsc;

use quill_types::{OperationRequest, OperationResult};

use crate::orchestrator::Orchestrator;
use crate::streaming::{self, StreamEnvelope, StreamEvent};

impl Orchestrator {
    /// Execute one JSON-encoded request and return its result envelope.
    pub async fn handle(&self, request: Value) -> Value {
        let request: OperationRequest = match serde_json::from_value(request) {
            Ok(request) => request,
            Err(e) => return invalid_request(&e),
        };
        let result = self.execute(request).await;
        // OperationResult serialization is infallible: strings and numbers only.
        serde_json::to_value(&result).unwrap_or_else(|_| Value::Null)
    }

    /// Execute one JSON-encoded streaming request. The request's
    /// `requestId` field tags every envelope; one is generated when absent.
    /// Returns the id so the caller can correlate the stream.
    pub async fn handle_stream(&self, request: Value, tx: mpsc::Sender<StreamEnvelope>) -> String {
        let request_id = request
            .get("requestId")
            .and_then(Value::as_str)
            .map_or_else(streaming::new_request_id, str::to_owned);
        let request: OperationRequest = match serde_json::from_value(request) {
            Ok(request) => request,
            Err(e) => {
                let envelope = StreamEnvelope {
                    request_id: request_id.clone(),
                    event: StreamEvent::Error {
                        error: format!("Invalid request: {e}"),
                    },
                };
                let _ = tx.send(envelope).await;
                return request_id;
            }
        };
        self.stream(request, &request_id, tx).await;
        request_id
    }
}

fn invalid_request(e: &serde_json::Error) -> Value {
    let result = OperationResult::failure(format!("Invalid request: {e}"), None, 0);
    serde_json::to_value(&result).unwrap_or_else(|_| Value::Null)
}
