//! Capability orchestration and fallback core for Quill.
//!
//! For each logical text operation the [`Orchestrator`] discovers which
//! specialized engines are usable (capability registry), routes the request
//! to the best one, and falls back to the general-purpose prompt engine with
//! deterministic task instructions when a specialized engine is missing,
//! disabled, or failing. Transient failures are retried with a fixed backoff
//! ladder, prompt sessions are cached and recycled by configuration key, long
//! generations can stream incrementally, and every completed attempt lands in
//! a bounded performance history.
//!
//! State is owned, not ambient: the registry, session map, usage counters,
//! and metric ring are constructed with the orchestrator and mutated only
//! through their narrow APIs, which keeps tests hermetic with fresh instances
//! per case. Mutations never span an await point.

pub mod api;
pub mod capabilities;
pub mod metrics;
pub mod orchestrator;
pub mod parse;
pub mod prompts;
pub mod retry;
pub mod session;
pub mod streaming;
pub mod usage;


pub use capabilities::{CapabilityRegistry, CapabilitySnapshot};
pub use metrics::{PerformanceMonitor, PerformanceStats};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, OrchestratorConfig};
pub use retry::RetryPolicy;
pub use session::SessionManager;
pub use streaming::{StreamEnvelope, StreamEvent, new_request_id};
pub use usage::{UsageSnapshot, UsageTracker};
