//! The fallback orchestrator: routing, fallback cascade, result assembly.
//!
//! For each request: validate the payload, consult settings and the
//! capability registry, try the specialized engine for the operation kind,
//! and on absence, disablement, or failure fall back to the prompt engine
//! through the session manager and retry controller, parsing the free-text
//! response into the operation's structured shape. The specialized engine
//! always wins the tie-break when enabled and available. Every request
//! reaches exactly one terminal result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use quill_providers::{PromptEngine, SpecializedEngine};
use quill_types::{
    EngineError, EngineKind, ErrorKind, OperationKind, OperationOutput, OperationPayload,
    OperationRequest, OperationResult, ParseTuning, SettingsSource,
};

use crate::capabilities::{CapabilityRegistry, CapabilitySnapshot, DEFAULT_CAPABILITY_TTL};
use crate::metrics::{DEFAULT_METRIC_CAPACITY, DEFAULT_SLOW_THRESHOLD_MS, PerformanceMonitor};
use crate::parse;
use crate::prompts::{self, PromptPlan};
use crate::retry::{RetryController, RetryPolicy};
use crate::session::{DEFAULT_PING_TIMEOUT, DEFAULT_SESSION_TTL, SessionManager};
use crate::usage::{UsageSnapshot, UsageTracker};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_QUOTA_ESTIMATE: u64 = 100;

/// Tuning knobs for the whole engine. Defaults match production behavior;
/// tests shrink the timings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub capability_ttl: Duration,
    pub session_ttl: Duration,
    pub ping_timeout: Duration,
    /// Upper bound on any single engine call.
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
    pub tuning: ParseTuning,
    pub quota_estimate: u64,
    pub metric_capacity: usize,
    pub slow_threshold_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            capability_ttl: DEFAULT_CAPABILITY_TTL,
            session_ttl: DEFAULT_SESSION_TTL,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            retry: RetryPolicy::default(),
            tuning: ParseTuning::default(),
            quota_estimate: DEFAULT_QUOTA_ESTIMATE,
            metric_capacity: DEFAULT_METRIC_CAPACITY,
            slow_threshold_ms: DEFAULT_SLOW_THRESHOLD_MS,
        }
    }
}

pub struct OrchestratorBuilder {
    prompt: Arc<dyn PromptEngine>,
    settings: Arc<dyn SettingsSource>,
    engines: Vec<Arc<dyn SpecializedEngine>>,
    config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    /// Register a specialized engine. A later registration for the same
    /// engine kind replaces the earlier one.
    #[must_use]
    pub fn engine(mut self, engine: Arc<dyn SpecializedEngine>) -> Self {
        self.engines.push(engine);
        self
    }

    #[must_use]
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn build(self) -> Orchestrator {
        let Self {
            prompt,
            settings,
            engines,
            config,
        } = self;
        let specialized: HashMap<EngineKind, Arc<dyn SpecializedEngine>> =
            engines.into_iter().map(|e| (e.kind(), e)).collect();
        let usage = Arc::new(UsageTracker::new(config.quota_estimate));
        Orchestrator {
            registry: CapabilityRegistry::new(
                specialized.clone(),
                Arc::clone(&prompt),
                config.capability_ttl,
            ),
            sessions: SessionManager::new(prompt, config.session_ttl, config.ping_timeout),
            retry: RetryController::new(config.retry.clone(), Arc::clone(&usage)),
            monitor: PerformanceMonitor::new(config.metric_capacity, config.slow_threshold_ms),
            specialized,
            usage,
            settings,
            config,
        }
    }
}

/// Central coordinator owning all orchestration state.
pub struct Orchestrator {
    specialized: HashMap<EngineKind, Arc<dyn SpecializedEngine>>,
    registry: CapabilityRegistry,
    sessions: SessionManager,
    pub(crate) retry: RetryController,
    pub(crate) usage: Arc<UsageTracker>,
    pub(crate) monitor: PerformanceMonitor,
    settings: Arc<dyn SettingsSource>,
    pub(crate) config: OrchestratorConfig,
}

impl Orchestrator {
    #[must_use]
    pub fn builder(
        prompt: Arc<dyn PromptEngine>,
        settings: Arc<dyn SettingsSource>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            prompt,
            settings,
            engines: Vec::new(),
            config: OrchestratorConfig::default(),
        }
    }

    /// Run one operation to exactly one terminal result.
    pub async fn execute(&self, request: OperationRequest) -> OperationResult {
        let started = Instant::now();
        let kind = request.kind();

        if let Err(e) = validate_request(&request) {
            return OperationResult::failure(e.message, None, elapsed_ms(started));
        }

        let settings = self.settings.current();
        if kind == OperationKind::Translate && !settings.translation_enabled {
            return OperationResult::failure("Translation is disabled.", None, elapsed_ms(started));
        }
        if kind == OperationKind::Proofread && !settings.proofread_enabled {
            return OperationResult::failure(
                "Proofreading is disabled.",
                None,
                elapsed_ms(started),
            );
        }

        let capabilities = self
            .registry
            .capabilities(false, settings.experimental_mode)
            .await;
        let engine_kind = kind.specialized_engine();
        let prefer_specialized = match kind {
            OperationKind::Summarize => settings.use_specialized_summarizer,
            OperationKind::Proofread => settings.use_specialized_proofreader,
            _ => true,
        };

        if prefer_specialized
            && capabilities.engine(engine_kind)
            && let Some(engine) = self.specialized.get(&engine_kind)
        {
            let outcome = self
                .retry
                .execute(kind, || self.bounded(engine.invoke(&request)))
                .await;
            match outcome {
                Ok(output) => {
                    self.monitor
                        .record(kind, engine_kind, elapsed_ms(started), true);
                    return OperationResult::success(output, engine_kind, elapsed_ms(started));
                }
                Err(e) => {
                    self.monitor
                        .record(kind, engine_kind, elapsed_ms(started), false);
                    if kind == OperationKind::Translate {
                        // Translation has no fallback cascade by design.
                        return OperationResult::failure(
                            e.message,
                            Some(engine_kind),
                            elapsed_ms(started),
                        );
                    }
                    tracing::warn!(
                        operation = %kind,
                        engine = %engine_kind,
                        error = %e,
                        "specialized engine failed, falling back to prompt engine"
                    );
                }
            }
        }

        if kind == OperationKind::Translate {
            let message = match &request.payload {
                OperationPayload::Translate {
                    source_language,
                    target_language,
                    ..
                } => {
                    let source = if source_language.is_empty() {
                        "auto"
                    } else {
                        source_language
                    };
                    format!("Translation not available for {source} -> {target_language}")
                }
                _ => ErrorKind::Unavailable.user_message().to_string(),
            };
            return OperationResult::failure(message, None, elapsed_ms(started));
        }

        self.execute_fallback(&request, kind, &capabilities, started)
            .await
    }

    async fn execute_fallback(
        &self,
        request: &OperationRequest,
        kind: OperationKind,
        capabilities: &CapabilitySnapshot,
        started: Instant,
    ) -> OperationResult {
        let Some(plan) = prompts::fallback_plan(request, &self.config.tuning) else {
            return OperationResult::failure(
                ErrorKind::Unavailable.user_message(),
                None,
                elapsed_ms(started),
            );
        };
        if !capabilities.engine(EngineKind::Prompt) {
            return OperationResult::failure(
                ErrorKind::Unavailable.user_message(),
                None,
                elapsed_ms(started),
            );
        }

        let raw = match self.retry.execute(kind, || self.prompt_once(&plan)).await {
            Ok(raw) => raw,
            Err(e) => {
                self.monitor
                    .record(kind, EngineKind::Prompt, elapsed_ms(started), false);
                return OperationResult::failure(
                    e.message,
                    Some(EngineKind::Prompt),
                    elapsed_ms(started),
                );
            }
        };

        match parse_output(kind, &raw, &self.config.tuning) {
            Ok(output) => {
                self.monitor
                    .record(kind, EngineKind::Prompt, elapsed_ms(started), true);
                OperationResult::success(output, EngineKind::Prompt, elapsed_ms(started))
            }
            Err(e) => {
                self.monitor
                    .record(kind, EngineKind::Prompt, elapsed_ms(started), false);
                OperationResult::failure(e.message, Some(EngineKind::Prompt), elapsed_ms(started))
            }
        }
    }

    /// One fallback attempt: acquire (or reuse) the session for the plan's
    /// config and run the prompt under the call timeout. A session-kind
    /// failure evicts the cached session so the retry recreates it.
    pub(crate) async fn prompt_once(&self, plan: &PromptPlan) -> Result<String, EngineError> {
        let session = self.sessions.acquire(&plan.config).await?;
        let result = self.bounded(session.prompt(&plan.input)).await;
        if let Err(e) = &result
            && e.kind == ErrorKind::Session
        {
            self.sessions.release(plan.config.key()).await;
        }
        result
    }

    pub(crate) async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::timeout("engine call timed out")),
        }
    }

    pub(crate) fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Current capability snapshot, honoring the cache unless forced.
    pub async fn capabilities(&self, force_refresh: bool) -> CapabilitySnapshot {
        let experimental = self.settings.current().experimental_mode;
        self.registry.capabilities(force_refresh, experimental).await
    }

    /// Entry point for settings-change collaborators.
    pub fn reset_availability_cache(&self) {
        self.registry.invalidate();
    }

    #[must_use]
    pub fn usage_snapshot(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    #[must_use]
    pub fn approaching_quota(&self) -> bool {
        self.usage.approaching_quota()
    }

    pub fn reset_stats(&self) {
        self.usage.reset();
    }

    #[must_use]
    pub fn performance_stats(&self) -> crate::metrics::PerformanceStats {
        self.monitor.stats()
    }

    pub fn clear_metrics(&self) {
        self.monitor.clear();
    }

    /// Tear down all prompt sessions. Called on shutdown/disable; idempotent.
    pub async fn shutdown(&self) {
        self.sessions.destroy_all().await;
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn validate_request(request: &OperationRequest) -> Result<(), EngineError> {
    match &request.payload {
        OperationPayload::Write { task, .. } => {
            if task.trim().is_empty() {
                return Err(EngineError::validation("The writing task must not be empty."));
            }
        }
        OperationPayload::Translate {
            text,
            target_language,
            ..
        } => {
            if text.trim().is_empty() {
                return Err(EngineError::validation("The provided text must not be empty."));
            }
            if target_language.trim().is_empty() {
                return Err(EngineError::validation(
                    "A target language is required for translation.",
                ));
            }
        }
        OperationPayload::Summarize { text }
        | OperationPayload::Rewrite { text, .. }
        | OperationPayload::Proofread { text }
        | OperationPayload::DetectLanguage { text } => {
            if text.trim().is_empty() {
                return Err(EngineError::validation("The provided text must not be empty."));
            }
        }
    }
    Ok(())
}

fn parse_output(
    kind: OperationKind,
    raw: &str,
    tuning: &ParseTuning,
) -> Result<OperationOutput, EngineError> {
    match kind {
        OperationKind::Summarize => parse::parse_summary(raw, tuning).map(OperationOutput::Summary),
        OperationKind::Write | OperationKind::Rewrite => {
            parse::parse_plain_text(raw).map(OperationOutput::Text)
        }
        OperationKind::Proofread => parse::parse_proofread(raw).map(OperationOutput::Proofread),
        OperationKind::DetectLanguage => parse::parse_language(raw).map(OperationOutput::Language),
        // No fallback parse exists for translation; the cascade never gets here.
        OperationKind::Translate => Err(EngineError::unavailable(
            ErrorKind::Unavailable.user_message(),
        )),
    }
}
