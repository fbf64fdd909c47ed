//! Engine availability detection with a TTL cache.
//!
//! Probes every engine independently on a cache miss; one failing probe never
//! hides the others, it just marks that engine unavailable. No retries at
//! this layer: a transient probe failure reads as "unavailable now" and is
//! re-checked on the next non-cached call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{BoxFuture, join_all};
use tokio::time::Instant;

use quill_providers::{PromptEngine, SpecializedEngine};
use quill_types::{EngineKind, OperationKind};

pub(crate) const DEFAULT_CAPABILITY_TTL: Duration = Duration::from_secs(30);

/// Point-in-time availability of every engine kind.
#[derive(Debug, Clone)]
pub struct CapabilitySnapshot {
    available: HashMap<EngineKind, bool>,
    pub experimental: bool,
    pub checked_at: Instant,
    pub ttl: Duration,
}

impl CapabilitySnapshot {
    #[must_use]
    pub fn engine(&self, kind: EngineKind) -> bool {
        self.available.get(&kind).copied().unwrap_or(false)
    }

    /// Whether the purpose-built engine for `kind` is usable right now.
    #[must_use]
    pub fn supports(&self, kind: OperationKind) -> bool {
        self.engine(kind.specialized_engine())
    }

    /// A snapshot older than its TTL must be re-derived before being trusted.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.checked_at.elapsed() > self.ttl
    }
}

/// Detects and caches which engines are usable.
pub struct CapabilityRegistry {
    specialized: HashMap<EngineKind, Arc<dyn SpecializedEngine>>,
    prompt: Arc<dyn PromptEngine>,
    ttl: Duration,
    cache: Mutex<Option<CapabilitySnapshot>>,
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new(
        specialized: HashMap<EngineKind, Arc<dyn SpecializedEngine>>,
        prompt: Arc<dyn PromptEngine>,
        ttl: Duration,
    ) -> Self {
        Self {
            specialized,
            prompt,
            ttl,
            cache: Mutex::new(None),
        }
    }

    /// Current capabilities, served from cache unless stale, the experimental
    /// flag changed, or the caller forces a refresh.
    pub async fn capabilities(
        &self,
        force_refresh: bool,
        experimental: bool,
    ) -> CapabilitySnapshot {
        if !force_refresh
            && let Some(cached) = self.cached()
            && !cached.is_stale()
            && cached.experimental == experimental
        {
            return cached;
        }

        let mut probes: Vec<BoxFuture<'_, (EngineKind, bool)>> = Vec::new();
        for kind in EngineKind::ALL {
            if kind.is_experimental() && !experimental {
                // Beta engines stay hidden without the experimental flag.
                probes.push(Box::pin(async move { (kind, false) }));
                continue;
            }
            match kind {
                EngineKind::Prompt => {
                    probes.push(Box::pin(async move {
                        (kind, self.prompt.is_available().await)
                    }));
                }
                _ => match self.specialized.get(&kind) {
                    Some(engine) => {
                        probes.push(Box::pin(async move { (kind, engine.is_available().await) }));
                    }
                    None => probes.push(Box::pin(async move { (kind, false) })),
                },
            }
        }

        let available: HashMap<EngineKind, bool> = join_all(probes).await.into_iter().collect();
        let snapshot = CapabilitySnapshot {
            available,
            experimental,
            checked_at: Instant::now(),
            ttl: self.ttl,
        };
        tracing::debug!(
            summarizer = snapshot.engine(EngineKind::Summarizer),
            translator = snapshot.engine(EngineKind::Translator),
            prompt = snapshot.engine(EngineKind::Prompt),
            experimental,
            "refreshed capability snapshot"
        );
        *self.cache.lock().expect("capability cache poisoned") = Some(snapshot.clone());
        snapshot
    }

    /// Drop the cached snapshot so the next query re-probes.
    pub fn invalidate(&self) {
        *self.cache.lock().expect("capability cache poisoned") = None;
    }

    fn cached(&self) -> Option<CapabilitySnapshot> {
        self.cache
            .lock()
            .expect("capability cache poisoned")
            .clone()
    }
}
