//! Prompt-session lifecycle: creation, reuse, expiry, teardown.
//!
//! Sessions are keyed by their configuration (instruction text +
//! temperature). The outer map lock only shuffles pointers; the per-key async
//! lock is held across probe and creation, which is the at-most-one-creation
//! marker: a second same-key acquirer awaits the first and reuses its result
//! instead of creating a duplicate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

use quill_providers::{PromptConfig, PromptEngine, PromptSession, SessionKey};
use quill_types::{EngineError, ErrorKind};

pub(crate) const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(300);
pub(crate) const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(2);

struct CachedSession {
    handle: Arc<dyn PromptSession>,
    created_at: Instant,
}

type Slot = Arc<AsyncMutex<Option<CachedSession>>>;

/// Owns every general-purpose engine session in the process.
pub struct SessionManager {
    engine: Arc<dyn PromptEngine>,
    ttl: Duration,
    ping_timeout: Duration,
    slots: StdMutex<HashMap<SessionKey, Slot>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(engine: Arc<dyn PromptEngine>, ttl: Duration, ping_timeout: Duration) -> Self {
        Self {
            engine,
            ttl,
            ping_timeout,
            slots: StdMutex::new(HashMap::new()),
        }
    }

    /// A live session for `config`: the cached one when it is young and
    /// answers a liveness ping, otherwise a fresh one after tearing the old
    /// one down exactly once. Creation failures surface as `Unavailable`.
    pub async fn acquire(
        &self,
        config: &PromptConfig,
    ) -> Result<Arc<dyn PromptSession>, EngineError> {
        let key = config.key();
        let slot = self.slot(key);
        let mut guard = slot.lock().await;

        if let Some(cached) = guard.as_ref() {
            if cached.created_at.elapsed() <= self.ttl {
                let ping = tokio::time::timeout(self.ping_timeout, cached.handle.ping()).await;
                if matches!(ping, Ok(Ok(()))) {
                    return Ok(Arc::clone(&cached.handle));
                }
                tracing::debug!(%key, "session liveness probe failed, recreating");
            } else {
                tracing::debug!(%key, "session exceeded TTL, recreating");
            }
            if let Some(dead) = guard.take() {
                dead.handle.close().await;
            }
        }

        let handle: Arc<dyn PromptSession> = match self.engine.create_session(config).await {
            Ok(session) => Arc::from(session),
            Err(e) => {
                tracing::warn!(%key, error = %e, "session creation failed");
                return Err(EngineError::new(ErrorKind::Unavailable, e.message));
            }
        };
        *guard = Some(CachedSession {
            handle: Arc::clone(&handle),
            created_at: Instant::now(),
        });
        Ok(handle)
    }

    /// Drop and close the session for `key`, if one exists.
    pub async fn release(&self, key: SessionKey) {
        let slot = {
            let mut slots = self.slots.lock().expect("session map poisoned");
            slots.remove(&key)
        };
        if let Some(slot) = slot
            && let Some(cached) = slot.lock().await.take()
        {
            cached.handle.close().await;
            tracing::debug!(%key, "released session");
        }
    }

    /// Close every session. Idempotent: a second call finds an empty map and
    /// does nothing.
    pub async fn destroy_all(&self) {
        let slots: Vec<Slot> = {
            let mut map = self.slots.lock().expect("session map poisoned");
            map.drain().map(|(_, slot)| slot).collect()
        };
        for slot in slots {
            if let Some(cached) = slot.lock().await.take() {
                cached.handle.close().await;
            }
        }
    }

    /// Number of cached slots, for telemetry.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.lock().expect("session map poisoned").len()
    }

    fn slot(&self, key: SessionKey) -> Slot {
        let mut slots = self.slots.lock().expect("session map poisoned");
        Arc::clone(slots.entry(key).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mocks::MockPromptEngine;

    fn manager(prompt: &Arc<MockPromptEngine>) -> SessionManager {
        SessionManager::new(
            Arc::clone(prompt) as Arc<dyn PromptEngine>,
            DEFAULT_SESSION_TTL,
            DEFAULT_PING_TIMEOUT,
        )
    }

    fn config() -> PromptConfig {
        PromptConfig::new("fix grammar", 0.2)
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_acquires_share_one_session() {
        let prompt = Arc::new(MockPromptEngine::new());
        let sessions = manager(&prompt);

        let a = sessions.acquire(&config()).await.unwrap();
        let b = sessions.acquire(&config()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(prompt.created(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_configs_get_distinct_sessions() {
        let prompt = Arc::new(MockPromptEngine::new());
        let sessions = manager(&prompt);

        let a = sessions.acquire(&config()).await.unwrap();
        let b = sessions
            .acquire(&PromptConfig::new("fix grammar", 0.8))
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(prompt.created(), 2);
        assert_eq!(sessions.slot_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_session_is_torn_down_exactly_once() {
        let prompt = Arc::new(MockPromptEngine::new());
        let sessions = manager(&prompt);

        let a = sessions.acquire(&config()).await.unwrap();
        tokio::time::advance(DEFAULT_SESSION_TTL + Duration::from_secs(1)).await;
        let b = sessions.acquire(&config()).await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(prompt.created(), 2);
        assert_eq!(prompt.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ping_triggers_recreation() {
        let prompt = Arc::new(MockPromptEngine::new());
        let sessions = manager(&prompt);

        let a = sessions.acquire(&config()).await.unwrap();
        prompt.fail_pings(true);
        let b = sessions.acquire(&config()).await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(prompt.created(), 2);
        assert_eq!(prompt.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquires_create_at_most_one_session() {
        let prompt = Arc::new(MockPromptEngine::new().with_create_delay(Duration::from_millis(50)));
        let sessions = manager(&prompt);

        let cfg = config();
        let (a, b) = tokio::join!(sessions.acquire(&cfg), sessions.acquire(&cfg));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(prompt.created(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn creation_failure_surfaces_as_unavailable() {
        let prompt = Arc::new(MockPromptEngine::new());
        prompt.fail_creation(true);
        let sessions = manager(&prompt);

        let err = sessions.acquire(&config()).await.err().unwrap();
        assert_eq!(err.kind, ErrorKind::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_all_is_idempotent() {
        let prompt = Arc::new(MockPromptEngine::new());
        let sessions = manager(&prompt);

        sessions.acquire(&config()).await.unwrap();
        sessions.destroy_all().await;
        sessions.destroy_all().await;
        assert_eq!(prompt.closed(), 1);
        assert_eq!(sessions.slot_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn release_closes_and_forgets_the_session() {
        let prompt = Arc::new(MockPromptEngine::new());
        let sessions = manager(&prompt);

        let cfg = config();
        sessions.acquire(&cfg).await.unwrap();
        sessions.release(cfg.key()).await;
        assert_eq!(prompt.closed(), 1);

        sessions.acquire(&cfg).await.unwrap();
        assert_eq!(prompt.created(), 2);
    }
}
