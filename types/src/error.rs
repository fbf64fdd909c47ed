//! Error taxonomy and the message classifier.
//!
//! Every failure that crosses a component boundary is an [`EngineError`] with
//! a fixed [`ErrorKind`]. Transient kinds (rate-limit, timeout, session) are
//! retried by the retry controller; permanent kinds surface immediately.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Quota or rate pressure. Transient.
    RateLimit,
    /// A bounded call exceeded its deadline. Transient.
    Timeout,
    /// A stateful session broke underneath us. Transient via recreation.
    Session,
    /// The engine is missing or disabled for this attempt. Permanent.
    Unavailable,
    /// Bad caller input, or output that could not be recovered. Permanent.
    Validation,
    /// Anything else. Treated as permanent unless proven otherwise.
    Unknown,
}

impl ErrorKind {
    /// Classify a raw failure message into an error kind.
    ///
    /// Total and deterministic: identical input always yields the same kind,
    /// and no input panics. Matching is by a fixed lowercase vocabulary.
    /// `Validation` is assigned structurally by callers, never from text.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("rate") || lower.contains("quota") || lower.contains("429") {
            Self::RateLimit
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else if lower.contains("session")
            || lower.contains("expired")
            || lower.contains("closed")
            || lower.contains("not found")
        {
            Self::Session
        } else if lower.contains("not available") || lower.contains("unavailable") {
            Self::Unavailable
        } else {
            Self::Unknown
        }
    }

    /// Transient kinds are retried locally; everything else surfaces at once.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::RateLimit | Self::Timeout | Self::Session)
    }

    /// Stable, user-presentable message for a final failure of this kind.
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::RateLimit => "The AI service is temporarily busy. Please try again in a moment.",
            Self::Timeout => "The request timed out. Please try again.",
            Self::Session => "The AI session was interrupted. Please try again.",
            Self::Unavailable => "This AI capability is not available on this device.",
            Self::Validation => "The request could not be processed.",
            Self::Unknown => "Something went wrong. Please try again.",
        }
    }
}

/// A classified failure carrying a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error whose kind is derived from the message itself.
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ErrorKind::classify(&message),
            message,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// The stable message shown to end users for this kind of failure.
    #[must_use]
    pub fn user_facing(&self) -> Self {
        Self::new(self.kind, self.kind.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineError, ErrorKind};

    #[test]
    fn classifies_rate_limit_vocabulary() {
        assert_eq!(ErrorKind::classify("Rate limit exceeded"), ErrorKind::RateLimit);
        assert_eq!(ErrorKind::classify("quota exhausted"), ErrorKind::RateLimit);
        assert_eq!(ErrorKind::classify("HTTP 429"), ErrorKind::RateLimit);
    }

    #[test]
    fn classifies_timeout_vocabulary() {
        assert_eq!(ErrorKind::classify("request timeout"), ErrorKind::Timeout);
        assert_eq!(ErrorKind::classify("the call timed out"), ErrorKind::Timeout);
    }

    #[test]
    fn classifies_session_vocabulary() {
        assert_eq!(ErrorKind::classify("session destroyed"), ErrorKind::Session);
        assert_eq!(ErrorKind::classify("context expired"), ErrorKind::Session);
        assert_eq!(ErrorKind::classify("stream closed"), ErrorKind::Session);
        assert_eq!(ErrorKind::classify("model not found"), ErrorKind::Session);
    }

    #[test]
    fn classifies_unavailable_vocabulary() {
        assert_eq!(
            ErrorKind::classify("summarizer not available"),
            ErrorKind::Unavailable
        );
        assert_eq!(ErrorKind::classify("engine unavailable"), ErrorKind::Unavailable);
    }

    #[test]
    fn unmatched_messages_are_unknown() {
        assert_eq!(ErrorKind::classify("something odd happened"), ErrorKind::Unknown);
        assert_eq!(ErrorKind::classify(""), ErrorKind::Unknown);
    }

    #[test]
    fn classification_is_deterministic() {
        for msg in ["rate", "timeout", "session", "unavailable", "???"] {
            assert_eq!(ErrorKind::classify(msg), ErrorKind::classify(msg));
        }
    }

    #[test]
    fn only_rate_limit_timeout_session_are_transient() {
        assert!(ErrorKind::RateLimit.is_transient());
        assert!(ErrorKind::Timeout.is_transient());
        assert!(ErrorKind::Session.is_transient());
        assert!(!ErrorKind::Unavailable.is_transient());
        assert!(!ErrorKind::Validation.is_transient());
        assert!(!ErrorKind::Unknown.is_transient());
    }

    #[test]
    fn user_facing_replaces_message_and_keeps_kind() {
        let raw = EngineError::classified("HTTP 429: too many requests");
        let shown = raw.user_facing();
        assert_eq!(shown.kind, ErrorKind::RateLimit);
        assert!(!shown.message.contains("429"));
    }
}
