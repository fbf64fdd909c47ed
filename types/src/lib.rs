//! Core domain types for Quill.
//!
//! This crate contains pure domain types with no IO, no async, and minimal
//! dependencies. Everything here can be used from any layer of the engine:
//! operation requests and results, engine kinds, the error taxonomy with its
//! message classifier, host settings, and parse-tuning constants.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod error;
mod operation;
mod settings;
mod tuning;

pub use error::{EngineError, ErrorKind};
pub use operation::{
    Correction, DetectedLanguage, OperationKind, OperationOutput, OperationPayload,
    OperationRequest, OperationResult, OutputFormat, ProofreadOutcome, Tone, TranslationOutcome,
};
pub use settings::{Settings, SettingsSource};
pub use tuning::ParseTuning;

use serde::{Deserialize, Serialize};

/// The closed set of AI engines a device may carry.
///
/// Six specialized single-task engines plus the general-purpose prompting
/// engine used as the universal fallback. The set is closed by design: the
/// orchestrator switches on this tag, never on engine subtyping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    Summarizer,
    Writer,
    Rewriter,
    Proofreader,
    Translator,
    LanguageDetector,
    /// The general-purpose instruction-following engine.
    Prompt,
}

impl EngineKind {
    pub const ALL: [Self; 7] = [
        Self::Summarizer,
        Self::Writer,
        Self::Rewriter,
        Self::Proofreader,
        Self::Translator,
        Self::LanguageDetector,
        Self::Prompt,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Summarizer => "summarizer",
            Self::Writer => "writer",
            Self::Rewriter => "rewriter",
            Self::Proofreader => "proofreader",
            Self::Translator => "translator",
            Self::LanguageDetector => "language-detector",
            Self::Prompt => "prompt",
        }
    }

    /// Device-only beta engines, exposed only when experimental mode is on.
    #[must_use]
    pub const fn is_experimental(self) -> bool {
        matches!(self, Self::Writer | Self::Rewriter)
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::EngineKind;

    #[test]
    fn engine_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&EngineKind::LanguageDetector).unwrap();
        assert_eq!(json, "\"language-detector\"");
        assert_eq!(EngineKind::Prompt.as_str(), "prompt");
    }

    #[test]
    fn only_writer_and_rewriter_are_experimental() {
        let experimental: Vec<_> = EngineKind::ALL
            .into_iter()
            .filter(|k| k.is_experimental())
            .collect();
        assert_eq!(experimental, [EngineKind::Writer, EngineKind::Rewriter]);
    }
}
