//! Operation requests, payloads, and the result union.
//!
//! The transport contract is JSON: requests are tagged by an
//! `operation` string, results serialize as
//! `{success:true, data, engineUsed, durationMs}` or
//! `{success:false, error, engineUsed?, durationMs}`.

use serde::{Deserialize, Serialize};

use crate::EngineKind;

/// The six logical operations callers can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Summarize,
    Write,
    Rewrite,
    Proofread,
    Translate,
    DetectLanguage,
}

impl OperationKind {
    pub const ALL: [Self; 6] = [
        Self::Summarize,
        Self::Write,
        Self::Rewrite,
        Self::Proofread,
        Self::Translate,
        Self::DetectLanguage,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::Write => "write",
            Self::Rewrite => "rewrite",
            Self::Proofread => "proofread",
            Self::Translate => "translate",
            Self::DetectLanguage => "detect-language",
        }
    }

    /// The purpose-built engine that serves this operation when present.
    #[must_use]
    pub const fn specialized_engine(self) -> EngineKind {
        match self {
            Self::Summarize => EngineKind::Summarizer,
            Self::Write => EngineKind::Writer,
            Self::Rewrite => EngineKind::Rewriter,
            Self::Proofread => EngineKind::Proofreader,
            Self::Translate => EngineKind::Translator,
            Self::DetectLanguage => EngineKind::LanguageDetector,
        }
    }

    /// Generation operations deliver output incrementally when streamed.
    #[must_use]
    pub const fn supports_streaming(self) -> bool {
        matches!(self, Self::Write | Self::Rewrite)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tone preset for generation operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tone {
    #[default]
    Neutral,
    Formal,
    Casual,
}

impl Tone {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Formal => "formal",
            Self::Casual => "casual",
        }
    }
}

/// Output format for generation operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    PlainText,
    Markdown,
}

impl OutputFormat {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlainText => "plain text",
            Self::Markdown => "markdown",
        }
    }
}

/// Operation-specific payload, tagged by the operation name on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum OperationPayload {
    Summarize {
        text: String,
    },
    Write {
        task: String,
        #[serde(default)]
        tone: Tone,
        #[serde(default)]
        format: OutputFormat,
    },
    Rewrite {
        text: String,
        #[serde(default)]
        tone: Tone,
        #[serde(default)]
        format: OutputFormat,
    },
    Proofread {
        text: String,
    },
    Translate {
        text: String,
        #[serde(default, rename = "sourceLanguage")]
        source_language: String,
        #[serde(rename = "targetLanguage")]
        target_language: String,
    },
    DetectLanguage {
        text: String,
    },
}

impl OperationPayload {
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Summarize { .. } => OperationKind::Summarize,
            Self::Write { .. } => OperationKind::Write,
            Self::Rewrite { .. } => OperationKind::Rewrite,
            Self::Proofread { .. } => OperationKind::Proofread,
            Self::Translate { .. } => OperationKind::Translate,
            Self::DetectLanguage { .. } => OperationKind::DetectLanguage,
        }
    }

    /// The primary text the operation acts on.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Summarize { text }
            | Self::Rewrite { text, .. }
            | Self::Proofread { text }
            | Self::Translate { text, .. }
            | Self::DetectLanguage { text } => text,
            Self::Write { task, .. } => task,
        }
    }
}

/// An immutable operation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    #[serde(flatten)]
    pub payload: OperationPayload,
    /// Requested language for the produced output, when the caller overrides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_language: Option<String>,
    /// Hints about the languages the input text is likely written in.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_input_languages: Vec<String>,
    /// Hints about the languages of surrounding context.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_context_languages: Vec<String>,
}

impl OperationRequest {
    #[must_use]
    pub fn new(payload: OperationPayload) -> Self {
        Self {
            payload,
            output_language: None,
            expected_input_languages: Vec::new(),
            expected_context_languages: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_output_language(mut self, language: impl Into<String>) -> Self {
        self.output_language = Some(language.into());
        self
    }

    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.payload.kind()
    }
}

/// A single grammar/spelling correction within proofread output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub start_index: usize,
    pub end_index: usize,
    pub correction: String,
}

/// Proofread result: the corrected text plus individual corrections.
///
/// The prompt fallback cannot attribute individual corrections, so its
/// `corrections` list is empty; only specialized engines populate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofreadOutcome {
    pub corrected_text: String,
    #[serde(default)]
    pub corrections: Vec<Correction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationOutcome {
    pub translated_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedLanguage {
    /// BCP 47 language code.
    pub language: String,
    pub confidence: f64,
}

/// Typed success payload, one variant per operation shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationOutput {
    /// Fixed-size bullet summary (see `ParseTuning::summary_items`).
    Summary(Vec<String>),
    Proofread(ProofreadOutcome),
    Translation(TranslationOutcome),
    Language(DetectedLanguage),
    /// Written or rewritten text.
    Text(String),
}

/// The discriminated result union. Every code path that completes an
/// operation produces exactly one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationResult {
    Success {
        success: bool,
        data: OperationOutput,
        #[serde(rename = "engineUsed")]
        engine_used: EngineKind,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    Failure {
        success: bool,
        error: String,
        #[serde(rename = "engineUsed", skip_serializing_if = "Option::is_none")]
        engine_used: Option<EngineKind>,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
}

impl OperationResult {
    #[must_use]
    pub fn success(data: OperationOutput, engine_used: EngineKind, duration_ms: u64) -> Self {
        Self::Success {
            success: true,
            data,
            engine_used,
            duration_ms,
        }
    }

    #[must_use]
    pub fn failure(
        error: impl Into<String>,
        engine_used: Option<EngineKind>,
        duration_ms: u64,
    ) -> Self {
        Self::Failure {
            success: false,
            error: error.into(),
            engine_used,
            duration_ms,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub const fn engine_used(&self) -> Option<EngineKind> {
        match self {
            Self::Success { engine_used, .. } => Some(*engine_used),
            Self::Failure { engine_used, .. } => *engine_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        EngineKind, OperationKind, OperationOutput, OperationPayload, OperationRequest,
        OperationResult, Tone,
    };

    #[test]
    fn request_deserializes_from_tagged_json() {
        let json = serde_json::json!({
            "operation": "translate",
            "text": "hello",
            "sourceLanguage": "en",
            "targetLanguage": "es",
            "outputLanguage": "es"
        });
        let request: OperationRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.kind(), OperationKind::Translate);
        assert_eq!(request.output_language.as_deref(), Some("es"));
    }

    #[test]
    fn write_payload_defaults_tone_and_format() {
        let json = serde_json::json!({ "operation": "write", "task": "a haiku" });
        let request: OperationRequest = serde_json::from_value(json).unwrap();
        let OperationPayload::Write { tone, .. } = request.payload else {
            panic!("expected write payload");
        };
        assert_eq!(tone, Tone::Neutral);
    }

    #[test]
    fn success_result_serializes_with_success_flag() {
        let result = OperationResult::success(
            OperationOutput::Summary(vec!["a".into(), "b".into(), "c".into()]),
            EngineKind::Prompt,
            42,
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["engineUsed"], "prompt");
        assert_eq!(json["durationMs"], 42);
        assert_eq!(json["data"][0], "a");
    }

    #[test]
    fn failure_result_omits_engine_when_none_was_used() {
        let result = OperationResult::failure("nope", None, 7);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "nope");
        assert!(json.get("engineUsed").is_none());
    }

    #[test]
    fn specialized_engine_mapping_is_one_to_one() {
        for kind in OperationKind::ALL {
            assert_ne!(kind.specialized_engine(), EngineKind::Prompt);
        }
    }

    #[test]
    fn only_generation_operations_stream() {
        assert!(OperationKind::Write.supports_streaming());
        assert!(OperationKind::Rewrite.supports_streaming());
        assert!(!OperationKind::Summarize.supports_streaming());
        assert!(!OperationKind::Translate.supports_streaming());
    }
}
