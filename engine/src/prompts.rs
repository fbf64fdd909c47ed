//! Deterministic instruction builders for the prompt fallback.
//!
//! Each operation kind maps to a fixed "system" framing string and an
//! operation-appropriate sampling temperature: low for factual tasks
//! (summarize, proofread, detect-language), high for creative ones (write,
//! rewrite). The pair is the session configuration key, so identical
//! requests always land on the same cached session.
//!
//! Translation deliberately has no entry here: there is no prompt fallback
//! for it, only the specialized translator.

use quill_providers::PromptConfig;
use quill_types::{OperationPayload, OperationRequest, ParseTuning};

pub(crate) const TEMPERATURE_FACTUAL: f32 = 0.2;
pub(crate) const TEMPERATURE_CREATIVE: f32 = 0.8;

/// A ready-to-run fallback invocation: session config plus user content.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptPlan {
    pub config: PromptConfig,
    pub input: String,
}

/// Build the fallback plan for a request, or `None` when the operation has
/// no prompt fallback path.
#[must_use]
pub fn fallback_plan(request: &OperationRequest, tuning: &ParseTuning) -> Option<PromptPlan> {
    let (mut instructions, temperature, input) = match &request.payload {
        OperationPayload::Summarize { text } => (
            format!(
                "You are a careful reading assistant. Summarize the provided text as exactly \
                 {items} bullet points: the key insight, the most surprising idea, and one way \
                 to apply it. Start each line with \"- \" and keep every bullet under \
                 {limit} words.",
                items = tuning.summary_items,
                limit = tuning.summary_word_limit,
            ),
            TEMPERATURE_FACTUAL,
            text.clone(),
        ),
        OperationPayload::Write { task, tone, format } => (
            format!(
                "You are a writing assistant. Write {format} in a {tone} tone for the task the \
                 user provides. Respond with only the written text.",
                format = format.as_str(),
                tone = tone.as_str(),
            ),
            TEMPERATURE_CREATIVE,
            task.clone(),
        ),
        OperationPayload::Rewrite { text, tone, format } => (
            format!(
                "You are an editing assistant. Rewrite the provided text as {format} in a \
                 {tone} tone, preserving its meaning. Respond with only the rewritten text.",
                format = format.as_str(),
                tone = tone.as_str(),
            ),
            TEMPERATURE_CREATIVE,
            text.clone(),
        ),
        OperationPayload::Proofread { text } => (
            "You are a proofreader. Fix grammar, spelling, and punctuation mistakes in the \
             provided text while preserving its meaning. Respond with only the corrected text."
                .to_string(),
            TEMPERATURE_FACTUAL,
            text.clone(),
        ),
        OperationPayload::DetectLanguage { text } => (
            "Identify the language of the provided text. Respond with only its BCP 47 language \
             code."
                .to_string(),
            TEMPERATURE_FACTUAL,
            text.clone(),
        ),
        OperationPayload::Translate { .. } => return None,
    };

    if let Some(language) = &request.output_language
        && !matches!(request.payload, OperationPayload::DetectLanguage { .. })
    {
        instructions.push_str(&format!(" Respond in {language}."));
    }

    Some(PromptPlan {
        config: PromptConfig::new(instructions, temperature),
        input,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::{OperationPayload, OperationRequest, Tone};

    fn summarize(text: &str) -> OperationRequest {
        OperationRequest::new(OperationPayload::Summarize { text: text.into() })
    }

    #[test]
    fn identical_requests_share_a_session_key() {
        let tuning = ParseTuning::default();
        let a = fallback_plan(&summarize("hello"), &tuning).unwrap();
        let b = fallback_plan(&summarize("different text"), &tuning).unwrap();
        assert_eq!(a.config.key(), b.config.key());
        assert_ne!(a.input, b.input);
    }

    #[test]
    fn factual_and_creative_tasks_use_different_temperatures() {
        let tuning = ParseTuning::default();
        let summary = fallback_plan(&summarize("x"), &tuning).unwrap();
        let write = fallback_plan(
            &OperationRequest::new(OperationPayload::Write {
                task: "a haiku".into(),
                tone: Tone::Casual,
                format: Default::default(),
            }),
            &tuning,
        )
        .unwrap();
        assert_eq!(summary.config.temperature, TEMPERATURE_FACTUAL);
        assert_eq!(write.config.temperature, TEMPERATURE_CREATIVE);
    }

    #[test]
    fn translation_has_no_fallback_plan() {
        let request = OperationRequest::new(OperationPayload::Translate {
            text: "hola".into(),
            source_language: "es".into(),
            target_language: "en".into(),
        });
        assert!(fallback_plan(&request, &ParseTuning::default()).is_none());
    }

    #[test]
    fn output_language_override_changes_the_config_key() {
        let tuning = ParseTuning::default();
        let plain = fallback_plan(&summarize("x"), &tuning).unwrap();
        let localized =
            fallback_plan(&summarize("x").with_output_language("de"), &tuning).unwrap();
        assert_ne!(plain.config.key(), localized.config.key());
        assert!(localized.config.instructions.ends_with("Respond in de."));
    }

    #[test]
    fn summary_instruction_reflects_tuning() {
        let tuning = ParseTuning {
            summary_items: 5,
            summary_word_limit: 12,
            word_tolerance: 5,
        };
        let plan = fallback_plan(&summarize("x"), &tuning).unwrap();
        assert!(plan.config.instructions.contains("exactly 5 bullet points"));
        assert!(plan.config.instructions.contains("under 12 words"));
    }
}
