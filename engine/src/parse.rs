//! Parsing and validation of free-text prompt-engine output.
//!
//! Strict parses enforce the expected structure; when validation fails but
//! plausible output exists, a documented heuristic recovers a best-effort
//! result instead of failing the operation. Only a completely empty or
//! unusable response becomes a `Validation` error.

use std::sync::OnceLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use quill_types::{DetectedLanguage, EngineError, ParseTuning, ProofreadOutcome};

/// Confidence assigned when the response is exactly a language code.
const STRICT_DETECTION_CONFIDENCE: f64 = 0.9;
/// Confidence assigned when a code had to be fished out of prose.
const HEURISTIC_DETECTION_CONFIDENCE: f64 = 0.5;

const SUMMARY_LABELS: [&str; 3] = ["insight", "surprise", "apply"];

fn word_count(text: &str) -> usize {
    text.unicode_words().count()
}

/// Strip a leading bullet marker (`-`, `*`, `•`, `1.`, `1)`) if present.
fn strip_bullet(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed
        .strip_prefix('-')
        .or_else(|| trimmed.strip_prefix('*'))
        .or_else(|| trimmed.strip_prefix('•'))
    {
        return Some(rest.trim_start());
    }
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &trimmed[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return Some(rest.trim_start());
        }
    }
    None
}

/// Strip a known summary section label (`Insight:`, `Surprise:`, `Apply:`).
fn strip_label(line: &str) -> &str {
    let lower = line.to_ascii_lowercase();
    for label in SUMMARY_LABELS {
        if lower.starts_with(label)
            && let Some(rest) = line[label.len()..].trim_start().strip_prefix(':')
        {
            return rest.trim_start();
        }
    }
    line
}

/// Parse a bullet-point summary out of raw prompt output.
///
/// Strict path: every bullet-marked line, label-stripped, and the result must
/// have exactly the expected item count with each bullet inside the word
/// tolerance. Failing that, the heuristic takes the first N non-blank lines
/// regardless of markers, so a malformed-but-present answer still reaches the
/// user.
pub fn parse_summary(raw: &str, tuning: &ParseTuning) -> Result<Vec<String>, EngineError> {
    let strict: Vec<String> = raw
        .lines()
        .filter_map(strip_bullet)
        .map(|line| strip_label(line).trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    if strict.len() == tuning.summary_items
        && strict
            .iter()
            .all(|item| word_count(item) <= tuning.max_bullet_words())
    {
        return Ok(strict);
    }

    tracing::debug!(
        strict_items = strict.len(),
        expected = tuning.summary_items,
        "summary parse falling back to first non-blank lines"
    );
    let fallback: Vec<String> = raw
        .lines()
        .map(|line| {
            let line = strip_bullet(line).unwrap_or(line);
            strip_label(line).trim().to_string()
        })
        .filter(|line| !line.is_empty())
        .take(tuning.summary_items)
        .collect();

    if fallback.is_empty() {
        return Err(EngineError::validation(
            "The AI returned an empty summary.",
        ));
    }
    Ok(fallback)
}

/// Trim a plain-text response, dropping a wrapping code fence or quote pair.
pub fn parse_plain_text(raw: &str) -> Result<String, EngineError> {
    let mut text = raw.trim();
    if let Some(inner) = text.strip_prefix("```")
        && let Some(inner) = inner.strip_suffix("```")
    {
        // Drop an optional language tag on the opening fence line.
        text = inner.split_once('\n').map_or(inner, |(_, body)| body).trim();
    }
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text = text[1..text.len() - 1].trim();
    }
    if text.is_empty() {
        return Err(EngineError::validation("The AI returned an empty response."));
    }
    Ok(text.to_string())
}

/// Proofread output from the prompt fallback: the corrected text only.
/// Individual corrections come from the specialized proofreader alone.
pub fn parse_proofread(raw: &str) -> Result<ProofreadOutcome, EngineError> {
    Ok(ProofreadOutcome {
        corrected_text: parse_plain_text(raw)?,
        corrections: Vec::new(),
    })
}

fn language_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z]{2,3}(-[a-zA-Z0-9]{2,8})*$").expect("language pattern must compile")
    })
}

fn normalize_language(code: &str) -> String {
    code.to_ascii_lowercase()
}

/// Extract a BCP 47 language code from raw prompt output.
///
/// Strict path: the whole trimmed response is a code. Heuristic: the first
/// code-shaped word anywhere in the response, at reduced confidence.
pub fn parse_language(raw: &str) -> Result<DetectedLanguage, EngineError> {
    let pattern = language_code_pattern();
    let cleaned = raw.trim().trim_matches(['"', '\'', '`', '.', ',']);
    if pattern.is_match(cleaned) {
        return Ok(DetectedLanguage {
            language: normalize_language(cleaned),
            confidence: STRICT_DETECTION_CONFIDENCE,
        });
    }

    // Bare 2-3 letter words in prose are too ambiguous ("to", "be"), so the
    // heuristic only trusts quoted tokens, hyphenated codes, or the token the
    // response opens with.
    for word in raw.split_whitespace() {
        let quoted = word.len() > 2
            && word.starts_with(['"', '\'', '`'])
            && word.trim_end_matches(['.', ',']).ends_with(['"', '\'', '`']);
        let cleaned = word.trim_matches(['"', '\'', '`', '.', ',', '(', ')', ':']);
        if pattern.is_match(cleaned) && (quoted || cleaned.contains('-')) {
            return Ok(DetectedLanguage {
                language: normalize_language(cleaned),
                confidence: HEURISTIC_DETECTION_CONFIDENCE,
            });
        }
    }
    if let Some(first) = raw.split_whitespace().next() {
        let cleaned = first.trim_matches(['"', '\'', '`', '.', ',', '(', ')', ':']);
        if pattern.is_match(cleaned) {
            return Ok(DetectedLanguage {
                language: normalize_language(cleaned),
                confidence: HEURISTIC_DETECTION_CONFIDENCE,
            });
        }
    }

    Err(EngineError::validation(
        "The AI response did not contain a language code.",
    ))
}
