//! Host-application settings consumed by the orchestrator.
//!
//! The orchestrator reads settings once per request to decide routing; it
//! never writes them. Persistence and validation of settings belong to the
//! host, not to this engine.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Prefer the specialized summarizer over the prompt fallback.
    pub use_specialized_summarizer: bool,
    /// Prefer the specialized proofreader over the prompt fallback.
    pub use_specialized_proofreader: bool,
    pub translation_enabled: bool,
    pub proofread_enabled: bool,
    /// Default target language when the caller does not supply one.
    pub preferred_translation_language: String,
    /// Unlocks device-only beta engines (writer, rewriter).
    pub experimental_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_specialized_summarizer: true,
            use_specialized_proofreader: true,
            translation_enabled: true,
            proofread_enabled: true,
            preferred_translation_language: "en".to_string(),
            experimental_mode: false,
        }
    }
}

/// Read-only settings collaborator.
///
/// A plain [`Settings`] value is its own source, which keeps tests and
/// embedders that have no dynamic settings trivial.
pub trait SettingsSource: Send + Sync {
    fn current(&self) -> Settings;
}

impl SettingsSource for Settings {
    fn current(&self) -> Settings {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;

    #[test]
    fn defaults_enable_specialized_engines() {
        let settings = Settings::default();
        assert!(settings.use_specialized_summarizer);
        assert!(settings.translation_enabled);
        assert!(!settings.experimental_mode);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: Settings =
            serde_json::from_value(serde_json::json!({ "experimentalMode": true })).unwrap();
        assert!(settings.experimental_mode);
        assert!(settings.proofread_enabled);
        assert_eq!(settings.preferred_translation_language, "en");
    }
}
