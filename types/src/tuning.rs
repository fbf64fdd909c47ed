//! Parse-validation tuning knobs.
//!
//! These values encode product tuning, not correctness requirements, so they
//! are configurable rather than hard invariants.

/// Tolerances used when validating parsed prompt-engine output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseTuning {
    /// Expected number of summary bullet points.
    pub summary_items: usize,
    /// Soft per-bullet word limit requested in the instruction.
    pub summary_word_limit: usize,
    /// Extra words tolerated beyond the limit before the strict parse is
    /// rejected and the heuristic fallback applies.
    pub word_tolerance: usize,
}

impl Default for ParseTuning {
    fn default() -> Self {
        Self {
            summary_items: 3,
            summary_word_limit: 20,
            word_tolerance: 5,
        }
    }
}

impl ParseTuning {
    /// Maximum words a summary bullet may carry before strict validation fails.
    #[must_use]
    pub const fn max_bullet_words(&self) -> usize {
        self.summary_word_limit + self.word_tolerance
    }
}
