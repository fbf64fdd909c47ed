//! Per-operation usage counters and the approaching-quota flag.
//!
//! Counters increase only on eventual operation success (the retry controller
//! calls [`UsageTracker::record_success`] once per successful operation,
//! never per attempt) and are reset only by an explicit call.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use quill_types::OperationKind;

const DEFAULT_QUOTA_ESTIMATE: u64 = 100;
const QUOTA_WARN_RATIO: f64 = 0.8;

#[derive(Debug)]
struct UsageState {
    counts: HashMap<OperationKind, u64>,
    session_start: DateTime<Utc>,
}

/// Process-wide usage counters, one per operation type.
#[derive(Debug)]
pub struct UsageTracker {
    quota_estimate: u64,
    state: Mutex<UsageState>,
}

/// Read-only usage view for display surfaces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub counts: HashMap<OperationKind, u64>,
    pub total: u64,
    pub session_start: String,
    pub quota_estimate: u64,
    pub approaching_quota: bool,
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTA_ESTIMATE)
    }
}

impl UsageTracker {
    #[must_use]
    pub fn new(quota_estimate: u64) -> Self {
        Self {
            quota_estimate,
            state: Mutex::new(UsageState {
                counts: HashMap::new(),
                session_start: Utc::now(),
            }),
        }
    }

    pub fn record_success(&self, kind: OperationKind) {
        let mut state = self.state.lock().expect("usage state poisoned");
        *state.counts.entry(kind).or_insert(0) += 1;
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        let state = self.state.lock().expect("usage state poisoned");
        state.counts.values().sum()
    }

    #[must_use]
    pub fn count(&self, kind: OperationKind) -> u64 {
        let state = self.state.lock().expect("usage state poisoned");
        state.counts.get(&kind).copied().unwrap_or(0)
    }

    /// True once total recorded operations reach 80% of the quota estimate.
    #[must_use]
    pub fn approaching_quota(&self) -> bool {
        self.total() as f64 >= QUOTA_WARN_RATIO * self.quota_estimate as f64
    }

    #[must_use]
    pub fn snapshot(&self) -> UsageSnapshot {
        let state = self.state.lock().expect("usage state poisoned");
        let total = state.counts.values().sum();
        UsageSnapshot {
            counts: state.counts.clone(),
            total,
            session_start: state.session_start.to_rfc3339(),
            quota_estimate: self.quota_estimate,
            approaching_quota: total as f64 >= QUOTA_WARN_RATIO * self.quota_estimate as f64,
        }
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().expect("usage state poisoned");
        state.counts.clear();
        state.session_start = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::UsageTracker;
    use quill_types::OperationKind;

    #[test]
    fn counters_accumulate_per_kind() {
        let usage = UsageTracker::default();
        usage.record_success(OperationKind::Summarize);
        usage.record_success(OperationKind::Summarize);
        usage.record_success(OperationKind::Proofread);
        assert_eq!(usage.count(OperationKind::Summarize), 2);
        assert_eq!(usage.count(OperationKind::Proofread), 1);
        assert_eq!(usage.total(), 3);
    }

    #[test]
    fn quota_flag_flips_exactly_at_eighty_percent() {
        let usage = UsageTracker::new(10);
        for _ in 0..7 {
            usage.record_success(OperationKind::Write);
        }
        assert!(!usage.approaching_quota());
        usage.record_success(OperationKind::Write);
        assert!(usage.approaching_quota());
    }

    #[test]
    fn reset_clears_counts_and_restarts_session() {
        let usage = UsageTracker::new(10);
        usage.record_success(OperationKind::Translate);
        usage.reset();
        assert_eq!(usage.total(), 0);
        assert!(!usage.approaching_quota());
    }

    #[test]
    fn snapshot_serializes_with_kind_keys() {
        let usage = UsageTracker::default();
        usage.record_success(OperationKind::DetectLanguage);
        let json = serde_json::to_value(usage.snapshot()).unwrap();
        assert_eq!(json["counts"]["detect-language"], 1);
        assert_eq!(json["total"], 1);
        assert_eq!(json["approachingQuota"], false);
    }
}
