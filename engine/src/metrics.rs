//! Bounded rolling history of operation performance.
//!
//! Aggregates are derived on read, never stored redundantly. Slow operations
//! are logged when recorded, not when the stats are computed.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use quill_types::{EngineKind, OperationKind};

pub(crate) const DEFAULT_METRIC_CAPACITY: usize = 100;
pub(crate) const DEFAULT_SLOW_THRESHOLD_MS: u64 = 5000;

#[derive(Debug, Clone)]
struct PerformanceMetric {
    operation: OperationKind,
    engine: EngineKind,
    duration_ms: u64,
    #[allow(dead_code)] // kept for future export; aggregates don't need it
    timestamp: DateTime<Utc>,
    success: bool,
}

/// One extreme (slowest/fastest) entry in the stats view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub operation: OperationKind,
    pub engine: EngineKind,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub count: u64,
    pub success_count: u64,
    pub average_duration_ms: f64,
}

/// Aggregate statistics over the rolling history.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub total: u64,
    pub success_count: u64,
    pub average_duration_ms: f64,
    pub slowest: Option<MetricSummary>,
    pub fastest: Option<MetricSummary>,
    pub slow_count: u64,
    pub by_operation: HashMap<OperationKind, Breakdown>,
    pub by_engine: HashMap<EngineKind, Breakdown>,
}

/// Ring buffer of recent operation metrics.
#[derive(Debug)]
pub struct PerformanceMonitor {
    capacity: usize,
    slow_threshold_ms: u64,
    history: Mutex<VecDeque<PerformanceMetric>>,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_METRIC_CAPACITY, DEFAULT_SLOW_THRESHOLD_MS)
    }
}

impl PerformanceMonitor {
    #[must_use]
    pub fn new(capacity: usize, slow_threshold_ms: u64) -> Self {
        Self {
            capacity: capacity.max(1),
            slow_threshold_ms,
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(
        &self,
        operation: OperationKind,
        engine: EngineKind,
        duration_ms: u64,
        success: bool,
    ) {
        if duration_ms > self.slow_threshold_ms {
            tracing::warn!(
                %operation,
                %engine,
                duration_ms,
                threshold_ms = self.slow_threshold_ms,
                "slow operation"
            );
        }
        let mut history = self.history.lock().expect("metric history poisoned");
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(PerformanceMetric {
            operation,
            engine,
            duration_ms,
            timestamp: Utc::now(),
            success,
        });
    }

    /// Aggregates computed on demand. An empty history yields zeroed stats.
    #[must_use]
    pub fn stats(&self) -> PerformanceStats {
        let history = self.history.lock().expect("metric history poisoned");
        if history.is_empty() {
            return PerformanceStats::default();
        }

        let total = history.len() as u64;
        let success_count = history.iter().filter(|m| m.success).count() as u64;
        let duration_sum: u64 = history.iter().map(|m| m.duration_ms).sum();
        let slow_count = history
            .iter()
            .filter(|m| m.duration_ms > self.slow_threshold_ms)
            .count() as u64;

        let summarize = |m: &PerformanceMetric| MetricSummary {
            operation: m.operation,
            engine: m.engine,
            duration_ms: m.duration_ms,
        };
        let slowest = history.iter().max_by_key(|m| m.duration_ms).map(summarize);
        let fastest = history.iter().min_by_key(|m| m.duration_ms).map(summarize);

        let mut by_operation: HashMap<OperationKind, (u64, u64, u64)> = HashMap::new();
        let mut by_engine: HashMap<EngineKind, (u64, u64, u64)> = HashMap::new();
        for metric in history.iter() {
            let op = by_operation.entry(metric.operation).or_default();
            op.0 += 1;
            op.1 += u64::from(metric.success);
            op.2 += metric.duration_ms;
            let engine = by_engine.entry(metric.engine).or_default();
            engine.0 += 1;
            engine.1 += u64::from(metric.success);
            engine.2 += metric.duration_ms;
        }
        let finish = |(count, success_count, sum): (u64, u64, u64)| Breakdown {
            count,
            success_count,
            average_duration_ms: sum as f64 / count as f64,
        };

        PerformanceStats {
            total,
            success_count,
            average_duration_ms: duration_sum as f64 / total as f64,
            slowest,
            fastest,
            slow_count,
            by_operation: by_operation.into_iter().map(|(k, v)| (k, finish(v))).collect(),
            by_engine: by_engine.into_iter().map(|(k, v)| (k, finish(v))).collect(),
        }
    }

    pub fn clear(&self) {
        self.history.lock().expect("metric history poisoned").clear();
    }
}
