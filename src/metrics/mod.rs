//! Usage reporting for context optimization
//!
//! Every optimization produces an [`OptimizationReport`]. Reports are handed
//! to a [`UsageSink`]; [`MetricsTracker`] is the in-process sink that keeps
//! aggregate counters and a short history.

use crate::context::{ContextStrategy, TokenUsage};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Operation name attached to every report
pub const OPTIMIZATION_OPERATION: &str = "context_optimization";

/// Reports retained by [`MetricsTracker`]
const MAX_RECENT_REPORTS: usize = 50;

/// Errors included in [`ErrorSummary::recent_errors`]
const MAX_RECENT_ERRORS: usize = 5;

/// Outcome of a single optimization call
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub operation: &'static str,
    pub success: bool,
    /// `None` when the context was already within budget
    pub strategy: Option<ContextStrategy>,
    pub original_tokens: usize,
    pub optimized_tokens: usize,
    pub messages_removed: usize,
    /// Usage of the returned context
    pub usage: TokenUsage,
    pub duration: Duration,
    pub error: Option<String>,
    /// Error kind, for grouping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl OptimizationReport {
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.map(|s| s.as_str()).unwrap_or("none")
    }

    pub fn tokens_saved(&self) -> usize {
        self.original_tokens.saturating_sub(self.optimized_tokens)
    }
}

impl std::fmt::Display for OptimizationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Context Optimization ===")?;
        writeln!(f, "Strategy: {}", self.strategy_name())?;
        writeln!(f, "Success: {}", self.success)?;
        writeln!(f, "Original tokens: {}", self.original_tokens)?;
        writeln!(f, "Optimized tokens: {}", self.optimized_tokens)?;
        writeln!(f, "Messages removed: {}", self.messages_removed)?;
        writeln!(
            f,
            "Utilization: {:.1}% of {}",
            self.usage.utilization_percent, self.usage.max_tokens
        )?;
        if let Some(error) = &self.error {
            writeln!(f, "Error: {}", error)?;
        }
        Ok(())
    }
}

/// Receives optimization reports
pub trait UsageSink: Send + Sync {
    fn record(&self, report: &OptimizationReport);
}

/// Aggregate counters over all recorded reports
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextMetrics {
    /// Total optimization calls
    pub operations: u64,
    /// Calls that ran a strategy
    pub optimizations: u64,
    /// Calls that failed and returned the original context
    pub failures: u64,
    pub tokens_saved: u64,
    pub messages_removed: u64,
    /// Calls per strategy name, including "none"
    pub by_strategy: BTreeMap<String, u64>,
    /// Failures per error kind
    pub error_kinds: BTreeMap<String, u64>,
    #[serde(skip)]
    recent: VecDeque<OptimizationReport>,
    #[serde(skip)]
    recent_errors: VecDeque<String>,
}

impl ContextMetrics {
    pub fn record(&mut self, report: &OptimizationReport) {
        self.operations += 1;
        *self
            .by_strategy
            .entry(report.strategy_name().to_string())
            .or_insert(0) += 1;

        if report.success {
            if report.strategy.is_some() {
                self.optimizations += 1;
            }
            self.tokens_saved += report.tokens_saved() as u64;
            self.messages_removed += report.messages_removed as u64;
        } else {
            self.failures += 1;
            let kind = report.error_kind.unwrap_or("unknown");
            *self.error_kinds.entry(kind.to_string()).or_insert(0) += 1;

            if let Some(error) = &report.error {
                if self.recent_errors.len() == MAX_RECENT_ERRORS {
                    self.recent_errors.pop_front();
                }
                self.recent_errors.push_back(error.clone());
            }
        }

        if self.recent.len() == MAX_RECENT_REPORTS {
            self.recent.pop_front();
        }
        self.recent.push_back(report.clone());
    }

    /// Most recent reports, newest first
    pub fn recent(&self, limit: usize) -> Vec<OptimizationReport> {
        self.recent.iter().rev().take(limit).cloned().collect()
    }

    pub fn error_summary(&self) -> ErrorSummary {
        let error_rate = if self.operations > 0 {
            self.failures as f64 / self.operations as f64
        } else {
            0.0
        };

        ErrorSummary {
            total_errors: self.failures,
            error_rate,
            error_kinds: self.error_kinds.clone(),
            recent_errors: self.recent_errors.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorSummary {
    pub total_errors: u64,
    pub error_rate: f64,
    pub error_kinds: BTreeMap<String, u64>,
    pub recent_errors: Vec<String>,
}

/// Thread-safe metrics tracker
#[derive(Clone, Default)]
pub struct MetricsTracker {
    inner: Arc<Mutex<ContextMetrics>>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_metrics(&self) -> ContextMetrics {
        self.inner
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn recent(&self, limit: usize) -> Vec<OptimizationReport> {
        self.inner
            .lock()
            .map(|m| m.recent(limit))
            .unwrap_or_default()
    }

    pub fn error_summary(&self) -> ErrorSummary {
        self.inner
            .lock()
            .map(|m| m.error_summary())
            .unwrap_or_else(|_| ContextMetrics::default().error_summary())
    }

    pub fn summary(&self) -> MetricsSummary {
        self.inner
            .lock()
            .map(|m| MetricsSummary {
                operations: m.operations,
                optimizations: m.optimizations,
                failures: m.failures,
                tokens_saved: m.tokens_saved,
                messages_removed: m.messages_removed,
                by_strategy: m.by_strategy.clone(),
            })
            .unwrap_or_else(|_| MetricsSummary::default())
    }
}

impl UsageSink for MetricsTracker {
    fn record(&self, report: &OptimizationReport) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.record(report);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSummary {
    pub operations: u64,
    pub optimizations: u64,
    pub failures: u64,
    pub tokens_saved: u64,
    pub messages_removed: u64,
    pub by_strategy: BTreeMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Context Metrics Summary ===")?;
        writeln!(f, "Optimization calls: {}", self.operations)?;
        writeln!(f, "Strategies applied: {}", self.optimizations)?;
        writeln!(f, "Failures: {}", self.failures)?;
        writeln!(f, "Tokens saved: {}", self.tokens_saved)?;
        writeln!(f, "Messages removed: {}", self.messages_removed)?;
        for (strategy, count) in &self.by_strategy {
            writeln!(f, "  {}: {}", strategy, count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(
        strategy: Option<ContextStrategy>,
        before: usize,
        after: usize,
    ) -> OptimizationReport {
        OptimizationReport {
            operation: OPTIMIZATION_OPERATION,
            success: true,
            strategy,
            original_tokens: before,
            optimized_tokens: after,
            messages_removed: 2,
            usage: TokenUsage::new(0, after, 1000),
            duration: Duration::from_millis(1),
            error: None,
            error_kind: None,
        }
    }

    fn failure(kind: &'static str, message: &str) -> OptimizationReport {
        OptimizationReport {
            success: false,
            messages_removed: 0,
            error: Some(message.to_string()),
            error_kind: Some(kind),
            ..report(Some(ContextStrategy::KeepRecent), 900, 900)
        }
    }

    #[test]
    fn test_tracker_aggregates() {
        let tracker = MetricsTracker::new();
        tracker.record(&report(None, 100, 100));
        tracker.record(&report(Some(ContextStrategy::TruncateOldest), 1200, 800));

        let summary = tracker.summary();
        assert_eq!(summary.operations, 2);
        assert_eq!(summary.optimizations, 1);
        assert_eq!(summary.tokens_saved, 400);
        assert_eq!(summary.messages_removed, 4);
        assert_eq!(summary.by_strategy.get("none"), Some(&1));
        assert_eq!(summary.by_strategy.get("truncate_oldest"), Some(&1));
    }

    #[test]
    fn test_recent_is_newest_first_and_bounded() {
        let tracker = MetricsTracker::new();
        for i in 0..60 {
            tracker.record(&report(None, i, i));
        }

        let recent = tracker.recent(100);
        assert_eq!(recent.len(), MAX_RECENT_REPORTS);
        assert_eq!(recent[0].original_tokens, 59);
        assert_eq!(tracker.recent(3).len(), 3);
    }

    #[test]
    fn test_error_summary() {
        let tracker = MetricsTracker::new();
        assert_eq!(tracker.error_summary().total_errors, 0);

        tracker.record(&report(None, 10, 10));
        tracker.record(&failure("invalid_config", "bad budget"));

        let errors = tracker.error_summary();
        assert_eq!(errors.total_errors, 1);
        assert!((errors.error_rate - 0.5).abs() < 1e-9);
        assert_eq!(errors.error_kinds.get("invalid_config"), Some(&1));
        assert_eq!(errors.recent_errors, vec!["bad budget".to_string()]);
        assert_eq!(tracker.summary().failures, 1);
    }

    #[test]
    fn test_error_history_is_bounded() {
        let tracker = MetricsTracker::new();
        for i in 0..20 {
            tracker.record(&failure("strategy", &format!("failure {}", i)));
        }

        let errors = tracker.error_summary();
        assert_eq!(errors.total_errors, 20);
        assert_eq!(errors.error_kinds.get("strategy"), Some(&20));
        assert_eq!(errors.recent_errors.len(), MAX_RECENT_ERRORS);
        assert_eq!(errors.recent_errors[0], "failure 15");
        assert_eq!(errors.recent_errors[4], "failure 19");
        assert_eq!(tracker.get_metrics().error_kinds.get("strategy"), Some(&20));
    }

    #[test]
    fn test_report_display() {
        let text = report(Some(ContextStrategy::SlidingWindow), 1000, 600).to_string();
        assert!(text.contains("Strategy: sliding_window"));
        assert!(text.contains("Messages removed: 2"));
    }
}
