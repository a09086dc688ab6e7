//! Context optimization strategies

use super::{
    BudgetCalculator, ContextError, ContextStrategy, MemoryConfig, Message, MessageSummarizer,
    TokenUsage,
};
use crate::metrics::{OptimizationReport, UsageSink, OPTIMIZATION_OPERATION};
use crate::tokens::{TiktokenCounter, TokenCounter};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Prefix of the synthetic message that replaces summarized history
pub const SUMMARY_MARKER: &str = "[Context Summary]";

/// What [`ContextOptimizer::optimize`] did with the context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizationOutcome {
    /// Usage was not near the limit; context returned as is
    WithinBudget,
    /// A strategy ran (its result may still equal the input)
    Applied(ContextStrategy),
    /// Optimization failed; the original context was returned
    Skipped(ContextError),
}

/// System prompt and messages ready for the model call
#[derive(Debug, Clone)]
pub struct OptimizedContext {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub outcome: OptimizationOutcome,
    pub report: OptimizationReport,
}

/// Detailed token and configuration statistics for a conversation
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub token_usage: UsageStats,
    pub message_count: usize,
    pub strategy: ContextStrategy,
    pub optimization_needed: bool,
    pub over_limit: bool,
    pub config: ConfigStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    pub total: usize,
    pub system: usize,
    pub conversation: usize,
    pub remaining: usize,
    pub max: usize,
    pub utilization_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigStats {
    pub max_context_tokens: usize,
    pub summarize_threshold: usize,
    pub min_messages_to_keep: usize,
    pub auto_summarization: bool,
}

/// Fits a conversation into its token budget
pub struct ContextOptimizer {
    counter: Arc<dyn TokenCounter>,
    summarizer: MessageSummarizer,
    sink: Option<Arc<dyn UsageSink>>,
}

impl Default for ContextOptimizer {
    fn default() -> Self {
        Self::new(Arc::new(TiktokenCounter::new()))
    }
}

/// Per-call state shared by the strategies
struct Pass<'a> {
    budget: BudgetCalculator,
    summarizer: &'a MessageSummarizer,
    config: &'a MemoryConfig,
    system_prompt: &'a str,
    model: &'a str,
}

impl ContextOptimizer {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            counter,
            summarizer: MessageSummarizer::new(),
            sink: None,
        }
    }

    /// Send every report to `sink` in addition to the tracing log
    pub fn with_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn budget(&self, config: &MemoryConfig) -> BudgetCalculator {
        BudgetCalculator::new(self.counter.clone(), config.max_context_tokens)
    }

    /// Reduce the context to fit `config.max_context_tokens`.
    ///
    /// Never fails: on any internal error the original prompt and messages
    /// are returned with [`OptimizationOutcome::Skipped`].
    pub fn optimize(
        &self,
        system_prompt: &str,
        messages: &[Message],
        model: &str,
        config: &MemoryConfig,
    ) -> OptimizedContext {
        let start = Instant::now();
        let budget = self.budget(config);
        let before = budget.compute_usage(system_prompt, messages, model);

        let result = config.validate().and_then(|()| {
            if !before.is_near_limit() {
                return Ok(None);
            }

            let pass = Pass {
                budget: budget.clone(),
                summarizer: &self.summarizer,
                config,
                system_prompt,
                model,
            };
            debug!(
                strategy = %config.strategy,
                utilization = before.utilization_percent,
                messages = messages.len(),
                "Context near limit, applying strategy"
            );
            pass.run(config.strategy, messages).map(Some)
        });

        let (optimized, outcome) = match result {
            Ok(None) => (messages.to_vec(), OptimizationOutcome::WithinBudget),
            Ok(Some(optimized)) => (optimized, OptimizationOutcome::Applied(config.strategy)),
            Err(e) => (messages.to_vec(), OptimizationOutcome::Skipped(e)),
        };

        let after = budget.compute_usage(system_prompt, &optimized, model);
        let report = OptimizationReport {
            operation: OPTIMIZATION_OPERATION,
            success: !matches!(outcome, OptimizationOutcome::Skipped(_)),
            strategy: match &outcome {
                OptimizationOutcome::WithinBudget => None,
                _ => Some(config.strategy),
            },
            original_tokens: before.total_tokens,
            optimized_tokens: after.total_tokens,
            messages_removed: messages.len().saturating_sub(optimized.len()),
            usage: after,
            duration: start.elapsed(),
            error: match &outcome {
                OptimizationOutcome::Skipped(e) => Some(e.to_string()),
                _ => None,
            },
            error_kind: match &outcome {
                OptimizationOutcome::Skipped(e) => Some(e.kind()),
                _ => None,
            },
        };

        match &outcome {
            OptimizationOutcome::Skipped(e) => warn!(
                operation = OPTIMIZATION_OPERATION,
                strategy = %config.strategy,
                error = %e,
                "Context optimization skipped, returning original context"
            ),
            _ => info!(
                operation = OPTIMIZATION_OPERATION,
                strategy = report.strategy_name(),
                original_tokens = report.original_tokens,
                optimized_tokens = report.optimized_tokens,
                messages_removed = report.messages_removed,
                "Context optimization completed"
            ),
        }

        if let Some(sink) = &self.sink {
            sink.record(&report);
        }

        OptimizedContext {
            system_prompt: system_prompt.to_string(),
            messages: optimized,
            outcome,
            report,
        }
    }

    /// Token usage, message count, and configuration for a conversation
    pub fn memory_stats(
        &self,
        system_prompt: &str,
        messages: &[Message],
        model: &str,
        config: &MemoryConfig,
    ) -> MemoryStats {
        let usage = self.budget(config).compute_usage(system_prompt, messages, model);

        MemoryStats {
            token_usage: UsageStats {
                total: usage.total_tokens,
                system: usage.system_tokens,
                conversation: usage.conversation_tokens,
                remaining: usage.remaining_tokens,
                max: usage.max_tokens,
                utilization_percent: (usage.utilization_percent * 10.0).round() / 10.0,
            },
            message_count: messages.len(),
            strategy: config.strategy,
            optimization_needed: usage.is_near_limit(),
            over_limit: usage.is_over_limit(),
            config: ConfigStats {
                max_context_tokens: config.max_context_tokens,
                summarize_threshold: config.summarize_threshold,
                min_messages_to_keep: config.min_messages_to_keep,
                auto_summarization: config.enable_auto_summarization,
            },
        }
    }
}

impl Pass<'_> {
    fn run(
        &self,
        strategy: ContextStrategy,
        messages: &[Message],
    ) -> Result<Vec<Message>, ContextError> {
        let optimized = match strategy {
            ContextStrategy::TruncateOldest => self.truncate_oldest(messages),
            ContextStrategy::SummarizeOldest => self.summarize_oldest(messages),
            ContextStrategy::KeepRecent => self.keep_recent(messages),
            ContextStrategy::SlidingWindow => self.sliding_window(messages),
        }?;

        if optimized.len() > messages.len() {
            return Err(ContextError::Strategy {
                strategy,
                reason: format!(
                    "produced {} messages from {}",
                    optimized.len(),
                    messages.len()
                ),
            });
        }
        Ok(optimized)
    }

    fn usage(&self, messages: &[Message]) -> TokenUsage {
        self.budget
            .compute_usage(self.system_prompt, messages, self.model)
    }

    /// Drop the oldest messages, a pair at a time, until under the limit or
    /// down to `min_messages_to_keep`.
    fn truncate_oldest(&self, messages: &[Message]) -> Result<Vec<Message>, ContextError> {
        let floor = self.config.min_messages_to_keep;
        let mut start = 0;

        while messages.len() - start > floor {
            if !self.usage(&messages[start..]).is_over_limit() {
                break;
            }
            // Pairs only while the floor allows it
            start += if messages.len() - start - floor >= 2 { 2 } else { 1 };
        }

        Ok(messages[start..].to_vec())
    }

    /// Keep the last `min_messages_to_keep` messages (all of them when that
    /// is zero), then keep dropping the oldest while over the limit. Never
    /// returns an empty history for a non-empty input.
    fn keep_recent(&self, messages: &[Message]) -> Result<Vec<Message>, ContextError> {
        let mut start = match self.config.min_messages_to_keep {
            0 => 0,
            keep => messages.len().saturating_sub(keep),
        };

        while messages.len() - start > 1 && self.usage(&messages[start..]).is_over_limit() {
            start += 1;
        }

        Ok(messages[start..].to_vec())
    }

    /// Replace the older part of the history with a single summary message.
    fn summarize_oldest(&self, messages: &[Message]) -> Result<Vec<Message>, ContextError> {
        let min_keep = self.config.min_messages_to_keep;
        if messages.len() <= min_keep {
            return Ok(messages.to_vec());
        }

        let keep = min_keep.max(messages.len() / 2);
        if keep == 0 {
            return Ok(messages.to_vec());
        }

        let (older, recent) = messages.split_at(messages.len() - keep);
        if older.is_empty() {
            return Ok(messages.to_vec());
        }

        let usage = self.usage(messages);
        if !self.summarizer.should_summarize(&usage, self.config) {
            debug!(
                conversation_tokens = usage.conversation_tokens,
                threshold = self.config.summarize_threshold,
                "Below summarization threshold"
            );
            return Ok(messages.to_vec());
        }

        let summary = self.summarizer.summarize(older, self.config.summary_length);
        debug!(
            summarized = older.len(),
            kept = recent.len(),
            "Summarized older messages"
        );

        let mut optimized = Vec::with_capacity(recent.len() + 1);
        optimized.push(Message::system(format!("{} {}", SUMMARY_MARKER, summary)));
        optimized.extend_from_slice(recent);
        Ok(optimized)
    }

    /// Keep recent messages; if still over the limit, summarize the full
    /// original history instead.
    fn sliding_window(&self, messages: &[Message]) -> Result<Vec<Message>, ContextError> {
        let recent = self.keep_recent(messages)?;

        if self.usage(&recent).is_over_limit() && recent.len() < messages.len() {
            debug!("Recent window still over limit, falling back to summarization");
            return self.summarize_oldest(messages);
        }

        Ok(recent)
    }
}
