//! context-memory - Fit conversation histories into a model's token budget
//!
//! Before every model call, a chat front-end hands its system prompt and
//! message history to [`ContextOptimizer::optimize`], which measures the
//! context against a token budget and, when it is nearly exhausted, reduces
//! it with one of four strategies.
//!
//! ## Key Features
//!
//! - **Token Accounting**: Deterministic counting through pluggable tokenizers
//! - **Reduction Strategies**: Truncate, keep-recent, summarize, sliding window
//! - **Fail-safe**: Internal failures return the original context untouched
//! - **Metrics Tracking**: Every optimization reports before/after usage

pub mod config;
pub mod context;
pub mod metrics;
pub mod tokens;

pub use config::{Config, ConfigBuilder, ConfigError};
pub use context::{
    BudgetCalculator, ContextError, ContextOptimizer, ContextStrategy, Conversation,
    MemoryConfig, MemoryStats, Message, MessageSummarizer, OptimizationOutcome,
    OptimizedContext, Role, TokenUsage,
};
pub use metrics::{MetricsTracker, OptimizationReport, UsageSink};
pub use tokens::{HeuristicCounter, TiktokenCounter, TokenCounter};
