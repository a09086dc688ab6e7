//! Conversation context management
//!
//! Decides, before every model call, how much of an accumulating message
//! history fits inside a fixed token budget and how to reduce it when it
//! does not.

mod budget;
mod optimizer;
mod summarizer;

pub use budget::{BudgetCalculator, MESSAGE_OVERHEAD_TOKENS};
pub use optimizer::{
    ConfigStats, ContextOptimizer, MemoryStats, OptimizationOutcome, OptimizedContext,
    UsageStats, SUMMARY_MARKER,
};
pub use summarizer::MessageSummarizer;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised inside context optimization. They never reach the caller of
/// [`ContextOptimizer::optimize`]; they are reported alongside the original
/// context instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("Invalid memory configuration: {0}")]
    InvalidConfig(String),

    #[error("Strategy {strategy} failed: {reason}")]
    Strategy {
        strategy: ContextStrategy,
        reason: String,
    },
}

impl ContextError {
    /// Stable label used when grouping errors
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::Strategy { .. } => "strategy",
        }
    }
}

/// Speaker of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A system prompt plus its message history, as exchanged by the CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Reduction strategy applied when a context nears its budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStrategy {
    /// Drop the oldest messages, a question/answer pair at a time
    TruncateOldest,
    /// Replace the older half of the history with a summary
    SummarizeOldest,
    /// Keep only the most recent messages
    KeepRecent,
    /// Keep recent messages, summarize if that is not enough
    #[default]
    SlidingWindow,
}

impl ContextStrategy {
    pub const ALL: [ContextStrategy; 4] = [
        Self::TruncateOldest,
        Self::SummarizeOldest,
        Self::KeepRecent,
        Self::SlidingWindow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TruncateOldest => "truncate_oldest",
            Self::SummarizeOldest => "summarize_oldest",
            Self::KeepRecent => "keep_recent",
            Self::SlidingWindow => "sliding_window",
        }
    }
}

impl fmt::Display for ContextStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextStrategy {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == name)
            .ok_or_else(|| ContextError::InvalidConfig(format!("unknown strategy: {}", s)))
    }
}

/// Configuration for context optimization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Hard token budget for system prompt plus history
    pub max_context_tokens: usize,

    /// Strategy used once the budget is nearly exhausted
    pub strategy: ContextStrategy,

    /// Conversation tokens above which summarization kicks in
    pub summarize_threshold: usize,

    /// Messages that truncation never goes below
    pub min_messages_to_keep: usize,

    /// Summarize older messages regardless of the threshold
    pub enable_auto_summarization: bool,

    /// Target length of generated summaries, in tokens
    pub summary_length: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 4000,
            strategy: ContextStrategy::SlidingWindow,
            summarize_threshold: 3000,
            min_messages_to_keep: 4,
            enable_auto_summarization: true,
            summary_length: 200,
        }
    }
}

impl MemoryConfig {
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.max_context_tokens == 0 {
            return Err(ContextError::InvalidConfig(
                "max_context_tokens must be greater than zero".to_string(),
            ));
        }
        if self.summary_length == 0 {
            return Err(ContextError::InvalidConfig(
                "summary_length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Token accounting snapshot for one system prompt and message history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total_tokens: usize,
    pub system_tokens: usize,
    pub conversation_tokens: usize,
    pub remaining_tokens: usize,
    pub max_tokens: usize,
    pub utilization_percent: f64,
}

impl TokenUsage {
    pub fn new(system_tokens: usize, conversation_tokens: usize, max_tokens: usize) -> Self {
        let total_tokens = system_tokens + conversation_tokens;
        let utilization_percent = if max_tokens > 0 {
            total_tokens as f64 * 100.0 / max_tokens as f64
        } else {
            0.0
        };

        Self {
            total_tokens,
            system_tokens,
            conversation_tokens,
            remaining_tokens: max_tokens.saturating_sub(total_tokens),
            max_tokens,
            utilization_percent,
        }
    }

    /// More than 80% of the budget is used
    pub fn is_near_limit(&self) -> bool {
        self.utilization_percent > 80.0
    }

    pub fn is_over_limit(&self) -> bool {
        self.total_tokens > self.max_tokens
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_memory_config() {
        let config = MemoryConfig::default();
        assert_eq!(config.max_context_tokens, 4000);
        assert_eq!(config.strategy, ContextStrategy::SlidingWindow);
        assert_eq!(config.summarize_threshold, 3000);
        assert_eq!(config.min_messages_to_keep, 4);
        assert!(config.enable_auto_summarization);
        assert_eq!(config.summary_length, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_memory_config() {
        let config = MemoryConfig {
            max_context_tokens: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ContextError::InvalidConfig(_))));

        let config = MemoryConfig {
            summary_length: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_usage_invariants() {
        let usage = TokenUsage::new(100, 750, 1000);
        assert_eq!(usage.total_tokens, 850);
        assert_eq!(usage.remaining_tokens, 150);
        assert!((usage.utilization_percent - 85.0).abs() < 1e-9);
        assert!(usage.is_near_limit());
        assert!(!usage.is_over_limit());

        let over = TokenUsage::new(600, 600, 1000);
        assert_eq!(over.remaining_tokens, 0);
        assert!(over.is_over_limit());
    }

    #[test]
    fn test_token_usage_zero_budget() {
        let usage = TokenUsage::new(10, 10, 0);
        assert_eq!(usage.utilization_percent, 0.0);
        assert_eq!(usage.remaining_tokens, 0);
        assert!(!usage.is_near_limit());
        assert!(usage.is_over_limit());
    }

    #[test]
    fn test_exactly_eighty_percent_is_not_near_limit() {
        let usage = TokenUsage::new(0, 800, 1000);
        assert!(!usage.is_near_limit());
    }

    #[test]
    fn test_strategy_names() {
        let names: Vec<_> = ContextStrategy::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec!["truncate_oldest", "summarize_oldest", "keep_recent", "sliding_window"]
        );
        assert_eq!(
            "Keep_Recent".parse::<ContextStrategy>(),
            Ok(ContextStrategy::KeepRecent)
        );
        assert!("newest_first".parse::<ContextStrategy>().is_err());
    }

    #[test]
    fn test_message_serialization() {
        let message = Message::assistant("Hi there!");
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"Hi there!"}"#);

        let conversation: Conversation = serde_json::from_str(
            r#"{"messages":[{"role":"user","content":"Hello"}]}"#,
        )
        .unwrap();
        assert_eq!(conversation.system_prompt, "");
        assert_eq!(conversation.messages, vec![Message::user("Hello")]);
    }
}
