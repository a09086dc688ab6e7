//! Token budget accounting

use super::{Message, TokenUsage};
use crate::tokens::TokenCounter;
use std::sync::Arc;

/// Fixed per-message formatting overhead, in tokens
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Measures a system prompt plus message history against a token budget
#[derive(Clone)]
pub struct BudgetCalculator {
    counter: Arc<dyn TokenCounter>,
    max_tokens: usize,
}

impl BudgetCalculator {
    pub fn new(counter: Arc<dyn TokenCounter>, max_tokens: usize) -> Self {
        Self {
            counter,
            max_tokens,
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Compute a fresh usage snapshot
    pub fn compute_usage(
        &self,
        system_prompt: &str,
        messages: &[Message],
        model: &str,
    ) -> TokenUsage {
        let system_tokens = if system_prompt.is_empty() {
            0
        } else {
            self.counter.count_tokens(system_prompt, model)
        };

        TokenUsage::new(
            system_tokens,
            self.estimate_tokens(messages, model),
            self.max_tokens,
        )
    }

    /// Conversation tokens only: role + content + formatting overhead per message
    pub fn estimate_tokens(&self, messages: &[Message], model: &str) -> usize {
        messages
            .iter()
            .map(|msg| self.message_tokens(msg, model))
            .sum()
    }

    pub fn message_tokens(&self, message: &Message, model: &str) -> usize {
        self.counter.count_tokens(message.role.as_str(), model)
            + self.counter.count_tokens(&message.content, model)
            + MESSAGE_OVERHEAD_TOKENS
    }
}

impl std::fmt::Debug for BudgetCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetCalculator")
            .field("counter", &self.counter.name())
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::WordCounter;
    use crate::tokens::TiktokenCounter;

    fn calculator(max_tokens: usize) -> BudgetCalculator {
        BudgetCalculator::new(Arc::new(WordCounter), max_tokens)
    }

    #[test]
    fn test_compute_usage() {
        let messages = vec![
            Message::user("Hello there friend"),
            Message::assistant("Hi"),
        ];
        let usage = calculator(100).compute_usage("You are helpful", &messages, "gpt-4");

        assert_eq!(usage.system_tokens, 3);
        // (1 + 3 + 4) + (1 + 1 + 4)
        assert_eq!(usage.conversation_tokens, 14);
        assert_eq!(usage.total_tokens, 17);
        assert_eq!(usage.remaining_tokens, 83);
        assert_eq!(usage.max_tokens, 100);
    }

    #[test]
    fn test_empty_prompt_and_history() {
        let usage = calculator(100).compute_usage("", &[], "gpt-4");
        assert_eq!(usage.total_tokens, 0);
        assert_eq!(usage.remaining_tokens, 100);
        assert_eq!(usage.utilization_percent, 0.0);
    }

    #[test]
    fn test_estimate_tokens_with_tiktoken() {
        let calc = BudgetCalculator::new(Arc::new(TiktokenCounter::new()), 4000);
        let messages = vec![Message::user("Hello"), Message::assistant("Hi there!")];
        let tokens = calc.estimate_tokens(&messages, "gpt-3.5-turbo");
        assert!(tokens > 2 * MESSAGE_OVERHEAD_TOKENS);
        assert!(tokens < 20);
    }

    #[test]
    fn test_usage_is_deterministic() {
        let calc = BudgetCalculator::new(Arc::new(TiktokenCounter::new()), 4000);
        let messages = vec![Message::user("What is the capital of France?")];
        let first = calc.compute_usage("Be brief.", &messages, "gpt-4");
        let second = calc.compute_usage("Be brief.", &messages, "gpt-4");
        assert_eq!(first, second);
    }
}
