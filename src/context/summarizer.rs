//! Rule-based summarization of older conversation turns

use super::{MemoryConfig, Message, Role, TokenUsage};
use indexmap::IndexSet;
use regex::Regex;
use std::sync::OnceLock;

/// Keywords that mark a user message as a question
const QUESTION_KEYWORDS: [&str; 7] = ["what", "how", "why", "when", "where", "can you", "tell me"];

const SNIPPET_CHARS: usize = 100;
const MAX_EXAMPLES: usize = 3;
const MAX_TOPICS: usize = 5;
const MIN_TOPIC_CHARS: usize = 5;
const CHARS_PER_TOKEN: usize = 4;
const ELLIPSIS: &str = "...";

fn word_pattern() -> &'static Regex {
    static WORDS: OnceLock<Regex> = OnceLock::new();
    WORDS.get_or_init(|| Regex::new(r"\b\w+\b").expect("word pattern is valid"))
}

/// Condenses a batch of messages into a short synthetic description.
///
/// Deterministic and model free: the same messages always produce the same
/// summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageSummarizer;

impl MessageSummarizer {
    pub fn new() -> Self {
        Self
    }

    /// Summarization runs when the conversation is past the threshold, or
    /// unconditionally when auto summarization is enabled.
    pub fn should_summarize(&self, usage: &TokenUsage, config: &MemoryConfig) -> bool {
        usage.conversation_tokens > config.summarize_threshold || config.enable_auto_summarization
    }

    /// Summarize `messages` into at most `target_tokens * 4` characters
    pub fn summarize(&self, messages: &[Message], target_tokens: usize) -> String {
        if messages.is_empty() {
            return String::new();
        }

        let mut user_questions = Vec::new();
        let mut assistant_responses = 0usize;
        let mut topics: IndexSet<String> = IndexSet::new();

        for msg in messages {
            match msg.role {
                Role::User => {
                    let lowered = msg.content.to_lowercase();
                    if QUESTION_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
                        user_questions.push(truncate_chars(&msg.content, SNIPPET_CHARS));
                    } else {
                        user_questions.push("User input".to_string());
                    }

                    topics.extend(
                        word_pattern()
                            .find_iter(&lowered)
                            .map(|m| m.as_str())
                            .filter(|word| word.chars().count() >= MIN_TOPIC_CHARS)
                            .map(str::to_string),
                    );
                }
                Role::Assistant => assistant_responses += 1,
                Role::System => {}
            }
        }

        let mut parts = Vec::new();

        if !user_questions.is_empty() {
            let examples: Vec<&str> = user_questions
                .iter()
                .take(MAX_EXAMPLES)
                .map(String::as_str)
                .collect();
            parts.push(format!(
                "Previous discussion covered {} user questions including: {}",
                user_questions.len(),
                examples.join(", ")
            ));
        }

        if !topics.is_empty() {
            let top: Vec<&str> = topics.iter().take(MAX_TOPICS).map(String::as_str).collect();
            parts.push(format!("Topics discussed: {}", top.join(", ")));
        }

        if assistant_responses > 0 {
            parts.push(format!(
                "Assistant provided {} responses with guidance and information.",
                assistant_responses
            ));
        }

        let summary = parts.join(" ");
        let max_chars = target_tokens.saturating_mul(CHARS_PER_TOKEN);
        if summary.chars().count() > max_chars {
            let kept: String = summary
                .chars()
                .take(max_chars.saturating_sub(ELLIPSIS.len()))
                .collect();
            format!("{}{}", kept, ELLIPSIS)
        } else {
            summary
        }
    }
}

/// First `max_chars` characters, with an ellipsis if anything was cut
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let kept: String = text.chars().take(max_chars).collect();
        format!("{}{}", kept, ELLIPSIS)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch() {
        assert_eq!(MessageSummarizer::new().summarize(&[], 200), "");
    }

    #[test]
    fn test_summary_sentences() {
        let messages = vec![
            Message::user("What is ownership in Rust?"),
            Message::assistant("Ownership is a set of rules..."),
            Message::user("Thanks, that helps"),
            Message::assistant("Glad to help."),
        ];

        let summary = MessageSummarizer::new().summarize(&messages, 200);
        assert_eq!(
            summary,
            "Previous discussion covered 2 user questions including: \
             What is ownership in Rust?, User input \
             Topics discussed: ownership, thanks, helps \
             Assistant provided 2 responses with guidance and information."
        );
    }

    #[test]
    fn test_examples_and_topics_are_capped() {
        let messages: Vec<Message> = [
            "how do closures capture variables",
            "why does borrowing matter here",
            "when should lifetimes appear explicitly",
            "where are traits resolved",
        ]
        .iter()
        .map(|q| Message::user(*q))
        .collect();

        let summary = MessageSummarizer::new().summarize(&messages, 500);
        assert!(summary.starts_with("Previous discussion covered 4 user questions including: "));
        assert!(summary.contains("when should lifetimes appear explicitly"));
        assert!(!summary.contains("where are traits resolved"));
        assert!(summary.contains(
            "Topics discussed: closures, capture, variables, borrowing, matter"
        ));
        assert!(!summary.contains("Assistant provided"));
    }

    #[test]
    fn test_long_question_snippet_is_truncated() {
        let question = format!("Can you explain {}", "x".repeat(200));
        let summary = MessageSummarizer::new().summarize(&[Message::user(question.clone())], 500);
        let snippet: String = question.chars().take(100).collect();
        assert!(summary.contains(&format!("{}...", snippet)));
    }

    #[test]
    fn test_summary_respects_target_length() {
        let messages: Vec<Message> = (0..30)
            .map(|i| Message::user(format!("What about topic{} and subject{}", i, i)))
            .collect();

        let summary = MessageSummarizer::new().summarize(&messages, 10);
        assert_eq!(summary.chars().count(), 40);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn test_topics_have_no_duplicates() {
        let messages = vec![
            Message::user("rust rust macros macros"),
            Message::user("Macros again"),
        ];
        let summary = MessageSummarizer::new().summarize(&messages, 200);
        assert!(summary.contains("Topics discussed: macros, again"));
    }

    #[test]
    fn test_should_summarize() {
        let summarizer = MessageSummarizer::new();
        let usage = TokenUsage::new(0, 100, 1000);

        let forced = MemoryConfig::default();
        assert!(summarizer.should_summarize(&usage, &forced));

        let manual = MemoryConfig {
            enable_auto_summarization: false,
            summarize_threshold: 50,
            ..Default::default()
        };
        assert!(summarizer.should_summarize(&usage, &manual));

        let below = MemoryConfig {
            enable_auto_summarization: false,
            ..Default::default()
        };
        assert!(!summarizer.should_summarize(&usage, &below));
    }
}
