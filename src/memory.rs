//! Token-bounded conversation memory.
//!
//! The agent does not replay a user's whole history. [`ChatMemory::window`]
//! keeps the newest messages whose combined cost fits the token limit, where
//! a message costs its content tokens plus a fixed per-message overhead for
//! the role framing. The oldest messages fall out first, and a window never
//! opens on an assistant reply without the user message that prompted it.

use crate::chunk::TokenCounter;
use crate::models::{ChatMessage, ChatRole};

/// Framing tokens charged per message on top of its content.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

#[derive(Debug, Clone)]
pub struct ChatMemory {
    counter: TokenCounter,
    token_limit: usize,
}

impl ChatMemory {
    pub fn new(counter: TokenCounter, token_limit: usize) -> Self {
        Self {
            counter,
            token_limit,
        }
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }

    pub fn message_tokens(&self, message: &ChatMessage) -> usize {
        self.counter.count(&message.content) + MESSAGE_OVERHEAD_TOKENS
    }

    /// Newest suffix of `history` within the limit.
    pub fn window<'a>(&self, history: &'a [ChatMessage]) -> &'a [ChatMessage] {
        let mut used = 0;
        let mut start = history.len();
        for (i, message) in history.iter().enumerate().rev() {
            let cost = self.message_tokens(message);
            if used + cost > self.token_limit {
                break;
            }
            used += cost;
            start = i;
        }

        while start < history.len() && history[start].role == ChatRole::Assistant {
            start += 1;
        }
        &history[start..]
    }

    pub fn window_tokens(&self, history: &[ChatMessage]) -> usize {
        self.window(history)
            .iter()
            .map(|m| self.message_tokens(m))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(limit: usize) -> ChatMemory {
        ChatMemory::new(TokenCounter::new().unwrap(), limit)
    }

    fn history(n: usize) -> Vec<ChatMessage> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("câu hỏi số {}", i))
                } else {
                    ChatMessage::assistant(format!("trả lời số {}", i))
                }
            })
            .collect()
    }

    #[test]
    fn everything_fits_under_a_large_limit() {
        let m = memory(3000);
        let h = history(6);
        assert_eq!(m.window(&h).len(), 6);
    }

    #[test]
    fn keeps_newest_within_limit() {
        let h = history(40);
        let m = memory(60);
        let w = m.window(&h);
        assert!(!w.is_empty());
        assert!(w.len() < h.len());
        assert_eq!(w.last(), h.last());
        assert!(m.window_tokens(&h) <= 60);
    }

    #[test]
    fn window_never_starts_with_assistant() {
        let h = history(41);
        for limit in [10, 25, 40, 55, 70, 85] {
            let w = memory(limit).window(&h);
            if let Some(first) = w.first() {
                assert_eq!(first.role, ChatRole::User, "limit {}", limit);
            }
        }
    }

    #[test]
    fn oversized_newest_message_gives_empty_window() {
        let h = vec![ChatMessage::user("từ ".repeat(200))];
        assert!(memory(20).window(&h).is_empty());
    }

    #[test]
    fn empty_history() {
        assert!(memory(100).window(&[]).is_empty());
    }
}
