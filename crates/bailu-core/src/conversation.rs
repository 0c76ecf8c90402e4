//! The conversation store: an ordered message sequence with a cheap token
//! estimate and an auto-compression operator.
//!
//! Treats the context window as a finite, estimated resource, with a
//! deliberately simple cost model: this store compresses wholesale rather
//! than evicting individual tool results.

use crate::{Message, MessageRole};

/// Default token budget before auto-compression becomes eligible.
pub const DEFAULT_TOKEN_BUDGET: f32 = 8000.0;

/// Auto-compression triggers once the estimate crosses this fraction of the budget.
pub const AUTO_COMPRESS_THRESHOLD: f32 = 0.8;

/// Auto-compression additionally requires more than this many messages.
pub const AUTO_COMPRESS_MIN_MESSAGES: usize = 10;

/// Number of trailing messages preserved verbatim by auto-compression.
const KEEP_TAIL_MESSAGES: usize = 6;

/// Number of trailing *rounds* (user/assistant/tool triads, approximated as
/// message count) preserved verbatim by manual compression.
const MANUAL_KEEP_ROUNDS: usize = 3;

/// Estimate the token cost of a string: `1.5` per CJK-range character plus
/// `0.25` per ascii-alphabetic word. Deliberately cheap and monotonic — this
/// is a budget heuristic, not a tokenizer.
pub fn estimate_tokens(text: &str) -> f32 {
    let cjk_chars = text
        .chars()
        .filter(|c| {
            let cp = *c as u32;
            (0x4E00..=0x9FFF).contains(&cp)
                || (0x3040..=0x30FF).contains(&cp)
                || (0xAC00..=0xD7A3).contains(&cp)
        })
        .count();

    let ascii_words = text
        .split_whitespace()
        .filter(|w| w.chars().any(|c| c.is_ascii_alphabetic()))
        .count();

    cjk_chars as f32 * 1.5 + ascii_words as f32 * 0.25
}

/// An ordered sequence of [`Message`]s with token-estimation and compression.
///
/// Invariants: non-empty; element 0 is system-role; no two adjacent
/// messages share both role and content; after compression, the first two
/// elements are `{system, compression-marker}` and the tail retains the last
/// six messages verbatim.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Start a new conversation with the given system message.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// Wrap an existing message sequence (e.g. loaded from a session file).
    /// The caller is responsible for the index-0-is-system invariant.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replace the system message (index 0) in place — used to refresh the
    /// injected tool-documentation appendix idempotently.
    pub fn set_system(&mut self, content: impl Into<String>) {
        if let Some(first) = self.messages.first_mut() {
            if first.role == MessageRole::System {
                first.content = Some(content.into());
                return;
            }
        }
        self.messages.insert(0, Message::system(content));
    }

    /// Every message excluding the system message at index 0 — the shape the
    /// orchestrator hands back to an embedding REPL.
    pub fn messages_excluding_system(&self) -> &[Message] {
        if self.messages.is_empty() {
            &[]
        } else {
            &self.messages[1..]
        }
    }

    /// Sum of per-message token estimates.
    pub fn estimate_tokens(&self) -> f32 {
        self.messages.iter().map(Message::estimate_tokens).sum()
    }

    /// Whether auto-compression should run before the next round: estimate
    /// exceeds `threshold * budget`, AND message count exceeds the minimum.
    pub fn should_auto_compress(&self) -> bool {
        self.should_auto_compress_with(DEFAULT_TOKEN_BUDGET, AUTO_COMPRESS_THRESHOLD)
    }

    pub fn should_auto_compress_with(&self, budget: f32, threshold: f32) -> bool {
        self.messages.len() > AUTO_COMPRESS_MIN_MESSAGES
            && self.estimate_tokens() > budget * threshold
    }

    /// Replace everything between the system message and the last six
    /// messages with a single elision-marker message. No-op if there
    /// is nothing to elide.
    pub fn compress(&mut self) {
        self.compress_keeping(KEEP_TAIL_MESSAGES);
    }

    /// Manual compression: "retain last 3 rounds" — approximated as the last
    /// six messages, the same tail width as auto-compression, since a round
    /// is a user-turn followed by an assistant/tool exchange.
    pub fn compress_manual(&mut self) {
        self.compress_keeping(MANUAL_KEEP_ROUNDS * 2);
    }

    fn compress_keeping(&mut self, keep_tail: usize) {
        if self.messages.len() <= keep_tail + 1 {
            return; // nothing meaningful to elide
        }

        let system = self.messages[0].clone();
        let tail_start = self.messages.len() - keep_tail;
        let elided_count = tail_start - 1;
        let tail = self.messages[tail_start..].to_vec();

        let marker = Message::system(format!(
            "[{elided_count} earlier message(s) elided by compression]"
        ));

        let mut rebuilt = Vec::with_capacity(2 + tail.len());
        rebuilt.push(system);
        rebuilt.push(marker);
        rebuilt.extend(tail);
        self.messages = rebuilt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_counts_ascii_words_and_cjk_chars() {
        assert_eq!(estimate_tokens(""), 0.0);
        assert_eq!(estimate_tokens("hello world"), 0.5);
        assert!((estimate_tokens("你好") - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn new_conversation_has_system_at_index_zero() {
        let conv = Conversation::new("be helpful");
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.messages()[0].role, MessageRole::System);
    }

    #[test]
    fn messages_excluding_system_drops_only_index_zero() {
        let mut conv = Conversation::new("sys");
        conv.push(Message::user("hi"));
        conv.push(Message::assistant_text("hello"));
        assert_eq!(conv.messages_excluding_system().len(), 2);
    }

    #[test]
    fn set_system_replaces_in_place_idempotently() {
        let mut conv = Conversation::new("v1");
        conv.push(Message::user("hi"));
        conv.set_system("v2");
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages()[0].content.as_deref(), Some("v2"));
    }

    #[test]
    fn auto_compress_trigger_requires_both_conditions() {
        let mut conv = Conversation::new("sys");
        for i in 0..5 {
            conv.push(Message::user(format!("msg {i}")));
        }
        // Few messages, short content: should not trigger even with a tiny budget.
        assert!(!conv.should_auto_compress_with(1.0, 0.8));
    }

    #[test]
    fn compress_preserves_system_and_tail() {
        let mut conv = Conversation::new("sys");
        for i in 0..20 {
            conv.push(Message::user(format!("msg {i}")));
        }
        let tail_before: Vec<String> = conv.messages()[conv.len() - 6..]
            .iter()
            .map(|m| m.content.clone().unwrap_or_default())
            .collect();

        conv.compress();

        assert_eq!(conv.messages()[0].role, MessageRole::System);
        assert_eq!(conv.messages()[0].content.as_deref(), Some("sys"));
        assert_eq!(conv.messages()[1].role, MessageRole::System);
        assert!(conv.messages()[1].content.as_deref().unwrap().contains("elided"));

        let tail_after: Vec<String> = conv.messages()[2..]
            .iter()
            .map(|m| m.content.clone().unwrap_or_default())
            .collect();
        assert_eq!(tail_after, tail_before);
    }

    #[test]
    fn compress_is_noop_when_nothing_to_elide() {
        let mut conv = Conversation::new("sys");
        conv.push(Message::user("only one"));
        let before = conv.len();
        conv.compress();
        assert_eq!(conv.len(), before);
    }

    #[test]
    fn compress_manual_keeps_last_three_rounds() {
        let mut conv = Conversation::new("sys");
        for i in 0..20 {
            conv.push(Message::user(format!("msg {i}")));
        }
        conv.compress_manual();
        // system + marker + 6 tail messages (3 rounds * 2)
        assert_eq!(conv.len(), 8);
    }
}
