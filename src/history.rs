//! Conversation history replayed with every request.
//!
//! The whole history is serialized into each outbound request; nothing is
//! truncated locally, so context growth is bounded only by the model's input
//! limit.

use crate::ai::gemini::Part;
use crate::models::{Role, Turn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_turn(&mut self, role: Role, parts: Vec<Part>) {
        tracing::debug!(
            "Appending {:?} turn with {} part(s) (history: {} turn(s))",
            role,
            parts.len(),
            self.turns.len() + 1
        );
        self.turns.push(Turn::new(role, parts));
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Swap in an entirely new history, e.g. a restored conversation.
    pub fn replace(&mut self, turns: Vec<Turn>) {
        self.turns = turns;
    }

    /// Turns in arrival order.
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
