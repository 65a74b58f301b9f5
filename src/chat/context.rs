use crate::db::models::Turn;
use crate::llm::models::Message;

/// The text half of a stored turn, as the model gets to see it. The trap flag is
/// deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorTurn {
    pub user_message: String,
    pub ai_message: String,
}

impl PriorTurn {
    pub fn new(user_message: impl Into<String>, ai_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            ai_message: ai_message.into(),
        }
    }
}

impl From<Turn> for PriorTurn {
    fn from(turn: Turn) -> Self {
        Self {
            user_message: turn.user_message,
            ai_message: turn.ai_message,
        }
    }
}

pub fn topic_instruction(topic: &str) -> String {
    format!("You are helping the user solve a problem related to: {}", topic)
}

/// Builds the prompt for one turn: optional topic instruction, the most recent
/// `max_turns` prior turns as user/assistant pairs, then the new user message.
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    max_turns: usize,
}

impl ContextAssembler {
    pub fn new(max_turns: usize) -> Self {
        Self { max_turns }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn assemble(&self, topic: Option<&str>, prior: &[PriorTurn], user_message: &str) -> Vec<Message> {
        let window = &prior[prior.len().saturating_sub(self.max_turns)..];
        let mut messages = Vec::with_capacity(window.len() * 2 + 2);

        if let Some(topic) = topic.map(str::trim).filter(|t| !t.is_empty()) {
            messages.push(Message::system(topic_instruction(topic)));
        }

        for turn in window {
            messages.push(Message::user(turn.user_message.as_str()));
            messages.push(Message::assistant(turn.ai_message.as_str()));
        }

        messages.push(Message::user(user_message));
        messages
    }
}
