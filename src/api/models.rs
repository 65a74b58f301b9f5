use serde::{Deserialize, Serialize};

use crate::api::error::RequestError;
use crate::chat::{PriorTurn, TurnOutcome, TurnRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextEntry {
    pub sender: Sender,
    pub text: String,
    #[serde(default, rename = "isTrap")]
    pub is_trap: Option<bool>,
}

/// Body of `POST /api/chat`. The last context entry is the new user message.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub context: Option<Vec<ContextEntry>>,
}

impl ChatRequest {
    pub fn into_turn_request(self) -> Result<TurnRequest, RequestError> {
        let session_id = required_session_id(self.session_id)?;
        let mut context = self.context.ok_or(RequestError::MissingContext)?;
        let latest = context.pop().ok_or(RequestError::EmptyContext)?;
        if latest.sender != Sender::User {
            return Err(RequestError::LastEntryNotFromUser);
        }

        Ok(TurnRequest {
            session_id,
            user_message: latest.text,
            prior_context: pair_turns(context),
        })
    }
}

/// Folds a flat transcript into user/AI pairs. A user entry without a following AI
/// reply is superseded by the next user entry; AI entries with no preceding user
/// entry are skipped.
pub fn pair_turns(entries: Vec<ContextEntry>) -> Vec<PriorTurn> {
    let mut turns = Vec::with_capacity(entries.len() / 2);
    let mut pending_user: Option<String> = None;

    for entry in entries {
        match entry.sender {
            Sender::User => pending_user = Some(entry.text),
            Sender::Ai => {
                if let Some(user_message) = pending_user.take() {
                    turns.push(PriorTurn::new(user_message, entry.text));
                }
            }
            Sender::Other => {}
        }
    }
    turns
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    #[serde(rename = "isTrap")]
    pub is_trap: bool,
}

impl From<TurnOutcome> for ChatResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            message: outcome.ai_message,
            is_trap: outcome.is_trap,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SetTopicRequest {
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

impl SetTopicRequest {
    pub fn validate(self) -> Result<(String, String), RequestError> {
        let session_id = required_session_id(self.session_id)?;
        let topic = self
            .topic
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(RequestError::BlankTopic)?;
        Ok((session_id, topic))
    }
}

#[derive(Debug, Deserialize)]
pub struct TopicQuery {
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopicResponse {
    pub topic: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub fn required_session_id(session_id: Option<String>) -> Result<String, RequestError> {
    session_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(RequestError::MissingSessionId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: serde_json::Value) -> ChatRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn last_entry_becomes_the_user_message() {
        let req = parse(json!({
            "sessionId": "abc",
            "context": [
                {"sender": "user", "text": "What is 2+2?"},
                {"sender": "ai", "text": "2 + 2 equals 5.", "isTrap": true},
                {"sender": "user", "text": "Are you sure?"}
            ]
        }));
        let turn = req.into_turn_request().unwrap();
        assert_eq!(turn.session_id, "abc");
        assert_eq!(turn.user_message, "Are you sure?");
        assert_eq!(turn.prior_context, vec![PriorTurn::new("What is 2+2?", "2 + 2 equals 5.")]);
    }

    #[test]
    fn unpaired_and_unknown_entries_are_skipped() {
        let entries: Vec<ContextEntry> = serde_json::from_value(json!([
            {"sender": "ai", "text": "orphan"},
            {"sender": "user", "text": "first"},
            {"sender": "user", "text": "second"},
            {"sender": "system", "text": "ignored"},
            {"sender": "ai", "text": "reply"}
        ]))
        .unwrap();
        assert_eq!(pair_turns(entries), vec![PriorTurn::new("second", "reply")]);
    }

    #[test]
    fn rejects_missing_session_and_empty_context() {
        let missing = parse(json!({"context": [{"sender": "user", "text": "hi"}]}));
        assert!(matches!(missing.into_turn_request(), Err(RequestError::MissingSessionId)));

        let blank = parse(json!({"session_id": "  ", "context": []}));
        assert!(matches!(blank.into_turn_request(), Err(RequestError::MissingSessionId)));

        let empty = parse(json!({"session_id": "abc", "context": []}));
        assert!(matches!(empty.into_turn_request(), Err(RequestError::EmptyContext)));

        let absent = parse(json!({"session_id": "abc"}));
        assert!(matches!(absent.into_turn_request(), Err(RequestError::MissingContext)));

        let ai_last = parse(json!({
            "session_id": "abc",
            "context": [{"sender": "user", "text": "hi"}, {"sender": "ai", "text": "hello"}]
        }));
        assert!(matches!(ai_last.into_turn_request(), Err(RequestError::LastEntryNotFromUser)));
    }

    #[test]
    fn topic_is_trimmed_and_required() {
        let req: SetTopicRequest =
            serde_json::from_value(json!({"session_id": "abc", "topic": "  Data Structures "})).unwrap();
        assert_eq!(req.validate().unwrap(), ("abc".to_string(), "Data Structures".to_string()));

        let blank: SetTopicRequest = serde_json::from_value(json!({"session_id": "abc", "topic": ""})).unwrap();
        assert!(matches!(blank.validate(), Err(RequestError::BlankTopic)));
    }
}
