use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted user/AI exchange. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: i64,
    pub session_id: String,
    pub user_message: String,
    pub ai_message: String,
    pub is_trap: bool,
    pub timestamp: DateTime<Utc>,
}

/// A turn that has not been written yet; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTurn {
    pub session_id: String,
    pub user_message: String,
    pub ai_message: String,
    pub is_trap: bool,
    pub timestamp: DateTime<Utc>,
}

impl NewTurn {
    pub fn into_turn(self, id: i64) -> Turn {
        Turn {
            id,
            session_id: self.session_id,
            user_message: self.user_message,
            ai_message: self.ai_message,
            is_trap: self.is_trap,
            timestamp: self.timestamp,
        }
    }
}
