#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use trapchat::chat::{RecorderSettings, TurnOrchestrator, TurnRecorder};
use trapchat::config::{ChatConfig, DatabaseConfig, HistorySource, PersistenceConfig};
use trapchat::db::{get_connection, DuckDbStore, NewTurn, StoreError, TopicStore, Turn, TurnStore};
use trapchat::llm::models::{ChatOptions, ChatResponse, Message};
use trapchat::llm::{LlmError, LlmProvider};

pub const FALLBACK: &str = "[Error: Could not get response from AI.]";

pub fn memory_store() -> DuckDbStore {
    let pool = get_connection(&DatabaseConfig { path: ":memory:".to_string() }).unwrap();
    DuckDbStore::new(pool)
}

pub fn chat_config(trap_probability: f64, history_source: HistorySource) -> ChatConfig {
    ChatConfig {
        trap_probability,
        history_source,
        ..ChatConfig::default()
    }
}

pub fn fast_recorder_settings(max_attempts: u32) -> RecorderSettings {
    RecorderSettings::from(&PersistenceConfig {
        queue_capacity: 64,
        max_attempts,
        backoff_ms: 0,
    })
}

/// Orchestrator over a fresh in-memory DuckDB for both stores.
pub fn orchestrator(llm: Arc<dyn LlmProvider>, chat: ChatConfig) -> (TurnOrchestrator, DuckDbStore) {
    let store = memory_store();
    let shared = Arc::new(store.clone());
    let (recorder, _writer) = TurnRecorder::spawn(shared.clone(), fast_recorder_settings(3));
    let orchestrator = TurnOrchestrator::new(shared.clone(), shared, llm, recorder, chat).unwrap();
    (orchestrator, store)
}

/// Answers every prompt and remembers what it was sent.
#[derive(Default)]
pub struct RecordingProvider {
    pub calls: Mutex<Vec<(Vec<Message>, ChatOptions)>>,
}

impl RecordingProvider {
    pub fn last_context(&self) -> Vec<Message> {
        self.calls.lock().unwrap().last().map(|(m, _)| m.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.calls.lock().unwrap().push((messages.to_vec(), options));
        Ok(ChatResponse {
            content: format!("You said: {}", last),
            model: "fake-model".to_string(),
            usage: None,
        })
    }
}

/// Always fails, like an unreachable model endpoint.
pub struct FailingProvider;

#[async_trait]
impl LlmProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn chat(&self, _messages: &[Message], _options: ChatOptions) -> Result<ChatResponse, LlmError> {
        Err(LlmError::Network("connection refused".to_string()))
    }
}

/// Fails the first `failures` writes, then stores turns in memory.
pub struct FlakyTurnStore {
    failures: u32,
    pub attempts: AtomicU32,
    pub saved: Mutex<Vec<Turn>>,
}

impl FlakyTurnStore {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: AtomicU32::new(0),
            saved: Mutex::new(Vec::new()),
        }
    }

    pub fn saved_count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }
}

#[async_trait]
impl TurnStore for FlakyTurnStore {
    async fn append_turn(&self, turn: &NewTurn) -> Result<Turn, StoreError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(StoreError::Unavailable(format!("attempt {attempt} refused")));
        }
        let mut saved = self.saved.lock().unwrap();
        let stored = turn.clone().into_turn(saved.len() as i64 + 1);
        saved.push(stored.clone());
        Ok(stored)
    }

    async fn recent_turns(&self, _session_id: &str, _limit: usize) -> Result<Vec<Turn>, StoreError> {
        Err(StoreError::Unavailable("reads disabled".to_string()))
    }

    async fn session_turns(&self, _session_id: &str, _limit: usize) -> Result<Vec<Turn>, StoreError> {
        Err(StoreError::Unavailable("reads disabled".to_string()))
    }

    async fn list_turns(&self) -> Result<Vec<Turn>, StoreError> {
        Ok(self.saved.lock().unwrap().clone())
    }
}

/// A topic store whose backend is down.
pub struct BrokenTopicStore;

#[async_trait]
impl TopicStore for BrokenTopicStore {
    async fn get_topic(&self, _session_id: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("topic backend down".to_string()))
    }

    async fn set_topic(&self, _session_id: &str, _topic: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("topic backend down".to_string()))
    }
}
