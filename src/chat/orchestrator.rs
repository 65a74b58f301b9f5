use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chat::context::{ContextAssembler, PriorTurn};
use crate::chat::recorder::{RecorderSettings, TurnRecorder};
use crate::chat::trap::{TrapCatalog, TrapError, TrapGate, TurnOutcome};
use crate::config::{AppConfig, ChatConfig, HistorySource};
use crate::db::{models::{NewTurn, Turn}, DuckDbStore, StoreError, TopicStore, TurnStore};
use crate::llm::{models::{ChatOptions, Message}, LlmProvider};

/// One submitted user message plus whatever history the caller sent with it.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: String,
    pub user_message: String,
    pub prior_context: Vec<PriorTurn>,
}

/// Runs a single turn: topic lookup, context assembly, model call, trap gate and
/// hand-off to the turn log. Holds no per-session state; every collaborator is
/// injected so tests can swap in fakes.
pub struct TurnOrchestrator {
    topics: Arc<dyn TopicStore>,
    turns: Arc<dyn TurnStore>,
    llm: Arc<dyn LlmProvider>,
    recorder: TurnRecorder,
    assembler: ContextAssembler,
    traps: TrapGate,
    settings: ChatConfig,
}

impl TurnOrchestrator {
    pub fn new(
        topics: Arc<dyn TopicStore>,
        turns: Arc<dyn TurnStore>,
        llm: Arc<dyn LlmProvider>,
        recorder: TurnRecorder,
        settings: ChatConfig,
    ) -> Result<Self, TrapError> {
        let catalog = TrapCatalog::new(settings.trap_catalog.iter().cloned())?;
        let traps = TrapGate::new(settings.trap_probability, catalog)?;

        Ok(Self {
            topics,
            turns,
            llm,
            recorder,
            assembler: ContextAssembler::new(settings.history_turns),
            traps,
            settings,
        })
    }

    /// Wires the DuckDB store into both store seams and starts the turn log writer.
    pub fn from_config(
        config: &AppConfig,
        store: DuckDbStore,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<(Self, JoinHandle<()>), TrapError> {
        let store = Arc::new(store);
        let (recorder, writer) = TurnRecorder::spawn(store.clone(), RecorderSettings::from(&config.persistence));
        let orchestrator = Self::new(store.clone(), store, llm, recorder, config.chat.clone())?;
        Ok((orchestrator, writer))
    }

    pub fn provider_name(&self) -> &str {
        self.llm.name()
    }

    /// Never fails: a store error reads as "no topic".
    pub async fn resolve_topic(&self, session_id: &str) -> Option<String> {
        match self.topics.get_topic(session_id).await {
            Ok(topic) => topic,
            Err(e) => {
                warn!(session_id, "Topic lookup failed, continuing without topic: {}", e);
                None
            }
        }
    }

    /// Upserts the session topic. A store error is logged and dropped.
    pub async fn set_topic(&self, session_id: &str, topic: &str) {
        match self.topics.set_topic(session_id, topic.trim()).await {
            Ok(()) => info!(session_id, "Topic set"),
            Err(e) => warn!(session_id, "Failed to persist topic: {}", e),
        }
    }

    pub async fn submit_turn(&self, request: TurnRequest) -> TurnOutcome {
        let TurnRequest { session_id, user_message, prior_context } = request;

        let topic = self.resolve_topic(&session_id).await;
        let prior = self.prior_turns(&session_id, prior_context).await;
        let context = self.assembler.assemble(topic.as_deref(), &prior, &user_message);

        let (draft, model_failed) = self.draft_answer(&context).await;

        let outcome = if model_failed && !self.settings.trap_on_failure {
            TurnOutcome { ai_message: draft, is_trap: false }
        } else {
            self.roll_trap(draft)
        };

        self.recorder.record(NewTurn {
            session_id,
            user_message,
            ai_message: outcome.ai_message.clone(),
            is_trap: outcome.is_trap,
            timestamp: Utc::now(),
        });

        outcome
    }

    /// All persisted turns, newest first.
    pub async fn turn_log(&self) -> Result<Vec<Turn>, StoreError> {
        self.turns.list_turns().await
    }

    /// A session's turns, oldest first.
    pub async fn session_history(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, StoreError> {
        self.turns.session_turns(session_id, limit).await
    }

    /// Waits for queued turn writes to finish.
    pub async fn flush(&self) {
        self.recorder.flush().await;
    }

    /// Closes the turn log queue; the writer exits once it has drained.
    pub async fn close(&self) {
        self.recorder.close().await;
    }

    async fn prior_turns(&self, session_id: &str, supplied: Vec<PriorTurn>) -> Vec<PriorTurn> {
        match self.settings.history_source {
            HistorySource::Client => supplied,
            HistorySource::Server => {
                match self.recorder.recent_turns(session_id, self.assembler.max_turns()).await {
                    Ok(recent) => recent,
                    Err(e) => {
                        warn!(session_id, "History read failed, using caller history: {}", e);
                        supplied
                    }
                }
            }
        }
    }

    /// Single attempt; any failure becomes the fallback text.
    async fn draft_answer(&self, context: &[Message]) -> (String, bool) {
        let options = ChatOptions {
            max_tokens: Some(self.settings.max_tokens),
        };

        match self.llm.chat(context, options).await {
            Ok(response) => {
                debug!(model = %response.model, usage = ?response.usage, "Model answered");
                (response.content, false)
            }
            Err(e) => {
                warn!(provider = self.llm.name(), "Model call failed, using fallback answer: {}", e);
                (self.settings.fallback_message.clone(), true)
            }
        }
    }

    fn roll_trap(&self, draft: String) -> TurnOutcome {
        let mut rng = rand::thread_rng();
        self.traps.apply(draft, &mut rng)
    }
}
