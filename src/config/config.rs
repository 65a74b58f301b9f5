use serde::Deserialize;
use thiserror::Error;

use crate::chat::trap::DEFAULT_TRAP_CATALOG;

pub const DEFAULT_FALLBACK_MESSAGE: &str = "[Error: Could not get response from AI.]";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    #[serde(default = "default_openai_model")]
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub openai: Option<OpenAiConfig>,
    pub ollama: Option<OllamaConfig>,
}

/// Where the orchestrator takes prior turns from when assembling context.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistorySource {
    /// Re-read the session's most recent turns from the turn store.
    #[default]
    Server,
    /// Trust the history the caller sent along with the request.
    Client,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_trap_probability")]
    pub trap_probability: f64,
    /// Whether a trap may replace the fallback text of a failed model call.
    #[serde(default = "default_true")]
    pub trap_on_failure: bool,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    #[serde(default)]
    pub history_source: HistorySource,
    #[serde(default = "default_trap_catalog")]
    pub trap_catalog: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_turns: default_history_turns(),
            max_tokens: default_max_tokens(),
            trap_probability: default_trap_probability(),
            trap_on_failure: true,
            fallback_message: default_fallback_message(),
            history_source: HistorySource::default(),
            trap_catalog: default_trap_catalog(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("TRAPCHAT").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Expand environment variables if present like ${OPENAI_API_KEY}
        app_config.server.host = expand_env(&app_config.server.host);
        app_config.database.path = expand_env(&app_config.database.path);

        if let Some(ref mut openai) = app_config.llm.openai {
            openai.api_key = expand_env(&openai.api_key);
            openai.api_base = expand_env(&openai.api_base);
        }
        if let Some(ref mut ollama) = app_config.llm.ollama {
            ollama.base_url = expand_env(&ollama.base_url);
        }

        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let chat = &self.chat;
        if !(0.0..=1.0).contains(&chat.trap_probability) {
            return Err(ConfigError::Invalid(format!(
                "chat.trap_probability must be within [0, 1], got {}",
                chat.trap_probability
            )));
        }
        if chat.trap_catalog.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid("chat.trap_catalog must not be empty".into()));
        }
        if chat.history_turns == 0 {
            return Err(ConfigError::Invalid("chat.history_turns must be at least 1".into()));
        }
        if self.persistence.max_attempts == 0 || self.persistence.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "persistence.max_attempts and persistence.queue_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn expand_env(val: &str) -> String {
    match val.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
        Some(var_name) => std::env::var(var_name).unwrap_or_default(),
        None => val.to_string(),
    }
}

fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_history_turns() -> usize {
    4
}

fn default_max_tokens() -> u32 {
    100
}

fn default_trap_probability() -> f64 {
    0.2
}

fn default_true() -> bool {
    true
}

fn default_fallback_message() -> String {
    DEFAULT_FALLBACK_MESSAGE.to_string()
}

fn default_trap_catalog() -> Vec<String> {
    DEFAULT_TRAP_CATALOG.iter().map(|s| s.to_string()).collect()
}

fn default_queue_capacity() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    50
}
