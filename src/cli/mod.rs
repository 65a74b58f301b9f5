pub mod commands;

use std::io::{self, BufRead, Write};

use thiserror::Error;
use uuid::Uuid;

use crate::chat::{trap::TrapError, PriorTurn, TurnOrchestrator, TurnRequest};
use crate::cli::commands::{Commands, TopicAction};
use crate::config::{AppConfig, ConfigError};
use crate::db::{get_connection, models::Turn, DuckDbStore, StoreError, TopicStore, TurnStore};
use crate::llm::ProviderFactory;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Database Error: {0}")]
    Database(#[from] duckdb::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Trap(#[from] TrapError),
    #[error("Failed to initialize LLM provider '{0}'")]
    Provider(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("'{0}' is not a one-shot command")]
    Unsupported(&'static str),
}

pub async fn run_cli(command: Commands, config_path: String) -> Result<(), CliError> {
    let config = AppConfig::load(&config_path)?;
    let store = DuckDbStore::new(get_connection(&config.database)?);

    match command {
        Commands::Serve => return Err(CliError::Unsupported("serve")),
        Commands::Topic { action } => match action {
            TopicAction::Set { session, topic } => {
                store.set_topic(&session, topic.trim()).await?;
                println!("Topic for {} set to: {}", session, topic.trim());
            }
            TopicAction::Get { session } => match store.get_topic(&session).await? {
                Some(topic) => println!("{}", topic),
                None => println!("No topic set for session {}.", session),
            },
        },
        Commands::Logs { session, limit, traps_only } => {
            let turns: Vec<Turn> = store
                .list_turns()
                .await?
                .into_iter()
                .filter(|t| session.as_deref().map_or(true, |s| t.session_id == s))
                .filter(|t| !traps_only || t.is_trap)
                .take(limit.unwrap_or(usize::MAX))
                .collect();
            print_turns(&turns);
        }
        Commands::Chat { session } => {
            let llm = ProviderFactory::create_default(&config)
                .ok_or_else(|| CliError::Provider(config.llm.provider.clone()))?;
            let (orchestrator, writer) = TurnOrchestrator::from_config(&config, store, llm)?;
            let session_id = session.unwrap_or_else(|| Uuid::new_v4().to_string());
            let result = run_repl(&orchestrator, session_id).await;
            orchestrator.close().await;
            let _ = writer.await;
            result?;
        }
    }
    Ok(())
}

fn print_turns(turns: &[Turn]) {
    if turns.is_empty() {
        println!("No turns logged.");
        return;
    }
    println!("{:<27} | {:<24} | {:<5} | {:<40} | {}", "Timestamp", "Session", "Trap", "User", "AI");
    println!("{:-<27}-+-{:-<24}-+-{:-<5}-+-{:-<40}-+-{:-<40}", "", "", "", "", "");
    for t in turns {
        println!(
            "{:<27} | {:<24} | {:<5} | {:<40} | {}",
            t.timestamp.to_rfc3339(),
            clip(&t.session_id, 24),
            if t.is_trap { "YES" } else { "no" },
            clip(&t.user_message, 40),
            clip(&t.ai_message, 60),
        );
    }
}

fn clip(text: &str, width: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= width {
        flat
    } else {
        let mut out: String = flat.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

async fn run_repl(orchestrator: &TurnOrchestrator, session_id: String) -> Result<(), CliError> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("--- Trapchat Terminal Chat ---");
    println!("Session: {}", session_id);
    println!("Provider: {}", orchestrator.provider_name());

    match orchestrator.resolve_topic(&session_id).await {
        Some(topic) => println!("Topic: {}", topic),
        None => {
            print!("What topic or task are you trying to solve today? ");
            stdout.flush()?;
            let mut topic = String::new();
            stdin.lock().read_line(&mut topic)?;
            if !topic.trim().is_empty() {
                orchestrator.set_topic(&session_id, topic.trim()).await;
            }
        }
    }
    println!("Type /exit to quit.");
    println!("------------------------------");

    let mut local_history: Vec<PriorTurn> = Vec::new();

    loop {
        print!("\nUser> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let text = input.trim();

        if text.is_empty() {
            continue;
        }
        if text == "/exit" || text == "/quit" {
            break;
        }

        let outcome = orchestrator
            .submit_turn(TurnRequest {
                session_id: session_id.clone(),
                user_message: text.to_string(),
                prior_context: local_history.clone(),
            })
            .await;

        println!("AI> {}", outcome.ai_message);
        local_history.push(PriorTurn::new(text, outcome.ai_message));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::clip;

    #[test]
    fn clip_flattens_and_truncates() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("line\nbreak", 20), "line break");
        assert_eq!(clip("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn clip_counts_chars_not_bytes() {
        assert_eq!(clip("ééééé", 5), "ééééé");
    }
}
