use actix_web::{web, App, HttpServer};
use clap::Parser;
use trapchat::chat::TurnOrchestrator;
use trapchat::cli::{commands::{Cli, Commands}, run_cli};
use trapchat::config::AppConfig;
use trapchat::db::{self, DuckDbStore};
use trapchat::llm::ProviderFactory;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Serve) {
        if let Err(e) = run_cli(cli.command, cli.config).await {
            error!("{}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    info!("Starting Trapchat server...");

    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let db_pool = match db::get_connection(&config.database) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let llm_provider = match ProviderFactory::create_default(&config) {
        Some(p) => p,
        None => {
            error!("Failed to initialize LLM provider '{}' from config", config.llm.provider);
            std::process::exit(1);
        }
    };

    let (orchestrator, writer) =
        match TurnOrchestrator::from_config(&config, DuckDbStore::new(db_pool), llm_provider) {
            Ok(parts) => parts,
            Err(e) => {
                error!("Invalid trap configuration: {}", e);
                std::process::exit(1);
            }
        };
    let orchestrator = web::Data::new(orchestrator);

    let host = config.server.host.clone();
    let port = config.server.port;

    info!(
        "Server listening on {}:{} (provider: {}, history: {:?})",
        host,
        port,
        orchestrator.provider_name(),
        config.chat.history_source
    );

    let app_data = orchestrator.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(app_data.clone())
            .configure(trapchat::api::routes::configure)
    })
    .bind((host, port))?
    .run()
    .await?;

    info!("Draining turn log queue");
    orchestrator.close().await;
    if let Err(e) = writer.await {
        error!("Turn log writer failed: {}", e);
    }

    Ok(())
}
