use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "trapchat", version, about = "Trapchat assessment chat server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Serve,

    /// Chat from the terminal through the same turn pipeline as the API
    Chat {
        /// Session to continue; a fresh one is generated when omitted
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Read or set a session topic
    Topic {
        #[command(subcommand)]
        action: TopicAction,
    },

    /// Print the turn log, newest first
    Logs {
        /// Only show turns of this session
        #[arg(short, long)]
        session: Option<String>,

        /// Maximum number of rows to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only show turns where a trap answer was served
        #[arg(long)]
        traps_only: bool,
    },
}

#[derive(Subcommand)]
pub enum TopicAction {
    /// Set (or overwrite) the topic of a session
    Set {
        #[arg(short, long)]
        session: String,
        topic: String,
    },

    /// Show the topic of a session
    Get {
        #[arg(short, long)]
        session: String,
    },
}
