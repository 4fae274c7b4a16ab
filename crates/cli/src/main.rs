//! Parley CLI, the main entry point.
//!
//! Commands:
//! - `serve`     Start the HTTP API server
//! - `chat`      Answer one message through the full chat pipeline
//! - `providers` Show the configured provider chain
//! - `onboard`   Write a default config file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "Parley: multi-provider chat backend",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "PARLEY_LOG_JSON")]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send a single message and print the reply
    Chat {
        /// The message to send
        #[arg(short, long)]
        message: String,

        /// Persona to answer as (e.g. idea_validator)
        #[arg(short, long)]
        role: Option<String>,

        /// Session id; history is kept in memory for this run only
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Show the configured provider chain
    Providers,

    /// Initialize the config directory and a default config file
    Onboard,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Chat {
            message,
            role,
            session,
        } => commands::chat::run(message, role, session).await?,
        Commands::Providers => commands::providers::run().await?,
        Commands::Onboard => commands::onboard::run().await?,
    }

    Ok(())
}
