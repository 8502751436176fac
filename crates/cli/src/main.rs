//! agentwire CLI: the main entry point.
//!
//! Commands:
//! - `serve`   Start the HTTP gateway
//! - `run`     Run one request against the agent and stream the result
//! - `config`  Show, locate or validate the configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "agentwire",
    about = "agentwire: streaming agent runtime",
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
    #[arg(long, global = true, env = "AGENTWIRE_LOG_JSON")]
    log_json: bool,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send a single request to the agent
    Run {
        /// The user message
        #[arg(short, long)]
        message: String,

        /// Toolkit to load (repeatable); defaults to the configured toolkits
        #[arg(short, long = "toolkit")]
        toolkits: Vec<String>,

        /// Provider to use instead of the configured default
        #[arg(long)]
        provider: Option<String>,

        /// Model to use instead of the provider's default
        #[arg(long)]
        model: Option<String>,

        /// Print every structured message as a JSON line
        #[arg(long)]
        raw: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file path
    Path,
    /// Load and validate the configuration
    Validate,
    /// Print a default config file
    Init,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Run {
            message,
            toolkits,
            provider,
            model,
            raw,
        } => {
            let options = commands::run::RunOptions {
                message,
                toolkits,
                provider,
                model,
                raw,
            };
            commands::run::run(config_path, options).await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Path => commands::config_cmd::path(config_path),
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
            ConfigAction::Init => commands::config_cmd::init(),
        },
    }

    Ok(())
}
