use clap::{Parser, Subcommand};
use mallow::commands;
use mallow::config::Config;
use mallow::error::Result;

/// Mallow: your friendly local LLM server.
///
/// Soft-serve AI on your desktop. Easy to use, easy to customize.
#[derive(Parser)]
#[command(name = "mallow", version, about = "Your friendly local LLM server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show all available models from the mallow registry
    List,
    /// Download a model from the registry to your local machine
    Get {
        /// The name of the model to download, e.g. 'llama3:8b'
        model_name: String,
    },
    /// Chat with a local model interactively
    Run {
        /// The name of the model to run
        model_name: String,
    },
    /// Serve a local model on an API endpoint
    Serve {
        /// The name of the local model to serve
        model_name: String,
    },
    /// Delete a locally downloaded model
    Remove {
        /// The name of the model to remove
        model_name: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::List => commands::list(&config).await,
        Commands::Get { model_name } => commands::get(&config, &model_name).await,
        Commands::Run { model_name } => commands::run(&config, &model_name).await,
        Commands::Serve { model_name } => commands::serve(&config, &model_name).await,
        Commands::Remove { model_name } => commands::remove(&config, &model_name),
    }
}
