//! Handlers behind the CLI subcommands.

use crate::config::Config;
use crate::error::Result;
use crate::generate::Engine;
use crate::models::registry::Registry;
use crate::models::{format_bytes, ModelManager, ModelStatus};
use std::collections::HashSet;
use std::io::Write;
use tokio::io::AsyncBufReadExt;

const EXIT_WORDS: &[&str] = &["/bye", "exit", "quit"];

/// `mallow list` - print the remote catalog, flagging local models.
pub async fn list(config: &Config) -> Result<()> {
    let manager = ModelManager::new(config)?;
    let manifest = manager.manifest().await?;
    let installed: HashSet<String> = manager
        .registry()
        .installed()?
        .into_iter()
        .map(|e| e.name)
        .collect();

    println!("{:<24} {:<44} {:>10}", "NAME", "DESCRIPTION", "SIZE");
    for entry in manifest.iter() {
        let flag = if installed.contains(&entry.name) {
            "  [installed]"
        } else {
            ""
        };
        println!(
            "{:<24} {:<44} {:>10}{flag}",
            entry.name, entry.description, entry.size
        );
    }
    Ok(())
}

/// `mallow get <name>` - make a model locally present.
///
/// Ctrl-c leaves the staging area resumable and exits 130; the next `get`
/// picks up where this one stopped.
pub async fn get(config: &Config, name: &str) -> Result<()> {
    let manager = ModelManager::new(config)?;

    if manager.registry().status(name)? == ModelStatus::Complete {
        println!("Model '{name}' is already here.");
        return Ok(());
    }

    println!("Downloading '{name}'...");
    tokio::select! {
        result = manager.ensure(name) => {
            let path = result?;
            println!("Successfully got '{name}' ({})", path.display());
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted. Partial download kept; re-run 'mallow get {name}' to resume.");
            std::process::exit(130);
        }
    }
}

/// `mallow run <name>` - interactive read-generate loop.
pub async fn run(config: &Config, name: &str) -> Result<()> {
    let manager = ModelManager::new(config)?;
    let path = manager.ensure(name).await?;

    println!("Warming up '{name}'... (this may take a moment)");
    let engine = Engine::from_config(&config.generate, name, &path)?;
    tracing::debug!(backend = engine.backend_name(), model = name, "Engine ready");

    println!("Model loaded! Type your prompt. (Send an empty prompt or type '/bye' to exit)");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!(">>> ");
        std::io::stdout().flush().ok();

        tokio::select! {
            line = lines.next_line() => {
                let Some(input) = line? else {
                    println!();
                    break;
                };
                let input = input.trim();
                if input.is_empty() || EXIT_WORDS.contains(&input.to_lowercase().as_str()) {
                    break;
                }

                // per-turn failures are reported, not fatal
                match engine.generate(input).await {
                    Ok(text) => println!("{text}"),
                    Err(e) => eprintln!("An error occurred during generation: {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    println!("Bye!");
    Ok(())
}

/// `mallow serve <name>` - ensure the model then expose it over HTTP.
pub async fn serve(config: &Config, name: &str) -> Result<()> {
    let manager = ModelManager::new(config)?;
    let path = manager.ensure(name).await?;

    println!("Serving model '{name}'...");
    let engine = Engine::from_config(&config.generate, name, &path)?;
    crate::server::serve(config, engine).await
}

/// `mallow remove <name>` - delete a local model and any staging leftovers.
pub fn remove(config: &Config, name: &str) -> Result<()> {
    let registry = Registry::new(config)?;

    let present = registry.model_path(name).exists() || registry.staging_path(name).exists();
    if !present {
        println!("Model '{name}' is not installed; nothing to remove.");
        return Ok(());
    }

    // a corrupt entry has no readable marker; freed size is best-effort
    let freed = registry.entry(name).ok().flatten().map(|e| e.size_bytes);
    registry.remove(name)?;

    match freed {
        Some(bytes) => println!("Removed '{name}' (freed {})", format_bytes(bytes)),
        None => println!("Removed '{name}'."),
    }
    Ok(())
}
