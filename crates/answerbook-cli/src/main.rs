//! Answer Book - draw a random answer from your books of answers.
//!
//! Command-line front end over `answerbook-core`. Books and answers live in
//! the remote document store; static web assets can be precached for
//! offline use with the `assets` commands.

mod commands;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use answerbook_core::Config;
use commands::Cli;

/// Log file prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "answerbook.log";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and to a daily file in the cache directory. The
/// returned guard flushes the file writer on drop.
fn init_tracing(cache_dir: &Path) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::fs::create_dir_all(cache_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(cache_dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let (mut config, config_error) = match Config::load() {
        Ok(c) => (c, None),
        Err(e) => (Config::default(), Some(e)),
    };
    let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
    let _guard = init_tracing(&cache_dir);
    if let Some(e) = config_error {
        warn!(error = %e, "Failed to load config, using defaults");
    }
    info!("Answer Book starting");

    if let Err(e) = commands::run(cli.command, &mut config, &cache_dir).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
