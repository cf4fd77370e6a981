//! Soji - Automated Media Housekeeping
//!
//! Command-line entry point. Each subcommand maps to one housekeeping chore
//! and runs as a single cancellable operation (Ctrl-C kills the external
//! process or stops admitting new batch items).

use anyhow::Result;
use clap::Parser;
use tracing::{Level, info};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use soji::cli::{Args, Commands};
use soji::config::Config;
use soji::operation::OperationResult;
use soji::workflow::Workflow;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    let workflow = Workflow::new(config);

    match args.command {
        Commands::Download {
            url,
            max_items,
            output_dir,
        } => {
            let result = workflow.download(&url, max_items, output_dir).await?;
            finish(result)?;
        }
        Commands::Compress { input, output } => {
            let result = workflow.compress(&input, output).await?;
            finish(result)?;
        }
        Commands::ConvertPhotos { dir } => {
            let result = workflow.convert_photos(&dir).await?;
            finish(result)?;
        }
        Commands::FixNames { dir } => {
            let result = workflow.fix_names(&dir).await?;
            finish(result)?;
        }
        Commands::Tag { dir } => {
            let result = workflow.tag(&dir).await?;
            finish(result)?;
        }
        Commands::MoveAudio { source, target } => {
            let moved = workflow.move_audio(&source, &target).await?;
            println!("Moved {} files to {}", moved, target.display());
        }
        Commands::Clean { dir } => {
            workflow.clean(&dir).await?;
            println!("Deleted {}", dir.display());
        }
        Commands::Playlist {
            url,
            max_items,
            target,
        } => {
            workflow.playlist(&url, max_items, &target).await?;
            println!("Playlist chore completed; files are in {}", target.display());
        }
    }

    Ok(())
}

/// Print the final status line and turn a failed operation into a non-zero
/// exit. Cancellation is a normal outcome, not an error.
fn finish(result: OperationResult) -> Result<()> {
    if result.cancelled {
        println!("Cancelled after {:?}", result.elapsed);
        return Ok(());
    }

    let item_failures: Vec<_> = result
        .items
        .iter()
        .filter(|item| !item.is_success())
        .collect();

    if result.success && item_failures.is_empty() {
        println!("Done in {:?}", result.elapsed);
        return Ok(());
    }

    for failure in &result.failures {
        eprintln!("  {}", failure);
    }
    if result.success {
        // Batch ran to the end; partial failures were recorded per item.
        println!(
            "Done in {:?} with {} failed items",
            result.elapsed,
            item_failures.len()
        );
        return Ok(());
    }

    Err(anyhow::anyhow!("operation failed after {:?}", result.elapsed))
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let soji_dir = std::env::current_dir()?.join(".soji");
    let log_dir = soji_dir.join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "soji.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer().with_target(false);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
