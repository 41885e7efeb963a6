//! runbox - run code and shell commands in a reusable container session

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use runbox_config::GlobalConfig;
use runbox_core::SessionManager;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "runbox")]
#[command(author, version, about = "Run code in a reusable container session", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the configured engine (docker or podman)
    #[arg(long, global = true, value_parser = ["docker", "podman"])]
    engine: Option<String>,

    /// Print operation reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive console driving the container lifecycle (default)
    Console,

    /// Run a script in the container: pull, create, run, execute, teardown
    Exec {
        /// Image to use (defaults to engine.default_image)
        #[arg(short, long)]
        image: Option<String>,
        /// Keep the container afterwards
        #[arg(long)]
        keep: bool,
        /// Source file to execute
        script: PathBuf,
    },

    /// Run shell commands in the container, one session for all of them
    Term {
        /// Image to use (defaults to engine.default_image)
        #[arg(short, long)]
        image: Option<String>,
        /// Keep the container afterwards
        #[arg(long)]
        keep: bool,
        /// Commands, one per argument
        #[arg(required = true, trailing_var_arg = true)]
        commands: Vec<String>,
    },

    /// Show or edit the configuration file
    Config {
        /// Open the config file in $EDITOR
        #[arg(short, long)]
        edit: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for reports
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Handle config command separately (doesn't need a valid config or engine)
    if let Some(Commands::Config { edit }) = &cli.command {
        commands::config(*edit)?;
        return Ok(());
    }

    let mut config = GlobalConfig::load().context("Failed to load configuration")?;
    if let Some(engine) = cli.engine {
        config.engine.program = engine;
    }

    let manager = SessionManager::new(config)?;

    match cli.command {
        None | Some(Commands::Console) => commands::console(&manager, cli.json).await?,
        Some(Commands::Exec {
            image,
            keep,
            script,
        }) => {
            let source = std::fs::read_to_string(&script)
                .with_context(|| format!("Failed to read {}", script.display()))?;
            commands::batch(
                &manager,
                image,
                keep,
                commands::Payload::Code(source),
                cli.json,
            )
            .await?
        }
        Some(Commands::Term {
            image,
            keep,
            commands: lines,
        }) => {
            commands::batch(
                &manager,
                image,
                keep,
                commands::Payload::Terminal(lines.join("\n")),
                cli.json,
            )
            .await?
        }
        Some(Commands::Config { .. }) => unreachable!(), // Handled above
    }

    Ok(())
}
