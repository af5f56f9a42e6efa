//! # Reflex CLI
//!
//! Two subcommands:
//!
//! - `reflex compile --input rules.json --output rules.rbc` compiles a
//!   ruleset document into a bytecode artifact. Exit codes: 0 on success,
//!   1 on validation error, 2 on I/O error.
//! - `reflex run [--config reflex.toml]` loads the configured artifact
//!   and dispatches fact updates read as `<key>=<literal>` lines from
//!   stdin until EOF.

use anyhow::Context;
use clap::{Parser, Subcommand};
use reflex::compiler::{compile_with_options, CompileOptions};
use reflex::store::{FactStore, MemoryStore};
use reflex::value::parse_update;
use reflex::{load, CompileError, Config, Dispatcher, Ruleset};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "reflex", version, about = "Reactive rule engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a ruleset document into a bytecode artifact
    Compile {
        /// Ruleset JSON file
        #[arg(long)]
        input: PathBuf,
        /// Output artifact path
        #[arg(long)]
        output: PathBuf,
        /// Drop rules below this priority
        #[arg(long, default_value_t = 0)]
        priority_threshold: i64,
        /// Log each compilation stage
        #[arg(long)]
        verbose: bool,
    },
    /// Run the engine against fact updates from stdin
    Run {
        /// Configuration file (defaults to reflex.toml + environment)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Compile {
            input,
            output,
            priority_threshold,
            verbose,
        } => compile_command(&input, &output, priority_threshold, verbose),
        Command::Run { config } => run_command(config.as_deref()),
    }
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn compile_command(
    input: &std::path::Path,
    output: &std::path::Path,
    priority_threshold: i64,
    verbose: bool,
) -> ExitCode {
    init_logging(if verbose { "debug" } else { "info" });

    let text = match std::fs::read_to_string(input) {
        Ok(text) => text,
        Err(e) => {
            error!(path = %input.display(), error = %e, "cannot read ruleset");
            return ExitCode::from(2);
        }
    };

    let ruleset = match Ruleset::from_json(&text) {
        Ok(ruleset) => ruleset,
        Err(e) => {
            error!(path = %input.display(), error = %e, "ruleset does not parse");
            return ExitCode::from(1);
        }
    };

    let options = CompileOptions { priority_threshold };
    let artifact = match compile_with_options(&ruleset, options) {
        Ok(artifact) => artifact,
        Err(e @ CompileError::Validation(_)) => {
            error!(error = %e, "ruleset is invalid");
            return ExitCode::from(1);
        }
        Err(e) => {
            error!(error = %e, "compilation failed");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = std::fs::write(output, &artifact) {
        error!(path = %output.display(), error = %e, "cannot write artifact");
        return ExitCode::from(2);
    }

    info!(
        rules = ruleset.rules.len(),
        bytes = artifact.len(),
        output = %output.display(),
        "compiled"
    );
    ExitCode::SUCCESS
}

fn run_command(config_path: Option<&std::path::Path>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return ExitCode::from(2);
        }
    };
    init_logging(&config.logging.level);

    match run_engine(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "engine stopped");
            ExitCode::from(1)
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(&path.to_string_lossy())
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::load().context("loading reflex.toml")?,
    };
    Ok(config)
}

fn run_engine(config: &Config) -> anyhow::Result<()> {
    let artifact_path = config
        .bytecode_file
        .as_ref()
        .context("no bytecode_file configured")?;
    let bytes = std::fs::read(artifact_path)
        .with_context(|| format!("reading {}", artifact_path.display()))?;
    let engine = Arc::new(load(bytes)?);

    let store = Arc::new(MemoryStore::new());
    let dispatcher = Dispatcher::new(engine, Arc::clone(&store) as Arc<dyn FactStore>);
    let interval = Duration::from_secs(config.engine.update_interval.max(1));

    // stdin is this binary's transport: each line is `<key>=<literal>`,
    // delivered on the first configured channel. Dropping the sender at
    // EOF disconnects the dispatcher's receiver and ends the run loop.
    let channel = config
        .store
        .channels
        .first()
        .cloned()
        .unwrap_or_else(|| reflex::store::DEFAULT_CHANNEL.to_string());
    let (tx, updates) = crossbeam_channel::unbounded();
    let reader = std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_update(line) {
                Some((key, value)) => {
                    let update = reflex::store::FactUpdate {
                        channel: channel.clone(),
                        key,
                        value,
                    };
                    if tx.send(update).is_err() {
                        break;
                    }
                }
                None => warn!(%line, "ignoring malformed update"),
            }
        }
    });

    match dispatcher.run(&updates, interval) {
        Ok(()) => {
            // Clean exit implies the reader hit EOF and dropped its sender.
            let _ = reader.join();
        }
        Err(e) => {
            // Do not wait on a reader that may be blocked in a stdin read.
            drop(updates);
            return Err(e.into());
        }
    }

    let stats = dispatcher.stats();
    info!(
        updates = stats.updates_processed,
        matched = stats.rules_matched,
        actions = stats.actions_executed,
        "done"
    );
    Ok(())
}
