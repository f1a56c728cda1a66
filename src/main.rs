//! AISH queue operator CLI.
//!
//! `aish_queue run` starts the scheduler and an interactive console on
//! stdin. The other subcommands are one-shot helpers.

use aish_queue::config::{AishConfig, DEFAULT_CONFIG_PATH};
use aish_queue::console::{render_estimate, render_event, Console, EstimateArgs, ManualArg, Outcome};
use aish_queue::gateway::{HttpGateway, InstrumentGateway, ManualCommand, MockGateway};
use aish_queue::logging::{self, LogFormat};
use aish_queue::scheduler::Scheduler;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Debug, Parser)]
#[command(name = "aish_queue", version, about = "Experiment queue for the AISH XRD loader")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scheduler with an interactive console
    Run {
        /// Use the simulated instrument instead of the HTTP service
        #[arg(long)]
        mock: bool,
    },
    /// Estimate the duration of a heated experiment
    Estimate(EstimateArgs),
    /// Send a one-shot hardware command
    Manual {
        #[command(subcommand)]
        command: ManualArg,
    },
    /// Print the instrument status once
    Status,
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AishConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.application.log_level = level;
        config.validate()?;
    }

    logging::init(&config.application.log_level, cli.log_format)?;

    match cli.command {
        Command::Run { mock } => run(config, mock).await,
        Command::Estimate(args) => {
            println!("{}", render_estimate(&args.estimate()));
            Ok(())
        }
        Command::Manual { command } => {
            let gateway = HttpGateway::new(&config.gateway)?;
            let command = ManualCommand::from(command);
            let response = gateway.send_manual(command).await?;
            println!("{}: {}", command.path(), response);
            Ok(())
        }
        Command::Status => {
            let gateway = HttpGateway::new(&config.gateway)?;
            let status = gateway.fetch_status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn run(config: AishConfig, mock: bool) -> anyhow::Result<()> {
    let gateway: Arc<dyn InstrumentGateway> = if mock {
        tracing::info!(
            duration = ?config.mock.experiment_duration(),
            "using simulated instrument"
        );
        Arc::new(MockGateway::new(config.mock.experiment_duration()))
    } else {
        tracing::info!(base_url = %config.gateway.base_url, "using instrument service");
        Arc::new(HttpGateway::new(&config.gateway)?)
    };

    let (handle, scheduler_task) = Scheduler::new(Arc::clone(&gateway), &config).spawn();

    let mut events = handle.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", render_event(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "console fell behind scheduler events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let console = Console::new(handle.clone(), gateway);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("AISH queue console. Type 'help' for commands.");

    loop {
        prompt()?;
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match console.handle_line(&line).await {
                    Outcome::Continue(text) if text.is_empty() => {}
                    Outcome::Continue(text) => println!("{text}"),
                    Outcome::Quit => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    handle.shutdown().await?;
    scheduler_task.await.context("scheduler task panicked")?;
    printer.abort();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()
}
