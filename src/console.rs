//! Interactive operator console.
//!
//! Each input line is parsed with `clap` (no binary name) into a
//! [`ConsoleCommand`] and executed against a [`SchedulerHandle`]. Manual
//! hardware commands bypass the scheduler and go straight to the gateway,
//! the same way the loader's manual-control buttons do.
//!
//! ```text
//! > add "Cu foil" --min-angle 10 --max-angle 80 --precision high --heat 25 225 3
//! > move 2 0
//! > start
//! > status
//! ```

use crate::controller::QueueSnapshot;
use crate::error::AppResult;
use crate::estimate::{self, DurationEstimate};
use crate::gateway::{InstrumentGateway, ManualCommand};
use crate::job::{HeatingForm, JobDescriptor, JobForm, Precision, SampleSelection};
use crate::messages::SchedulerEvent;
use crate::scheduler::SchedulerHandle;
use clap::{Args, Parser, Subcommand};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::warn;

/// One console line.
#[derive(Debug, Parser)]
#[command(no_binary_name = true, name = "aish", disable_version_flag = true)]
pub struct ConsoleLine {
    /// Command to run.
    #[command(subcommand)]
    pub command: ConsoleCommand,
}

/// Commands accepted by the console.
#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum ConsoleCommand {
    /// Queue an experiment for the selected sample
    Add {
        /// Label for the queue entry
        name: Option<String>,
        /// Lower 2θ bound
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        min_angle: String,
        /// Upper 2θ bound
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        max_angle: String,
        /// Low or High
        #[arg(long, default_value = "Low")]
        precision: String,
        /// Heat during the scan: start and end temperature and number of scans
        #[arg(
            long,
            num_args = 3,
            value_names = ["MIN", "MAX", "SCANS"],
            allow_hyphen_values = true
        )]
        heat: Option<Vec<String>>,
    },
    /// Select the sample slot for the next job
    Select {
        /// Slot number, from 0
        sample: u32,
    },
    /// Delete a pending job
    Remove {
        /// Queue position, from 0
        index: usize,
    },
    /// Move a pending job to another position
    Move {
        /// Current position
        from: usize,
        /// New position
        to: usize,
    },
    /// Start dispatching queued jobs
    Start,
    /// Stop dispatching after the current job
    Pause,
    /// Pause and abort the running experiment
    Abort,
    /// Show queue and run state
    #[command(alias = "list")]
    Status,
    /// Estimate how long a heated experiment takes
    Estimate(EstimateArgs),
    /// Send a one-shot hardware command
    Manual {
        /// Hardware command
        #[command(subcommand)]
        command: ManualArg,
    },
    /// Leave the console
    #[command(alias = "exit")]
    Quit,
}

/// Inputs of the duration estimator.
#[derive(Debug, Clone, PartialEq, Args)]
pub struct EstimateArgs {
    /// Ramp start, °C
    #[arg(long, allow_hyphen_values = true)]
    pub min_temp: f64,
    /// Ramp end, °C
    #[arg(long, allow_hyphen_values = true)]
    pub max_temp: f64,
    /// Lower 2θ bound
    #[arg(long)]
    pub min_angle: f64,
    /// Upper 2θ bound
    #[arg(long)]
    pub max_angle: f64,
    /// Low or High
    #[arg(long, default_value = "Low")]
    pub precision: Precision,
    /// Number of scans along the ramp
    #[arg(long)]
    pub scans: u32,
}

impl EstimateArgs {
    /// Run the estimator.
    pub fn estimate(&self) -> DurationEstimate {
        estimate::estimate(
            self.min_temp,
            self.max_temp,
            self.min_angle,
            self.max_angle,
            self.precision,
            self.scans,
        )
    }
}

/// Manual hardware commands, as typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum ManualArg {
    /// Load a sample onto the stage
    LoadSample {
        /// Tray slot
        sample: u32,
    },
    /// Return the loaded sample to the tray
    UnloadSample,
    /// Eject the sample buffer for loading
    LoadingSampleBuffer,
    /// Retract the sample buffer
    DoneLoadingSampleBuffer,
    /// Move the gantry over a tray slot
    MoveToSample {
        /// Tray slot
        sample: u32,
    },
    /// Move the gantry to rest
    MoveToRest,
    /// Move the gantry home
    MoveToHome,
    /// Move the gantry over the stage
    MoveToStage,
    /// Eject the gantry bed
    EjectBed,
    /// Home the gantry
    Home,
    /// Open the gripper
    GripperOpen,
    /// Close the gripper
    GripperClose,
    /// Raise the linear rail
    RailUp,
    /// Lower the linear rail
    RailDown,
    /// Home the linear rail
    RailHome,
}

impl From<ManualArg> for ManualCommand {
    fn from(arg: ManualArg) -> Self {
        match arg {
            ManualArg::LoadSample { sample } => ManualCommand::LoadSample { sample_num: sample },
            ManualArg::UnloadSample => ManualCommand::UnloadSample,
            ManualArg::LoadingSampleBuffer => ManualCommand::LoadingSampleBuffer,
            ManualArg::DoneLoadingSampleBuffer => ManualCommand::DoneLoadingSampleBuffer,
            ManualArg::MoveToSample { sample } => {
                ManualCommand::Ender3MoveToSample { sample_num: sample }
            }
            ManualArg::MoveToRest => ManualCommand::Ender3MoveToRest,
            ManualArg::MoveToHome => ManualCommand::Ender3MoveToHome,
            ManualArg::MoveToStage => ManualCommand::Ender3MoveToStage,
            ManualArg::EjectBed => ManualCommand::Ender3MoveEjectBed,
            ManualArg::Home => ManualCommand::Ender3Home,
            ManualArg::GripperOpen => ManualCommand::GripperOpen,
            ManualArg::GripperClose => ManualCommand::GripperClose,
            ManualArg::RailUp => ManualCommand::LinearRailMoveUp,
            ManualArg::RailDown => ManualCommand::LinearRailMoveDown,
            ManualArg::RailHome => ManualCommand::LinearRailHome,
        }
    }
}

/// Result of one console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Print this and read the next line.
    Continue(String),
    /// Leave the console.
    Quit,
}

/// Split a line into words. Double quotes group words; there are no escapes.
pub fn split_words(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quoted {
        return Err("unterminated quote".to_string());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Operator console bound to a running scheduler.
pub struct Console {
    scheduler: SchedulerHandle,
    gateway: Arc<dyn InstrumentGateway>,
}

impl Console {
    /// Console that drives `scheduler` and sends manual commands to `gateway`.
    pub fn new(scheduler: SchedulerHandle, gateway: Arc<dyn InstrumentGateway>) -> Self {
        Self { scheduler, gateway }
    }

    /// Parse and run one input line. Errors are rendered, never returned.
    pub async fn handle_line(&self, line: &str) -> Outcome {
        let words = match split_words(line) {
            Ok(words) if words.is_empty() => return Outcome::Continue(String::new()),
            Ok(words) => words,
            Err(e) => return Outcome::Continue(format!("Error: {e}")),
        };

        let parsed = match ConsoleLine::try_parse_from(words) {
            Ok(parsed) => parsed,
            Err(e) => return Outcome::Continue(e.render().to_string()),
        };

        match self.execute(parsed.command).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "console command failed");
                Outcome::Continue(format!("Error: {e}"))
            }
        }
    }

    /// Run a parsed command.
    pub async fn execute(&self, command: ConsoleCommand) -> AppResult<Outcome> {
        let text = match command {
            ConsoleCommand::Add {
                name,
                min_angle,
                max_angle,
                precision,
                heat,
            } => {
                let form = JobForm {
                    item_name: name.unwrap_or_default(),
                    min_angle,
                    max_angle,
                    precision,
                    heating: heat.map(heating_form),
                };
                let job = self.scheduler.add_job(form).await?;
                render_queued(&job)
            }
            ConsoleCommand::Select { sample } => {
                let selection = self.scheduler.select_sample(sample).await?;
                render_selection(&selection)
            }
            ConsoleCommand::Remove { index } => {
                let job = self.scheduler.remove_at(index).await?;
                format!("Removed: {}", job.summary())
            }
            ConsoleCommand::Move { from, to } => {
                self.scheduler.move_item(from, to).await?;
                let snapshot = self.scheduler.snapshot().await?;
                render_pending(&snapshot)
            }
            ConsoleCommand::Start => {
                self.scheduler.start().await?;
                "Queue started".to_string()
            }
            ConsoleCommand::Pause => {
                self.scheduler.pause().await?;
                "Queue paused".to_string()
            }
            ConsoleCommand::Abort => {
                self.scheduler.abort().await?;
                "Abort sent; queue paused".to_string()
            }
            ConsoleCommand::Status => {
                let snapshot = self.scheduler.snapshot().await?;
                let selection = self.scheduler.selection().await?;
                format!(
                    "{}\n{}",
                    render_snapshot(&snapshot),
                    render_selection(&selection)
                )
            }
            ConsoleCommand::Estimate(args) => render_estimate(&args.estimate()),
            ConsoleCommand::Manual { command } => {
                let command = ManualCommand::from(command);
                let response = self.gateway.send_manual(command).await?;
                format!("{}: {}", command.path(), response)
            }
            ConsoleCommand::Quit => return Ok(Outcome::Quit),
        };
        Ok(Outcome::Continue(text))
    }
}

fn heating_form(values: Vec<String>) -> HeatingForm {
    let mut values = values.into_iter();
    HeatingForm {
        min_temp: values.next().unwrap_or_default(),
        max_temp: values.next().unwrap_or_default(),
        num_scans: values.next().unwrap_or_default(),
    }
}

fn render_queued(job: &JobDescriptor) -> String {
    let mut text = format!("Queued: {}", job.summary());
    if let Some(estimate) = job.estimate() {
        let _ = write!(text, "\n{}", render_estimate(&estimate));
    }
    text
}

/// Estimate with its breakdown lines.
pub fn render_estimate(estimate: &DurationEstimate) -> String {
    format!(
        "{}\n  {}\n  {}",
        estimate,
        estimate.scan_breakdown(),
        estimate.ramp_breakdown()
    )
}

fn render_selection(selection: &SampleSelection) -> String {
    match selection.current() {
        Some(sample) => format!("Selected sample: {} of {}", sample, selection.slots()),
        None => "Selected sample: none".to_string(),
    }
}

fn render_pending(snapshot: &QueueSnapshot) -> String {
    if snapshot.pending.is_empty() {
        return "Queue: empty".to_string();
    }
    let mut text = format!("Queue ({}):", snapshot.pending.len());
    for (index, job) in snapshot.pending.iter().enumerate() {
        let _ = write!(text, "\n  {index}. {}", job.summary());
    }
    text
}

/// Multi-line view of queue and run state.
pub fn render_snapshot(snapshot: &QueueSnapshot) -> String {
    let running = snapshot
        .running_item
        .as_ref()
        .map_or_else(|| "none".to_string(), JobDescriptor::summary);
    format!(
        "Phase: {}\nRunning: {}\n{}",
        snapshot.phase,
        running,
        render_pending(snapshot)
    )
}

/// One-line rendering of a scheduler event.
pub fn render_event(event: &SchedulerEvent) -> String {
    match event {
        SchedulerEvent::JobQueued(job) => format!("[queued] {}", job.summary()),
        SchedulerEvent::JobDispatched(job) => format!("[dispatched] {}", job.summary()),
        SchedulerEvent::JobFinished(job) => format!("[finished] {}", job.summary()),
        SchedulerEvent::DispatchFailed { job, reason } => {
            format!("[dispatch failed] {} ({reason})", job.item_name())
        }
        SchedulerEvent::DispatchUnconfirmed { job, reason } => {
            format!("[dispatch unconfirmed] {} ({reason})", job.item_name())
        }
        SchedulerEvent::QueueExhausted => "[queue empty] scheduler paused".to_string(),
        SchedulerEvent::RemoteUnavailable(reason) => format!("[instrument unavailable] {reason}"),
        SchedulerEvent::PhaseChanged(phase) => format!("[phase] {phase}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AishConfig;
    use crate::gateway::MockGateway;
    use crate::scheduler::Scheduler;

    fn parse(line: &str) -> ConsoleCommand {
        ConsoleLine::try_parse_from(split_words(line).unwrap())
            .unwrap()
            .command
    }

    fn console() -> (Console, MockGateway) {
        let mock = MockGateway::manual();
        let gateway: Arc<dyn InstrumentGateway> = Arc::new(mock.clone());
        let (handle, _task) = Scheduler::new(Arc::clone(&gateway), &AishConfig::default()).spawn();
        (Console::new(handle, gateway), mock)
    }

    fn text(outcome: Outcome) -> String {
        match outcome {
            Outcome::Continue(text) => text,
            Outcome::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn test_split_words_honours_quotes() {
        assert_eq!(
            split_words(r#"add "Cu foil" --min-angle 10"#).unwrap(),
            vec!["add", "Cu foil", "--min-angle", "10"]
        );
        assert!(split_words("  ").unwrap().is_empty());
        assert!(split_words(r#"add "open"#).is_err());
    }

    #[test]
    fn test_parse_add_with_heating() {
        let command = parse("add Si --min-angle 10 --max-angle 80 --precision high --heat -20 225 3");
        assert_eq!(
            command,
            ConsoleCommand::Add {
                name: Some("Si".to_string()),
                min_angle: "10".to_string(),
                max_angle: "80".to_string(),
                precision: "high".to_string(),
                heat: Some(vec!["-20".to_string(), "225".to_string(), "3".to_string()]),
            }
        );
    }

    #[test]
    fn test_parse_aliases_and_manual() {
        assert_eq!(parse("list"), ConsoleCommand::Status);
        assert_eq!(parse("exit"), ConsoleCommand::Quit);
        assert_eq!(
            parse("manual load-sample 4"),
            ConsoleCommand::Manual {
                command: ManualArg::LoadSample { sample: 4 }
            }
        );
        assert_eq!(
            ManualCommand::from(ManualArg::RailHome).path(),
            "/api/arduino/linear_rail/home"
        );
    }

    #[test]
    fn test_estimate_rendering() {
        let ConsoleCommand::Estimate(args) = parse(
            "estimate --min-temp 25 --max-temp 225 --min-angle 10 --max-angle 80 --scans 3",
        ) else {
            panic!("expected estimate");
        };
        let rendered = render_estimate(&args.estimate());
        assert!(rendered.starts_with("Estimated Procedure Time: 7.53 min = 0.13 hr"));
        assert!(rendered.contains("1.40 min/scan * 3 scans = 4.20 min"));
        assert!(rendered.contains("3.33 min ramping"));
    }

    #[tokio::test]
    async fn test_add_and_status_through_console() {
        let (console, _mock) = console();

        let added = text(
            console
                .handle_line(r#"add "Cu foil" --min-angle 10 --max-angle 80 --heat 25 225 3"#)
                .await,
        );
        assert!(added.contains("Queued: Cu foil | Sample Number: 0"));
        assert!(added.contains("Estimated Procedure Time"));

        let status = text(console.handle_line("status").await);
        assert!(status.contains("Phase: paused"));
        assert!(status.contains("Queue (1):"));
        assert!(status.contains("Selected sample: 1 of 10"));
    }

    #[tokio::test]
    async fn test_errors_are_rendered_not_returned() {
        let (console, _mock) = console();

        let missing = text(console.handle_line("add --min-angle 10 --max-angle 80").await);
        assert!(missing.starts_with("Error: Validation error"));

        let empty = text(console.handle_line("start").await);
        assert!(empty.starts_with("Error:"));

        let out_of_range = text(console.handle_line("remove 3").await);
        assert!(out_of_range.starts_with("Error:"));

        let unknown = text(console.handle_line("frobnicate").await);
        assert!(unknown.contains("unrecognized subcommand"));
    }

    #[tokio::test]
    async fn test_manual_command_goes_to_gateway() {
        let (console, mock) = console();
        let reply = text(console.handle_line("manual move-to-sample 3").await);
        assert!(reply.starts_with("/api/ender3/move_to_sample"));
        assert_eq!(
            mock.manual_commands().await,
            vec![ManualCommand::Ender3MoveToSample { sample_num: 3 }]
        );
        assert_eq!(console.handle_line("quit").await, Outcome::Quit);
    }
}
