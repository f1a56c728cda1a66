//! Remote instrument control surface.
//!
//! The scheduler never talks HTTP directly. It sees the instrument through the
//! [`InstrumentGateway`] trait: poll status, submit one experiment, request an
//! abort, and forward one-shot manual commands.
//!
//! # Implementations
//!
//! - [`HttpGateway`] - JSON over HTTP against the AISH service
//! - [`MockGateway`] - in-process simulated instrument for tests and dry runs

pub mod http;
pub mod mock;

pub use http::HttpGateway;
pub use mock::MockGateway;

use crate::error::GatewayError;
use crate::job::{JobDescriptor, Precision};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Endpoint polled for instrument state.
pub const STATE_ENDPOINT: &str = "/api/get_state";
/// Endpoint that starts an experiment.
pub const COMMAND_ENDPOINT: &str = "/api/command";
/// Endpoint that aborts the running experiment.
pub const ABORT_ENDPOINT: &str = "/api/abort";

/// Snapshot returned by `GET /api/get_state`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentStatus {
    /// Loader hardware state, opaque to the scheduler.
    #[serde(default)]
    pub aish_loader: Option<Value>,
    /// Running-experiment marker; `None` means the instrument is idle.
    #[serde(default)]
    pub aish_experiment: Option<Value>,
}

impl InstrumentStatus {
    /// Idle instrument.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Instrument running the experiment described by `marker`.
    pub fn active(marker: Value) -> Self {
        Self {
            aish_loader: None,
            aish_experiment: Some(marker),
        }
    }

    /// Whether an experiment is in progress.
    pub fn is_experiment_active(&self) -> bool {
        matches!(&self.aish_experiment, Some(v) if !v.is_null())
    }

    /// Progress of the running experiment, when the service reports it.
    pub fn progress(&self) -> Option<ExperimentProgress> {
        let progress = self.aish_experiment.as_ref()?.get("progress")?;
        serde_json::from_value(progress.clone()).ok()
    }
}

/// Step/temperature progress of a running experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExperimentProgress {
    /// Index of the scan being executed.
    pub cur_step: u32,
    /// Number of scans in the ramp.
    pub total_steps: u32,
    /// Furnace setpoint for the current scan, °C.
    pub cur_temp: f64,
}

/// XRD parameters of a command request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XrdParams {
    /// Lower 2θ bound.
    pub min_angle: f64,
    /// Upper 2θ bound.
    pub max_angle: f64,
    /// Scan precision.
    pub precision: Precision,
    /// Temperature ramp; empty for no heating.
    pub temperatures: Vec<f64>,
}

/// Body of `POST /api/command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Operator label, used by the service as the results directory name.
    pub sample_name: String,
    /// Tray slot to load.
    pub sample_num: u32,
    /// Scan parameters.
    pub xrd_params: XrdParams,
}

impl From<&JobDescriptor> for CommandRequest {
    fn from(job: &JobDescriptor) -> Self {
        Self {
            sample_name: job.item_name().to_string(),
            sample_num: job.sample_number(),
            xrd_params: XrdParams {
                min_angle: job.min_angle(),
                max_angle: job.max_angle(),
                precision: job.precision(),
                temperatures: job.temperatures().to_vec(),
            },
        }
    }
}

/// One-shot hardware commands outside the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualCommand {
    /// Load a sample onto the stage.
    LoadSample {
        /// Tray slot.
        sample_num: u32,
    },
    /// Return the loaded sample to the tray.
    UnloadSample,
    /// Eject the sample buffer for loading.
    LoadingSampleBuffer,
    /// Retract the sample buffer after loading.
    DoneLoadingSampleBuffer,
    /// Move the gantry over a tray slot.
    Ender3MoveToSample {
        /// Tray slot.
        sample_num: u32,
    },
    /// Move the gantry to its rest position.
    Ender3MoveToRest,
    /// Move the gantry to its home position.
    Ender3MoveToHome,
    /// Move the gantry over the XRD stage.
    Ender3MoveToStage,
    /// Eject the gantry bed.
    Ender3MoveEjectBed,
    /// Run the gantry homing routine.
    Ender3Home,
    /// Open the gripper.
    GripperOpen,
    /// Close the gripper.
    GripperClose,
    /// Raise the linear rail.
    LinearRailMoveUp,
    /// Lower the linear rail.
    LinearRailMoveDown,
    /// Home the linear rail.
    LinearRailHome,
}

impl ManualCommand {
    /// Endpoint path for this command.
    pub fn path(&self) -> &'static str {
        match self {
            ManualCommand::LoadSample { .. } => "/api/load_sample",
            ManualCommand::UnloadSample => "/api/unload_sample",
            ManualCommand::LoadingSampleBuffer => "/api/loading_sample_buffer",
            ManualCommand::DoneLoadingSampleBuffer => "/api/done_loading_sample_buffer",
            ManualCommand::Ender3MoveToSample { .. } => "/api/ender3/move_to_sample",
            ManualCommand::Ender3MoveToRest => "/api/ender3/move_to_rest",
            ManualCommand::Ender3MoveToHome => "/api/ender3/move_to_home",
            ManualCommand::Ender3MoveToStage => "/api/ender3/move_to_stage",
            ManualCommand::Ender3MoveEjectBed => "/api/ender3/move_eject_bed",
            ManualCommand::Ender3Home => "/api/ender3/home",
            ManualCommand::GripperOpen => "/api/arduino/gripper/open",
            ManualCommand::GripperClose => "/api/arduino/gripper/close",
            ManualCommand::LinearRailMoveUp => "/api/arduino/linear_rail/move_up",
            ManualCommand::LinearRailMoveDown => "/api/arduino/linear_rail/move_down",
            ManualCommand::LinearRailHome => "/api/arduino/linear_rail/home",
        }
    }

    /// JSON body, for the commands that carry one.
    pub fn body(&self) -> Option<Value> {
        match self {
            ManualCommand::LoadSample { sample_num }
            | ManualCommand::Ender3MoveToSample { sample_num } => {
                Some(json!({ "sample_num": sample_num }))
            }
            _ => None,
        }
    }
}

/// Access to the remote instrument service.
#[async_trait]
pub trait InstrumentGateway: Send + Sync {
    /// Query current instrument state.
    async fn fetch_status(&self) -> Result<InstrumentStatus, GatewayError>;

    /// Submit one experiment. The response body is informational only;
    /// the next status poll is what confirms the dispatch.
    async fn submit(&self, request: &CommandRequest) -> Result<Value, GatewayError>;

    /// Ask the instrument to abort the running experiment. Best effort.
    async fn abort(&self) -> Result<(), GatewayError>;

    /// Forward a one-shot manual command.
    async fn send_manual(&self, command: ManualCommand) -> Result<Value, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{HeatingForm, JobBuilder, JobForm};

    #[test]
    fn test_status_parses_idle_and_active() {
        let idle: InstrumentStatus =
            serde_json::from_str(r#"{"aish_loader": null, "aish_experiment": null}"#).unwrap();
        assert!(!idle.is_experiment_active());

        let active: InstrumentStatus = serde_json::from_str(
            r#"{"aish_loader": null,
                "aish_experiment": {"progress": {"cur_step": 1, "total_steps": 3, "cur_temp": 125},
                                    "xrd_params": {"sample_num": 2}}}"#,
        )
        .unwrap();
        assert!(active.is_experiment_active());
        assert_eq!(
            active.progress(),
            Some(ExperimentProgress {
                cur_step: 1,
                total_steps: 3,
                cur_temp: 125.0
            })
        );
    }

    #[test]
    fn test_status_tolerates_missing_keys_and_test_mode_marker() {
        let status: InstrumentStatus = serde_json::from_str("{}").unwrap();
        assert!(!status.is_experiment_active());

        let test_mode: InstrumentStatus =
            serde_json::from_str(r#"{"aish_experiment": {"sample_num": 4, "xrd_params": {}}}"#)
                .unwrap();
        assert!(test_mode.is_experiment_active());
        assert!(test_mode.progress().is_none());
    }

    #[test]
    fn test_command_request_wire_shape() {
        let mut builder = JobBuilder::new(10);
        builder.select(2).unwrap();
        let job = builder
            .build(&JobForm {
                item_name: "NaCl".to_string(),
                min_angle: "10".to_string(),
                max_angle: "80".to_string(),
                precision: "High".to_string(),
                heating: Some(HeatingForm {
                    min_temp: "25".to_string(),
                    max_temp: "225".to_string(),
                    num_scans: "3".to_string(),
                }),
            })
            .unwrap();

        let body = serde_json::to_value(CommandRequest::from(&job)).unwrap();
        assert_eq!(
            body,
            json!({
                "sample_name": "NaCl",
                "sample_num": 2,
                "xrd_params": {
                    "min_angle": 10.0,
                    "max_angle": 80.0,
                    "precision": "High",
                    "temperatures": [25.0, 125.0, 225.0]
                }
            })
        );
    }

    #[test]
    fn test_manual_command_routes() {
        assert_eq!(
            ManualCommand::LoadSample { sample_num: 3 }.body(),
            Some(json!({ "sample_num": 3 }))
        );
        assert_eq!(ManualCommand::UnloadSample.body(), None);
        assert_eq!(
            ManualCommand::LinearRailMoveDown.path(),
            "/api/arduino/linear_rail/move_down"
        );
        assert_eq!(ManualCommand::Ender3Home.path(), "/api/ender3/home");
    }
}
