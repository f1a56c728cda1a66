//! Simulated instrument service.
//!
//! Behaves like the AISH service in its website test mode: a submitted
//! experiment is reported as active for a fixed duration and then the
//! instrument goes idle again. All state lives in memory.
//!
//! # Example
//!
//! ```rust,ignore
//! let gateway = MockGateway::manual();
//! gateway.submit(&request).await?;
//! assert!(gateway.fetch_status().await?.is_experiment_active());
//! gateway.finish_experiment().await;
//! ```

use super::{
    CommandRequest, InstrumentGateway, InstrumentStatus, ManualCommand, COMMAND_ENDPOINT,
    STATE_ENDPOINT,
};
use crate::error::GatewayError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration, Instant};

const ROOM_TEMPERATURE: f64 = 25.0;

#[derive(Debug, Default)]
struct MockState {
    active: Option<ActiveExperiment>,
    submissions: Vec<CommandRequest>,
    overlapping_submissions: u32,
    aborts: u32,
    status_queries: u32,
    manual: Vec<ManualCommand>,
    fail_status: bool,
    fail_submit: bool,
    status_delay: Option<Duration>,
    submit_delay: Option<Duration>,
}

#[derive(Debug)]
struct ActiveExperiment {
    request: CommandRequest,
    ends_at: Option<Instant>,
}

impl MockState {
    fn expire(&mut self, now: Instant) {
        if let Some(active) = &self.active {
            if active.ends_at.is_some_and(|end| now >= end) {
                tracing::debug!(sample = active.request.sample_num, "mock experiment complete");
                self.active = None;
            }
        }
    }
}

/// In-memory stand-in for the instrument service.
#[derive(Debug, Clone)]
pub struct MockGateway {
    state: Arc<RwLock<MockState>>,
    experiment_duration: Option<Duration>,
}

impl MockGateway {
    /// Experiments finish on their own after `experiment_duration`.
    pub fn new(experiment_duration: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(MockState::default())),
            experiment_duration: Some(experiment_duration),
        }
    }

    /// Experiments run until [`MockGateway::finish_experiment`] is called.
    pub fn manual() -> Self {
        Self {
            state: Arc::new(RwLock::new(MockState::default())),
            experiment_duration: None,
        }
    }

    /// Complete the running experiment now.
    pub async fn finish_experiment(&self) {
        self.state.write().await.active = None;
    }

    /// Pretend an experiment was started by someone else.
    pub async fn start_external_experiment(&self, request: CommandRequest) {
        self.state.write().await.active = Some(ActiveExperiment {
            request,
            ends_at: None,
        });
    }

    /// Make status queries fail with HTTP 503.
    pub async fn set_status_failure(&self, fail: bool) {
        self.state.write().await.fail_status = fail;
    }

    /// Make submissions fail as if the service could not be reached.
    pub async fn set_submit_failure(&self, fail: bool) {
        self.state.write().await.fail_submit = fail;
    }

    /// Delay every status response by `delay`.
    pub async fn set_status_delay(&self, delay: Option<Duration>) {
        self.state.write().await.status_delay = delay;
    }

    /// Accept submissions immediately but answer only after `delay`.
    pub async fn set_submit_delay(&self, delay: Option<Duration>) {
        self.state.write().await.submit_delay = delay;
    }

    /// Every accepted submission, oldest first.
    pub async fn submissions(&self) -> Vec<CommandRequest> {
        self.state.read().await.submissions.clone()
    }

    /// Submissions that arrived while another experiment was active.
    pub async fn overlapping_submissions(&self) -> u32 {
        self.state.read().await.overlapping_submissions
    }

    /// Number of abort requests received.
    pub async fn aborts(&self) -> u32 {
        self.state.read().await.aborts
    }

    /// Number of status queries received.
    pub async fn status_queries(&self) -> u32 {
        self.state.read().await.status_queries
    }

    /// Manual commands received, oldest first.
    pub async fn manual_commands(&self) -> Vec<ManualCommand> {
        self.state.read().await.manual.clone()
    }

    /// Whether an experiment is currently running.
    pub async fn is_busy(&self) -> bool {
        let mut state = self.state.write().await;
        state.expire(Instant::now());
        state.active.is_some()
    }
}

fn unavailable(endpoint: &str) -> GatewayError {
    GatewayError::Status {
        endpoint: endpoint.to_string(),
        status: 503,
    }
}

fn progress_marker(request: &CommandRequest) -> Value {
    let cur_temp = request
        .xrd_params
        .temperatures
        .first()
        .copied()
        .unwrap_or(ROOM_TEMPERATURE);
    json!({
        "progress": {
            "cur_step": 0,
            "total_steps": request.xrd_params.temperatures.len(),
            "cur_temp": cur_temp,
        },
        "xrd_params": {
            "sample_num": request.sample_num,
            "min_angle": request.xrd_params.min_angle,
            "max_angle": request.xrd_params.max_angle,
            "precision": request.xrd_params.precision,
            "temperatures": request.xrd_params.temperatures,
        },
    })
}

#[async_trait]
impl InstrumentGateway for MockGateway {
    async fn fetch_status(&self) -> Result<InstrumentStatus, GatewayError> {
        let delay = {
            let mut state = self.state.write().await;
            state.status_queries += 1;
            state.status_delay
        };
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        let mut state = self.state.write().await;
        if state.fail_status {
            return Err(unavailable(STATE_ENDPOINT));
        }
        state.expire(Instant::now());
        Ok(match &state.active {
            Some(active) => InstrumentStatus::active(progress_marker(&active.request)),
            None => InstrumentStatus::idle(),
        })
    }

    async fn submit(&self, request: &CommandRequest) -> Result<Value, GatewayError> {
        let delay = {
            let mut state = self.state.write().await;
            if state.fail_submit {
                return Err(GatewayError::Unreachable {
                    endpoint: COMMAND_ENDPOINT.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            let now = Instant::now();
            state.expire(now);
            if state.active.is_some() {
                tracing::warn!(sample = request.sample_num, "mock received overlapping submission");
                state.overlapping_submissions += 1;
            }
            state.submissions.push(request.clone());
            state.active = Some(ActiveExperiment {
                request: request.clone(),
                ends_at: self.experiment_duration.map(|d| now + d),
            });
            state.submit_delay
        };
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        Ok(json!({ "success": true }))
    }

    async fn abort(&self) -> Result<(), GatewayError> {
        let mut state = self.state.write().await;
        state.aborts += 1;
        state.active = None;
        Ok(())
    }

    async fn send_manual(&self, command: ManualCommand) -> Result<Value, GatewayError> {
        self.state.write().await.manual.push(command);
        let mut response = json!({ "success": true });
        if let Some(Value::Object(body)) = command.body() {
            if let Value::Object(map) = &mut response {
                map.extend(body);
            }
        }
        Ok(response)
    }
}
