//! Message types for actor-based communication
//!
//! This module defines the command and event types used for message-passing
//! between operator-facing code and the scheduler actor. The actor owns the
//! queue and run state exclusively; everything else talks to it through these
//! messages.

use crate::controller::{QueueSnapshot, RunPhase};
use crate::error::{AishError, ControlError, GatewayError, IndexError, ValidationError};
use crate::job::{JobDescriptor, JobForm, SampleSelection};
use tokio::sync::oneshot;

/// Commands that can be sent to the scheduler actor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Validate a form and append the resulting job
    AddJob {
        form: JobForm,
        response: oneshot::Sender<Result<JobDescriptor, ValidationError>>,
    },

    /// Select the sample the next job targets
    SelectSample {
        sample: u32,
        response: oneshot::Sender<Result<SampleSelection, ValidationError>>,
    },

    /// Delete a pending job
    RemoveAt {
        index: usize,
        response: oneshot::Sender<Result<JobDescriptor, IndexError>>,
    },

    /// Reorder pending jobs
    MoveItem {
        from: usize,
        to: usize,
        response: oneshot::Sender<Result<(), IndexError>>,
    },

    /// Begin dispatching
    Start {
        response: oneshot::Sender<Result<(), ControlError>>,
    },

    /// Stop dispatching
    Pause { response: oneshot::Sender<()> },

    /// Stop dispatching and abort the running experiment
    Abort {
        response: oneshot::Sender<Result<(), GatewayError>>,
    },

    /// Get a copy of queue and run state
    Snapshot {
        response: oneshot::Sender<QueueSnapshot>,
    },

    /// Get the current sample selection
    Selection {
        response: oneshot::Sender<SampleSelection>,
    },

    /// Stop the actor
    Shutdown { response: oneshot::Sender<()> },
}

impl SchedulerCommand {
    /// Helper to create an AddJob command
    pub fn add_job(
        form: JobForm,
    ) -> (Self, oneshot::Receiver<Result<JobDescriptor, ValidationError>>) {
        let (tx, rx) = oneshot::channel();
        (Self::AddJob { form, response: tx }, rx)
    }

    /// Helper to create a SelectSample command
    pub fn select_sample(
        sample: u32,
    ) -> (Self, oneshot::Receiver<Result<SampleSelection, ValidationError>>) {
        let (tx, rx) = oneshot::channel();
        (Self::SelectSample { sample, response: tx }, rx)
    }

    /// Helper to create a RemoveAt command
    pub fn remove_at(index: usize) -> (Self, oneshot::Receiver<Result<JobDescriptor, IndexError>>) {
        let (tx, rx) = oneshot::channel();
        (Self::RemoveAt { index, response: tx }, rx)
    }

    /// Helper to create a MoveItem command
    pub fn move_item(from: usize, to: usize) -> (Self, oneshot::Receiver<Result<(), IndexError>>) {
        let (tx, rx) = oneshot::channel();
        (Self::MoveItem { from, to, response: tx }, rx)
    }

    /// Helper to create a Start command
    pub fn start() -> (Self, oneshot::Receiver<Result<(), ControlError>>) {
        let (tx, rx) = oneshot::channel();
        (Self::Start { response: tx }, rx)
    }

    /// Helper to create a Pause command
    pub fn pause() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Pause { response: tx }, rx)
    }

    /// Helper to create an Abort command
    pub fn abort() -> (Self, oneshot::Receiver<Result<(), GatewayError>>) {
        let (tx, rx) = oneshot::channel();
        (Self::Abort { response: tx }, rx)
    }

    /// Helper to create a Snapshot command
    pub fn snapshot() -> (Self, oneshot::Receiver<QueueSnapshot>) {
        let (tx, rx) = oneshot::channel();
        (Self::Snapshot { response: tx }, rx)
    }

    /// Helper to create a Selection command
    pub fn selection() -> (Self, oneshot::Receiver<SampleSelection>) {
        let (tx, rx) = oneshot::channel();
        (Self::Selection { response: tx }, rx)
    }

    /// Helper to create a Shutdown command
    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { response: tx }, rx)
    }
}

/// Notifications broadcast by the scheduler actor
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// A job was appended to the queue
    JobQueued(JobDescriptor),
    /// A job was submitted to the instrument
    JobDispatched(JobDescriptor),
    /// An idle poll observed that the running job is no longer active
    JobFinished(JobDescriptor),
    /// Submission never reached the instrument; the job is back at the head of the queue
    DispatchFailed { job: JobDescriptor, reason: String },
    /// Submission got no clean answer; the job stays running until an idle poll
    DispatchUnconfirmed { job: JobDescriptor, reason: String },
    /// The queue ran dry while running; the scheduler paused itself
    QueueExhausted,
    /// A status query failed; the tick was skipped
    RemoteUnavailable(String),
    /// The run phase changed
    PhaseChanged(RunPhase),
}

impl From<oneshot::error::RecvError> for AishError {
    fn from(_: oneshot::error::RecvError) -> Self {
        AishError::SchedulerStopped
    }
}
