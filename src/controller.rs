//! Run controller state machine.
//!
//! Owns the pending queue, the paused flag and the currently dispatched job.
//! It is purely synchronous: the scheduler feeds it fresh instrument status and
//! carries out whatever [`TickDecision`] it returns.
//!
//! # States
//!
//! ```text
//!            start()                 idle poll, queue non-empty
//!  Paused ───────────► RunningIdle ─────────────────────────► RunningDispatched
//!    ▲                    │  ▲                                     │
//!    │ pause()/abort()    │  └──── idle poll (completion seen) ────┘
//!    └────────────────────┴─ idle poll, queue empty (auto-pause)
//! ```
//!
//! An active instrument always wins: no dispatch happens while the remote
//! reports an experiment, whatever the local flag says.

use crate::error::{ControlError, IndexError};
use crate::gateway::InstrumentStatus;
use crate::job::JobDescriptor;
use crate::queue::QueueStore;
use serde::Serialize;
use std::fmt;

/// Derived scheduler phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    /// No further dispatch until started.
    Paused,
    /// Running, nothing in flight.
    RunningIdle,
    /// Running, one job in flight at the instrument.
    RunningDispatched,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunPhase::Paused => "paused",
            RunPhase::RunningIdle => "running (idle)",
            RunPhase::RunningDispatched => "running (dispatched)",
        };
        f.write_str(text)
    }
}

/// What the scheduler must do after a status poll.
#[derive(Debug, Clone, PartialEq)]
pub enum TickDecision {
    /// Instrument is busy; nothing to do.
    Busy,
    /// Instrument idle but the controller is paused.
    Paused {
        /// Job whose completion this poll observed, if any.
        finished: Option<JobDescriptor>,
    },
    /// Instrument idle and nothing left to run; the controller paused itself.
    Exhausted {
        /// Job whose completion this poll observed, if any.
        finished: Option<JobDescriptor>,
    },
    /// Submit this job to the instrument.
    Dispatch {
        /// Job to submit; already removed from the queue.
        job: JobDescriptor,
        /// Job whose completion this poll observed, if any.
        finished: Option<JobDescriptor>,
    },
}

/// Read-only view of controller state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSnapshot {
    /// Current phase.
    pub phase: RunPhase,
    /// Whether dispatch is suspended.
    pub paused: bool,
    /// Job believed to be running at the instrument.
    pub running_item: Option<JobDescriptor>,
    /// Pending jobs, head first.
    pub pending: Vec<JobDescriptor>,
}

/// Queue plus run state.
#[derive(Debug, Clone)]
pub struct RunController {
    queue: QueueStore,
    paused: bool,
    running_item: Option<JobDescriptor>,
}

impl Default for RunController {
    fn default() -> Self {
        Self::new()
    }
}

impl RunController {
    /// Paused controller with an empty queue.
    pub fn new() -> Self {
        Self {
            queue: QueueStore::new(),
            paused: true,
            running_item: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> RunPhase {
        match (self.paused, &self.running_item) {
            (true, _) => RunPhase::Paused,
            (false, None) => RunPhase::RunningIdle,
            (false, Some(_)) => RunPhase::RunningDispatched,
        }
    }

    /// Whether dispatch is suspended.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Job believed to be running at the instrument.
    pub fn running_item(&self) -> Option<&JobDescriptor> {
        self.running_item.as_ref()
    }

    /// Pending jobs.
    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    /// Copy of the current state for display.
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            phase: self.phase(),
            paused: self.paused,
            running_item: self.running_item.clone(),
            pending: self.queue.to_vec(),
        }
    }

    /// Append a job to the queue.
    pub fn enqueue(&mut self, job: JobDescriptor) {
        self.queue.append(job);
    }

    /// Delete the pending job at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<JobDescriptor, IndexError> {
        self.queue.remove_at(index)
    }

    /// Reorder pending jobs.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<(), IndexError> {
        self.queue.move_item(from, to)
    }

    /// Resume dispatching. Refuses to start an empty queue.
    pub fn start(&mut self) -> Result<(), ControlError> {
        if self.queue.is_empty() {
            return Err(ControlError::QueueEmpty);
        }
        self.paused = false;
        Ok(())
    }

    /// Stop dispatching. A job already at the instrument keeps running.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Stop dispatching ahead of a remote abort.
    ///
    /// The running item is left in place; the next idle poll clears it.
    pub fn abort(&mut self) {
        self.paused = true;
    }

    /// Decide what to do with a fresh instrument status.
    pub fn on_status(&mut self, status: &InstrumentStatus) -> TickDecision {
        if status.is_experiment_active() {
            return TickDecision::Busy;
        }

        let finished = self.running_item.take();
        if self.paused {
            return TickDecision::Paused { finished };
        }

        match self.queue.pop_front() {
            None => {
                self.paused = true;
                TickDecision::Exhausted { finished }
            }
            Some(job) => {
                self.running_item = Some(job.clone());
                TickDecision::Dispatch { job, finished }
            }
        }
    }

    /// Undo a dispatch whose submission never reached the instrument.
    ///
    /// Not for timeouts or error replies: those leave the job as the running
    /// item so the next poll decides whether it ran.
    pub fn dispatch_failed(&mut self, job: JobDescriptor) {
        if self.running_item.as_ref().is_some_and(|r| r.id() == job.id()) {
            self.running_item = None;
        }
        self.queue.push_front(job);
    }
}
