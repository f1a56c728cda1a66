//! Core library for the AISH experiment queue.
//!
//! Operators queue XRD experiments (optionally with a heating ramp) for an
//! automated sample loader. A single scheduler task polls the remote
//! instrument and dispatches exactly one queued job whenever it is idle.
//! The library is used by the `aish_queue` binary and by the integration
//! tests.

pub mod config;
pub mod console;
pub mod controller;
pub mod error;
pub mod estimate;
pub mod gateway;
pub mod job;
pub mod logging;
pub mod messages;
pub mod queue;
pub mod scheduler;

pub use config::AishConfig;
pub use controller::{QueueSnapshot, RunController, RunPhase, TickDecision};
pub use error::{AishError, AppResult};
pub use gateway::{HttpGateway, InstrumentGateway, InstrumentStatus, MockGateway};
pub use job::{JobBuilder, JobDescriptor, JobForm, Precision};
pub use messages::{SchedulerCommand, SchedulerEvent};
pub use scheduler::{Scheduler, SchedulerHandle};
