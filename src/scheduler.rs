//! Actor-based queue scheduler
//!
//! All queue and run state lives in a single async task. Operator code holds a
//! [`SchedulerHandle`] and talks to the task through [`SchedulerCommand`]
//! messages, so there is exactly one owner of the single-flight invariant and
//! no locking.
//!
//! # Poll loop
//!
//! The task wakes on a fixed interval and queries instrument status. The query
//! is held as a pending future while the loop keeps serving commands, so a
//! pause or reorder issued during the round trip is already applied when the
//! answer arrives. The dispatch decision is always made from controller state
//! as it stands after the query resolves. Only one query is outstanding at a
//! time, and each one is bounded by the configured poll timeout.

use crate::config::AishConfig;
use crate::controller::{QueueSnapshot, RunController, RunPhase, TickDecision};
use crate::error::{AishError, AppResult, ControlError, GatewayError, ValidationError};
use crate::gateway::{CommandRequest, InstrumentGateway, InstrumentStatus};
use crate::job::{JobBuilder, JobDescriptor, JobForm, SampleSelection};
use crate::messages::{SchedulerCommand, SchedulerEvent};
use futures::future::{BoxFuture, OptionFuture};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, info_span, warn, Instrument};

const EVENT_CAPACITY: usize = 256;

type StatusFuture = BoxFuture<'static, Result<InstrumentStatus, GatewayError>>;

/// What the event loop does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandOutcome {
    Handled,
    /// Query status now instead of waiting for the next tick.
    PollNow,
    Shutdown,
}

/// Actor that owns the queue, the run state and the poll loop
pub struct Scheduler {
    controller: RunController,
    builder: JobBuilder,
    gateway: Arc<dyn InstrumentGateway>,
    poll_interval: Duration,
    poll_timeout: Duration,
    mailbox_capacity: usize,
    events: broadcast::Sender<SchedulerEvent>,
    last_phase: RunPhase,
}

impl Scheduler {
    /// Creates a new scheduler for `gateway`
    pub fn new(gateway: Arc<dyn InstrumentGateway>, config: &AishConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let controller = RunController::new();
        let last_phase = controller.phase();
        Self {
            controller,
            builder: JobBuilder::new(config.samples.slots),
            gateway,
            poll_interval: config.scheduler.poll_interval(),
            poll_timeout: config.scheduler.poll_timeout(),
            mailbox_capacity: config.scheduler.mailbox_capacity,
            events,
            last_phase,
        }
    }

    /// Spawns the actor on the current Tokio runtime
    pub fn spawn(self) -> (SchedulerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.mailbox_capacity);
        let handle = SchedulerHandle {
            tx,
            events: self.events.clone(),
        };
        let task = tokio::spawn(self.run(rx).instrument(info_span!("scheduler")));
        (handle, task)
    }

    /// Runs the actor event loop until shutdown or until every handle is dropped
    pub async fn run(mut self, mut command_rx: mpsc::Receiver<SchedulerCommand>) {
        info!(
            interval = ?self.poll_interval,
            timeout = ?self.poll_timeout,
            "scheduler started"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<StatusFuture> = None;

        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    let Some(command) = command else { break };
                    match self.handle_command(command).await {
                        CommandOutcome::Shutdown => break,
                        CommandOutcome::PollNow if in_flight.is_none() => {
                            in_flight = Some(self.begin_poll());
                        }
                        CommandOutcome::PollNow | CommandOutcome::Handled => {}
                    }
                }

                _ = ticker.tick(), if in_flight.is_none() => {
                    in_flight = Some(self.begin_poll());
                }

                Some(result) = OptionFuture::from(in_flight.as_mut()), if in_flight.is_some() => {
                    in_flight = None;
                    self.complete_poll(result).await;
                }
            }
        }

        info!("scheduler shutting down");
    }

    /// Handles one operator command and tells the loop what to do next.
    async fn handle_command(&mut self, command: SchedulerCommand) -> CommandOutcome {
        let mut outcome = CommandOutcome::Handled;
        match command {
            SchedulerCommand::AddJob { form, response } => {
                let result = self.add_job(&form);
                let _ = response.send(result);
            }

            SchedulerCommand::SelectSample { sample, response } => {
                let result = self.builder.select(sample).map(|()| self.builder.selection());
                let _ = response.send(result);
            }

            SchedulerCommand::RemoveAt { index, response } => {
                let result = self.controller.remove_at(index);
                if let Ok(job) = &result {
                    info!(job = %job.id(), index, "removed job from queue");
                }
                let _ = response.send(result);
            }

            SchedulerCommand::MoveItem { from, to, response } => {
                let result = self.controller.move_item(from, to);
                if result.is_ok() {
                    debug!(from, to, "reordered queue");
                }
                let _ = response.send(result);
            }

            SchedulerCommand::Start { response } => {
                let result = self.controller.start();
                match &result {
                    Ok(()) => {
                        info!(pending = self.controller.queue().len(), "queue started");
                        outcome = CommandOutcome::PollNow;
                    }
                    Err(e) => warn!(error = %e, "start refused"),
                }
                let _ = response.send(result);
            }

            SchedulerCommand::Pause { response } => {
                self.controller.pause();
                info!("queue paused");
                let _ = response.send(());
            }

            SchedulerCommand::Abort { response } => {
                self.controller.abort();
                self.publish_phase();
                warn!(
                    running = ?self.controller.running_item().map(JobDescriptor::id),
                    "abort requested"
                );
                let result = self.request_abort().await;
                let _ = response.send(result);
            }

            SchedulerCommand::Snapshot { response } => {
                let _ = response.send(self.controller.snapshot());
            }

            SchedulerCommand::Selection { response } => {
                let _ = response.send(self.builder.selection());
            }

            SchedulerCommand::Shutdown { response } => {
                info!("shutdown command received");
                let _ = response.send(());
                outcome = CommandOutcome::Shutdown;
            }
        }
        self.publish_phase();
        outcome
    }

    fn add_job(&mut self, form: &JobForm) -> Result<JobDescriptor, ValidationError> {
        let job = self.builder.build(form).map_err(|e| {
            warn!(error = %e, "rejected job");
            e
        })?;
        info!(
            job = %job.id(),
            name = job.item_name(),
            sample = job.sample_number(),
            scans = job.temperatures().len(),
            "queued job"
        );
        self.controller.enqueue(job.clone());
        self.emit(SchedulerEvent::JobQueued(job.clone()));
        Ok(job)
    }

    fn begin_poll(&self) -> StatusFuture {
        let gateway = Arc::clone(&self.gateway);
        let limit = self.poll_timeout;
        Box::pin(async move {
            match timeout(limit, gateway.fetch_status()).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout(limit)),
            }
        })
    }

    async fn complete_poll(&mut self, result: Result<InstrumentStatus, GatewayError>) {
        let status = match result {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "status query failed; skipping tick");
                self.emit(SchedulerEvent::RemoteUnavailable(e.to_string()));
                return;
            }
        };

        match self.controller.on_status(&status) {
            TickDecision::Busy => {
                if let Some(progress) = status.progress() {
                    debug!(
                        step = progress.cur_step,
                        total = progress.total_steps,
                        temp = progress.cur_temp,
                        "instrument busy"
                    );
                }
            }
            TickDecision::Paused { finished } => {
                self.report_finished(finished);
            }
            TickDecision::Exhausted { finished } => {
                self.report_finished(finished);
                info!("queue exhausted; pausing");
                self.emit(SchedulerEvent::QueueExhausted);
            }
            TickDecision::Dispatch { job, finished } => {
                self.report_finished(finished);
                self.dispatch(job).await;
            }
        }
        self.publish_phase();
    }

    async fn dispatch(&mut self, job: JobDescriptor) {
        let request = CommandRequest::from(&job);
        let result = match timeout(self.poll_timeout, self.gateway.submit(&request)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.poll_timeout)),
        };

        match result {
            Ok(response) => {
                info!(
                    job = %job.id(),
                    name = job.item_name(),
                    sample = job.sample_number(),
                    response = %response,
                    "dispatched job"
                );
                self.emit(SchedulerEvent::JobDispatched(job));
            }
            Err(e) if e.is_undelivered() => {
                warn!(job = %job.id(), error = %e, "dispatch failed; job returned to head of queue");
                self.controller.dispatch_failed(job.clone());
                self.emit(SchedulerEvent::DispatchFailed {
                    job,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                // The request may have been acted on. Keep the job as the
                // running item; the next idle poll retires it.
                warn!(job = %job.id(), error = %e, "dispatch unconfirmed; awaiting next poll");
                self.emit(SchedulerEvent::DispatchUnconfirmed {
                    job,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn request_abort(&self) -> Result<(), GatewayError> {
        let result = match timeout(self.poll_timeout, self.gateway.abort()).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.poll_timeout)),
        };
        if let Err(e) = &result {
            warn!(error = %e, "abort request failed");
        }
        result
    }

    fn report_finished(&self, finished: Option<JobDescriptor>) {
        if let Some(job) = finished {
            info!(job = %job.id(), name = job.item_name(), "job finished");
            self.emit(SchedulerEvent::JobFinished(job));
        }
    }

    fn publish_phase(&mut self) {
        let phase = self.controller.phase();
        if phase != self.last_phase {
            debug!(from = %self.last_phase, to = %phase, "phase changed");
            self.last_phase = phase;
            self.emit(SchedulerEvent::PhaseChanged(phase));
        }
    }

    fn emit(&self, event: SchedulerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Cloneable handle to a running [`Scheduler`]
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerCommand>,
    events: broadcast::Sender<SchedulerEvent>,
}

impl SchedulerHandle {
    async fn request<T>(
        &self,
        (command, response): (SchedulerCommand, oneshot::Receiver<T>),
    ) -> AppResult<T> {
        self.tx
            .send(command)
            .await
            .map_err(|_| AishError::SchedulerStopped)?;
        Ok(response.await?)
    }

    /// Validate `form` and append the job to the queue
    pub async fn add_job(&self, form: JobForm) -> AppResult<JobDescriptor> {
        Ok(self.request(SchedulerCommand::add_job(form)).await??)
    }

    /// Select the sample the next job targets
    pub async fn select_sample(&self, sample: u32) -> AppResult<SampleSelection> {
        Ok(self.request(SchedulerCommand::select_sample(sample)).await??)
    }

    /// Current sample selection
    pub async fn selection(&self) -> AppResult<SampleSelection> {
        self.request(SchedulerCommand::selection()).await
    }

    /// Delete the pending job at `index`
    pub async fn remove_at(&self, index: usize) -> AppResult<JobDescriptor> {
        Ok(self.request(SchedulerCommand::remove_at(index)).await??)
    }

    /// Move the pending job at `from` to `to`
    pub async fn move_item(&self, from: usize, to: usize) -> AppResult<()> {
        Ok(self.request(SchedulerCommand::move_item(from, to)).await??)
    }

    /// Begin dispatching
    pub async fn start(&self) -> AppResult<()> {
        let result: Result<(), ControlError> = self.request(SchedulerCommand::start()).await?;
        Ok(result?)
    }

    /// Stop dispatching; a running experiment continues
    pub async fn pause(&self) -> AppResult<()> {
        self.request(SchedulerCommand::pause()).await
    }

    /// Stop dispatching and ask the instrument to abort
    ///
    /// The scheduler is paused even when the abort request itself fails.
    pub async fn abort(&self) -> AppResult<()> {
        Ok(self.request(SchedulerCommand::abort()).await??)
    }

    /// Copy of queue and run state
    pub async fn snapshot(&self) -> AppResult<QueueSnapshot> {
        self.request(SchedulerCommand::snapshot()).await
    }

    /// Stop the actor
    pub async fn shutdown(&self) -> AppResult<()> {
        self.request(SchedulerCommand::shutdown()).await
    }

    /// Subscribe to scheduler events
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }
}
