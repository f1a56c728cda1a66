//! End-to-end scheduler behaviour against the simulated instrument.
//!
//! All tests run on a paused Tokio clock, so poll intervals and experiment
//! durations elapse instantly and deterministically.

use aish_queue::config::AishConfig;
use aish_queue::controller::RunPhase;
use aish_queue::error::{AishError, ControlError};
use aish_queue::gateway::{InstrumentGateway, MockGateway};
use aish_queue::job::{HeatingForm, JobForm};
use aish_queue::messages::SchedulerEvent;
use aish_queue::scheduler::{Scheduler, SchedulerHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

fn form(name: &str) -> JobForm {
    JobForm {
        item_name: name.to_string(),
        min_angle: "10".to_string(),
        max_angle: "80".to_string(),
        precision: "Low".to_string(),
        heating: None,
    }
}

fn spawn(mock: &MockGateway) -> (SchedulerHandle, JoinHandle<()>) {
    let gateway: Arc<dyn InstrumentGateway> = Arc::new(mock.clone());
    Scheduler::new(gateway, &AishConfig::default()).spawn()
}

async fn wait_for<F>(events: &mut broadcast::Receiver<SchedulerEvent>, mut matches: F) -> SchedulerEvent
where
    F: FnMut(&SchedulerEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(300), async {
        loop {
            let event = events.recv().await.expect("scheduler event stream closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for scheduler event")
}

fn dispatched(name: &'static str) -> impl FnMut(&SchedulerEvent) -> bool {
    move |event| matches!(event, SchedulerEvent::JobDispatched(job) if job.item_name() == name)
}

#[tokio::test(start_paused = true)]
async fn test_paused_scheduler_never_dispatches() {
    let mock = MockGateway::manual();
    let (handle, _task) = spawn(&mock);

    handle.add_job(form("A")).await.unwrap();
    handle.add_job(form("B")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert!(mock.status_queries().await >= 5);
    assert!(mock.submissions().await.is_empty());
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, RunPhase::Paused);
    assert_eq!(snapshot.pending.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_runs_queue_one_job_at_a_time_then_pauses() {
    let mock = MockGateway::manual();
    let (handle, _task) = spawn(&mock);
    let mut events = handle.subscribe();

    handle.add_job(form("A")).await.unwrap();
    handle.add_job(form("B")).await.unwrap();
    handle.start().await.unwrap();

    wait_for(&mut events, dispatched("A")).await;

    // Busy instrument: many ticks, queue untouched.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(mock.submissions().await.len(), 1);
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, RunPhase::RunningDispatched);
    assert_eq!(snapshot.pending.len(), 1);
    assert_eq!(snapshot.running_item.unwrap().item_name(), "A");

    mock.finish_experiment().await;
    wait_for(&mut events, dispatched("B")).await;

    mock.finish_experiment().await;
    wait_for(&mut events, |e| *e == SchedulerEvent::QueueExhausted).await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, RunPhase::Paused);
    assert!(snapshot.running_item.is_none());
    assert!(snapshot.pending.is_empty());

    let submitted: Vec<_> = mock
        .submissions()
        .await
        .into_iter()
        .map(|r| r.sample_name)
        .collect();
    assert_eq!(submitted, ["A", "B"]);
    assert_eq!(mock.overlapping_submissions().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_timed_experiments_complete_without_overlap() {
    let mock = MockGateway::new(Duration::from_secs(7));
    let (handle, _task) = spawn(&mock);
    let mut events = handle.subscribe();

    for name in ["A", "B", "C", "D"] {
        handle.add_job(form(name)).await.unwrap();
    }
    handle.start().await.unwrap();

    wait_for(&mut events, |e| *e == SchedulerEvent::QueueExhausted).await;

    assert_eq!(mock.submissions().await.len(), 4);
    assert_eq!(mock.overlapping_submissions().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reorder_before_dispatch_changes_order() {
    let mock = MockGateway::manual();
    let (handle, _task) = spawn(&mock);
    let mut events = handle.subscribe();

    for name in ["A", "B", "C"] {
        handle.add_job(form(name)).await.unwrap();
    }
    handle.move_item(2, 0).await.unwrap();
    handle.remove_at(2).await.unwrap();
    handle.start().await.unwrap();

    wait_for(&mut events, dispatched("C")).await;
    mock.finish_experiment().await;
    wait_for(&mut events, dispatched("A")).await;
    mock.finish_experiment().await;
    wait_for(&mut events, |e| *e == SchedulerEvent::QueueExhausted).await;

    assert_eq!(mock.submissions().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_external_experiment_blocks_dispatch() {
    let mock = MockGateway::manual();
    let (handle, _task) = spawn(&mock);
    let mut events = handle.subscribe();

    handle.add_job(form("A")).await.unwrap();
    let external = aish_queue::gateway::CommandRequest::from(
        &handle.snapshot().await.unwrap().pending[0],
    );
    mock.start_external_experiment(external).await;
    handle.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(mock.submissions().await.is_empty());

    mock.finish_experiment().await;
    wait_for(&mut events, dispatched("A")).await;
}

#[tokio::test(start_paused = true)]
async fn test_start_with_empty_queue_is_rejected() {
    let mock = MockGateway::manual();
    let (handle, _task) = spawn(&mock);

    assert!(matches!(
        handle.start().await,
        Err(AishError::Control(ControlError::QueueEmpty))
    ));
    assert_eq!(handle.snapshot().await.unwrap().phase, RunPhase::Paused);
}

#[tokio::test(start_paused = true)]
async fn test_pause_during_outstanding_query_prevents_dispatch() {
    let mock = MockGateway::manual();
    mock.set_status_delay(Some(Duration::from_secs(1))).await;
    let (handle, _task) = spawn(&mock);

    handle.add_job(form("A")).await.unwrap();
    handle.start().await.unwrap();
    handle.pause().await.unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;

    assert!(mock.submissions().await.is_empty());
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, RunPhase::Paused);
    assert_eq!(snapshot.pending.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abort_keeps_running_item_until_idle_poll() {
    let mock = MockGateway::manual();
    let (handle, _task) = spawn(&mock);
    let mut events = handle.subscribe();

    handle.add_job(form("A")).await.unwrap();
    handle.add_job(form("B")).await.unwrap();
    handle.start().await.unwrap();
    wait_for(&mut events, dispatched("A")).await;

    handle.abort().await.unwrap();
    assert_eq!(mock.aborts().await, 1);

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, RunPhase::Paused);
    assert_eq!(snapshot.running_item.unwrap().item_name(), "A");

    wait_for(&mut events, |e| {
        matches!(e, SchedulerEvent::JobFinished(job) if job.item_name() == "A")
    })
    .await;

    let snapshot = handle.snapshot().await.unwrap();
    assert!(snapshot.running_item.is_none());
    assert_eq!(snapshot.pending.len(), 1);
    assert_eq!(mock.submissions().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_instrument_skips_ticks() {
    let mock = MockGateway::manual();
    mock.set_status_failure(true).await;
    let (handle, _task) = spawn(&mock);
    let mut events = handle.subscribe();

    handle.add_job(form("A")).await.unwrap();
    handle.start().await.unwrap();

    wait_for(&mut events, |e| matches!(e, SchedulerEvent::RemoteUnavailable(_))).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(mock.submissions().await.is_empty());
    assert_eq!(handle.snapshot().await.unwrap().pending.len(), 1);

    mock.set_status_failure(false).await;
    wait_for(&mut events, dispatched("A")).await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_status_query_times_out() {
    let mock = MockGateway::manual();
    mock.set_status_delay(Some(Duration::from_secs(60))).await;
    let (handle, _task) = spawn(&mock);
    let mut events = handle.subscribe();

    handle.add_job(form("A")).await.unwrap();
    handle.start().await.unwrap();

    let event = wait_for(&mut events, |e| matches!(e, SchedulerEvent::RemoteUnavailable(_))).await;
    let SchedulerEvent::RemoteUnavailable(reason) = event else {
        unreachable!()
    };
    assert!(reason.contains("timed out"));
    assert!(mock.submissions().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_submission_requeues_job_at_head() {
    let mock = MockGateway::manual();
    mock.set_submit_failure(true).await;
    let (handle, _task) = spawn(&mock);
    let mut events = handle.subscribe();

    handle.add_job(form("A")).await.unwrap();
    handle.add_job(form("B")).await.unwrap();
    handle.start().await.unwrap();

    let event = wait_for(&mut events, |e| matches!(e, SchedulerEvent::DispatchFailed { .. })).await;
    let SchedulerEvent::DispatchFailed { job, .. } = event else {
        unreachable!()
    };
    assert_eq!(job.item_name(), "A");

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, RunPhase::RunningIdle);
    assert!(snapshot.running_item.is_none());
    let names: Vec<_> = snapshot.pending.iter().map(|j| j.item_name().to_string()).collect();
    assert_eq!(names, ["A", "B"]);

    mock.set_submit_failure(false).await;
    wait_for(&mut events, dispatched("A")).await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_accepted_submission_is_not_sent_twice() {
    // Each experiment runs 60 s; the service only answers a submit after 30 s,
    // well past the 10 s timeout.
    let mock = MockGateway::new(Duration::from_secs(60));
    mock.set_submit_delay(Some(Duration::from_secs(30))).await;
    let (handle, _task) = spawn(&mock);
    let mut events = handle.subscribe();

    handle.add_job(form("A")).await.unwrap();
    handle.add_job(form("B")).await.unwrap();
    handle.start().await.unwrap();

    let event = wait_for(&mut events, |e| {
        matches!(e, SchedulerEvent::DispatchUnconfirmed { .. })
    })
    .await;
    let SchedulerEvent::DispatchUnconfirmed { job, reason } = event else {
        unreachable!()
    };
    assert_eq!(job.item_name(), "A");
    assert!(reason.contains("timed out"));

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, RunPhase::RunningDispatched);
    assert_eq!(snapshot.running_item.unwrap().item_name(), "A");
    assert_eq!(snapshot.pending.len(), 1);

    wait_for(&mut events, |e| *e == SchedulerEvent::QueueExhausted).await;

    let submitted: Vec<_> = mock
        .submissions()
        .await
        .into_iter()
        .map(|r| r.sample_name)
        .collect();
    assert_eq!(submitted, ["A", "B"]);
    assert_eq!(mock.overlapping_submissions().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_heated_job_reaches_instrument_with_ramp() {
    let mock = MockGateway::manual();
    let (handle, _task) = spawn(&mock);
    let mut events = handle.subscribe();

    handle.select_sample(6).await.unwrap();
    let mut heated = form("Fe2O3");
    heated.heating = Some(HeatingForm {
        min_temp: "100".to_string(),
        max_temp: "400".to_string(),
        num_scans: "4".to_string(),
    });
    handle.add_job(heated).await.unwrap();
    handle.start().await.unwrap();
    wait_for(&mut events, dispatched("Fe2O3")).await;

    let submitted = mock.submissions().await;
    assert_eq!(submitted[0].sample_num, 6);
    assert_eq!(
        submitted[0].xrd_params.temperatures,
        vec![100.0, 200.0, 300.0, 400.0]
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_form_leaves_queue_and_selection_untouched() {
    let mock = MockGateway::manual();
    let (handle, _task) = spawn(&mock);

    let mut bad = form("A");
    bad.max_angle = "eighty".to_string();
    assert!(matches!(
        handle.add_job(bad).await,
        Err(AishError::Validation(_))
    ));
    assert!(handle.snapshot().await.unwrap().pending.is_empty());
    assert_eq!(handle.selection().await.unwrap().current(), Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_actor() {
    let mock = MockGateway::manual();
    let (handle, task) = spawn(&mock);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
    assert!(matches!(
        handle.add_job(form("A")).await,
        Err(AishError::SchedulerStopped)
    ));
}
