//! Scheduler-level behavior: toggles, the gate watcher and shutdown

mod common;

use std::sync::Arc;
use std::time::Duration;

use carousel::blacklist::NoopBlacklist;
use carousel::cluster::PublishGate;
use carousel::scheduler::{CarouselScheduler, CycleConfig, CycleState};
use carousel::storage::FileMetadataStore;
use common::{seeded_store, wait_for, RecordingTask};
use tempfile::TempDir;

struct Fixture {
    scheduler: Arc<CarouselScheduler>,
    task: Arc<RecordingTask>,
    gate: PublishGate,
    _state_dir: TempDir,
}

fn fixture() -> Fixture {
    let state_dir = TempDir::new().unwrap();
    let task = RecordingTask::new();
    let gate = PublishGate::always_open();
    let scheduler = Arc::new(CarouselScheduler::new(
        seeded_store("methode", &["u1", "u2", "u3"]),
        task.clone(),
        Arc::new(NoopBlacklist),
        Arc::new(FileMetadataStore::new(state_dir.path()).unwrap()),
        gate.clone(),
    ));
    Fixture {
        scheduler,
        task,
        gate,
        _state_dir: state_dir,
    }
}

fn slow_cycle(name: &str) -> CycleConfig {
    CycleConfig {
        name: name.to_string(),
        cycle_type: "ThrottledWholeCollection".to_string(),
        collection: "methode".to_string(),
        origin: "methode-web-pub".to_string(),
        cool_down: Duration::from_secs(3600),
        throttle: Some("10m".to_string()),
        time_window: None,
        minimum_throttle: None,
        maximum_throttle: None,
    }
}

#[tokio::test(start_paused = true)]
async fn manual_toggle_stops_and_restarts_all_cycles() {
    let f = fixture();
    let id = f.scheduler.add_cycle(slow_cycle("archive")).await.unwrap();

    f.scheduler.start().await;
    let cycle = f.scheduler.cycle(&id).await.unwrap();
    wait_for(|| async { !cycle.state().await.contains(&CycleState::Stopped) }).await;

    f.scheduler.manual_toggle("false").await;
    assert!(cycle.state().await.contains(&CycleState::Stopped));
    assert!(!f.scheduler.is_enabled());

    f.scheduler.manual_toggle("true").await;
    wait_for(|| async { !cycle.state().await.contains(&CycleState::Stopped) }).await;

    f.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn start_is_refused_while_disabled() {
    let f = fixture();
    let id = f.scheduler.add_cycle(slow_cycle("archive")).await.unwrap();

    f.scheduler.manual_toggle("false").await;
    f.scheduler.start().await;

    let cycle = f.scheduler.cycle(&id).await.unwrap();
    assert!(cycle.state().await.contains(&CycleState::Stopped));

    f.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn gate_watcher_drives_the_automatic_toggle() {
    let f = fixture();
    let id = f.scheduler.add_cycle(slow_cycle("archive")).await.unwrap();

    f.scheduler.start_gate_watcher();
    f.scheduler.start().await;

    let cycle = f.scheduler.cycle(&id).await.unwrap();
    wait_for(|| async { !cycle.state().await.contains(&CycleState::Stopped) }).await;

    f.gate.set_healthy(false);
    wait_for(|| async { cycle.state().await.contains(&CycleState::Stopped) }).await;
    assert!(f.scheduler.is_automatically_disabled());
    assert!(f.scheduler.was_automatically_disabled());

    f.gate.set_healthy(true);
    wait_for(|| async { !cycle.state().await.contains(&CycleState::Stopped) }).await;
    assert!(!f.scheduler.is_automatically_disabled());
    assert!(
        f.scheduler.was_automatically_disabled(),
        "the automatic disablement is remembered"
    );

    f.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent() {
    let f = fixture();
    let id = f.scheduler.add_cycle(slow_cycle("archive")).await.unwrap();
    let cycle = f.scheduler.cycle(&id).await.unwrap();

    cycle.stop().await;
    cycle.stop().await;
    assert!(cycle.state().await.contains(&CycleState::Stopped));

    f.scheduler.start().await;
    wait_for(|| async { !cycle.state().await.contains(&CycleState::Stopped) }).await;
    cycle.stop().await;
    cycle.stop().await;
    assert!(cycle.state().await.contains(&CycleState::Stopped));

    f.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reset_on_a_stopped_cycle_is_safe() {
    let f = fixture();
    let id = f.scheduler.add_cycle(slow_cycle("archive")).await.unwrap();
    let cycle = f.scheduler.cycle(&id).await.unwrap();

    cycle.reset().await;

    let meta = cycle.metadata().await;
    assert_eq!(meta.iteration, 0);
    assert_eq!(meta.completed, 0);
    assert_eq!(meta.errors, 0);

    f.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_cycles_and_throttles() {
    let f = fixture();
    f.scheduler
        .add_throttle("shared", Duration::from_secs(600))
        .await
        .unwrap();

    let mut config = slow_cycle("archive");
    config.throttle = Some("shared".to_string());
    let id = f.scheduler.add_cycle(config).await.unwrap();

    f.scheduler.start().await;
    let cycle = f.scheduler.cycle(&id).await.unwrap();
    wait_for(|| async { !cycle.state().await.contains(&CycleState::Stopped) }).await;

    f.scheduler.shutdown().await;

    assert!(cycle.state().await.contains(&CycleState::Stopped));
    for (_, throttle) in f.scheduler.throttles().await {
        assert!(throttle.is_stopped());
    }
    assert!(f.task.executed().is_empty(), "the slow throttle never ticked");
}
