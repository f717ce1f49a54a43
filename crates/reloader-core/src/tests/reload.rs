//! Category B: Config change restart falsification tests (R011-R020).

use std::path::PathBuf;
use std::time::Duration;

use notify::EventKind;
use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind};
use tokio::sync::mpsc;

use crate::config::{BackoffConfig, RestartPolicy};
use crate::filter::EventFilter;
use crate::supervisor::ChildSupervisor;
use crate::tests::harness::{TestHarness, wait_until};
use crate::watcher::ConfigWatcher;

fn event(kind: EventKind, path: &str) -> notify::Event {
    notify::Event::new(kind).add_path(PathBuf::from(path))
}

/// R011: One kill produces exactly one relaunch
#[tokio::test]
async fn r011_kill_yields_exactly_one_relaunch() {
    let harness = TestHarness::new();
    let supervisor = ChildSupervisor::new(&harness.long_running());
    let stats = supervisor.stats();
    let switch = supervisor.kill_switch();
    let stop = supervisor.stop_handle();
    let task = tokio::spawn(supervisor.run());

    wait_until("child A", || harness.pids().len() == 1).await;
    assert!(switch.kill());
    wait_until("child B", || harness.pids().len() == 2).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(stats.launches(), 2);
    assert_eq!(stats.kill_requests(), 1);
    assert_eq!(stats.live_children(), 1);

    stop.stop();
    task.await.unwrap().unwrap();
}

/// R012: The relaunched child gets the same arguments as the original
#[cfg(target_os = "linux")]
#[tokio::test]
async fn r012_relaunch_uses_identical_arguments() {
    let harness = TestHarness::new();
    let config = harness.long_running();
    let supervisor = ChildSupervisor::new(&config);
    let switch = supervisor.kill_switch();
    let stop = supervisor.stop_handle();
    let task = tokio::spawn(supervisor.run());

    wait_until("child A", || harness.launch_args().len() == 1).await;
    switch.kill();
    wait_until("child B", || harness.launch_args().len() == 2).await;

    let args = harness.launch_args();
    assert_eq!(args[0], args[1]);
    assert!(args[0].starts_with("/bin/sh -c "), "unexpected cmdline: {}", args[0]);

    stop.stop();
    task.await.unwrap().unwrap();
}

/// R013: Kill requests against the same child collapse into at least one restart
#[tokio::test]
async fn r013_burst_of_kills_restarts_at_least_once() {
    let harness = TestHarness::new();
    let supervisor = ChildSupervisor::new(&harness.long_running());
    let stats = supervisor.stats();
    let switch = supervisor.kill_switch();
    let stop = supervisor.stop_handle();
    let task = tokio::spawn(supervisor.run());

    wait_until("child A", || harness.pids().len() == 1).await;
    for _ in 0..5 {
        switch.kill();
    }
    wait_until("relaunch", || stats.launches() >= 2).await;
    wait_until("a running child", || stats.current_pid().is_some()).await;
    assert!(stats.launches() <= 6);

    stop.stop();
    task.await.unwrap().unwrap();
}

/// R014: A config change restart is not delayed by the backoff policy
#[tokio::test]
async fn r014_kill_resets_backoff() {
    let harness = TestHarness::new();
    let backoff = BackoffConfig::new()
        .with_initial_delay(Duration::from_secs(30))
        .with_max_delay(Duration::from_secs(30));
    let config = harness
        .long_running()
        .with_restart(RestartPolicy::Backoff(backoff));

    let supervisor = ChildSupervisor::new(&config);
    let stats = supervisor.stats();
    let switch = supervisor.kill_switch();
    let stop = supervisor.stop_handle();
    let task = tokio::spawn(supervisor.run());

    wait_until("child A", || harness.pids().len() == 1).await;
    switch.kill();
    wait_until("child B", || stats.launches() == 2).await;

    stop.stop();
    task.await.unwrap().unwrap();
}

/// R015: A creation event kills the child; other events do not
#[tokio::test]
async fn r015_only_create_events_restart() {
    let harness = TestHarness::new();
    let supervisor = ChildSupervisor::new(&harness.long_running());
    let stats = supervisor.stats();
    let (tx, rx) = mpsc::unbounded_channel();
    let watcher = ConfigWatcher::from_events(rx, supervisor.kill_switch(), EventFilter::new());
    let stop_watcher = watcher.stop_handle();
    let stop_supervisor = supervisor.stop_handle();

    let sup_task = tokio::spawn(supervisor.run());
    let watch_task = tokio::spawn(watcher.run());
    wait_until("child A", || harness.pids().len() == 1).await;

    for kind in [
        EventKind::Modify(ModifyKind::Data(DataChange::Content)),
        EventKind::Remove(RemoveKind::File),
        EventKind::Modify(ModifyKind::Metadata(notify::event::MetadataKind::Permissions)),
    ] {
        tx.send(Ok(event(kind, "/cfg/fluent-bit.conf"))).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(stats.launches(), 1, "non-create event restarted the child");

    tx.send(Ok(event(EventKind::Create(CreateKind::File), "/cfg/..data")))
        .unwrap();
    wait_until("child B", || harness.pids().len() == 2).await;
    assert_eq!(stats.kill_requests(), 1);

    stop_watcher.stop();
    stop_supervisor.stop();
    watch_task.await.unwrap().unwrap();
    sup_task.await.unwrap().unwrap();
}

/// R016: With a marker configured, only that file name restarts the child
#[tokio::test]
async fn r016_marker_filter_is_opt_in() {
    let harness = TestHarness::new();
    let supervisor = ChildSupervisor::new(&harness.long_running());
    let stats = supervisor.stats();
    let (tx, rx) = mpsc::unbounded_channel();
    let watcher = ConfigWatcher::from_events(
        rx,
        supervisor.kill_switch(),
        EventFilter::with_marker("..data"),
    );
    let stop_watcher = watcher.stop_handle();
    let stop_supervisor = supervisor.stop_handle();

    let sup_task = tokio::spawn(supervisor.run());
    let watch_task = tokio::spawn(watcher.run());
    wait_until("child A", || harness.pids().len() == 1).await;

    tx.send(Ok(event(EventKind::Create(CreateKind::File), "/cfg/..2026_10_14_tmp")))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(stats.launches(), 1);

    tx.send(Ok(event(EventKind::Create(CreateKind::Any), "/cfg/..data")))
        .unwrap();
    wait_until("child B", || stats.launches() == 2).await;

    stop_watcher.stop();
    stop_supervisor.stop();
    watch_task.await.unwrap().unwrap();
    sup_task.await.unwrap().unwrap();
}

/// R017: A watch-subsystem error ends the watcher with an error
#[tokio::test]
async fn r017_watch_error_is_fatal_for_watcher() {
    let supervisor = ChildSupervisor::new(&TestHarness::new().long_running());
    let (tx, rx) = mpsc::unbounded_channel();
    let watcher = ConfigWatcher::from_events(rx, supervisor.kill_switch(), EventFilter::new());

    tx.send(Err(notify::Error::generic("inotify queue overflow")))
        .unwrap();
    let result = watcher.run().await;
    assert!(matches!(result, Err(crate::ReloadError::Watch(_))));
}

/// R018: A closed event stream without a stop request is an error
#[tokio::test]
async fn r018_closed_stream_is_an_error() {
    let supervisor = ChildSupervisor::new(&TestHarness::new().long_running());
    let (tx, rx) = mpsc::unbounded_channel();
    let watcher = ConfigWatcher::from_events(rx, supervisor.kill_switch(), EventFilter::new());

    drop(tx);
    tokio_test::assert_err!(watcher.run().await);
}

/// R019: A real file created in the watch directory restarts the child
#[tokio::test]
async fn r019_real_directory_watch() {
    let harness = TestHarness::new();
    let config = harness.long_running();
    let supervisor = ChildSupervisor::new(&config);
    let stats = supervisor.stats();
    let watcher = ConfigWatcher::new(&config, supervisor.kill_switch()).unwrap();
    let stop_watcher = watcher.stop_handle();
    let stop_supervisor = supervisor.stop_handle();

    let sup_task = tokio::spawn(supervisor.run());
    let watch_task = tokio::spawn(watcher.run());
    wait_until("child A", || harness.pids().len() == 1).await;

    harness.touch("fluent-bit.conf");
    wait_until("child B", || harness.pids().len() >= 2).await;
    assert!(stats.kill_requests() >= 1);

    stop_watcher.stop();
    stop_supervisor.stop();
    watch_task.await.unwrap().unwrap();
    sup_task.await.unwrap().unwrap();
}
