//! Only one fleet scheduler may run in a process at a time.
//!
//! Kept in its own test binary: the lease is process-wide.

mod common;

use autocheck::adapters::backends::{Scripted, ScriptedBackend};
use autocheck::domain::models::Strategy;
use autocheck::services::SchedulerState;

use common::{Engine, RecordingTransport};

fn engine() -> Engine {
    Engine::new(
        vec![ScriptedBackend::new(Strategy::ApiDirect, Scripted::NotFound)],
        RecordingTransport::new(),
    )
}

#[tokio::test]
async fn test_second_scheduler_in_process_is_rejected() {
    let (first_engine, second_engine) = (engine(), engine());
    let first = first_engine.scheduler(2);
    let second = second_engine.scheduler(2);

    first.start().await.unwrap();
    let err = second.start().await.expect_err("a second scheduler must not start");
    assert!(err.to_string().contains("already running"), "{err}");
    assert_eq!(second.state(), SchedulerState::Stopped);

    first.shutdown().await.unwrap();
    second.start().await.unwrap();
    assert_eq!(second.state(), SchedulerState::Running);
    second.shutdown().await.unwrap();
}
