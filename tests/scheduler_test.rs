//! Fleet scheduler: per-owner isolation, concurrency cap, shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use autocheck::adapters::backends::{Scripted, ScriptedBackend};
use autocheck::domain::models::{AttemptRecord, CheckMode, Handle, Owner, Strategy};
use autocheck::domain::ports::{SettingsRepository, AUTO_CHECK_INTERVAL_KEY};
use autocheck::services::{HistoryConfig, SchedulerState, StrategyHistory};

use common::{credential, proxy, session, temp_dir, wait_for, Engine, RecordingTransport};

async fn api_owner(engine: &Engine, owner_id: i64, handle: &str) -> Handle {
    engine
        .store
        .insert_owner(Owner::new(owner_id).with_mode(CheckMode::ApiOnly))
        .await;
    engine.store.insert_credential(credential(owner_id)).await;
    engine.store.add_handle(owner_id, handle).await
}

#[tokio::test]
async fn test_owner_failures_do_not_affect_other_owners() {
    common::setup_test_logging();
    let engine = Engine::new(
        vec![
            ScriptedBackend::new(Strategy::ApiDirect, Scripted::Found),
            ScriptedBackend::new(Strategy::BrowserMobile, Scripted::Found),
        ],
        RecordingTransport::failing_for(10),
    );
    // X wants the API but has no key; its transport also panics.
    engine
        .store
        .insert_owner(Owner::new(10).with_mode(CheckMode::ApiOnly))
        .await;
    let x_handle = engine.store.add_handle(10, "xhandle").await;
    // Y is fully provisioned for browser+proxy.
    engine
        .store
        .insert_owner(Owner::new(20).with_mode(CheckMode::BrowserProxy))
        .await;
    engine.store.insert_session(session(20)).await;
    engine.store.insert_proxy(proxy(20, 1)).await;
    let y_handle = engine.store.add_handle(20, "yhandle").await;

    let scheduler = engine.scheduler(8);
    let tick = scheduler.tick().await.unwrap();
    assert_eq!(tick.launched, vec![10, 20]);

    let mut reports = scheduler.wait_idle().await;
    reports.sort_by_key(|r| r.owner_id);
    assert_eq!(reports[0].skipped, 1);
    assert_eq!(reports[1].found, 1);

    engine.sink.wait_idle().await;
    assert_eq!(engine.transport.sent_to(20), vec!["✅ @yhandle active".to_string()]);
    assert!(engine.transport.sent_to(10).is_empty());
    assert_eq!(engine.sink.stats().failed, 1);

    assert!(engine.store.handle(y_handle.id).await.unwrap().done);
    assert!(!engine.store.handle(x_handle.id).await.unwrap().done);
    assert_eq!(engine.backend(Strategy::ApiDirect).call_count(), 0);
}

#[tokio::test]
async fn test_concurrency_cap_defers_owners_to_next_tick() {
    let engine = Engine::new(
        vec![ScriptedBackend::new(Strategy::ApiDirect, Scripted::Found).with_delay(Duration::from_millis(300))],
        RecordingTransport::new(),
    );
    for (id, handle) in [(1, "one"), (2, "two"), (3, "three")] {
        api_owner(&engine, id, handle).await;
    }
    let scheduler = engine.scheduler(2);

    let first = scheduler.tick().await.unwrap();
    assert_eq!(first.eligible, 3);
    assert_eq!(first.launched, vec![1, 2]);
    assert_eq!(first.deferred, vec![3]);

    // One worker per owner: a tick while they run launches nothing new.
    let second = scheduler.tick().await.unwrap();
    assert!(second.launched.is_empty());
    assert_eq!(second.skipped_busy, vec![1, 2]);
    assert_eq!(second.deferred, vec![3]);
    assert_eq!(scheduler.active_owners(), vec![1, 2]);

    assert_eq!(scheduler.wait_idle().await.len(), 2);

    let third = scheduler.tick().await.unwrap();
    assert_eq!(third.eligible, 1);
    assert_eq!(third.launched, vec![3]);
    scheduler.wait_idle().await;

    // Everything is active now; nothing is left to check.
    let fourth = scheduler.tick().await.unwrap();
    assert_eq!(fourth.eligible, 0);
    assert_eq!(engine.backend(Strategy::ApiDirect).call_count(), 3);
}

#[tokio::test]
async fn test_disabled_owner_is_not_ticked() {
    let engine = Engine::new(
        vec![ScriptedBackend::new(Strategy::ApiDirect, Scripted::Found)],
        RecordingTransport::new(),
    );
    engine
        .store
        .insert_owner(Owner::new(1).with_mode(CheckMode::ApiOnly).with_auto_check(false))
        .await;
    engine.store.insert_credential(credential(1)).await;
    engine.store.add_handle(1, "quiet").await;

    let tick = engine.scheduler(4).tick().await.unwrap();
    assert_eq!(tick.eligible, 0);
    assert!(tick.launched.is_empty());
}

#[tokio::test]
async fn test_interval_setting_is_read_each_tick() {
    let engine = Engine::new(
        vec![ScriptedBackend::new(Strategy::ApiDirect, Scripted::NotFound)],
        RecordingTransport::new(),
    );
    let scheduler = engine.scheduler(4);
    assert_eq!(scheduler.tick().await.unwrap().interval_minutes, 5);

    engine.store.set_setting(AUTO_CHECK_INTERVAL_KEY, "5000").await.unwrap();
    assert_eq!(scheduler.tick().await.unwrap().interval_minutes, 1440);

    engine.store.set_setting(AUTO_CHECK_INTERVAL_KEY, "soon").await.unwrap();
    assert_eq!(scheduler.current_interval_minutes().await, 5);

    engine.store.set_setting(AUTO_CHECK_INTERVAL_KEY, "15").await.unwrap();
    assert_eq!(scheduler.current_interval_minutes().await, 15);
}

#[tokio::test]
async fn test_shutdown_mid_check_discards_attempt_and_flushes_history() {
    let dir = temp_dir();
    let path = dir.path().join("history.json");
    let history = Arc::new(StrategyHistory::open(HistoryConfig {
        path: Some(path.clone()),
        cap: 100,
        flush_every: 10,
    }));
    history.append(AttemptRecord::new(Strategy::ApiDirect, true, 1.0));
    history.append(AttemptRecord::new(Strategy::ApiDirect, false, 3.0));

    let engine = Engine::with_history(
        vec![ScriptedBackend::new(Strategy::ApiDirect, Scripted::Hang)],
        RecordingTransport::new(),
        history,
    );
    let handle_id = api_owner(&engine, 1, "slowpoke").await.id;

    let scheduler = engine.scheduler(4);
    scheduler.start().await.unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Running);
    assert!(scheduler.start().await.is_err(), "a second start must be rejected");

    let backend = engine.backend(Strategy::ApiDirect).clone();
    assert!(wait_for(|| backend.call_count() == 1, 2000).await);

    let report = scheduler.shutdown().await.unwrap();
    assert_eq!(report.finished, 1);
    assert_eq!(report.abandoned, 0);
    assert_eq!(scheduler.state(), SchedulerState::Stopped);

    assert_eq!(engine.selector.history().len(), 2);
    assert!(!engine.store.handle(handle_id).await.unwrap().done);
    assert!(engine.transport.sent().is_empty());

    let reloaded = StrategyHistory::open(HistoryConfig {
        path: Some(path),
        cap: 100,
        flush_every: 10,
    });
    assert_eq!(reloaded.len(), 2);
}

#[tokio::test]
async fn test_repeat_tick_without_status_change_sends_nothing() {
    let engine = Engine::new(
        vec![ScriptedBackend::new(Strategy::ApiDirect, Scripted::NotFound)],
        RecordingTransport::new(),
    );
    let handle = api_owner(&engine, 1, "bob").await;
    let scheduler = engine.scheduler(4);

    assert_eq!(scheduler.tick().await.unwrap().launched, vec![1]);
    scheduler.wait_idle().await;
    engine.sink.wait_idle().await;
    assert_eq!(engine.transport.sent_to(1), vec!["❌ @bob not found".to_string()]);

    assert_eq!(scheduler.tick().await.unwrap().launched, vec![1]);
    scheduler.wait_idle().await;
    engine.sink.wait_idle().await;

    assert_eq!(engine.backend(Strategy::ApiDirect).call_count(), 2);
    assert_eq!(engine.transport.sent_to(1).len(), 1, "second tick must stay silent");
    assert_eq!(engine.sink.stats().suppressed, 1);
    assert!(!engine.store.handle(handle.id).await.unwrap().done);
}
