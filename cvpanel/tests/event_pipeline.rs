mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cvpanel::prelude::*;
use parking_lot::Mutex;
use serial_test::serial;
use serde_json::json;

use common::{GridPage, ms, page_config, settings, wait_for};

fn registry() -> PageRegistry {
    let mut registry = PageRegistry::new();
    registry
        .register(page_config("A", "alpha"), || {
            Box::new(GridPage::new("Alpha"))
        })
        .expect("A");
    registry
        .register(page_config("B", "beta"), || {
            Box::new(GridPage::new("Beta"))
        })
        .expect("B");
    registry
}

#[test]
#[serial]
fn burst_of_a_thousand_events_drains_in_one_ordered_batch() {
    let queue = EventQueue::new(256);

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            let started = Instant::now();
            for i in 0..1000u64 {
                queue.push(PendingEvent::Custom {
                    tag: "seq".to_string(),
                    payload: json!(i),
                });
            }
            started.elapsed()
        })
    };
    let elapsed = producer.join().expect("producer");
    assert!(elapsed < Duration::from_millis(500));
    assert_eq!(queue.len(), 1000);
    assert_eq!(queue.backlog_episodes(), 1);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let seen = seen.clone();
        move |event: &PendingEvent, _: &UiSnapshot| -> Result<()> {
            if let PendingEvent::Custom { payload, .. } = event {
                seen.lock().push(payload.as_u64().unwrap_or(u64::MAX));
            }
            Ok(())
        }
    };

    let mut worker =
        EventWorker::spawn(queue.clone(), SnapshotCell::new(), handler, 100.0)
            .expect("spawn worker");
    assert!(wait_for(ms(2000), || seen.lock().len() == 1000));
    worker.stop(ms(1000)).expect("stop");

    let stats = worker.stats();
    assert_eq!(stats.batches, 1);
    assert_eq!(stats.largest_batch, 1000);
    assert_eq!(stats.dispatched, 1000);
    assert_eq!(*seen.lock(), (0..1000).collect::<Vec<u64>>());
    assert!(queue.is_empty());
}

#[test]
#[serial]
fn hardware_changes_reach_the_owner_page_and_the_screen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut runtime =
        PanelRuntime::new(registry(), settings(dir.path()), Theme::dark())
            .expect("runtime");
    runtime.start(Some("A")).expect("start");
    runtime.start_workers().expect("workers");

    let mut surface = RecordingSurface::new(800, 480);
    let t0 = Instant::now();
    runtime.step(t0, &mut surface);

    let ingress = runtime.ingress();
    ingress.on_control_change("alpha", Slot::Dial(2), RawValue::Midi(127));

    let key = PageKey::new("alpha", "A");
    let store = runtime.store().clone();
    assert!(wait_for(ms(2000), || {
        store.lock().value(&key, Slot::Dial(2)) == Some(127.0)
    }));

    let kind = runtime.step(t0 + ms(50), &mut surface);
    assert_eq!(kind, FrameKind::Partial);
    let frame = surface.last_frame().expect("frame");
    assert!(frame.texts().any(|t| t == "127"));
    assert!(frame.texts().any(|t| t == "Alpha 2"));
    assert!(!frame.texts().any(|t| t == "Alpha 1"));

    runtime.shutdown().expect("shutdown");
}

#[test]
#[serial]
fn hardware_for_an_unshown_owner_lands_on_its_home_page() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut runtime =
        PanelRuntime::new(registry(), settings(dir.path()), Theme::dark())
            .expect("runtime");
    runtime.start(Some("A")).expect("start");
    runtime.start_workers().expect("workers");

    let mut surface = RecordingSurface::new(800, 480);
    let t0 = Instant::now();
    runtime.step(t0, &mut surface);

    let ingress = runtime.ingress();
    ingress.on_control_change("beta", Slot::Dial(4), RawValue::Midi(127));

    let key = PageKey::new("beta", "B");
    let store = runtime.store().clone();
    assert!(wait_for(ms(2000), || {
        store.lock().value(&key, Slot::Dial(4)) == Some(127.0)
    }));

    // Nothing on the alpha page changed.
    runtime.step(t0 + ms(50), &mut surface);
    let frame = surface.last_frame().expect("frame");
    assert!(!frame.texts().any(|t| t == "127"));

    let stats = runtime.shutdown().expect("shutdown");
    assert_eq!(stats.worker.failed, 0);
}

#[test]
#[serial]
fn page_requests_from_the_worker_go_through_the_render_thread() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (event_tx, event_rx) = event_channel();
    let mut runtime =
        PanelRuntime::new(registry(), settings(dir.path()), Theme::dark())
            .expect("runtime")
            .with_events(event_tx);
    runtime.start(Some("A")).expect("start");
    runtime.start_workers().expect("workers");

    runtime.ingress().request_page("B");

    let mut surface = RecordingSurface::new(800, 480);
    let t0 = Instant::now();
    let mut step = 0;
    let switched = wait_for(ms(2000), || {
        step += 1;
        runtime.step(t0 + ms(50 * step), &mut surface);
        runtime.controller().active_name() == Some("B")
    });
    assert!(switched);

    let events: Vec<RuntimeEvent> = event_rx.try_iter().collect();
    let switched_to_b = RuntimeEvent::PageSwitched(PageKey::new("beta", "B"));
    assert!(events.contains(&switched_to_b));

    runtime.shutdown().expect("shutdown");
}

#[test]
#[serial]
fn shutdown_drains_events_queued_before_stop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = PanelSettings {
        worker_hz: 1.0,
        ..settings(dir.path())
    };
    let mut runtime = PanelRuntime::new(registry(), settings, Theme::dark())
        .expect("runtime");
    runtime.start(Some("A")).expect("start");
    runtime.start_workers().expect("workers");

    let ingress = runtime.ingress();
    for value in 1..=10 {
        ingress.on_control_change(
            "alpha",
            Slot::Dial(1),
            RawValue::Value(value as f32),
        );
    }

    let stats = runtime.shutdown().expect("shutdown");
    assert_eq!(stats.worker.dispatched, 10);

    let key = PageKey::new("alpha", "A");
    assert_eq!(runtime.store().lock().value(&key, Slot::Dial(1)), Some(10.0));
    // The final autosave ran after the drain.
    let saved = SnapshotStorage::in_dir(dir.path()).load().expect("load");
    assert_eq!(saved.get(&key, Slot::Dial(1)), Some(10.0));
}

#[test]
#[serial]
fn failing_events_do_not_stop_the_worker() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut runtime =
        PanelRuntime::new(registry(), settings(dir.path()), Theme::dark())
            .expect("runtime");
    runtime.start(Some("A")).expect("start");
    runtime.start_workers().expect("workers");

    let ingress = runtime.ingress();
    ingress.on_control_change("nobody", Slot::Dial(1), RawValue::Unit(1.0));
    ingress.on_button("alpha", Slot::Button(9));
    ingress.on_control_change("alpha", Slot::Dial(3), RawValue::Unit(0.5));

    let key = PageKey::new("alpha", "A");
    let store = runtime.store().clone();
    assert!(wait_for(ms(2000), || {
        store.lock().value(&key, Slot::Dial(3)) == Some(63.5)
    }));

    let stats = runtime.shutdown().expect("shutdown");
    assert_eq!(stats.worker.failed, 2);
    assert_eq!(stats.worker.dispatched, 1);
}
