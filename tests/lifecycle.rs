use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::{Instant, sleep};

use linkvisor::{
    AutoReconnect, Event, EventKind, LifecycleState, LinkConfig, LinkManager, LinkManagerBuilder,
    ManualSource, MemoryDevice, OpenErrorKind, StartError, StartOutcome, StartReply, Subscribe,
    Trigger,
};

fn fast_config() -> LinkConfig {
    LinkConfig {
        settle_delay: Duration::from_millis(50),
        ..LinkConfig::default()
    }
}

fn build(device: &MemoryDevice) -> LinkManager {
    LinkManagerBuilder::new(fast_config(), device.clone()).build()
}

fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

fn kinds(events: &[Event]) -> Vec<EventKind> {
    events.iter().map(|e| e.kind).collect()
}

fn msgs(items: &[Trigger]) -> Vec<&str> {
    items.iter().map(Trigger::msg).collect()
}

#[tokio::test(start_paused = true)]
async fn deliver_while_stopped_is_queued() {
    let device = MemoryDevice::new();
    let manager = build(&device);
    let mut rx = manager.subscribe();

    assert!(!manager.deliver(Trigger::new("F")).await);
    assert_eq!(manager.pending_count().await, 1);

    let events = drain_events(&mut rx);
    assert_eq!(kinds(&events), [EventKind::TriggerQueued]);
    assert_eq!(events[0].payload()["count"], 1);
    assert_eq!(events[0].payload()["msg"], "F");
    assert!(device.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn queued_trigger_is_written_once_after_start() {
    let device = MemoryDevice::new();
    let manager = build(&device);
    manager.deliver(Trigger::new("F").with_signature("sig")).await;
    let mut rx = manager.subscribe();

    let outcome = manager.start().await.unwrap();
    assert_eq!(outcome, StartOutcome::Started { attempts: 1 });
    sleep(Duration::from_secs(1)).await;

    assert_eq!(device.written(), ["F"]);
    assert_eq!(manager.pending_count().await, 0);

    let events = drain_events(&mut rx);
    assert_eq!(kinds(&events), [EventKind::LinkUp, EventKind::TriggerSent]);
    assert_eq!(events[1].payload()["trigger"], "api");
    assert_eq!(events[1].payload()["signature"], "sig");
}

#[tokio::test(start_paused = true)]
async fn drain_preserves_fifo_order() {
    let device = MemoryDevice::new();
    let manager = build(&device);
    for msg in ["A", "B", "C", "B", "D"] {
        assert!(!manager.deliver(Trigger::new(msg)).await);
    }

    manager.start().await.unwrap();
    sleep(Duration::from_secs(2)).await;

    assert_eq!(device.written(), ["A", "B", "C", "B", "D"]);
    assert!(manager.pending_items().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_drain_write_restores_head() {
    let device = MemoryDevice::new();
    let manager = build(&device);
    for msg in ["A", "B", "C"] {
        manager.deliver(Trigger::new(msg)).await;
    }

    manager.start().await.unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(device.written(), ["A"]);

    device.fail_next_writes(1);
    sleep(Duration::from_secs(1)).await;

    assert_eq!(device.written(), ["A"]);
    assert_eq!(msgs(&manager.pending_items().await), ["B", "C"]);

    // Halted: new triggers queue behind the restored head.
    assert!(!manager.deliver(Trigger::new("D")).await);
    assert_eq!(msgs(&manager.pending_items().await), ["B", "C", "D"]);

    assert_eq!(manager.drain_pending().await, 3);
    assert_eq!(device.written(), ["A", "B", "C", "D"]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_starts_allocate_one_handle() {
    let device = MemoryDevice::new();
    device.set_open_latency(Duration::from_millis(100));
    let manager = build(&device);

    let (a, b) = tokio::join!(manager.start(), manager.start());
    let mut outcomes = [a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| matches!(o, StartOutcome::InProgress));
    assert_eq!(
        outcomes,
        [StartOutcome::Started { attempts: 1 }, StartOutcome::InProgress]
    );

    assert_eq!(manager.start().await.unwrap(), StartOutcome::AlreadyRunning);
    assert_eq!(device.allocations(), 1);
    assert_eq!(device.open_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_clears_handle_even_when_close_fails() {
    let device = MemoryDevice::new();
    let manager = build(&device);
    manager.start().await.unwrap();

    device.fail_next_closes(1);
    let reply = manager.stop().await;

    assert!(reply.ok);
    assert_eq!(manager.state().await, LifecycleState::Stopped);
    assert_eq!(manager.status().await.path, None);
    assert!(!device.is_open());
    assert_eq!(device.destroyed(), 1);

    // Stopping again is harmless.
    assert!(manager.stop().await.ok);
    assert_eq!(manager.state().await, LifecycleState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn stop_during_start_cancels_it() {
    let device = MemoryDevice::new();
    let manager = build(&device);

    let pending = tokio::spawn({
        let manager = manager.clone();
        async move { manager.start().await }
    });
    sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.state().await, LifecycleState::Starting);

    manager.stop().await;
    let result = pending.await.unwrap();

    assert!(matches!(result, Err(StartError::Cancelled)));
    assert_eq!(manager.state().await, LifecycleState::Stopped);
    assert!(!device.is_open());
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_superseded_start_to_release_handle() {
    let device = MemoryDevice::new();
    device.set_open_latency(Duration::from_millis(100));
    let manager = build(&device);

    let pending = tokio::spawn({
        let manager = manager.clone();
        async move { manager.start().await }
    });
    sleep(Duration::from_millis(10)).await;

    let began = Instant::now();
    manager.stop().await;
    assert!(began.elapsed() >= Duration::from_millis(90));
    assert_eq!(manager.state().await, LifecycleState::Stopped);
    assert!(!device.is_open());
    assert!(matches!(pending.await.unwrap(), Err(StartError::Cancelled)));

    // The next start owns the only handle.
    manager.start().await.unwrap();
    assert_eq!(device.allocations(), 2);
    assert!(device.is_open());
    assert_eq!(manager.state().await, LifecycleState::Running);
}

#[tokio::test(start_paused = true)]
async fn link_loss_during_start_fails_with_reason() {
    let device = MemoryDevice::new();
    let manager = build(&device);
    let mut rx = manager.subscribe();

    let pending = tokio::spawn({
        let manager = manager.clone();
        async move { manager.start().await }
    });
    sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.state().await, LifecycleState::Starting);

    device.unplug("cable pulled");
    let result = pending.await.unwrap();

    assert!(matches!(&result, Err(StartError::LinkLost(reason)) if reason == "cable pulled"));
    let reply = StartReply::from(&result);
    assert!(!reply.ok);
    assert_eq!(reply.error.as_deref(), Some("link lost while starting: cable pulled"));

    assert_eq!(manager.state().await, LifecycleState::Stopped);
    assert!(!device.is_open());

    let events = drain_events(&mut rx);
    assert_eq!(kinds(&events), [EventKind::LinkDown]);
    assert_eq!(events[0].payload()["error"], "cable pulled");
}

#[tokio::test(start_paused = true)]
async fn transient_open_failures_are_retried() {
    let device = MemoryDevice::new();
    device.fail_next_opens([OpenErrorKind::Busy, OpenErrorKind::Busy]);
    let manager = build(&device);

    let started = Instant::now();
    let reply = StartReply::from(manager.start().await);

    assert_eq!(
        reply,
        StartReply {
            ok: true,
            error: None
        }
    );
    assert!(started.elapsed() >= Duration::from_millis(800));
    assert_eq!(device.open_attempts(), 3);
    assert_eq!(manager.state().await, LifecycleState::Running);
}

#[tokio::test(start_paused = true)]
async fn retry_bound_is_respected() {
    let device = MemoryDevice::new();
    device.fail_next_opens([OpenErrorKind::AccessConflict; 3]);
    let manager = build(&device);
    let mut rx = manager.subscribe();

    let err = manager.start().await.unwrap_err();
    match &err {
        StartError::Open(open) => assert_eq!(open.kind, OpenErrorKind::AccessConflict),
        other => panic!("unexpected error: {other:?}"),
    }

    sleep(Duration::from_secs(10)).await;
    assert_eq!(device.open_attempts(), 3);
    assert_eq!(manager.state().await, LifecycleState::Stopped);

    let events = drain_events(&mut rx);
    assert_eq!(kinds(&events), [EventKind::StartFailed]);
    assert_eq!(events[0].payload()["running"], false);
}

#[tokio::test(start_paused = true)]
async fn fatal_open_error_is_not_retried() {
    let device = MemoryDevice::new();
    device.fail_next_opens([OpenErrorKind::NotFound]);
    let manager = build(&device);

    let reply = StartReply::from(manager.start().await);
    assert!(!reply.ok);
    assert!(reply.error.unwrap().contains("No such file"));
    assert_eq!(device.open_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_during_drain_throttle_halts_writes() {
    let device = MemoryDevice::new();
    let manager = build(&device);
    for msg in ["A", "B", "C"] {
        manager.deliver(Trigger::new(msg)).await;
    }

    manager.start().await.unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(device.written(), ["A"]);

    manager.stop().await;
    sleep(Duration::from_secs(2)).await;

    assert_eq!(device.written(), ["A"]);
    assert_eq!(msgs(&manager.pending_items().await), ["B", "C"]);
    assert_eq!(manager.state().await, LifecycleState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn reconnect_tick_during_start_is_noop() {
    let device = MemoryDevice::new();
    device.set_open_latency(Duration::from_millis(2_500));
    let manager = build(&device);

    let manual = tokio::spawn({
        let manager = manager.clone();
        async move { manager.start().await }
    });
    sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.start().await.unwrap(), StartOutcome::InProgress);

    let reconnect = AutoReconnect::spawn(manager.clone(), Duration::from_secs(1));
    sleep(Duration::from_secs(2)).await;
    assert_eq!(device.allocations(), 1);

    let outcome = manual.await.unwrap().unwrap();
    assert!(matches!(outcome, StartOutcome::Started { .. }));

    sleep(Duration::from_secs(3)).await;
    assert_eq!(device.allocations(), 1);
    assert_eq!(manager.state().await, LifecycleState::Running);

    reconnect.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unplug_forces_stop_and_reconnect_recovers() {
    let device = MemoryDevice::new();
    let manager = build(&device);
    manager.start().await.unwrap();
    let mut rx = manager.subscribe();
    let reconnect = AutoReconnect::spawn(manager.clone(), Duration::from_secs(1));

    device.unplug("cable pulled");
    sleep(Duration::from_millis(10)).await;

    assert_eq!(manager.state().await, LifecycleState::Stopped);
    let events = drain_events(&mut rx);
    assert_eq!(kinds(&events), [EventKind::LinkDown]);
    assert_eq!(events[0].payload()["error"], "cable pulled");

    assert!(!manager.deliver(Trigger::new("F").with_signature("sig-9")).await);

    // Still unplugged at the first tick.
    sleep(Duration::from_secs(1)).await;
    assert_eq!(manager.state().await, LifecycleState::Stopped);

    device.plug();
    sleep(Duration::from_secs(2)).await;

    assert_eq!(manager.state().await, LifecycleState::Running);
    assert_eq!(device.written(), ["F"]);
    assert_eq!(manager.pending_count().await, 0);

    reconnect.shutdown().await;
    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn direct_write_failure_queues_trigger() {
    let device = MemoryDevice::new();
    let manager = build(&device);
    manager.start().await.unwrap();

    assert!(manager.deliver(Trigger::new("A")).await);
    device.fail_next_writes(1);
    assert!(!manager.deliver(Trigger::new("B")).await);

    assert_eq!(device.written(), ["A"]);
    assert_eq!(msgs(&manager.pending_items().await), ["B"]);
}

#[tokio::test(start_paused = true)]
async fn source_changes_become_signed_triggers() {
    let device = MemoryDevice::new();
    let source = ManualSource::new();
    let manager = LinkManagerBuilder::new(fast_config(), device.clone())
        .with_source(source.clone())
        .build();
    let mut rx = manager.subscribe();

    assert_eq!(source.fire("ignored"), 0);
    manager.start().await.unwrap();
    assert_eq!(source.subscriber_count(), 1);

    assert_eq!(source.fire("5hK2"), 1);
    sleep(Duration::from_millis(10)).await;

    assert_eq!(device.written(), ["F"]);
    let sent: Vec<Event> = drain_events(&mut rx)
        .into_iter()
        .filter(|e| e.kind == EventKind::TriggerSent)
        .collect();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload()["trigger"], "watch");
    assert_eq!(sent[0].payload()["signature"], "5hK2");

    source.fail_next_unsubscribes(1);
    assert!(manager.stop().await.ok);
    assert_eq!(source.subscriber_count(), 0);
    assert_eq!(manager.state().await, LifecycleState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn device_data_is_published() {
    let device = MemoryDevice::new();
    let manager = build(&device);
    manager.start().await.unwrap();
    let mut rx = manager.subscribe();

    device.receive(b"OK\r\n");

    let events = drain_events(&mut rx);
    assert_eq!(kinds(&events), [EventKind::SerialData]);
    assert_eq!(events[0].kind.channel(), "serial-data");
    assert_eq!(events[0].payload()["text"], "OK\r\n");
}

#[tokio::test(start_paused = true)]
async fn control_lines_are_asserted_on_start() {
    let device = MemoryDevice::new();
    let manager = build(&device);
    manager.start().await.unwrap();

    let lines = device.control_lines().unwrap();
    assert!(lines.dtr && lines.rts);
    let status = manager.status().await;
    assert!(status.running);
}

struct Recorder(Mutex<Vec<EventKind>>);

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, ev: &Event) {
        self.0.lock().unwrap().push(ev.kind);
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

#[tokio::test(start_paused = true)]
async fn subscribers_observe_lifecycle() {
    let device = MemoryDevice::new();
    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    let manager = LinkManagerBuilder::new(fast_config(), device.clone())
        .with_subscribers(vec![recorder.clone() as Arc<dyn Subscribe>])
        .build();

    manager.start().await.unwrap();
    manager.deliver(Trigger::new("F")).await;
    manager.stop().await;
    sleep(Duration::from_millis(10)).await;

    assert_eq!(
        *recorder.0.lock().unwrap(),
        [EventKind::LinkUp, EventKind::TriggerSent, EventKind::LinkDown]
    );
}
