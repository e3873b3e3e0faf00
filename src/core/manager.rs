//! # Link lifecycle manager.
//!
//! [`LinkManager`] is the single owner of everything that describes the link:
//! lifecycle state, the open handle, the event-source subscription and the
//! pending trigger queue. All of it lives in one `Core` behind a
//! `tokio::sync::Mutex`; nothing outside this module touches the handle or the
//! queue.
//!
//! ## Architecture
//! ```text
//! start()
//!   ├─► lock: Stopped → Starting, session += 1, fresh CancellationToken
//!   ├─► close stale handle, connector.connect()
//!   ├─► RetryPolicy::open(link, token)            (outside the lock)
//!   ├─► error/close listeners ─► watcher task ─► link_lost(session)
//!   ├─► configure(control lines) ─► sleep(settle_delay) | token
//!   ├─► data listener ─► Bus(SerialData)
//!   ├─► source.subscribe(key) ─► change pump task ─► deliver(watch trigger)
//!   └─► lock: session still current? → Running, Bus(LinkUp), spawn drain
//!
//! deliver(trigger)   lock ─► Running && queue empty && !draining ? write+drain : enqueue
//! drain              lock ─► pop ─► write+drain ─► unlock ─► sleep(throttle) | token ─► ...
//! stop()/link lost   lock ─► Stopping, session += 1, token.cancel() ─► unsubscribe
//!                         ─► close_gracefully ─► wait start gate ─► Stopped ─► Bus(LinkDown)
//! ```
//!
//! ## Rules
//! - Only one start in flight: calls during `Starting`/`Running` return
//!   [`StartOutcome::InProgress`] / [`StartOutcome::AlreadyRunning`].
//! - Write and drain run under the lock, so two triggers never interleave on the wire.
//! - Timers (retry delay, settle delay, drain throttle) race the session token;
//!   `stop()` and link loss cancel it, so no work of an old session survives.
//! - A start holds the start gate until its handle is committed or released;
//!   `stop()` waits for it before reporting `Stopped`.
//! - Queue removal happens only after a successful write+drain; a failed drain
//!   restores the head and halts until the next start.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::PendingQueue;
use super::reconnect::AutoReconnect;
use super::shutdown;
use super::state::LifecycleState;
use crate::config::LinkConfig;
use crate::error::{LinkError, OpenErrorKind, StartError};
use crate::events::{Bus, Event, EventKind};
use crate::link::{self, Connect, Link, LinkSignal, ListenerKind, close_gracefully};
use crate::reply::{PendingReply, Status, StopReply};
use crate::source::{Change, ChangeHandler, EventSource, SubscriptionId};
use crate::trigger::{SOURCE_WATCH, Trigger};

/// Successful result of [`LinkManager::start`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// This call brought the link up.
    Started {
        /// Open attempts it took.
        attempts: u32,
    },
    /// The link was already running.
    AlreadyRunning,
    /// Another start is in flight; this call did nothing.
    InProgress,
}

struct Core {
    state: LifecycleState,
    session: u64,
    token: CancellationToken,
    link: Option<Box<dyn Link>>,
    subscription: Option<SubscriptionId>,
    queue: PendingQueue,
    draining: bool,
    /// Reason the handle of a starting session was lost, keyed by session.
    lost: Option<(u64, String)>,
}

impl Core {
    /// Ends the current session: bumps the counter, cancels its timers and
    /// hands back the resources it owned.
    fn end_session(&mut self) -> (u64, Option<Box<dyn Link>>, Option<SubscriptionId>) {
        self.state = LifecycleState::Stopping;
        self.session += 1;
        self.token.cancel();
        self.draining = false;
        (self.session, self.link.take(), self.subscription.take())
    }
}

struct Shared {
    cfg: LinkConfig,
    bus: Bus,
    connector: Arc<dyn Connect>,
    source: Option<Arc<dyn EventSource>>,
    core: Mutex<Core>,
    start_gate: Arc<Mutex<()>>,
}

/// Owner of the link lifecycle. Cheap to clone; clones drive the same link.
#[derive(Clone)]
pub struct LinkManager {
    shared: Arc<Shared>,
}

impl LinkManager {
    pub(super) fn from_parts(
        cfg: LinkConfig,
        bus: Bus,
        connector: Arc<dyn Connect>,
        source: Option<Arc<dyn EventSource>>,
    ) -> Self {
        let core = Core {
            state: LifecycleState::Stopped,
            session: 0,
            token: CancellationToken::new(),
            link: None,
            subscription: None,
            queue: PendingQueue::new(),
            draining: false,
            lost: None,
        };
        Self {
            shared: Arc::new(Shared {
                cfg,
                bus,
                connector,
                source,
                core: Mutex::new(core),
                start_gate: Arc::new(Mutex::new(())),
            }),
        }
    }

    /// Configuration this manager was built with.
    pub fn config(&self) -> &LinkConfig {
        &self.shared.cfg
    }

    /// New receiver for every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LifecycleState {
        self.shared.core.lock().await.state
    }

    /// `{ running, path }` snapshot; `path` is set only while running.
    pub async fn status(&self) -> Status {
        let core = self.shared.core.lock().await;
        let running = core.state == LifecycleState::Running;
        Status {
            running,
            path: core
                .link
                .as_ref()
                .filter(|_| running)
                .map(|l| l.path().to_string()),
        }
    }

    /// Number of queued triggers.
    pub async fn pending_count(&self) -> usize {
        self.shared.core.lock().await.queue.len()
    }

    /// Queued triggers in delivery order.
    pub async fn pending_items(&self) -> Vec<Trigger> {
        self.shared.core.lock().await.queue.snapshot()
    }

    /// Queue snapshot as a reply.
    pub async fn pending(&self) -> PendingReply {
        PendingReply::from(self.pending_items().await)
    }

    /// Brings the link up.
    ///
    /// Returns immediately with a success outcome if a start is already in
    /// flight or the link is running, and with [`StartError::Stopping`] while a
    /// stop is still releasing resources. Failures never leave a handle behind.
    ///
    /// The attempt runs on its own task, so dropping the returned future does
    /// not abandon a half-open handle.
    pub async fn start(&self) -> Result<StartOutcome, StartError> {
        let manager = self.clone();
        tokio::spawn(async move { manager.start_attempt().await })
            .await
            .unwrap_or(Err(StartError::Cancelled))
    }

    async fn start_attempt(&self) -> Result<StartOutcome, StartError> {
        let (_gate, session, token, stale) = loop {
            {
                let mut core = self.shared.core.lock().await;
                match core.state {
                    LifecycleState::Running => return Ok(StartOutcome::AlreadyRunning),
                    LifecycleState::Starting => return Ok(StartOutcome::InProgress),
                    LifecycleState::Stopping => return Err(StartError::Stopping),
                    LifecycleState::Stopped => {}
                }
                if let Ok(gate) = Arc::clone(&self.shared.start_gate).try_lock_owned() {
                    core.state = LifecycleState::Starting;
                    core.session += 1;
                    core.token = CancellationToken::new();
                    core.lost = None;
                    break (gate, core.session, core.token.clone(), core.link.take());
                }
            }
            // A superseded start is still releasing its handle.
            drop(self.shared.start_gate.lock().await);
        };

        let mut stale = stale;
        close_gracefully(&mut stale).await;

        let mut link = self.shared.connector.connect(&self.shared.cfg);
        let mut subscription = None;
        let brought_up = self
            .bring_up(&token, link.as_mut(), &mut subscription)
            .await;

        let mut slot = Some(link);
        let result = match brought_up {
            Ok(attempts) => self
                .commit(session, &token, &mut slot, &mut subscription)
                .await
                .map(|()| attempts),
            Err(err) => Err(err),
        };

        match result {
            Ok(attempts) => {
                info!(path = %self.shared.cfg.path, attempts, "link running");
                let manager = self.clone();
                tokio::spawn(async move {
                    manager.drain_session(session).await;
                });
                Ok(StartOutcome::Started { attempts })
            }
            Err(err) => {
                let err = match err {
                    StartError::Cancelled => self
                        .take_loss(session)
                        .await
                        .unwrap_or(StartError::Cancelled),
                    err => err,
                };
                self.abort_start(session, &token, slot, subscription, &err)
                    .await;
                Err(err)
            }
        }
    }

    /// Open, configure, settle and subscribe. The handle stays with the caller.
    async fn bring_up(
        &self,
        token: &CancellationToken,
        link: &mut dyn Link,
        subscription: &mut Option<SubscriptionId>,
    ) -> Result<u32, StartError> {
        let cfg = &self.shared.cfg;

        let attempts = cfg.retry.open(link, token).await.map_err(|e| match e.kind {
            OpenErrorKind::Cancelled => StartError::Cancelled,
            _ => StartError::Open(e),
        })?;
        debug!(path = link.path(), attempts, "link opened");

        self.watch_link_loss(token, link);

        if let Err(source) = link.configure(cfg.control_lines).await {
            return Err(StartError::Configure {
                path: link.path().to_string(),
                source,
            });
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(StartError::Cancelled),
            _ = tokio::time::sleep(cfg.settle_delay) => {}
        }

        self.attach_data_listener(link);

        if let Some(source) = &self.shared.source {
            *subscription = Some(self.subscribe_source(token, source.as_ref()).await?);
        }
        Ok(attempts)
    }

    /// Publishes the handle if its session is still current.
    async fn commit(
        &self,
        session: u64,
        token: &CancellationToken,
        slot: &mut Option<Box<dyn Link>>,
        subscription: &mut Option<SubscriptionId>,
    ) -> Result<(), StartError> {
        let mut core = self.shared.core.lock().await;
        if core.session != session || token.is_cancelled() {
            return Err(StartError::Cancelled);
        }
        core.link = slot.take();
        core.subscription = subscription.take();
        core.state = LifecycleState::Running;
        core.draining = false;
        self.shared
            .bus
            .publish(Event::new(EventKind::LinkUp).with_path(self.shared.cfg.path.as_str()));
        Ok(())
    }

    async fn abort_start(
        &self,
        session: u64,
        token: &CancellationToken,
        slot: Option<Box<dyn Link>>,
        subscription: Option<SubscriptionId>,
        err: &StartError,
    ) {
        token.cancel();
        self.release(slot, subscription).await;
        {
            let mut core = self.shared.core.lock().await;
            if core.session == session && core.state == LifecycleState::Starting {
                core.state = LifecycleState::Stopped;
            }
        }

        match err {
            StartError::Cancelled => {
                debug!(path = %self.shared.cfg.path, "start superseded");
                return;
            }
            // LinkDown already carries the reason.
            StartError::LinkLost(_) => return,
            _ => {}
        }
        warn!(
            path = %self.shared.cfg.path,
            label = err.as_label(),
            error = %err,
            "start failed"
        );
        self.shared.bus.publish(
            Event::new(EventKind::StartFailed)
                .with_path(self.shared.cfg.path.as_str())
                .with_reason(err.to_string()),
        );
    }

    async fn take_loss(&self, session: u64) -> Option<StartError> {
        let mut core = self.shared.core.lock().await;
        match core.lost.take() {
            Some((lost, reason)) if lost == session => Some(StartError::LinkLost(reason)),
            _ => None,
        }
    }

    /// Routes error/close signals of `link` to [`LinkManager::link_lost`].
    fn watch_link_loss(&self, token: &CancellationToken, link: &dyn Link) {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let on_error = tx.clone();
        link.listeners().on(
            ListenerKind::Error,
            Arc::new(move |signal: &LinkSignal| {
                if let LinkSignal::Error(reason) = signal {
                    let _ = on_error.send(reason.clone());
                }
            }),
        );
        link.listeners().on(
            ListenerKind::Close,
            Arc::new(move |_: &LinkSignal| {
                let _ = tx.send("link closed".to_string());
            }),
        );

        let weak = Arc::downgrade(&self.shared);
        let token = token.clone();
        tokio::spawn(async move {
            let reason = tokio::select! {
                _ = token.cancelled() => return,
                reason = rx.recv() => reason,
            };
            if let (Some(reason), Some(shared)) = (reason, weak.upgrade()) {
                LinkManager { shared }.link_lost(&token, reason).await;
            }
        });
    }

    fn attach_data_listener(&self, link: &dyn Link) {
        let bus = self.shared.bus.clone();
        let path: Arc<str> = Arc::from(link.path());
        link.listeners().on(
            ListenerKind::Data,
            Arc::new(move |signal: &LinkSignal| {
                if let LinkSignal::Data(bytes) = signal {
                    bus.publish(
                        Event::new(EventKind::SerialData)
                            .with_path(Arc::clone(&path))
                            .with_data(bytes),
                    );
                }
            }),
        );
    }

    /// Subscribes to the event source and spawns the pump that turns each
    /// change into one [`LinkManager::deliver`], in order.
    async fn subscribe_source(
        &self,
        token: &CancellationToken,
        source: &dyn EventSource,
    ) -> Result<SubscriptionId, StartError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Change>();
        let handler: ChangeHandler = Arc::new(move |change| {
            let _ = tx.send(change);
        });
        let id = source
            .subscribe(self.shared.cfg.watch_key.as_deref(), handler)
            .await?;

        let weak = Arc::downgrade(&self.shared);
        let token = token.clone();
        tokio::spawn(async move {
            loop {
                let change = tokio::select! {
                    _ = token.cancelled() => break,
                    change = rx.recv() => match change {
                        Some(change) => change,
                        None => break,
                    },
                };
                let Some(shared) = weak.upgrade() else { break };
                let manager = LinkManager { shared };
                let trigger = manager.change_trigger(change);
                manager.deliver(trigger).await;
            }
        });
        Ok(id)
    }

    fn change_trigger(&self, change: Change) -> Trigger {
        let trigger = Trigger::new(&self.shared.cfg.default_command).with_source(SOURCE_WATCH);
        match change.signature {
            Some(signature) => trigger.with_signature(signature),
            None => trigger,
        }
    }

    /// Handles a fatal signal from the handle of the session owning `token`.
    async fn link_lost(&self, token: &CancellationToken, reason: String) {
        let released = {
            let mut core = self.shared.core.lock().await;
            if token.is_cancelled() {
                return;
            }
            let state = core.state;
            match state {
                LifecycleState::Running => Some(core.end_session()),
                LifecycleState::Starting => {
                    core.lost = Some((core.session, reason.clone()));
                    token.cancel();
                    None
                }
                LifecycleState::Stopped | LifecycleState::Stopping => return,
            }
        };

        warn!(path = %self.shared.cfg.path, reason = %reason, "link lost");
        if let Some((session, link, subscription)) = released {
            self.release(link, subscription).await;
            self.mark_stopped(session).await;
        }
        self.shared.bus.publish(
            Event::new(EventKind::LinkDown)
                .with_path(self.shared.cfg.path.as_str())
                .with_reason(reason),
        );
    }

    /// Tears the link down. Always succeeds; cleanup errors are logged.
    pub async fn stop(&self) -> StopReply {
        let (session, link, subscription) = self.shared.core.lock().await.end_session();

        self.release(link, subscription).await;
        self.wait_start_released().await;
        self.mark_stopped(session).await;

        info!(path = %self.shared.cfg.path, "link stopped");
        self.shared
            .bus
            .publish(Event::new(EventKind::LinkDown).with_path(self.shared.cfg.path.as_str()));
        StopReply::default()
    }

    async fn release(&self, link: Option<Box<dyn Link>>, subscription: Option<SubscriptionId>) {
        if let (Some(id), Some(source)) = (subscription, &self.shared.source) {
            if let Err(err) = source.unsubscribe(id).await {
                warn!(error = %err, "unsubscribe failed, continuing shutdown");
            }
        }
        let mut slot = link;
        close_gracefully(&mut slot).await;
    }

    /// Waits until no start attempt holds a handle.
    async fn wait_start_released(&self) {
        drop(self.shared.start_gate.lock().await);
    }

    async fn mark_stopped(&self, session: u64) {
        let mut core = self.shared.core.lock().await;
        if core.session == session && core.state == LifecycleState::Stopping {
            core.state = LifecycleState::Stopped;
        }
    }

    /// Writes `trigger` now if possible, queues it otherwise.
    ///
    /// Returns `true` when written, `false` when queued. A direct write is
    /// only attempted while running with an empty queue and no drain in
    /// progress, so a new trigger never overtakes an older one.
    pub async fn deliver(&self, trigger: Trigger) -> bool {
        let mut core = self.shared.core.lock().await;

        if core.state == LifecycleState::Running && !core.draining && core.queue.is_empty() {
            let written = match core.link.as_mut() {
                Some(handle) => link::write_line(handle.as_mut(), &trigger.wire_message()).await,
                None => Err(LinkError::NotOpen),
            };
            match written {
                Ok(()) => {
                    self.shared.bus.publish(
                        Event::new(EventKind::TriggerSent)
                            .with_path(self.shared.cfg.path.as_str())
                            .with_reason(trigger.source())
                            .with_trigger(trigger),
                    );
                    return true;
                }
                Err(err) => {
                    warn!(label = err.as_label(), error = %err, "direct write failed, queueing trigger");
                }
            }
        }

        let pending = core.queue.enqueue(trigger.clone());
        self.shared.bus.publish(
            Event::new(EventKind::TriggerQueued)
                .with_pending(pending)
                .with_trigger(trigger),
        );
        false
    }

    /// Drains the pending queue of the current session. Returns how many
    /// triggers were written. No-op if not running or a drain is already active.
    pub async fn drain_pending(&self) -> usize {
        let session = self.shared.core.lock().await.session;
        self.drain_session(session).await
    }

    async fn drain_session(&self, session: u64) -> usize {
        let token = {
            let mut core = self.shared.core.lock().await;
            if core.session != session
                || core.state != LifecycleState::Running
                || core.draining
                || core.queue.is_empty()
            {
                return 0;
            }
            core.draining = true;
            core.token.clone()
        };

        let mut sent = 0;
        loop {
            {
                let mut core = self.shared.core.lock().await;
                if core.session != session || core.state != LifecycleState::Running {
                    return sent;
                }
                let Some(trigger) = core.queue.pop() else {
                    core.draining = false;
                    return sent;
                };

                let written = match core.link.as_mut() {
                    Some(handle) => link::write_line(handle.as_mut(), &trigger.wire_message()).await,
                    None => Err(LinkError::NotOpen),
                };
                if let Err(err) = written {
                    core.queue.restore(trigger);
                    core.draining = false;
                    warn!(
                        label = err.as_label(),
                        error = %err,
                        pending = core.queue.len(),
                        "drain halted, trigger restored to queue head"
                    );
                    return sent;
                }

                sent += 1;
                let remaining = core.queue.len();
                self.shared.bus.publish(
                    Event::new(EventKind::TriggerSent)
                        .with_path(self.shared.cfg.path.as_str())
                        .with_reason(trigger.queued_source())
                        .with_pending(remaining)
                        .with_trigger(trigger),
                );
                if remaining == 0 {
                    core.draining = false;
                    return sent;
                }
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => return sent,
                _ = tokio::time::sleep(self.shared.cfg.drain_throttle) => {}
            }
        }
    }

    /// Runs the link until an OS shutdown signal.
    ///
    /// Attempts an initial start, keeps the link up with [`AutoReconnect`],
    /// then stops the loop and the link on SIGINT/SIGTERM/SIGQUIT (Ctrl-C on
    /// Windows).
    pub async fn run(&self) -> std::io::Result<()> {
        if let Err(err) = self.start().await {
            warn!(label = err.as_label(), error = %err, "initial start failed, auto-reconnect will retry");
        }
        let reconnect = AutoReconnect::spawn(self.clone(), self.shared.cfg.reconnect_interval);

        let signal = shutdown::wait_for_shutdown_signal().await;
        info!("shutdown requested");

        reconnect.shutdown().await;
        self.stop().await;
        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MemoryDevice;
    use crate::source::ManualSource;
    use std::time::Duration;

    fn manager(device: &MemoryDevice) -> LinkManager {
        let cfg = LinkConfig {
            settle_delay: Duration::from_millis(10),
            ..LinkConfig::default()
        };
        LinkManager::from_parts(cfg, Bus::new(64), Arc::new(device.clone()), None)
    }

    #[tokio::test(start_paused = true)]
    async fn test_deliver_while_draining_is_queued_behind() {
        let device = MemoryDevice::new();
        let mgr = manager(&device);
        mgr.deliver(Trigger::new("A")).await;
        mgr.deliver(Trigger::new("B")).await;

        mgr.start().await.unwrap();
        // The spawned drain wrote "A" and is sleeping in its throttle.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!mgr.deliver(Trigger::new("C")).await);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(device.written(), ["A", "B", "C"]);
        assert_eq!(mgr.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_pending_is_noop_when_stopped() {
        let device = MemoryDevice::new();
        let mgr = manager(&device);
        mgr.deliver(Trigger::new("A")).await;

        assert_eq!(mgr.drain_pending().await, 0);
        assert_eq!(mgr.pending_count().await, 1);
        assert!(device.written().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_failure_fails_start_and_releases_link() {
        let device = MemoryDevice::new();
        let source = ManualSource::new();
        source.fail_next_subscribes(1);
        let mgr = LinkManager::from_parts(
            LinkConfig::default(),
            Bus::new(64),
            Arc::new(device.clone()),
            Some(Arc::new(source.clone())),
        );

        let err = mgr.start().await.unwrap_err();
        assert!(matches!(err, StartError::Subscribe(_)));
        assert_eq!(mgr.state().await, LifecycleState::Stopped);
        assert!(!device.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_path_only_while_running() {
        let device = MemoryDevice::new();
        let mgr = manager(&device);
        assert_eq!(mgr.status().await.path, None);

        mgr.start().await.unwrap();
        let status = mgr.status().await;
        assert!(status.running);
        assert_eq!(status.path.as_deref(), Some(mgr.config().path.as_str()));
    }
}
