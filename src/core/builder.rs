use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use super::manager::LinkManager;
use crate::config::LinkConfig;
use crate::events::Bus;
use crate::link::Connect;
use crate::source::EventSource;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`LinkManager`].
///
/// ```rust
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use linkvisor::{LinkConfig, LinkManagerBuilder, ManualSource, MemoryDevice};
///
/// let manager = LinkManagerBuilder::new(LinkConfig::default(), MemoryDevice::new())
///     .with_source(ManualSource::new())
///     .build();
/// assert!(!manager.status().await.running);
/// # }
/// ```
pub struct LinkManagerBuilder {
    cfg: LinkConfig,
    connector: Arc<dyn Connect>,
    source: Option<Arc<dyn EventSource>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl LinkManagerBuilder {
    /// Creates a builder allocating handles through `connector`.
    pub fn new(cfg: LinkConfig, connector: impl Connect) -> Self {
        Self {
            cfg,
            connector: Arc::new(connector),
            source: None,
            subscribers: Vec::new(),
        }
    }

    /// Event source subscribed on every start; each change delivers one trigger.
    pub fn with_source(mut self, source: impl EventSource) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Shared event source (when the caller keeps another handle to it).
    pub fn with_shared_source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets event subscribers.
    ///
    /// Each one gets a dedicated worker with a bounded queue fed from the bus.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the manager.
    ///
    /// Must be called inside a tokio runtime when subscribers are set.
    pub fn build(self) -> LinkManager {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        if !self.subscribers.is_empty() {
            let subs = SubscriberSet::new(self.subscribers, bus.clone());
            subscriber_listener(&bus, subs);
        }
        LinkManager::from_parts(self.cfg, bus, self.connector, self.source)
    }
}

/// Forwards bus events to the subscriber set until the bus closes.
fn subscriber_listener(bus: &Bus, subs: SubscriberSet) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => subs.emit(&ev),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "subscriber listener lagged behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
        subs.shutdown().await;
    });
}
