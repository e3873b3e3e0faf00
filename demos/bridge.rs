//! # Bridge demo
//!
//! Keeps a serial actuator attached to an event stream read from stdin. Every
//! line typed is reported as one change by a [`ManualSource`]; the line text is
//! used as the change signature (an empty line fires an unsigned change).
//!
//! Events are rendered by the built-in `LogWriter`. Configuration comes from
//! the environment (`LINK_PATH`, `LINK_BAUD`, `AUTO_RECONNECT_INTERVAL_MS`, ...).
//! Set `LINK_DRY_RUN=1` to use an in-memory device instead of a real port.
//!
//! ## Run
//! ```bash
//! LINK_DRY_RUN=1 RUST_LOG=info cargo run --example bridge
//! LINK_PATH=/dev/ttyACM0 cargo run --example bridge
//! ```

use std::sync::Arc;

use linkvisor::{
    LinkConfig, LinkManagerBuilder, LogWriter, ManualSource, MemoryDevice, Subscribe,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "serial")]
fn builder(cfg: LinkConfig, dry_run: bool) -> LinkManagerBuilder {
    if dry_run {
        LinkManagerBuilder::new(cfg, MemoryDevice::new())
    } else {
        LinkManagerBuilder::new(cfg, linkvisor::SerialConnector)
    }
}

#[cfg(not(feature = "serial"))]
fn builder(cfg: LinkConfig, _dry_run: bool) -> LinkManagerBuilder {
    LinkManagerBuilder::new(cfg, MemoryDevice::new())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = LinkConfig::from_env()?;
    let dry_run = std::env::var_os("LINK_DRY_RUN").is_some();
    println!(
        "bridge: path={} baud={} dry_run={dry_run}; type a line to fire a change, Ctrl-C to quit",
        cfg.path, cfg.baud_rate
    );

    let source = ManualSource::new();
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let manager = builder(cfg, dry_run)
        .with_source(source.clone())
        .with_subscribers(subs)
        .build();

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            let notified = if line.is_empty() {
                source.fire_unsigned()
            } else {
                source.fire(line)
            };
            if notified == 0 {
                println!("link is down, change not watched");
            }
        }
    });

    manager.run().await?;
    Ok(())
}
