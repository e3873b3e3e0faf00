//! # Link runtime configuration.
//!
//! [`LinkConfig`] centralizes every knob of the link lifecycle: device path and
//! baud rate, open retries, the post-open settle delay, the drain throttle and
//! the auto-reconnect interval.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use linkvisor::LinkConfig;
//!
//! let mut cfg = LinkConfig::default();
//! cfg.path = "/dev/ttyACM0".into();
//! cfg.settle_delay = Duration::from_millis(500);
//!
//! assert_eq!(cfg.baud_rate, 9600);
//! assert_eq!(cfg.retry.attempts, 3);
//! ```

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::link::ControlLines;
use crate::policies::RetryPolicy;
use crate::trigger::DEFAULT_COMMAND;

/// Configuration for a [`LinkManager`](crate::LinkManager).
///
/// ## Field semantics
/// - `retry`: bounded open attempts with a fixed delay between them
/// - `settle_delay`: wait after configuring control lines, lets the device finish its reset cycle
/// - `drain_throttle`: pause between queued triggers so the device is not overrun
/// - `reconnect_interval`: period of the [`AutoReconnect`](crate::AutoReconnect) loop
/// - `io_timeout`: driver read/write timeout (serial only)
#[derive(Clone, Debug)]
pub struct LinkConfig {
    /// Device path (`/dev/ttyUSB0`, `COM5`, ...).
    pub path: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Key passed to the event source on subscribe (e.g. a wallet address).
    pub watch_key: Option<String>,
    /// Auto-reconnect period.
    pub reconnect_interval: Duration,
    /// Open retry policy.
    pub retry: RetryPolicy,
    /// Delay between configuring control lines and declaring the link live.
    pub settle_delay: Duration,
    /// Pause after each drained trigger.
    pub drain_throttle: Duration,
    /// Driver I/O timeout.
    pub io_timeout: Duration,
    /// Control lines asserted after open.
    pub control_lines: ControlLines,
    /// Payload used for triggers created from event-source changes.
    pub default_command: String,
    /// Capacity of the event bus ring buffer.
    pub bus_capacity: usize,
}

impl Default for LinkConfig {
    /// Default configuration:
    ///
    /// - `baud_rate = 9600`
    /// - `reconnect_interval = 5s`
    /// - `retry = 3 attempts, 400ms apart`
    /// - `settle_delay = 2s`
    /// - `drain_throttle = 120ms`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            path: default_path().to_string(),
            baud_rate: 9600,
            watch_key: None,
            reconnect_interval: Duration::from_millis(5000),
            retry: RetryPolicy::default(),
            settle_delay: Duration::from_millis(2000),
            drain_throttle: Duration::from_millis(120),
            io_timeout: Duration::from_millis(250),
            control_lines: ControlLines::default(),
            default_command: DEFAULT_COMMAND.to_string(),
            bus_capacity: 1024,
        }
    }
}

#[cfg(windows)]
fn default_path() -> &'static str {
    "COM5"
}

#[cfg(not(windows))]
fn default_path() -> &'static str {
    "/dev/ttyUSB0"
}

impl LinkConfig {
    /// Loads the configuration from process environment variables.
    ///
    /// Unset variables keep their defaults. See [`LinkConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through an arbitrary key lookup.
    ///
    /// Recognized keys:
    /// `LINK_PATH`, `LINK_BAUD`, `LINK_WATCH_KEY`, `AUTO_RECONNECT_INTERVAL_MS`,
    /// `LINK_OPEN_ATTEMPTS`, `LINK_OPEN_RETRY_DELAY_MS`, `LINK_SETTLE_DELAY_MS`,
    /// `LINK_DRAIN_THROTTLE_MS`, `LINK_IO_TIMEOUT_MS`, `LINK_DEFAULT_COMMAND`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(path) = lookup("LINK_PATH").filter(|v| !v.trim().is_empty()) {
            cfg.path = path;
        }
        if let Some(baud) = parse(&lookup, "LINK_BAUD")? {
            cfg.baud_rate = baud;
        }
        cfg.watch_key = lookup("LINK_WATCH_KEY").filter(|v| !v.trim().is_empty());
        if let Some(ms) = parse(&lookup, "AUTO_RECONNECT_INTERVAL_MS")? {
            cfg.reconnect_interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse(&lookup, "LINK_OPEN_ATTEMPTS")? {
            cfg.retry.attempts = n;
        }
        if let Some(ms) = parse(&lookup, "LINK_OPEN_RETRY_DELAY_MS")? {
            cfg.retry.delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(&lookup, "LINK_SETTLE_DELAY_MS")? {
            cfg.settle_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(&lookup, "LINK_DRAIN_THROTTLE_MS")? {
            cfg.drain_throttle = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(&lookup, "LINK_IO_TIMEOUT_MS")? {
            cfg.io_timeout = Duration::from_millis(ms);
        }
        if let Some(cmd) = lookup("LINK_DEFAULT_COMMAND").filter(|v| !v.trim().is_empty()) {
            cfg.default_command = cmd;
        }
        Ok(cfg)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

fn parse<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = LinkConfig::default();
        assert_eq!(cfg.baud_rate, 9600);
        assert_eq!(cfg.reconnect_interval, Duration::from_secs(5));
        assert_eq!(cfg.retry.attempts, 3);
        assert_eq!(cfg.retry.delay, Duration::from_millis(400));
        assert_eq!(cfg.settle_delay, Duration::from_secs(2));
        assert_eq!(cfg.drain_throttle, Duration::from_millis(120));
        assert_eq!(cfg.default_command, "F");
        assert!(cfg.control_lines.dtr && cfg.control_lines.rts);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let cfg = LinkConfig::from_lookup(lookup_from(&[
            ("LINK_PATH", "/dev/ttyACM1"),
            ("LINK_BAUD", "115200"),
            ("LINK_WATCH_KEY", "DsjJMaAx"),
            ("AUTO_RECONNECT_INTERVAL_MS", " 1500 "),
            ("LINK_OPEN_ATTEMPTS", "5"),
            ("LINK_DRAIN_THROTTLE_MS", "0"),
        ]))
        .unwrap();

        assert_eq!(cfg.path, "/dev/ttyACM1");
        assert_eq!(cfg.baud_rate, 115_200);
        assert_eq!(cfg.watch_key.as_deref(), Some("DsjJMaAx"));
        assert_eq!(cfg.reconnect_interval, Duration::from_millis(1500));
        assert_eq!(cfg.retry.attempts, 5);
        assert_eq!(cfg.drain_throttle, Duration::ZERO);
        assert_eq!(cfg.settle_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = LinkConfig::from_lookup(lookup_from(&[("AUTO_RECONNECT_INTERVAL_MS", "soon")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "AUTO_RECONNECT_INTERVAL_MS",
                value: "soon".into()
            }
        );
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let cfg =
            LinkConfig::from_lookup(lookup_from(&[("LINK_PATH", "  "), ("LINK_WATCH_KEY", "")]))
                .unwrap();
        assert_eq!(cfg.path, default_path());
        assert!(cfg.watch_key.is_none());
    }
}
