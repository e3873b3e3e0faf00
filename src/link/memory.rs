//! # In-process device.
//!
//! [`MemoryDevice`] stands in for the physical actuator: it implements
//! [`Connect`] and hands out [`MemoryLink`] handles that record every line
//! written to them. Failures are scripted on the device (busy opens, write
//! errors, close errors, unplug), which makes it suitable for dry runs
//! without hardware and for exercising every failure path of the manager.
//!
//! ## Example
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use linkvisor::{Connect, Link, LinkConfig, MemoryDevice, OpenErrorKind};
//!
//! let device = MemoryDevice::new();
//! device.fail_next_opens([OpenErrorKind::Busy]);
//!
//! let mut link = device.connect(&LinkConfig::default());
//! assert!(link.open().await.is_err());
//! assert!(link.open().await.is_ok());
//! assert_eq!(device.open_attempts(), 2);
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{Connect, ControlLines, Link, LinkSignal, Listeners};
use crate::config::LinkConfig;
use crate::error::{LinkError, OpenError, OpenErrorKind};

/// Handle currently attached to the device.
struct Attached {
    open: Arc<AtomicBool>,
    listeners: Listeners,
}

#[derive(Default)]
struct DeviceState {
    open_script: VecDeque<OpenErrorKind>,
    open_latency: Duration,
    unplugged: bool,
    write_failures: usize,
    close_failures: usize,
    written: Vec<String>,
    control_lines: Option<ControlLines>,
    allocations: usize,
    open_attempts: usize,
    destroyed: usize,
    attached: Option<Attached>,
}

/// Scriptable in-memory actuator.
///
/// Cheap to clone; clones control the same device.
#[derive(Clone, Default)]
pub struct MemoryDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl MemoryDevice {
    /// Creates a healthy device.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes the next opens fail with the given kinds, in order.
    pub fn fail_next_opens(&self, kinds: impl IntoIterator<Item = OpenErrorKind>) {
        self.state().open_script.extend(kinds);
    }

    /// Delays every open attempt by `latency`.
    pub fn set_open_latency(&self, latency: Duration) {
        self.state().open_latency = latency;
    }

    /// Makes the next `n` writes fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.state().write_failures = n;
    }

    /// Makes the next `n` closes fail.
    pub fn fail_next_closes(&self, n: usize) {
        self.state().close_failures = n;
    }

    /// Delivers bytes from the device to the attached handle's data listener.
    pub fn receive(&self, bytes: &[u8]) {
        let listeners = self.state().attached.as_ref().map(|a| a.listeners.clone());
        if let Some(listeners) = listeners {
            listeners.emit(LinkSignal::Data(bytes.to_vec()));
        }
    }

    /// Simulates pulling the cable: the attached handle reports an error and a
    /// close, and opens fail with `NotFound` until [`MemoryDevice::plug`].
    pub fn unplug(&self, reason: &str) {
        let attached = {
            let mut state = self.state();
            state.unplugged = true;
            state.attached.take()
        };
        if let Some(attached) = attached {
            attached.open.store(false, Ordering::SeqCst);
            attached.listeners.emit(LinkSignal::Error(reason.to_string()));
            attached.listeners.emit(LinkSignal::Closed);
        }
    }

    /// Makes the device openable again after [`MemoryDevice::unplug`].
    pub fn plug(&self) {
        self.state().unplugged = false;
    }

    /// Lines written and drained so far, without terminators.
    pub fn written(&self) -> Vec<String> {
        self.state().written.clone()
    }

    /// Control lines set by the last `configure`.
    pub fn control_lines(&self) -> Option<ControlLines> {
        self.state().control_lines
    }

    /// Number of handles allocated through [`Connect::connect`].
    pub fn allocations(&self) -> usize {
        self.state().allocations
    }

    /// Number of `open()` calls.
    pub fn open_attempts(&self) -> usize {
        self.state().open_attempts
    }

    /// Number of `destroy()` calls.
    pub fn destroyed(&self) -> usize {
        self.state().destroyed
    }

    /// Returns `true` if a handle is currently open on the device.
    pub fn is_open(&self) -> bool {
        self.state()
            .attached
            .as_ref()
            .is_some_and(|a| a.open.load(Ordering::SeqCst))
    }
}

impl Connect for MemoryDevice {
    fn connect(&self, cfg: &LinkConfig) -> Box<dyn Link> {
        self.state().allocations += 1;
        Box::new(MemoryLink {
            path: cfg.path.clone(),
            open: Arc::new(AtomicBool::new(false)),
            listeners: Listeners::new(),
            device: self.clone(),
        })
    }
}

/// Handle to a [`MemoryDevice`].
pub struct MemoryLink {
    path: String,
    open: Arc<AtomicBool>,
    listeners: Listeners,
    device: MemoryDevice,
}

impl MemoryLink {
    fn detach(&self) {
        self.open.store(false, Ordering::SeqCst);
        let mut state = self.device.state();
        if state
            .attached
            .as_ref()
            .is_some_and(|a| Arc::ptr_eq(&a.open, &self.open))
        {
            state.attached = None;
        }
    }

    fn ensure_open(&self) -> Result<(), LinkError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LinkError::NotOpen)
        }
    }
}

#[async_trait]
impl Link for MemoryLink {
    fn path(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    async fn open(&mut self) -> Result<(), OpenError> {
        let latency = self.device.state().open_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.device.state();
        state.open_attempts += 1;
        if let Some(kind) = state.open_script.pop_front() {
            return Err(OpenError::new(kind, &self.path, simulated_message(kind)));
        }
        if state.unplugged {
            return Err(OpenError::new(
                OpenErrorKind::NotFound,
                &self.path,
                "No such file or directory",
            ));
        }
        self.open.store(true, Ordering::SeqCst);
        state.attached = Some(Attached {
            open: Arc::clone(&self.open),
            listeners: self.listeners.clone(),
        });
        Ok(())
    }

    async fn configure(&mut self, lines: ControlLines) -> Result<(), LinkError> {
        self.ensure_open()?;
        self.device.state().control_lines = Some(lines);
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.ensure_open()?;
        let mut state = self.device.state();
        if state.write_failures > 0 {
            state.write_failures -= 1;
            return Err(LinkError::Write("simulated write failure".into()));
        }
        let line = String::from_utf8_lossy(bytes);
        state
            .written
            .push(line.trim_end_matches(['\r', '\n']).to_string());
        Ok(())
    }

    async fn drain(&mut self) -> Result<(), LinkError> {
        self.ensure_open()
    }

    async fn flush(&mut self) -> Result<(), LinkError> {
        self.ensure_open()
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        {
            let mut state = self.device.state();
            if state.close_failures > 0 {
                state.close_failures -= 1;
                return Err(LinkError::Close("simulated close failure".into()));
            }
        }
        self.detach();
        Ok(())
    }

    fn destroy(&mut self) {
        self.detach();
        self.device.state().destroyed += 1;
    }
}

fn simulated_message(kind: OpenErrorKind) -> &'static str {
    match kind {
        OpenErrorKind::Busy => "Device or resource busy",
        OpenErrorKind::PermissionDenied => "Permission denied",
        OpenErrorKind::AccessConflict => "Access denied",
        OpenErrorKind::NotFound => "No such file or directory",
        OpenErrorKind::InvalidConfig => "Invalid baud rate",
        OpenErrorKind::Cancelled => "cancelled",
        OpenErrorKind::Other => "Input/output error",
    }
}
