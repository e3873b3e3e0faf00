//! # Native serial link.
//!
//! [`SerialLink`] drives a real port through the `serialport` crate. The
//! crate's API is blocking, so every call runs on tokio's blocking pool and a
//! dedicated reader thread forwards incoming bytes to the data listener.
//!
//! ## Reader thread
//! ```text
//! open() ──► try_clone() ──► "linkvisor-reader" thread
//!                               loop read(timeout)
//!                                 ├─ Ok(n)          ─► emit Data
//!                                 ├─ TimedOut/EINTR ─► continue
//!                                 └─ other error    ─► emit Error, emit Closed, exit
//! close()/destroy() ──► stop flag ──► thread exits on its next timeout
//! ```

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serialport::{ClearBuffer, SerialPort};

use super::{Connect, ControlLines, Link, LinkSignal, Listeners};
use crate::config::LinkConfig;
use crate::error::{LinkError, OpenError, OpenErrorKind};

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

/// [`Connect`] implementation producing [`SerialLink`] handles.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialConnector;

impl Connect for SerialConnector {
    fn connect(&self, cfg: &LinkConfig) -> Box<dyn Link> {
        Box::new(SerialLink::new(&cfg.path, cfg.baud_rate, cfg.io_timeout))
    }
}

/// Serial port handle.
pub struct SerialLink {
    path: String,
    baud_rate: u32,
    timeout: Duration,
    port: Option<SharedPort>,
    reader_stop: Option<Arc<AtomicBool>>,
    listeners: Listeners,
}

impl SerialLink {
    /// Creates an unopened handle.
    pub fn new(path: &str, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            path: path.to_string(),
            baud_rate,
            timeout,
            port: None,
            reader_stop: None,
            listeners: Listeners::new(),
        }
    }

    /// Runs `op` against the port on the blocking pool.
    async fn with_port<T, F>(&self, op: F) -> Result<T, LinkError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SerialPort) -> Result<T, LinkError> + Send + 'static,
    {
        let port = self.port.clone().ok_or(LinkError::NotOpen)?;
        tokio::task::spawn_blocking(move || {
            let mut guard = port
                .lock()
                .map_err(|_| LinkError::Io(io::Error::other("serial port mutex poisoned")))?;
            op(guard.as_mut())
        })
        .await
        .map_err(|e| LinkError::Io(io::Error::other(e)))?
    }

    fn release(&mut self) {
        if let Some(stop) = self.reader_stop.take() {
            stop.store(true, Ordering::Release);
        }
        self.port = None;
    }
}

fn spawn_reader(
    mut port: Box<dyn SerialPort>,
    listeners: Listeners,
    stop: Arc<AtomicBool>,
) -> io::Result<()> {
    std::thread::Builder::new()
        .name("linkvisor-reader".into())
        .spawn(move || {
            let mut buf = [0u8; 1024];
            while !stop.load(Ordering::Acquire) {
                match port.read(&mut buf) {
                    Ok(0) => continue,
                    Ok(n) => {
                        if let Some(chunk) = buf.get(..n) {
                            listeners.emit(LinkSignal::Data(chunk.to_vec()));
                        }
                    }
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::TimedOut
                                | io::ErrorKind::Interrupted
                                | io::ErrorKind::WouldBlock
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        if !stop.load(Ordering::Acquire) {
                            listeners.emit(LinkSignal::Error(e.to_string()));
                            listeners.emit(LinkSignal::Closed);
                        }
                        break;
                    }
                }
            }
        })
        .map(|_| ())
}

#[async_trait]
impl Link for SerialLink {
    fn path(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    async fn open(&mut self) -> Result<(), OpenError> {
        if self.port.is_some() {
            return Ok(());
        }
        let path = self.path.clone();
        let baud = self.baud_rate;
        let timeout = self.timeout;

        let opened = tokio::task::spawn_blocking(move || {
            serialport::new(&path, baud)
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None)
                .timeout(timeout)
                .open()
                .map_err(|e| OpenError::from_serial(&path, e))
        })
        .await
        .map_err(|e| OpenError::new(OpenErrorKind::Other, &self.path, e.to_string()))??;

        let reader = opened
            .try_clone()
            .map_err(|e| OpenError::from_serial(&self.path, e))?;
        let stop = Arc::new(AtomicBool::new(false));
        spawn_reader(reader, self.listeners.clone(), Arc::clone(&stop))
            .map_err(|e| OpenError::new(OpenErrorKind::Other, &self.path, e.to_string()))?;

        self.reader_stop = Some(stop);
        self.port = Some(Arc::new(Mutex::new(opened)));
        Ok(())
    }

    async fn configure(&mut self, lines: ControlLines) -> Result<(), LinkError> {
        self.with_port(move |port| {
            port.write_data_terminal_ready(lines.dtr)
                .and_then(|_| port.write_request_to_send(lines.rts))
                .map_err(|e| LinkError::Configure(e.to_string()))
        })
        .await
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let bytes = bytes.to_vec();
        self.with_port(move |port| {
            port.write_all(&bytes)
                .map_err(|e| LinkError::Write(e.to_string()))
        })
        .await
    }

    async fn drain(&mut self) -> Result<(), LinkError> {
        self.with_port(|port| port.flush().map_err(|e| LinkError::Drain(e.to_string())))
            .await
    }

    async fn flush(&mut self) -> Result<(), LinkError> {
        self.with_port(|port| {
            port.clear(ClearBuffer::All)
                .map_err(|e| LinkError::Flush(e.to_string()))
        })
        .await
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        self.release();
        Ok(())
    }

    fn destroy(&mut self) {
        self.release();
    }
}
