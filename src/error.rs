//! Error types used by the link runtime.
//!
//! - [`OpenError`] / [`OpenErrorKind`]: a single failed open attempt, classified
//!   once at the driver boundary into transient or fatal.
//! - [`LinkError`]: post-open I/O on an already allocated handle.
//! - [`SourceError`]: failures talking to the external event source.
//! - [`StartError`]: why [`LinkManager::start`](crate::LinkManager::start) did not reach `Running`.
//! - [`ConfigError`]: invalid configuration values.
//!
//! All of them provide `as_label` for logs; none of them is ever raised as a panic.

use thiserror::Error;

/// Classification of an open failure.
///
/// Transient kinds are worth retrying (another process holds the port, the
/// OS has not released it yet, udev has not applied permissions yet). The
/// rest are fatal for the current start.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenErrorKind {
    /// Device or resource busy.
    Busy,
    /// Permission denied.
    PermissionDenied,
    /// Access conflict (port held by someone else, "access is denied" on Windows).
    AccessConflict,
    /// The device path does not exist.
    NotFound,
    /// Settings rejected by the driver (bad baud rate, bad path string).
    InvalidConfig,
    /// The attempt was abandoned because its session was cancelled.
    Cancelled,
    /// Anything else.
    Other,
}

impl OpenErrorKind {
    /// Classifies a driver error message.
    ///
    /// Used only where the platform hands us text; the result is the typed kind
    /// carried from then on.
    ///
    /// # Example
    /// ```
    /// use linkvisor::OpenErrorKind;
    ///
    /// assert_eq!(OpenErrorKind::classify("Device or resource busy"), OpenErrorKind::Busy);
    /// assert_eq!(OpenErrorKind::classify("Access is denied."), OpenErrorKind::AccessConflict);
    /// assert_eq!(OpenErrorKind::classify("No such file or directory"), OpenErrorKind::NotFound);
    /// ```
    pub fn classify(message: &str) -> Self {
        let msg = message.to_ascii_lowercase();
        if msg.contains("busy") {
            OpenErrorKind::Busy
        } else if msg.contains("permission") {
            OpenErrorKind::PermissionDenied
        } else if msg.contains("access") || msg.contains("denied") {
            OpenErrorKind::AccessConflict
        } else if msg.contains("no such file") || msg.contains("not found") {
            OpenErrorKind::NotFound
        } else {
            OpenErrorKind::Other
        }
    }

    /// Returns `true` for kinds that may resolve on retry.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            OpenErrorKind::Busy | OpenErrorKind::PermissionDenied | OpenErrorKind::AccessConflict
        )
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(self) -> &'static str {
        match self {
            OpenErrorKind::Busy => "busy",
            OpenErrorKind::PermissionDenied => "permission_denied",
            OpenErrorKind::AccessConflict => "access_conflict",
            OpenErrorKind::NotFound => "not_found",
            OpenErrorKind::InvalidConfig => "invalid_config",
            OpenErrorKind::Cancelled => "cancelled",
            OpenErrorKind::Other => "other",
        }
    }
}

/// A failed attempt to open a link.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to open {path}: {message}")]
pub struct OpenError {
    /// Typed classification.
    pub kind: OpenErrorKind,
    /// Device path that was being opened.
    pub path: String,
    /// Driver message.
    pub message: String,
}

impl OpenError {
    /// Creates an error with an explicit kind.
    pub fn new(kind: OpenErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an error whose kind is derived from the message text.
    pub fn from_message(path: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: OpenErrorKind::classify(&message),
            path: path.into(),
            message,
        }
    }

    /// Shorthand for `self.kind.is_transient()`.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

#[cfg(feature = "serial")]
impl OpenError {
    /// Converts a `serialport` error, preferring its typed kind over the text.
    pub(crate) fn from_serial(path: &str, err: serialport::Error) -> Self {
        use serialport::ErrorKind;

        let kind = match err.kind() {
            ErrorKind::NoDevice => OpenErrorKind::NotFound,
            ErrorKind::InvalidInput => OpenErrorKind::InvalidConfig,
            ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => OpenErrorKind::PermissionDenied,
            ErrorKind::Io(std::io::ErrorKind::NotFound) => OpenErrorKind::NotFound,
            ErrorKind::Io(_) | ErrorKind::Unknown => OpenErrorKind::classify(&err.description),
        };
        Self::new(kind, path, err.description)
    }
}

/// Errors raised by I/O on an allocated link.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LinkError {
    /// The handle is absent or not open.
    #[error("link is not open")]
    NotOpen,
    /// Setting control lines failed.
    #[error("configure failed: {0}")]
    Configure(String),
    /// Writing bytes failed.
    #[error("write failed: {0}")]
    Write(String),
    /// Waiting for bytes to reach the device failed.
    #[error("drain failed: {0}")]
    Drain(String),
    /// Discarding buffered bytes failed.
    #[error("flush failed: {0}")]
    Flush(String),
    /// Clean close failed.
    #[error("close failed: {0}")]
    Close(String),
    /// Underlying OS error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            LinkError::NotOpen => "link_not_open",
            LinkError::Configure(_) => "link_configure",
            LinkError::Write(_) => "link_write",
            LinkError::Drain(_) => "link_drain",
            LinkError::Flush(_) => "link_flush",
            LinkError::Close(_) => "link_close",
            LinkError::Io(_) => "link_io",
        }
    }
}

/// Errors raised by an [`EventSource`](crate::EventSource).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Subscription could not be established.
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    /// Subscription could not be removed.
    #[error("unsubscribe failed: {0}")]
    Unsubscribe(String),
}

/// Reasons a start attempt did not reach `Running`.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StartError {
    /// Retry-open policy gave up.
    #[error("{0}")]
    Open(#[from] OpenError),
    /// Control lines could not be set after open.
    #[error("failed to configure {path}: {source}")]
    Configure {
        /// Device path.
        path: String,
        /// Underlying link error.
        #[source]
        source: LinkError,
    },
    /// Event source refused the subscription.
    #[error("failed to subscribe to event source: {0}")]
    Subscribe(#[from] SourceError),
    /// A stop superseded this start while it was in flight.
    #[error("start cancelled by a concurrent stop")]
    Cancelled,
    /// The handle reported an error or closed before the link was running.
    #[error("link lost while starting: {0}")]
    LinkLost(String),
    /// A stop is still releasing resources.
    #[error("stop in progress")]
    Stopping,
}

impl StartError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use linkvisor::StartError;
    ///
    /// assert_eq!(StartError::Cancelled.as_label(), "start_cancelled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            StartError::Open(_) => "start_open_failed",
            StartError::Configure { .. } => "start_configure_failed",
            StartError::Subscribe(_) => "start_subscribe_failed",
            StartError::Cancelled => "start_cancelled",
            StartError::LinkLost(_) => "start_link_lost",
            StartError::Stopping => "start_while_stopping",
        }
    }
}

/// Invalid configuration input.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
}
