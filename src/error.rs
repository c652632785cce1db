//! Error types for mic-stream.
//!
//! Errors are split by the component that raises them:
//! - **Startup errors** ([`ConfigError`], [`DeviceError`], [`ConnectError`]):
//!   the session never reaches `Streaming`
//! - **Stream errors** ([`CaptureError`], [`SendError`]): raised mid-stream,
//!   they end the session
//!
//! [`StreamError`] wraps all of them and is what [`Session::run()`] returns.
//!
//! [`Session::run()`]: crate::Session::run

use std::io;
use std::time::Duration;

/// Invalid session configuration, detected before anything is opened.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Sample rate must be non-zero.
    #[error("sample rate must be greater than 0")]
    ZeroSampleRate,

    /// At least one channel is required.
    #[error("channel count must be at least 1")]
    ZeroChannels,

    /// Bit depth must be a non-zero whole number of bytes.
    #[error("bits per sample must be a non-zero multiple of 8 (got {bits})")]
    InvalidBitDepth {
        /// The rejected bit depth.
        bits: u16,
    },

    /// Chunk size must be non-zero.
    #[error("chunk size must be at least 1 frame")]
    ZeroChunkFrames,

    /// No server host was configured.
    #[error("no server host configured")]
    MissingHost,
}

/// Failure to open the audio input device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// No input device exists on this system.
    #[error("no audio input device available")]
    Unavailable,

    /// The device cannot capture the requested format.
    #[error("input device '{device}' does not support {requested}")]
    FormatUnsupported {
        /// Name of the device that was queried.
        device: String,
        /// Human-readable description of the requested format.
        requested: String,
    },

    /// The audio backend (CPAL) failed to build or start the stream.
    #[error("audio backend error: {0}")]
    Backend(String),
}

/// Failure while waiting for the next captured frame.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The source was closed while (or before) waiting for a frame.
    #[error("capture source closed")]
    Closed,

    /// The backend reported that the input device went away.
    #[error("input device lost: {reason}")]
    DeviceLost {
        /// Backend description of the failure.
        reason: String,
    },

    /// A frame did not match the configured frame size.
    #[error("captured frame is {actual} bytes, expected {expected}")]
    FrameLength {
        /// Configured frame size in bytes.
        expected: usize,
        /// Size of the frame actually produced.
        actual: usize,
    },
}

/// Failure to establish the outbound connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The server actively refused the connection.
    #[error("connection to {endpoint} refused")]
    Refused {
        /// The `host:port` that was dialled.
        endpoint: String,
    },

    /// The connection attempt did not complete in time.
    #[error("connection to {endpoint} timed out after {timeout_ms}ms")]
    Timeout {
        /// The `host:port` that was dialled.
        endpoint: String,
        /// The timeout that expired.
        timeout_ms: u64,
    },

    /// The server could not be reached (resolution or routing failure).
    #[error("{endpoint} unreachable: {source}")]
    Unreachable {
        /// The `host:port` that was dialled.
        endpoint: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl ConnectError {
    /// Classifies an I/O error from a connect attempt bounded by `timeout`.
    ///
    /// An OS-level timeout is reported against the configured bound.
    pub fn from_io(endpoint: impl Into<String>, source: io::Error, timeout: Duration) -> Self {
        let endpoint = endpoint.into();
        match source.kind() {
            io::ErrorKind::ConnectionRefused => Self::Refused { endpoint },
            io::ErrorKind::TimedOut => Self::Timeout {
                endpoint,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            _ => Self::Unreachable { endpoint, source },
        }
    }
}

/// Failure while writing a frame to the connection.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The peer closed the connection, or it was closed locally.
    #[error("connection closed")]
    ConnectionClosed,

    /// Any other transport fault.
    #[error("transport error: {0}")]
    Io(#[source] io::Error),

    /// A frame was still being written when the shutdown grace ran out, so
    /// the connection was reset instead of closed.
    #[error("frame {sequence} still in flight after {grace_ms}ms; connection reset")]
    Aborted {
        /// Sequence number of the frame that was cut off.
        sequence: u64,
        /// The grace period that expired.
        grace_ms: u64,
    },
}

impl From<io::Error> for SendError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero => Self::ConnectionClosed,
            _ => Self::Io(err),
        }
    }
}

/// Top-level error returned by a streaming session.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The audio device could not be opened.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// The server could not be reached.
    #[error("connect error: {0}")]
    Connect(#[from] ConnectError),

    /// Capture failed mid-stream.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Sending failed mid-stream.
    #[error("send error: {0}")]
    Send(#[from] SendError),
}

impl StreamError {
    /// Returns `true` if the session failed before it started streaming.
    pub fn is_startup(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Device(_) | Self::Connect(_))
    }
}
