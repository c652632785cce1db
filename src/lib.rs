//! # mic-stream
//!
//! Streams microphone audio as raw PCM over a single TCP connection.
//!
//! `mic-stream` captures the default input device via CPAL and writes
//! fixed-size frames of interleaved, signed little-endian PCM to a server.
//! There is no framing on the wire: the receiver must already know the
//! sample rate, channel count and bit depth.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mic_stream::MicStream;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), mic_stream::StreamError> {
//! let session = MicStream::builder()
//!     .host("192.168.1.20") // port 8888
//!     .on_event(|e| tracing::debug!(?e, "session event"))
//!     .build()?;
//!
//! let handle = session.handle();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     handle.cancel();
//! });
//!
//! let report = session.run().await?;
//! println!("{} bytes sent", report.stats.bytes_sent);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **CPAL Thread**: audio callback that never blocks, pushing whole
//!   sample-frames into a lock-free ring buffer
//! - **Session Task**: waits for one frame, writes it to the socket, repeats.
//!   A slow network suspends the write and the ring buffer absorbs the gap.
//! - **Cancellation**: a token raced against every wait. A frame already being
//!   written gets a short grace period to finish; if it can't, the connection
//!   is reset rather than closed, so the receiver never sees a truncated
//!   frame followed by a clean end of stream

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect are confined to tests
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod builder;
mod config;
mod error;
mod event;
pub mod format;
mod frame;
mod session;
pub mod sink;
pub mod source;

pub use builder::{MicStream, MicStreamBuilder};
pub use config::{Endpoint, SessionConfig, StreamConfig, DEFAULT_PORT};
pub use error::{CaptureError, ConfigError, ConnectError, DeviceError, SendError, StreamError};
pub use event::{event_callback, EventCallback, SessionEvent};
pub use frame::AudioFrame;
pub use session::{Session, SessionHandle, SessionReport, SessionState, SessionStats};
pub use sink::{ChannelSink, FrameSink, TcpSink};
pub use source::{CaptureSource, CpalSource, MockProbe, MockSource};
