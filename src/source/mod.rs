//! Capture sources: where audio frames come from.
//!
//! A [`CaptureSource`] owns an input device and hands out fixed-size
//! [`AudioFrame`]s as the hardware fills them. [`CpalSource`] wraps the
//! system's default microphone; [`MockSource`] produces synthetic frames for
//! tests.

mod device;
mod mock;

pub use device::CpalSource;
pub use mock::{MockProbe, MockSource};

use async_trait::async_trait;

use crate::{AudioFrame, CaptureError, StreamConfig};

/// A device that produces a lazy sequence of audio frames.
///
/// # Implementation Notes
///
/// - Every frame must be exactly [`StreamConfig::frame_bytes()`] long
/// - `next_frame` must be cancel-safe: dropping the future may not lose audio
/// - `close` must be idempotent and callable from another task while
///   `next_frame` is pending; the pending call then fails with
///   [`CaptureError::Closed`]
///
/// # Example
///
/// ```
/// use mic_stream::{CaptureError, CaptureSource, MockSource, StreamConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), CaptureError> {
/// let source = MockSource::new(StreamConfig::default());
/// let frame = source.next_frame().await?;
/// assert_eq!(frame.len(), 4096);
///
/// source.close();
/// assert!(matches!(source.next_frame().await, Err(CaptureError::Closed)));
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Human-readable device name for logging.
    fn name(&self) -> &str;

    /// The format every frame is captured in.
    fn config(&self) -> &StreamConfig;

    /// Suspends until a full frame has been captured and returns it.
    async fn next_frame(&self) -> Result<AudioFrame, CaptureError>;

    /// Sample-frames the device captured but had to drop because the
    /// consumer fell behind.
    fn overrun_frames(&self) -> u64 {
        0
    }

    /// Releases the device. Calling it again does nothing.
    ///
    /// May block while the backend tears the stream down.
    fn close(&self);
}
