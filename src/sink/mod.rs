//! Sink trait and implementations for frame destinations.
//!
//! A [`FrameSink`] delivers frames, in order and byte-exact, to wherever
//! the audio is going. The crate provides two sinks:
//!
//! - [`TcpSink`]: Writes raw PCM to a TCP connection (the normal case)
//! - [`ChannelSink`]: Forwards frames to a tokio mpsc channel
//!
//! You can implement [`FrameSink`] for other transports.

mod channel;
mod tcp;

pub use channel::ChannelSink;
pub use tcp::TcpSink;

use crate::{AudioFrame, SendError};
use async_trait::async_trait;

/// A destination for audio frames.
///
/// # Implementation Notes
///
/// - Methods take `&self`; use interior mutability if needed
/// - `send` must write the whole frame or fail; no added framing
/// - Frames must reach the destination in the order `send` was called
/// - `close` must be idempotent and safe to call while a `send` is pending;
///   the pending send then fails with [`SendError::ConnectionClosed`]
///
/// # Example
///
/// ```
/// use mic_stream::{AudioFrame, FrameSink, SendError};
/// use async_trait::async_trait;
///
/// struct PrintSink;
///
/// #[async_trait]
/// impl FrameSink for PrintSink {
///     fn name(&self) -> &str {
///         "print"
///     }
///
///     async fn send(&self, frame: &AudioFrame) -> Result<(), SendError> {
///         println!("frame {}: {} bytes", frame.sequence(), frame.len());
///         Ok(())
///     }
///
///     async fn close(&self) {}
/// }
/// ```
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Writes every byte of `frame`, suspending until done or failed.
    async fn send(&self, frame: &AudioFrame) -> Result<(), SendError>;

    /// Closes the destination. Calling it again does nothing.
    async fn close(&self);

    /// Tears the destination down after a frame was cut off mid-write.
    ///
    /// Transports that can signal an abnormal end (a TCP reset) should do so
    /// here. The default just closes.
    async fn abort(&self) {
        self.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct CountingSink {
        count: AtomicUsize,
    }

    #[async_trait]
    impl FrameSink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        async fn send(&self, _frame: &AudioFrame) -> Result<(), SendError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn test_sink_through_trait_object() {
        let sink: Arc<dyn FrameSink> = Arc::new(CountingSink {
            count: AtomicUsize::new(0),
        });

        let frame = AudioFrame::from_bytes(vec![0u8; 8], 0, Duration::ZERO);
        sink.send(&frame).await.unwrap();
        sink.send(&frame).await.unwrap();
        sink.close().await;

        assert_eq!(sink.name(), "counting");
    }

    #[test]
    fn test_sink_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<Arc<dyn FrameSink>>();
    }
}
