//! Tokio mpsc channel sink implementation.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::sink::FrameSink;
use crate::{AudioFrame, SendError};

/// A sink that forwards frames to a tokio mpsc channel.
///
/// Useful for in-process consumers and for tests. A dropped receiver is
/// reported as [`SendError::ConnectionClosed`], like a peer hanging up.
/// Closing the sink drops its sender, so the receiver sees the end of the
/// stream once buffered frames are drained.
///
/// # Example
///
/// ```
/// use mic_stream::{AudioFrame, ChannelSink};
/// use tokio::sync::mpsc;
///
/// let (tx, _rx) = mpsc::channel::<AudioFrame>(16);
/// let sink = ChannelSink::new(tx);
/// // while let Some(frame) = rx.recv().await { ... }
/// ```
pub struct ChannelSink {
    name: String,
    sender: Mutex<Option<mpsc::Sender<AudioFrame>>>,
}

impl ChannelSink {
    /// Creates a new channel sink with the given sender.
    pub fn new(sender: mpsc::Sender<AudioFrame>) -> Self {
        Self::with_name("channel", sender)
    }

    /// Creates a new channel sink with a custom name.
    pub fn with_name(name: impl Into<String>, sender: mpsc::Sender<AudioFrame>) -> Self {
        Self {
            name: name.into(),
            sender: Mutex::new(Some(sender)),
        }
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, frame: &AudioFrame) -> Result<(), SendError> {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            return Err(SendError::ConnectionClosed);
        };
        sender
            .send(frame.clone())
            .await
            .map_err(|_| SendError::ConnectionClosed)
    }

    async fn close(&self) {
        self.sender.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(sequence: u64) -> AudioFrame {
        AudioFrame::from_bytes(vec![1, 2, 3, 4], sequence, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_frames() {
        let (tx, mut rx) = mpsc::channel::<AudioFrame>(10);
        let sink = ChannelSink::new(tx);

        sink.send(&frame(0)).await.unwrap();
        sink.send(&frame(1)).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().sequence(), 0);
        assert_eq!(rx.recv().await.unwrap().sequence(), 1);
    }

    #[tokio::test]
    async fn test_channel_sink_receiver_dropped() {
        let (tx, rx) = mpsc::channel::<AudioFrame>(10);
        let sink = ChannelSink::new(tx);
        drop(rx);

        let result = sink.send(&frame(0)).await;
        assert!(matches!(result, Err(SendError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_channel_sink_close_ends_stream() {
        let (tx, mut rx) = mpsc::channel::<AudioFrame>(10);
        let sink = ChannelSink::with_name("loopback", tx);
        assert_eq!(sink.name(), "loopback");

        sink.send(&frame(0)).await.unwrap();
        sink.close().await;
        sink.close().await;

        assert!(matches!(
            sink.send(&frame(1)).await,
            Err(SendError::ConnectionClosed)
        ));
        assert_eq!(rx.recv().await.unwrap().sequence(), 0);
        assert!(rx.recv().await.is_none());
    }
}
