//! Captured audio frame.

use std::sync::Arc;
use std::time::Duration;

use crate::format::i16_to_le_bytes;

/// An immutable block of interleaved PCM audio.
///
/// `AudioFrame` is the unit handed from a [`CaptureSource`] to a
/// [`FrameSink`]. Its payload is exactly what goes on the wire: no header,
/// no length prefix. Every frame from a session has the same length,
/// [`StreamConfig::frame_bytes()`].
///
/// The payload is stored in an `Arc<[u8]>` so clones are cheap and share data.
///
/// # Example
///
/// ```
/// use mic_stream::{AudioFrame, StreamConfig};
/// use std::time::Duration;
///
/// let config = StreamConfig::default();
/// let frame = AudioFrame::from_samples(&vec![0i16; 2048], 0, Duration::ZERO);
/// assert_eq!(frame.len(), config.frame_bytes());
/// assert_eq!(frame.timestamp(), Duration::ZERO);
/// ```
///
/// [`CaptureSource`]: crate::CaptureSource
/// [`FrameSink`]: crate::FrameSink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Arc<[u8]>,
    sequence: u64,
    timestamp: Duration,
}

impl AudioFrame {
    /// Wraps raw PCM bytes.
    pub fn from_bytes(data: Vec<u8>, sequence: u64, timestamp: Duration) -> Self {
        Self {
            data: data.into(),
            sequence,
            timestamp,
        }
    }

    /// Encodes 16-bit samples as signed little-endian bytes.
    pub fn from_samples(samples: &[i16], sequence: u64, timestamp: Duration) -> Self {
        Self::from_bytes(i16_to_le_bytes(samples), sequence, timestamp)
    }

    /// The raw payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Position of this frame in its session, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Capture position of the first sample, relative to session start.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }
}

impl AsRef<[u8]> for AudioFrame {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
