//! Mock capture source for testing without hardware.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::source::CaptureSource;
use crate::{AudioFrame, CaptureError, StreamConfig};

/// Counters shared between a [`MockSource`] and its probes.
#[derive(Default)]
struct MockState {
    produced: AtomicU64,
    releases: AtomicUsize,
    released: AtomicBool,
}

/// Observes a [`MockSource`] after it has been moved into a session.
#[derive(Clone)]
pub struct MockProbe {
    state: Arc<MockState>,
    closed: CancellationToken,
}

impl MockProbe {
    /// Frames handed out so far.
    pub fn frames_produced(&self) -> u64 {
        self.state.produced.load(Ordering::SeqCst)
    }

    /// How many times the device was actually released.
    ///
    /// Repeated `close()` calls count once.
    pub fn releases(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    /// Returns `true` once the source has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// A capture source that synthesizes audio instead of reading a device.
///
/// Samples form a continuous ramp across frames: sample `k` of the session
/// (counting every channel) holds the low bytes of `k`, little-endian. A
/// receiver can therefore detect any gap, duplicate or reordering.
///
/// # Example
///
/// ```
/// use mic_stream::{MockSource, StreamConfig};
/// use std::time::Duration;
///
/// let source = MockSource::new(StreamConfig::default())
///     .with_interval(Duration::from_millis(64)) // pace like real hardware
///     .stall_after(10); // then block until closed
/// let probe = source.probe();
/// assert_eq!(probe.frames_produced(), 0);
/// ```
pub struct MockSource {
    config: StreamConfig,
    interval: Option<Duration>,
    stall_after: Option<u64>,
    state: Arc<MockState>,
    closed: CancellationToken,
}

impl MockSource {
    /// Creates a mock source producing frames in the given format.
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            interval: None,
            stall_after: None,
            state: Arc::new(MockState::default()),
            closed: CancellationToken::new(),
        }
    }

    /// Waits this long before each frame, like a device filling its buffer.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// After `frames` frames, `next_frame` blocks until the source is closed.
    #[must_use]
    pub fn stall_after(mut self, frames: u64) -> Self {
        self.stall_after = Some(frames);
        self
    }

    /// Returns a probe that outlives moving the source elsewhere.
    pub fn probe(&self) -> MockProbe {
        MockProbe {
            state: Arc::clone(&self.state),
            closed: self.closed.clone(),
        }
    }

    /// Builds the payload for the frame with the given sequence number.
    fn synthesize(&self, sequence: u64) -> Vec<u8> {
        let samples = self.config.samples_per_frame();
        let width = self.config.bytes_per_sample();
        let first = sequence * samples as u64;

        let mut bytes = Vec::with_capacity(samples * width);
        for k in first..first + samples as u64 {
            let value = k.to_le_bytes();
            for i in 0..width {
                bytes.push(value.get(i).copied().unwrap_or(0));
            }
        }
        bytes
    }
}

#[async_trait]
impl CaptureSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn config(&self) -> &StreamConfig {
        &self.config
    }

    async fn next_frame(&self) -> Result<AudioFrame, CaptureError> {
        if self.closed.is_cancelled() {
            return Err(CaptureError::Closed);
        }

        let sequence = self.state.produced.load(Ordering::SeqCst);
        if self.stall_after.is_some_and(|limit| sequence >= limit) {
            self.closed.cancelled().await;
            return Err(CaptureError::Closed);
        }

        if let Some(interval) = self.interval {
            tokio::select! {
                () = self.closed.cancelled() => return Err(CaptureError::Closed),
                () = tokio::time::sleep(interval) => {}
            }
        }

        let timestamp = self.config.frame_duration() * u32::try_from(sequence).unwrap_or(u32::MAX);
        let frame = AudioFrame::from_bytes(self.synthesize(sequence), sequence, timestamp);
        self.state.produced.fetch_add(1, Ordering::SeqCst);
        Ok(frame)
    }

    fn close(&self) {
        if self.state.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.closed.cancel();
        self.state.releases.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Mock capture source released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::le_bytes_to_i16;

    #[tokio::test]
    async fn test_mock_frames_have_configured_length() {
        let config = StreamConfig {
            sample_rate: 48000,
            channels: 1,
            bits_per_sample: 24,
            chunk_frames: 480,
        };
        let source = MockSource::new(config);
        for _ in 0..3 {
            let frame = source.next_frame().await.unwrap();
            assert_eq!(frame.len(), config.frame_bytes());
        }
    }

    #[tokio::test]
    async fn test_mock_ramp_continues_across_frames() {
        let config = StreamConfig {
            chunk_frames: 4,
            ..Default::default()
        };
        let source = MockSource::new(config);

        let first = le_bytes_to_i16(source.next_frame().await.unwrap().as_bytes());
        let second = source.next_frame().await.unwrap();

        assert_eq!(first, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(second.sequence(), 1);
        assert_eq!(le_bytes_to_i16(second.as_bytes())[0], 8);
    }

    #[tokio::test]
    async fn test_mock_close_is_idempotent() {
        let source = MockSource::new(StreamConfig::default());
        let probe = source.probe();

        source.close();
        source.close();

        assert_eq!(probe.releases(), 1);
        assert!(probe.is_closed());
        assert!(matches!(
            source.next_frame().await,
            Err(CaptureError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_mock_stall_unblocks_on_close() {
        let source = Arc::new(MockSource::new(StreamConfig::default()).stall_after(1));
        let probe = source.probe();
        source.next_frame().await.unwrap();

        let waiter = {
            let source = Arc::clone(&source);
            tokio::spawn(async move { source.next_frame().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        source.close();
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(CaptureError::Closed)));
        assert_eq!(probe.frames_produced(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_interval_paces_frames() {
        let source = MockSource::new(StreamConfig::default())
            .with_interval(Duration::from_millis(64));
        let start = tokio::time::Instant::now();

        source.next_frame().await.unwrap();
        source.next_frame().await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(128));
    }
}
