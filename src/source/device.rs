//! CPAL device wrapper for microphone capture.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig as CpalStreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tokio::sync::Notify;

use crate::format::f32_to_i16;
use crate::source::CaptureSource;
use crate::{AudioFrame, CaptureError, DeviceError, StreamConfig};

/// Ring buffer capacity, in audio frames.
/// 32 frames of the default format is about two seconds.
const RING_FRAMES: usize = 32;

/// State shared between the audio callback, the device thread and readers.
struct CaptureShared {
    /// Signalled whenever samples land in the ring buffer, on close, and on loss.
    data_ready: Notify,
    closed: AtomicBool,
    lost: Mutex<Option<String>>,
    /// Sample-frames dropped because the ring buffer was full.
    overrun_frames: AtomicU64,
}

impl CaptureShared {
    fn new() -> Self {
        Self {
            data_ready: Notify::new(),
            closed: AtomicBool::new(false),
            lost: Mutex::new(None),
            overrun_frames: AtomicU64::new(0),
        }
    }

    fn mark_lost(&self, reason: String) {
        tracing::error!("Input device lost: {}", reason);
        *self.lost.lock() = Some(reason);
        self.data_ready.notify_one();
    }
}

/// Assembles fixed-size frames from the ring buffer.
struct FrameReader {
    consumer: HeapCons<i16>,
    samples_per_frame: usize,
    channels: u16,
    sample_rate: u32,
    next_sequence: u64,
    samples_read: u64,
    reported_overruns: u64,
}

impl FrameReader {
    /// Pops exactly one frame if enough samples are buffered.
    fn try_read_frame(&mut self) -> Option<AudioFrame> {
        if self.consumer.occupied_len() < self.samples_per_frame {
            return None;
        }

        let mut samples = vec![0i16; self.samples_per_frame];
        let popped = self.consumer.pop_slice(&mut samples);
        debug_assert_eq!(popped, self.samples_per_frame);

        let timestamp = Duration::from_secs_f64(
            self.samples_read as f64 / f64::from(self.sample_rate) / f64::from(self.channels),
        );
        self.samples_read += popped as u64;

        let frame = AudioFrame::from_samples(&samples, self.next_sequence, timestamp);
        self.next_sequence += 1;
        Some(frame)
    }
}

/// Owns the thread the CPAL stream lives on.
///
/// CPAL streams are not `Send`, so the stream is created, played and dropped
/// on a dedicated thread that parks until told to stop.
struct DeviceThread {
    stop_tx: std_mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Captures from the system's default input device.
///
/// The CPAL callback never blocks: it pushes whole sample-frames into a
/// lock-free ring buffer and wakes the reader. [`next_frame`] pops exactly one
/// frame's worth of samples once they are available.
///
/// Dropping a `CpalSource` closes it.
///
/// [`next_frame`]: CaptureSource::next_frame
pub struct CpalSource {
    name: String,
    config: StreamConfig,
    shared: Arc<CaptureShared>,
    reader: Mutex<FrameReader>,
    device_thread: Mutex<Option<DeviceThread>>,
}

impl CpalSource {
    /// Opens the default input device in the requested format.
    ///
    /// The device must offer a configuration with exactly `config.channels`
    /// channels at `config.sample_rate`, in i16 or f32. Only 16-bit output
    /// is supported.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::Unavailable`] if there is no input device
    /// - [`DeviceError::FormatUnsupported`] if the format can't be captured
    /// - [`DeviceError::Backend`] if CPAL fails to build or start the stream
    pub fn open(config: &StreamConfig) -> Result<Self, DeviceError> {
        if config.validate().is_err() {
            return Err(DeviceError::FormatUnsupported {
                device: "default input".to_string(),
                requested: config.to_string(),
            });
        }

        let samples_per_frame = config.samples_per_frame();
        let ring_buffer = HeapRb::<i16>::new(samples_per_frame * RING_FRAMES);
        let (producer, consumer) = ring_buffer.split();
        let shared = Arc::new(CaptureShared::new());

        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = std_mpsc::channel();

        let thread_config = *config;
        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("mic-stream-capture".to_string())
            .spawn(move || {
                run_device_thread(thread_config, producer, thread_shared, ready_tx, stop_rx);
            })
            .map_err(|e| DeviceError::Backend(e.to_string()))?;

        let name = match ready_rx.recv() {
            Ok(Ok(name)) => name,
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(DeviceError::Backend(
                    "capture thread exited during setup".to_string(),
                ));
            }
        };

        tracing::info!(device = %name, format = %config, "Capture device opened");

        Ok(Self {
            name,
            config: *config,
            shared,
            reader: Mutex::new(FrameReader {
                consumer,
                samples_per_frame,
                channels: config.channels,
                sample_rate: config.sample_rate,
                next_sequence: 0,
                samples_read: 0,
                reported_overruns: 0,
            }),
            device_thread: Mutex::new(Some(DeviceThread { stop_tx, handle })),
        })
    }
}

/// Pops a buffered frame, first reporting any overruns since the last poll.
fn poll_frame(
    shared: &CaptureShared,
    reader: &Mutex<FrameReader>,
    device: &str,
) -> Option<AudioFrame> {
    let mut reader = reader.lock();

    let overruns = shared.overrun_frames.load(Ordering::Relaxed);
    if overruns > reader.reported_overruns {
        tracing::warn!(
            device,
            dropped_frames = overruns - reader.reported_overruns,
            total = overruns,
            "Capture overrun - audio dropped while the sink was blocked"
        );
        reader.reported_overruns = overruns;
    }

    reader.try_read_frame()
}

/// Suspends until a full frame is buffered, the source closes or the device
/// is lost. Frames captured before a loss are still handed out first.
async fn wait_for_frame(
    shared: &CaptureShared,
    reader: &Mutex<FrameReader>,
    device: &str,
) -> Result<AudioFrame, CaptureError> {
    loop {
        if shared.closed.load(Ordering::Acquire) {
            return Err(CaptureError::Closed);
        }

        if let Some(frame) = poll_frame(shared, reader, device) {
            return Ok(frame);
        }

        let lost = shared.lost.lock().clone();
        if let Some(reason) = lost {
            return Err(CaptureError::DeviceLost { reason });
        }

        // notify_one stores a permit, so a wakeup between the checks
        // above and this await is not lost.
        shared.data_ready.notified().await;
    }
}

#[async_trait]
impl CaptureSource for CpalSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &StreamConfig {
        &self.config
    }

    async fn next_frame(&self) -> Result<AudioFrame, CaptureError> {
        wait_for_frame(&self.shared, &self.reader, &self.name).await
    }

    fn overrun_frames(&self) -> u64 {
        self.shared.overrun_frames.load(Ordering::Relaxed)
    }

    fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.data_ready.notify_one();
        self.shared.data_ready.notify_waiters();

        if let Some(thread) = self.device_thread.lock().take() {
            let _ = thread.stop_tx.send(());
            if thread.handle.join().is_err() {
                tracing::error!(device = %self.name, "Capture thread panicked");
            }
        }

        tracing::info!(device = %self.name, "Capture device released");
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_device_thread(
    config: StreamConfig,
    producer: HeapProd<i16>,
    shared: Arc<CaptureShared>,
    ready_tx: std_mpsc::SyncSender<Result<String, DeviceError>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let stream = match start_stream(&config, producer, &shared) {
        Ok((name, stream)) => {
            let _ = ready_tx.send(Ok(name));
            stream
        }
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    // Returns on an explicit stop or when the sender is dropped
    let _ = stop_rx.recv();
    drop(stream);
    tracing::debug!("Capture stream dropped");
}

fn start_stream(
    config: &StreamConfig,
    producer: HeapProd<i16>,
    shared: &Arc<CaptureShared>,
) -> Result<(String, Stream), DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(DeviceError::Unavailable)?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let unsupported = || DeviceError::FormatUnsupported {
        device: name.clone(),
        requested: config.to_string(),
    };

    if config.bits_per_sample != 16 {
        return Err(unsupported());
    }

    let rate = SampleRate(config.sample_rate);
    let mut candidates: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| DeviceError::Backend(e.to_string()))?
        .filter(|range| {
            range.channels() == config.channels
                && range.min_sample_rate().0 <= rate.0
                && rate.0 <= range.max_sample_rate().0
                && matches!(range.sample_format(), SampleFormat::I16 | SampleFormat::F32)
        })
        .collect();

    // Native i16 avoids a conversion in the callback
    candidates.sort_by_key(|range| range.sample_format() != SampleFormat::I16);
    let range = candidates.into_iter().next().ok_or_else(unsupported)?;

    let sample_format = range.sample_format();
    let cpal_config: CpalStreamConfig = range.with_sample_rate(rate).config();

    tracing::debug!(
        device = %name,
        ?sample_format,
        sample_rate = cpal_config.sample_rate.0,
        channels = cpal_config.channels,
        "Selected input configuration"
    );

    let stream = match sample_format {
        SampleFormat::I16 => build_i16_stream(&device, &cpal_config, producer, shared)?,
        SampleFormat::F32 => build_f32_stream(&device, &cpal_config, producer, shared)?,
        _ => return Err(unsupported()),
    };

    stream
        .play()
        .map_err(|e| DeviceError::Backend(e.to_string()))?;

    Ok((name, stream))
}

/// Number of samples from a callback buffer that fit without splitting a
/// sample-frame across channels.
fn whole_frames_that_fit(producer: &HeapProd<i16>, available: usize, channels: usize) -> usize {
    let vacant = producer.vacant_len();
    let fit = vacant - vacant % channels;
    fit.min(available)
}

fn record_push(shared: &CaptureShared, offered: usize, pushed: usize, channels: usize) {
    let dropped = offered - pushed;
    if dropped > 0 {
        shared
            .overrun_frames
            .fetch_add((dropped / channels) as u64, Ordering::Relaxed);
    }
    if pushed > 0 {
        shared.data_ready.notify_one();
    }
}

fn error_callback(shared: Arc<CaptureShared>) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| match err {
        cpal::StreamError::DeviceNotAvailable => {
            shared.mark_lost("device is no longer available".to_string());
        }
        other => tracing::error!("Audio stream error: {}", other),
    }
}

fn build_i16_stream(
    device: &cpal::Device,
    config: &CpalStreamConfig,
    mut producer: HeapProd<i16>,
    shared: &Arc<CaptureShared>,
) -> Result<Stream, DeviceError> {
    let channels = usize::from(config.channels);
    let callback_shared = Arc::clone(shared);

    device
        .build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let take = whole_frames_that_fit(&producer, data.len(), channels);
                let pushed = producer.push_slice(&data[..take]);
                record_push(&callback_shared, data.len(), pushed, channels);
            },
            error_callback(Arc::clone(shared)),
            None,
        )
        .map_err(|e| DeviceError::Backend(e.to_string()))
}

fn build_f32_stream(
    device: &cpal::Device,
    config: &CpalStreamConfig,
    mut producer: HeapProd<i16>,
    shared: &Arc<CaptureShared>,
) -> Result<Stream, DeviceError> {
    let channels = usize::from(config.channels);
    let callback_shared = Arc::clone(shared);

    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let take = whole_frames_that_fit(&producer, data.len(), channels);
                let mut pushed = 0;
                // Inline conversion to avoid allocating in the audio callback
                for &sample in &data[..take] {
                    if producer.try_push(f32_to_i16(sample)).is_ok() {
                        pushed += 1;
                    }
                }
                record_push(&callback_shared, data.len(), pushed, channels);
            },
            error_callback(Arc::clone(shared)),
            None,
        )
        .map_err(|e| DeviceError::Backend(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_with(samples: &[i16], config: &StreamConfig) -> FrameReader {
        let ring_buffer = HeapRb::<i16>::new(config.samples_per_frame() * RING_FRAMES);
        let (mut producer, consumer) = ring_buffer.split();
        producer.push_slice(samples);
        FrameReader {
            consumer,
            samples_per_frame: config.samples_per_frame(),
            channels: config.channels,
            sample_rate: config.sample_rate,
            next_sequence: 0,
            samples_read: 0,
            reported_overruns: 0,
        }
    }

    #[test]
    fn test_reader_waits_for_full_frame() {
        let config = StreamConfig {
            chunk_frames: 4,
            ..Default::default()
        };
        let mut reader = reader_with(&[1, 2, 3, 4, 5, 6, 7], &config);
        assert!(reader.try_read_frame().is_none());
    }

    #[test]
    fn test_reader_emits_exact_frames_in_order() {
        let config = StreamConfig {
            chunk_frames: 2,
            ..Default::default()
        };
        let samples: Vec<i16> = (0..10).collect();
        let mut reader = reader_with(&samples, &config);

        let first = reader.try_read_frame().unwrap();
        let second = reader.try_read_frame().unwrap();
        assert!(reader.try_read_frame().is_none());

        assert_eq!(first.len(), config.frame_bytes());
        assert_eq!(first.sequence(), 0);
        assert_eq!(second.sequence(), 1);
        assert_eq!(
            crate::format::le_bytes_to_i16(second.as_bytes()),
            vec![4, 5, 6, 7]
        );
        assert_eq!(second.timestamp(), Duration::from_secs_f64(2.0 / 16000.0));
    }

    #[test]
    fn test_whole_frames_that_fit_never_splits_channels() {
        let ring_buffer = HeapRb::<i16>::new(7);
        let (producer, _consumer) = ring_buffer.split();
        assert_eq!(whole_frames_that_fit(&producer, 100, 2), 6);
        assert_eq!(whole_frames_that_fit(&producer, 4, 2), 4);
    }

    #[test]
    fn test_record_push_counts_dropped_frames() {
        let shared = CaptureShared::new();
        record_push(&shared, 10, 6, 2);
        assert_eq!(shared.overrun_frames.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_device_loss_wakes_waiting_reader() {
        let config = StreamConfig {
            chunk_frames: 4,
            ..Default::default()
        };
        let shared = CaptureShared::new();
        let reader = Mutex::new(reader_with(&[1, 2, 3], &config));

        let (result, ()) = tokio::join!(wait_for_frame(&shared, &reader, "test"), async {
            tokio::task::yield_now().await;
            shared.mark_lost("unplugged".to_string());
        });

        assert!(matches!(
            result,
            Err(CaptureError::DeviceLost { ref reason }) if reason == "unplugged"
        ));
    }

    #[tokio::test]
    async fn test_buffered_frames_drain_before_device_loss() {
        let config = StreamConfig {
            chunk_frames: 2,
            ..Default::default()
        };
        let shared = CaptureShared::new();
        let reader = Mutex::new(reader_with(&[0, 1, 2, 3, 4], &config));
        shared.mark_lost("unplugged".to_string());

        let frame = wait_for_frame(&shared, &reader, "test").await.unwrap();
        assert_eq!(frame.sequence(), 0);
        assert!(matches!(
            wait_for_frame(&shared, &reader, "test").await,
            Err(CaptureError::DeviceLost { .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_wins_over_buffered_frames() {
        let config = StreamConfig {
            chunk_frames: 2,
            ..Default::default()
        };
        let shared = CaptureShared::new();
        let reader = Mutex::new(reader_with(&[0, 1, 2, 3], &config));
        shared.closed.store(true, Ordering::Release);

        assert!(matches!(
            wait_for_frame(&shared, &reader, "test").await,
            Err(CaptureError::Closed)
        ));
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_open_default_device() {
        let source = CpalSource::open(&StreamConfig::default()).unwrap();
        println!("Default device: {}", source.name());
        source.close();
        source.close();
    }

    #[tokio::test]
    #[ignore = "requires audio hardware"]
    async fn test_capture_frames_from_default_device() {
        let config = StreamConfig::default();
        let source = CpalSource::open(&config).unwrap();
        for expected in 0..5 {
            let frame = source.next_frame().await.unwrap();
            assert_eq!(frame.len(), config.frame_bytes());
            assert_eq!(frame.sequence(), expected);
        }
        source.close();
        assert!(matches!(
            source.next_frame().await,
            Err(CaptureError::Closed)
        ));
    }
}
