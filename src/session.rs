//! Streaming session: drives frames from a capture source to a sink.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::sink::{FrameSink, TcpSink};
use crate::source::{CaptureSource, CpalSource};
use crate::{
    AudioFrame, CaptureError, ConnectError, DeviceError, EventCallback, SendError,
    SessionConfig, SessionEvent, StreamConfig, StreamError,
};

/// Lifecycle state of a [`Session`].
///
/// States only move forward: `Idle → Connected → Streaming → Stopping →
/// Closed`. Startup failures skip ahead (`Idle → Closed` when the connection
/// fails, `Connected → Stopping` when the device fails).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Nothing held yet.
    Idle = 0,
    /// Connection established, device not yet opened.
    Connected = 1,
    /// Device open and frames flowing.
    Streaming = 2,
    /// Releasing the device and connection.
    Stopping = 3,
    /// Terminal. Everything has been released.
    Closed = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Connected,
            2 => Self::Streaming,
            3 => Self::Stopping,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connected => "connected",
            Self::Streaming => "streaming",
            Self::Stopping => "stopping",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Counters for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames fully written to the sink.
    pub frames_sent: u64,
    /// Bytes fully written to the sink.
    pub bytes_sent: u64,
}

/// Summary returned when a session ends by cancellation.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Final counters.
    pub stats: SessionStats,
    /// Time spent in `Streaming`. Zero if streaming never started.
    pub elapsed: Duration,
    /// Sample-frames the device dropped because sending fell behind.
    pub overrun_frames: u64,
}

/// Internal state shared between a Session and its handles.
struct SharedState {
    state: AtomicU8,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl SharedState {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Idle as u8),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    fn stats(&self) -> SessionStats {
        SessionStats {
            frames_sent: self.frames_sent.load(Ordering::SeqCst),
            bytes_sent: self.bytes_sent.load(Ordering::SeqCst),
        }
    }
}

/// Cloneable control handle for a [`Session`].
///
/// Hand one to whatever should be able to stop the session, such as a
/// Ctrl+C handler. Cancelling is idempotent and a no-op once the session has
/// closed.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SharedState>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Requests a graceful shutdown.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once [`cancel()`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// Current counters.
    pub fn stats(&self) -> SessionStats {
        self.shared.stats()
    }
}

/// A single capture-to-sink streaming run.
///
/// Created by [`MicStreamBuilder::build()`]. Take a [`handle()`](Self::handle)
/// before calling [`run()`](Self::run), which consumes the session and
/// returns once it reaches [`SessionState::Closed`].
///
/// # Example
///
/// ```no_run
/// use mic_stream::MicStream;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let session = MicStream::builder().host("192.168.1.20").build()?;
///
/// let handle = session.handle();
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     handle.cancel();
/// });
///
/// let report = session.run().await?;
/// println!("sent {} frames", report.stats.frames_sent);
/// # Ok(())
/// # }
/// ```
///
/// [`MicStreamBuilder::build()`]: crate::MicStreamBuilder::build
pub struct Session {
    config: SessionConfig,
    shared: Arc<SharedState>,
    cancel: CancellationToken,
    event_callback: Option<EventCallback>,
}

impl Session {
    /// Creates an idle session.
    pub fn new(config: SessionConfig, event_callback: Option<EventCallback>) -> Self {
        Self {
            config,
            shared: Arc::new(SharedState::new()),
            cancel: CancellationToken::new(),
            event_callback,
        }
    }

    /// The session's configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns a handle that can cancel and observe this session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
            cancel: self.cancel.clone(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// Connects over TCP, opens the default microphone and streams until
    /// cancelled or until either side fails.
    ///
    /// # Errors
    ///
    /// Returns the first error that ended the session, tagged with the
    /// component that raised it. Cancellation is not an error.
    pub async fn run(self) -> Result<SessionReport, StreamError> {
        let endpoint = self.config.endpoint.clone();
        let timeout = self.config.connect_timeout;
        self.run_with(
            async move { TcpSink::connect(&endpoint, timeout).await },
            |config| CpalSource::open(&config),
        )
        .await
    }

    /// Runs the session with a custom sink and source.
    ///
    /// `connect` is awaited first, racing cancellation. `open` then runs on
    /// the blocking pool, also racing cancellation; a device that finishes
    /// opening after a cancel is dropped on that pool. Both resources are
    /// released before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// See [`run()`](Self::run).
    pub async fn run_with<C, K, O, S>(
        self,
        connect: C,
        open: O,
    ) -> Result<SessionReport, StreamError>
    where
        C: Future<Output = Result<K, ConnectError>> + Send,
        K: FrameSink,
        O: FnOnce(StreamConfig) -> Result<S, DeviceError> + Send + 'static,
        S: CaptureSource + 'static,
    {
        if let Err(err) = self.config.validate() {
            self.transition(SessionState::Closed);
            return Err(err.into());
        }

        let sink = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                tracing::info!(endpoint = %self.config.endpoint, "Cancelled before connecting");
                self.transition(SessionState::Closed);
                return Ok(self.report(Duration::ZERO, 0));
            }
            result = connect => match result {
                Ok(sink) => sink,
                Err(err) => {
                    tracing::error!(endpoint = %self.config.endpoint, "Connect failed: {}", err);
                    self.transition(SessionState::Closed);
                    return Err(err.into());
                }
            },
        };
        self.transition(SessionState::Connected);

        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            result = self.open_source(open) => Some(result),
        };
        let source = match opened {
            Some(Ok(source)) => source,
            None => {
                tracing::info!("Cancelled while opening the capture device");
                self.transition(SessionState::Stopping);
                sink.close().await;
                self.transition(SessionState::Closed);
                return Ok(self.report(Duration::ZERO, 0));
            }
            Some(Err(err)) => {
                tracing::error!("Failed to open capture device: {}", err);
                self.transition(SessionState::Stopping);
                sink.close().await;
                self.transition(SessionState::Closed);
                return Err(err.into());
            }
        };
        self.emit(SessionEvent::DeviceOpened {
            device: source.name().to_string(),
        });

        self.transition(SessionState::Streaming);
        let started = Instant::now();
        let result = self.stream(&source, &sink).await;
        let elapsed = started.elapsed();
        let overrun_frames = source.overrun_frames();

        if let Err(ref err) = result {
            tracing::error!(
                frames_sent = self.shared.frames_sent.load(Ordering::SeqCst),
                "Stream failed: {}",
                err
            );
            self.emit(SessionEvent::StreamFailed {
                error: err.to_string(),
            });
        }

        self.transition(SessionState::Stopping);
        // Device teardown can block, so it runs on the blocking pool while
        // the connection closes.
        let release = tokio::task::spawn_blocking(move || source.close());
        sink.close().await;
        if let Err(err) = release.await {
            tracing::error!("Capture device release failed: {}", err);
        }
        self.transition(SessionState::Closed);

        result.map(|()| self.report(elapsed, overrun_frames))
    }

    async fn open_source<O, S>(&self, open: O) -> Result<S, DeviceError>
    where
        O: FnOnce(StreamConfig) -> Result<S, DeviceError> + Send + 'static,
        S: CaptureSource + 'static,
    {
        let config = self.config.stream;
        tokio::task::spawn_blocking(move || open(config))
            .await
            .map_err(|e| DeviceError::Backend(format!("device open task failed: {e}")))?
    }

    /// The capture-then-send loop. Returns `Ok` when cancelled between frames
    /// or once an in-flight frame finishes within the grace period.
    async fn stream<S, K>(&self, source: &S, sink: &K) -> Result<(), StreamError>
    where
        S: CaptureSource,
        K: FrameSink,
    {
        let expected = self.config.stream.frame_bytes();

        loop {
            let frame = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(()),
                frame = source.next_frame() => frame?,
            };

            if frame.len() != expected {
                return Err(CaptureError::FrameLength {
                    expected,
                    actual: frame.len(),
                }
                .into());
            }

            self.send_frame(sink, &frame).await?;
            let frames_sent = self.shared.frames_sent.fetch_add(1, Ordering::SeqCst) + 1;
            self.shared
                .bytes_sent
                .fetch_add(frame.len() as u64, Ordering::SeqCst);
            tracing::trace!(sequence = frame.sequence(), frames_sent, "Frame sent");
        }
    }

    /// Sends one frame. If cancelled mid-send, waits up to `shutdown_grace`
    /// for the frame to finish. A frame still unfinished after that aborts
    /// the sink so the partial write can't pass for a clean shutdown.
    async fn send_frame<K: FrameSink>(
        &self,
        sink: &K,
        frame: &AudioFrame,
    ) -> Result<(), SendError> {
        // Boxed by async_trait, so it can be polled by reference and dropped
        // early to release whatever the send holds.
        let mut send = sink.send(frame);

        tokio::select! {
            result = &mut send => return result,
            () = self.cancel.cancelled() => {}
        }

        let grace = self.config.shutdown_grace;
        if let Ok(result) = tokio::time::timeout(grace, &mut send).await {
            return result;
        }

        // Drop the pending write before tearing the connection down
        drop(send);
        tracing::warn!(
            sequence = frame.sequence(),
            ?grace,
            "In-flight frame did not finish within the shutdown grace; aborting"
        );
        sink.abort().await;
        Err(SendError::Aborted {
            sequence: frame.sequence(),
            grace_ms: u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
        })
    }

    fn transition(&self, to: SessionState) {
        let from = SessionState::from_u8(self.shared.state.swap(to as u8, Ordering::SeqCst));
        if from == to {
            return;
        }
        tracing::debug!(%from, %to, "Session state changed");
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }

    fn report(&self, elapsed: Duration, overrun_frames: u64) -> SessionReport {
        let stats = self.shared.stats();
        tracing::info!(
            frames_sent = stats.frames_sent,
            bytes_sent = stats.bytes_sent,
            overrun_frames,
            ?elapsed,
            "Session finished"
        );
        SessionReport {
            stats,
            elapsed,
            overrun_frames,
        }
    }
}
