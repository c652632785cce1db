//! TCP sink: raw PCM over a single outbound connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::sink::FrameSink;
use crate::{AudioFrame, ConnectError, Endpoint, SendError};

/// Writes frames to a connected TCP stream with no framing.
///
/// The bytes on the wire are exactly the concatenation of every frame
/// payload, in `send` order. There is no retry and no reconnect: the first
/// write failure drops the connection and every later `send` fails with
/// [`SendError::ConnectionClosed`].
///
/// # Example
///
/// ```no_run
/// use mic_stream::{AudioFrame, Endpoint, FrameSink, TcpSink};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let endpoint = Endpoint::with_default_port("192.168.1.20");
/// let sink = TcpSink::connect(&endpoint, Duration::from_secs(5)).await?;
///
/// let frame = AudioFrame::from_samples(&[0i16; 2048], 0, Duration::ZERO);
/// sink.send(&frame).await?;
/// sink.close().await;
/// # Ok(())
/// # }
/// ```
pub struct TcpSink {
    name: String,
    stream: Mutex<Option<TcpStream>>,
    closing: AtomicBool,
    closed: CancellationToken,
}

impl TcpSink {
    /// Connects to `endpoint`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// - [`ConnectError::Refused`] if nothing is listening
    /// - [`ConnectError::Timeout`] if the attempt doesn't finish in time
    /// - [`ConnectError::Unreachable`] for resolution and routing failures
    pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Self, ConnectError> {
        let name = endpoint.to_string();
        tracing::debug!(endpoint = %name, ?timeout, "Connecting");

        let attempt = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
        let stream = match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => return Err(ConnectError::from_io(name, err, timeout)),
            Err(_) => {
                return Err(ConnectError::Timeout {
                    endpoint: name,
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        };

        if let Err(err) = stream.set_nodelay(true) {
            tracing::warn!(endpoint = %name, "Failed to disable Nagle: {}", err);
        }

        tracing::info!(endpoint = %name, "Connected");
        Ok(Self::from_stream(name, stream))
    }

    /// Wraps an already-connected stream.
    pub fn from_stream(name: impl Into<String>, stream: TcpStream) -> Self {
        Self {
            name: name.into(),
            stream: Mutex::new(Some(stream)),
            closing: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    /// Returns `true` once the connection has been closed or has failed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[async_trait]
impl FrameSink for TcpSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, frame: &AudioFrame) -> Result<(), SendError> {
        let mut guard = tokio::select! {
            biased;
            () = self.closed.cancelled() => return Err(SendError::ConnectionClosed),
            guard = self.stream.lock() => guard,
        };
        let Some(stream) = guard.as_mut() else {
            return Err(SendError::ConnectionClosed);
        };

        let result = tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(SendError::ConnectionClosed),
            result = stream.write_all(frame.as_bytes()) => result.map_err(SendError::from),
        };

        if let Err(ref err) = result {
            tracing::debug!(endpoint = %self.name, "Dropping connection after send failure: {}", err);
            guard.take();
            self.closed.cancel();
        }
        result
    }

    async fn close(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        // Unblocks a pending send before waiting for the stream lock
        self.closed.cancel();

        if let Some(mut stream) = self.stream.lock().await.take() {
            if let Err(err) = stream.shutdown().await {
                tracing::debug!(endpoint = %self.name, "Shutdown error ignored: {}", err);
            }
        }
        tracing::info!(endpoint = %self.name, "Connection closed");
    }

    async fn abort(&self) {
        self.closed.cancel();

        if let Some(stream) = self.stream.lock().await.take() {
            // A zero linger turns the close into a RST, so the peer can't
            // mistake a cut-off frame for a clean end of stream.
            #[allow(deprecated)]
            let linger = stream.set_linger(Some(Duration::ZERO));
            if let Err(err) = linger {
                tracing::warn!(endpoint = %self.name, "Failed to set zero linger: {}", err);
            }
            drop(stream);
            tracing::warn!(endpoint = %self.name, "Connection reset");
        }
    }
}
