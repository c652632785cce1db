//! Builder pattern for `MicStream`.

use std::time::Duration;

use crate::config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_SHUTDOWN_GRACE};
use crate::session::Session;
use crate::{
    event_callback, ConfigError, Endpoint, EventCallback, SessionConfig, SessionEvent,
    StreamConfig, StreamError, DEFAULT_PORT,
};

/// Builder for configuring a streaming session.
///
/// Use [`MicStream::builder()`] to create a new builder.
///
/// # Example
///
/// ```
/// use mic_stream::{MicStream, StreamConfig};
/// use std::time::Duration;
///
/// let session = MicStream::builder()
///     .server("192.168.1.20", 9000)
///     .format(StreamConfig {
///         channels: 1,
///         ..Default::default()
///     })
///     .connect_timeout(Duration::from_secs(3))
///     .on_event(|e| eprintln!("{e:?}"))
///     .build()
///     .unwrap();
///
/// assert_eq!(session.config().endpoint.to_string(), "192.168.1.20:9000");
/// ```
#[must_use]
pub struct MicStreamBuilder {
    endpoint: Option<Endpoint>,
    stream: StreamConfig,
    connect_timeout: Duration,
    shutdown_grace: Duration,
    event_callback: Option<EventCallback>,
}

impl Default for MicStreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MicStreamBuilder {
    /// Creates a new builder with default settings and no server.
    pub fn new() -> Self {
        Self {
            endpoint: None,
            stream: StreamConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            event_callback: None,
        }
    }

    /// Sets the server host and port.
    pub fn server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.endpoint = Some(Endpoint::new(host, port));
        self
    }

    /// Sets the server host, keeping the current port.
    ///
    /// Default port: 8888
    pub fn host(mut self, host: impl Into<String>) -> Self {
        let port = self.endpoint.as_ref().map_or(DEFAULT_PORT, |e| e.port);
        self.endpoint = Some(Endpoint::new(host, port));
        self
    }

    /// Sets the PCM format.
    ///
    /// Default: 16kHz, 2 channels, 16-bit, 1024-frame chunks
    pub fn format(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    /// Upper bound on the connection attempt.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// How long cancellation waits for an in-flight frame.
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Set a callback to receive lifecycle events.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Validates the configuration and creates an idle [`Session`].
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Config`] if no host was set or the format is
    /// invalid.
    pub fn build(self) -> Result<Session, StreamError> {
        let endpoint = self.endpoint.ok_or(ConfigError::MissingHost)?;
        let config = SessionConfig {
            endpoint,
            stream: self.stream,
            connect_timeout: self.connect_timeout,
            shutdown_grace: self.shutdown_grace,
        };
        config.validate()?;

        Ok(Session::new(config, self.event_callback))
    }
}

/// Main entry point for mic-stream.
///
/// Use [`MicStream::builder()`] to start configuring a session.
pub struct MicStream;

impl MicStream {
    /// Creates a new builder for configuring a session.
    pub fn builder() -> MicStreamBuilder {
        MicStreamBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = MicStreamBuilder::new();
        assert!(builder.endpoint.is_none());
        assert_eq!(builder.stream, StreamConfig::default());
        assert_eq!(builder.connect_timeout, Duration::from_secs(10));
        assert_eq!(builder.shutdown_grace, Duration::from_secs(1));
    }

    #[test]
    fn test_builder_requires_host() {
        let result = MicStream::builder().build();
        assert!(matches!(
            result,
            Err(StreamError::Config(ConfigError::MissingHost))
        ));
    }

    #[test]
    fn test_host_uses_default_port() {
        let session = MicStream::builder().host("10.0.0.5").build().unwrap();
        assert_eq!(session.config().endpoint, Endpoint::new("10.0.0.5", 8888));
    }

    #[test]
    fn test_host_keeps_explicit_port() {
        let session = MicStream::builder()
            .server("old", 9000)
            .host("new")
            .build()
            .unwrap();
        assert_eq!(session.config().endpoint, Endpoint::new("new", 9000));
    }

    #[test]
    fn test_builder_rejects_invalid_format() {
        let result = MicStream::builder()
            .host("localhost")
            .format(StreamConfig {
                chunk_frames: 0,
                ..Default::default()
            })
            .build();
        assert!(matches!(
            result,
            Err(StreamError::Config(ConfigError::ZeroChunkFrames))
        ));
    }

    #[test]
    fn test_builder_timings() {
        let session = MicStream::builder()
            .host("localhost")
            .connect_timeout(Duration::from_millis(250))
            .shutdown_grace(Duration::ZERO)
            .build()
            .unwrap();
        assert_eq!(session.config().connect_timeout, Duration::from_millis(250));
        assert_eq!(session.config().shutdown_grace, Duration::ZERO);
    }
}
