//! Configuration types for streaming sessions.

use std::fmt;
use std::time::Duration;

use crate::ConfigError;

/// Port the receiving server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 8888;

pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// PCM format of the captured stream.
///
/// The receiver has no way to learn this from the wire, so both ends must be
/// configured with the same values.
///
/// # Example
///
/// ```
/// use mic_stream::StreamConfig;
///
/// let config = StreamConfig::default();
/// // 1024 frames × 2 channels × 2 bytes
/// assert_eq!(config.frame_bytes(), 4096);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Sample rate in Hz.
    ///
    /// Default: 16000
    pub sample_rate: u32,

    /// Number of interleaved channels.
    ///
    /// Default: 2
    pub channels: u16,

    /// Bits per sample. Samples are signed little-endian.
    ///
    /// Default: 16
    pub bits_per_sample: u16,

    /// Sample-frames per [`AudioFrame`](crate::AudioFrame).
    ///
    /// Default: 1024
    pub chunk_frames: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 2,
            bits_per_sample: 16,
            chunk_frames: 1024,
        }
    }
}

impl StreamConfig {
    /// Checks that the format describes a non-empty, byte-aligned frame.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.channels == 0 {
            return Err(ConfigError::ZeroChannels);
        }
        if self.bits_per_sample == 0 || self.bits_per_sample % 8 != 0 {
            return Err(ConfigError::InvalidBitDepth {
                bits: self.bits_per_sample,
            });
        }
        if self.chunk_frames == 0 {
            return Err(ConfigError::ZeroChunkFrames);
        }
        Ok(())
    }

    /// Bytes occupied by one sample of one channel.
    #[must_use]
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    /// Samples (across all channels) in one audio frame.
    #[must_use]
    pub fn samples_per_frame(&self) -> usize {
        self.chunk_frames as usize * usize::from(self.channels)
    }

    /// Byte length of every audio frame in this format.
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        self.samples_per_frame() * self.bytes_per_sample()
    }

    /// Wall-clock time covered by one audio frame.
    #[must_use]
    pub fn frame_duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(f64::from(self.chunk_frames) / f64::from(self.sample_rate))
    }
}

impl fmt::Display for StreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz, {} channels, {}-bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

/// Address of the receiving server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Hostname or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint for the given host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Creates an endpoint on [`DEFAULT_PORT`].
    pub fn with_default_port(host: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Everything a session needs to run.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Where to send audio.
    pub endpoint: Endpoint,

    /// Format of the captured audio.
    pub stream: StreamConfig,

    /// Upper bound on the connection attempt.
    ///
    /// Default: 10 seconds
    pub connect_timeout: Duration,

    /// How long cancellation waits for an in-flight frame to finish sending.
    ///
    /// Default: 1 second
    pub shutdown_grace: Duration,
}

impl SessionConfig {
    /// Creates a configuration with default timings.
    pub fn new(endpoint: Endpoint, stream: StreamConfig) -> Self {
        Self {
            endpoint,
            stream,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Validates the endpoint and stream format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        self.stream.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_config_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.channels, 2);
        assert_eq!(config.bits_per_sample, 16);
        assert_eq!(config.chunk_frames, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frame_bytes() {
        let config = StreamConfig::default();
        assert_eq!(config.bytes_per_sample(), 2);
        assert_eq!(config.samples_per_frame(), 2048);
        assert_eq!(config.frame_bytes(), 4096);

        let mono24 = StreamConfig {
            sample_rate: 48000,
            channels: 1,
            bits_per_sample: 24,
            chunk_frames: 480,
        };
        assert_eq!(mono24.frame_bytes(), 480 * 3);
    }

    #[test]
    fn test_frame_duration() {
        let config = StreamConfig {
            chunk_frames: 1600,
            ..Default::default()
        };
        assert_eq!(config.frame_duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_validate_rejects_bad_formats() {
        let base = StreamConfig::default();

        let zero_rate = StreamConfig {
            sample_rate: 0,
            ..base
        };
        assert!(matches!(
            zero_rate.validate(),
            Err(ConfigError::ZeroSampleRate)
        ));

        let no_channels = StreamConfig {
            channels: 0,
            ..base
        };
        assert!(matches!(
            no_channels.validate(),
            Err(ConfigError::ZeroChannels)
        ));

        let odd_bits = StreamConfig {
            bits_per_sample: 12,
            ..base
        };
        assert!(matches!(
            odd_bits.validate(),
            Err(ConfigError::InvalidBitDepth { bits: 12 })
        ));

        let empty_chunk = StreamConfig {
            chunk_frames: 0,
            ..base
        };
        assert!(matches!(
            empty_chunk.validate(),
            Err(ConfigError::ZeroChunkFrames)
        ));
    }

    #[test]
    fn test_stream_config_display() {
        assert_eq!(
            StreamConfig::default().to_string(),
            "16000Hz, 2 channels, 16-bit"
        );
    }

    #[test]
    fn test_endpoint() {
        let endpoint = Endpoint::with_default_port("192.168.1.20");
        assert_eq!(endpoint.port, 8888);
        assert_eq!(endpoint.to_string(), "192.168.1.20:8888");
    }

    #[test]
    fn test_session_config_requires_host() {
        let config = SessionConfig::new(Endpoint::new("  ", 8888), StreamConfig::default());
        assert!(matches!(config.validate(), Err(ConfigError::MissingHost)));

        let config = SessionConfig::new(Endpoint::new("localhost", 8888), StreamConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.shutdown_grace, Duration::from_secs(1));
    }
}
