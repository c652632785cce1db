use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use mic_stream::{MicStream, SessionEvent, SessionState, StreamConfig, DEFAULT_PORT};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "mic-stream")]
#[command(version, about = "Stream microphone audio as raw PCM to a TCP server")]
#[command(long_about = "
Captures the default input device and writes raw interleaved PCM
(signed little-endian) to a TCP server. The stream carries no header:
the receiver must be configured with the same rate, channels and bits.

EXAMPLES:
  # Stream 16kHz stereo 16-bit to a server on the default port
  mic-stream 192.168.1.20

  # Mono, 48kHz, custom port
  mic-stream 192.168.1.20 --port 9000 --rate 48000 --channels 1
")]
struct Args {
    /// Server hostname or IP address
    host: String,

    /// Server TCP port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Sample rate in Hz
    #[arg(short, long, default_value_t = 16000)]
    rate: u32,

    /// Number of channels
    #[arg(short, long, default_value_t = 2)]
    channels: u16,

    /// Bits per sample
    #[arg(short, long, default_value_t = 16)]
    bits: u16,

    /// Sample-frames per chunk sent
    #[arg(long, default_value_t = 1024)]
    chunk: u32,

    /// Give up connecting after this many milliseconds
    #[arg(long, default_value_t = 10_000)]
    connect_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mic_stream=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let format = StreamConfig {
        sample_rate: args.rate,
        channels: args.channels,
        bits_per_sample: args.bits,
        chunk_frames: args.chunk,
    };
    let endpoint = format!("{}:{}", args.host, args.port);

    let session = match MicStream::builder()
        .server(args.host, args.port)
        .format(format)
        .connect_timeout(Duration::from_millis(args.connect_timeout_ms))
        .on_event(move |event| match event {
            SessionEvent::StateChanged {
                to: SessionState::Connected,
                ..
            } => println!("Connected to {endpoint}"),
            SessionEvent::StateChanged {
                to: SessionState::Streaming,
                ..
            } => {
                println!(
                    "Audio: {}Hz, {} channel(s), {}-bit, {} frames per chunk",
                    format.sample_rate, format.channels, format.bits_per_sample, format.chunk_frames
                );
                println!("Streaming... press Ctrl+C to stop");
            }
            _ => {}
        })
        .build()
    {
        Ok(session) => session,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let handle = session.handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::debug!("Ctrl+C received");
                handle.cancel();
            }
            Err(err) => tracing::error!("Failed to listen for Ctrl+C: {}", err),
        }
    });

    match session.run().await {
        Ok(report) => {
            println!(
                "Stopped. Sent {} frames ({} bytes).",
                report.stats.frames_sent, report.stats.bytes_sent
            );
            if report.overrun_frames > 0 {
                println!(
                    "Dropped {} sample-frames while the network fell behind.",
                    report.overrun_frames
                );
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
