//! Beam receiver — entry point.
//!
//! ```text
//! beam-receiver                         Advertise and wait for beams
//! beam-receiver --name "Studio"        Advertise under a custom name
//! beam-receiver --port 4410            Fixed control port
//! ```
//!
//! Headless: decoded frames land in a counting display layer (a GUI
//! shell would install a real one) and audio goes to cpal when built
//! with the `audio-cpal` feature.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use beam_core::audio::AudioOutput;
use beam_core::discovery::{Advertiser, ControlListener};
use beam_core::video::CountingLayer;
use beam_core::{BeamConfig, DeviceIdentity, ReceiverPipeline, Session};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "beam-receiver", about = "Beam receiver service")]
struct Cli {
    /// Human label advertised to peers.
    #[arg(short, long, default_value = "Beam Receiver")]
    name: String,

    /// Control TCP port (0 = system-chosen).
    #[arg(short, long, default_value_t = 0)]
    port: u16,

    /// Where the persistent device id lives.
    #[arg(long, default_value = ".beam-device-id")]
    identity: PathBuf,

    /// Presentation view size used for input normalization.
    #[arg(long, default_value_t = 1280.0)]
    view_width: f64,
    #[arg(long, default_value_t = 720.0)]
    view_height: f64,
}

#[cfg(feature = "audio-cpal")]
fn audio_output() -> Box<dyn AudioOutput> {
    Box::new(beam_core::audio::CpalOutput::new())
}

#[cfg(not(feature = "audio-cpal"))]
fn audio_output() -> Box<dyn AudioOutput> {
    Box::new(beam_core::audio::NullOutput::new())
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let identity = DeviceIdentity::load_or_create(&cli.identity, &cli.name)?;
    info!("beam-receiver v{}", env!("CARGO_PKG_VERSION"));
    info!("device id: {}", identity.device_id);

    let (mut listener, mut inbound) = ControlListener::bind(cli.port).await?;
    let advertiser = Advertiser::register(&identity, listener.local_port())?;
    info!("listening for beams on port {}", listener.local_port());

    let mut active: Option<Session> = None;
    let mut stats_ticker = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            stream = inbound.recv() => {
                let Some(stream) = stream else { break };
                // First established session wins; further connections
                // are dropped until it ends.
                if active.as_ref().map(|s| !s.state().is_stopped()).unwrap_or(false) {
                    warn!("already in a session; dropping new connection");
                    continue;
                }
                let layer = CountingLayer::new();
                let pipeline = ReceiverPipeline {
                    layer: Box::new(layer),
                    audio_output: audio_output(),
                    view_size: (cli.view_width, cli.view_height),
                };
                active = Some(Session::accept(stream, pipeline, BeamConfig::default()));
                info!("session adopted");
            }
            _ = stats_ticker.tick() => {
                if let Some(session) = active.as_ref() {
                    let stats = session.stats();
                    info!(
                        "state {} | {} frames rendered, {} audio packets played",
                        session.state(),
                        stats.frames_rendered,
                        stats.audio_packets_played
                    );
                    if session.state().is_stopped() {
                        if let Some(error) = session.last_error() {
                            warn!("session ended with error: {error}");
                        }
                        active = None;
                    }
                }
            }
        }
    }

    if let Some(session) = active.take() {
        session.stop().await;
    }
    listener.stop().await;
    advertiser.shutdown();
    Ok(())
}
