//! Beam sender — entry point.
//!
//! ```text
//! beam-sender                            Beam to the first receiver found
//! beam-sender --peer "Studio"           Pick a receiver by name substring
//! beam-sender --fps 60 --bitrate 12000000
//! ```
//!
//! Headless demo: the "window" is a synthetic test pattern plus a sine
//! tone, driven through the full pipeline (encode, fragment, UDP,
//! control channel). A GUI shell would swap in the real platform
//! capture and injection backends.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use beam_core::audio::SineSource;
use beam_core::cursor::MockCursorApi;
use beam_core::discovery::PeerBrowser;
use beam_core::hider::{MockVirtualDisplay, MockWindowControl};
use beam_core::input::{MockAxTree, NullInjectionBackend};
use beam_core::video::TestPatternSource;
use beam_core::{
    BeamConfig, BeamRequest, DeviceIdentity, Point, Rect, SenderPipeline, Session, SessionState,
    WindowHandle,
};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "beam-sender", about = "Beam sender service")]
struct Cli {
    /// Our human label.
    #[arg(short, long, default_value = "Beam Sender")]
    name: String,

    /// Receiver name substring; first discovered peer when omitted.
    #[arg(short, long)]
    peer: Option<String>,

    /// How long to browse before giving up.
    #[arg(long, default_value_t = 30)]
    discover_timeout_secs: u64,

    /// Demo window size.
    #[arg(long, default_value_t = 640)]
    width: u32,
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Encoder frame rate.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Encoder bitrate in bits/second.
    #[arg(long, default_value_t = 8_000_000)]
    bitrate: u32,

    /// Beam without audio.
    #[arg(long)]
    no_audio: bool,

    /// Where the persistent device id lives.
    #[arg(long, default_value = ".beam-device-id")]
    identity: PathBuf,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let identity = DeviceIdentity::load_or_create(&cli.identity, &cli.name)?;
    info!("beam-sender v{}", env!("CARGO_PKG_VERSION"));
    info!("device id: {}", identity.device_id);

    // Find the receiver.
    let browser = PeerBrowser::browse(&identity.device_id)?;
    let deadline = Instant::now() + Duration::from_secs(cli.discover_timeout_secs);
    let peer = loop {
        let peers = browser.peers();
        let found = peers.iter().find(|p| match &cli.peer {
            Some(name) => p.name.contains(name.as_str()),
            None => true,
        });
        if let Some(peer) = found {
            break peer.clone();
        }
        if Instant::now() >= deadline {
            warn!("no matching receiver found (saw {} peers)", peers.len());
            browser.shutdown();
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    };
    browser.shutdown();
    info!("beaming to {peer}");

    // Demo window backed by the synthetic sources and in-memory
    // platform backends.
    let config = BeamConfig {
        target_fps: cli.fps,
        video_bitrate: cli.bitrate,
        ..BeamConfig::default()
    };
    let window = WindowHandle {
        pid: std::process::id() as i32,
        window_id: 1,
        frame: Rect::new(0.0, 0.0, cli.width as f64, cli.height as f64),
        title: "Beam Demo".to_string(),
        bundle_id: "com.example.beam-demo".to_string(),
    };
    let windows = MockWindowControl::new();
    windows.add_window(
        window.pid,
        &window.title,
        Point::new(0.0, 0.0),
        (window.frame.width, window.frame.height),
    );
    let (cursor_api, _cursor_visible, _force_shows) = MockCursorApi::new();

    let pipeline = SenderPipeline {
        frame_source: Box::new(TestPatternSource::new(cli.width, cli.height, cli.fps)),
        audio_source: if cli.no_audio {
            None
        } else {
            Some(Box::new(SineSource::new(440.0)))
        },
        display_api: Box::new(MockVirtualDisplay::default()),
        window_control: Box::new(windows),
        injection: Box::new(NullInjectionBackend::default()),
        ax: Box::new(MockAxTree::new()),
        cursor: Box::new(cursor_api),
    };
    let request = BeamRequest {
        sender_name: identity.name.clone(),
        window,
        total_app_windows: 1,
        beamed_app_windows: 1,
    };

    let session = Session::start_sender(&peer, request, pipeline, config);

    let mut stats_ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, stopping beam");
                break;
            }
            _ = stats_ticker.tick() => {
                let stats = session.stats();
                info!(
                    "state {} | {} frames encoded, {} audio packets sent, {} keyframe requests",
                    session.state(),
                    stats.frames_encoded,
                    stats.audio_packets_sent,
                    stats.keyframe_requests
                );
                if session.state() == SessionState::Stopped {
                    if let Some(error) = session.last_error() {
                        warn!("session ended: {error}");
                    }
                    break;
                }
            }
        }
    }

    session.stop().await;
    Ok(())
}
