//! Sender-side session: offer the beam, build the outgoing pipelines,
//! route input and cursor state, tear down in a safe order.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::{AudioCapture, AudioEncoder, AudioSource, MutePolicy};
use crate::control::{ChannelEvent, ControlChannel, ControlMessage};
use crate::cursor::{CursorApi, CursorMonitor};
use crate::error::BeamError;
use crate::hider::{VirtualDisplayApi, WindowControl, WindowHider};
use crate::input::{AxTree, InjectionBackend, InputInjector};
use crate::session::{ActorShared, SessionCommand, SessionState};
use crate::transport::{bind_media_socket, MediaSender};
use crate::types::WindowHandle;
use crate::video::{FrameSource, VideoEncoder};

// ── Wiring types ─────────────────────────────────────────────────

/// What to beam.
pub struct BeamRequest {
    /// Our human label, shown on the receiver.
    pub sender_name: String,
    /// The picked window.
    pub window: WindowHandle,
    /// Window counts of the window's app, for the mute rule.
    pub total_app_windows: usize,
    pub beamed_app_windows: usize,
}

/// Platform and media backends injected into a sender session.
pub struct SenderPipeline {
    pub frame_source: Box<dyn FrameSource>,
    /// `None` beams without audio.
    pub audio_source: Option<Box<dyn AudioSource>>,
    pub display_api: Box<dyn VirtualDisplayApi>,
    pub window_control: Box<dyn WindowControl>,
    pub injection: Box<dyn InjectionBackend>,
    pub ax: Box<dyn AxTree>,
    pub cursor: Box<dyn CursorApi>,
}

// ── Actor ────────────────────────────────────────────────────────

pub(crate) async fn run(
    mut shared: ActorShared,
    endpoint: SocketAddr,
    request: BeamRequest,
    mut pipeline: SenderPipeline,
) {
    shared.set_state(SessionState::Connecting);

    let mut channel = match ControlChannel::connect(endpoint, &shared.config).await {
        Ok(channel) => channel,
        Err(e) => {
            shared.record_error(format!("control connect failed: {e}"));
            shared.set_state(SessionState::Stopped);
            return;
        }
    };

    let has_audio = pipeline.audio_source.is_some();
    channel.send(ControlMessage::BeamOffer {
        sender_name: request.sender_name.clone(),
        window_title: request.window.title.clone(),
        width: request.window.frame.width as u32,
        height: request.window.frame.height as u32,
        has_audio,
        bundle_id: request.window.bundle_id.clone(),
    });

    // Wait for the accept (or a stop / rejection).
    enum Handshake {
        Accepted(u16, u16),
        StopRequested,
        Rejected,
    }
    let handshake = tokio::time::timeout(shared.config.heartbeat_timeout, async {
        loop {
            tokio::select! {
                cmd = shared.command_rx.recv() => match cmd {
                    Some(SessionCommand::Stop) | None => return Handshake::StopRequested,
                    Some(SessionCommand::ForwardInput(_)) => {}
                },
                event = channel.recv() => match event {
                    Some(ChannelEvent::Message(ControlMessage::BeamAccept {
                        video_port,
                        audio_port,
                    })) => return Handshake::Accepted(video_port, audio_port),
                    Some(ChannelEvent::Message(ControlMessage::BeamEnd))
                    | Some(ChannelEvent::Disconnected)
                    | None => return Handshake::Rejected,
                    Some(ChannelEvent::Message(_)) => {}
                },
            }
        }
    })
    .await;

    let (video_port, audio_port) = match handshake {
        Ok(Handshake::Accepted(video_port, audio_port)) => (video_port, audio_port),
        Ok(Handshake::StopRequested) => {
            shared.set_state(SessionState::Stopping);
            channel.send(ControlMessage::BeamEnd);
            channel.close();
            shared.set_state(SessionState::Stopped);
            return;
        }
        Ok(Handshake::Rejected) => {
            shared.record_error("beam was not accepted");
            channel.send(ControlMessage::BeamEnd);
            channel.close();
            shared.set_state(SessionState::Stopped);
            return;
        }
        Err(_) => {
            shared.record_error("timed out waiting for beam_accept");
            channel.close();
            shared.set_state(SessionState::Stopped);
            return;
        }
    };

    let remote = channel.remote_host();
    info!(
        "beam accepted: video -> {remote}:{video_port}, audio -> {remote}:{audio_port}"
    );

    // Window hiding. Platforms without the virtual display continue
    // unhidden; any other creation failure kills the session start.
    let mut hider = match WindowHider::create(pipeline.display_api, pipeline.window_control) {
        Ok(hider) => Some(hider),
        Err(BeamError::Unsupported(what)) => {
            warn!("{what} unavailable; beaming unhidden");
            None
        }
        Err(e) => {
            shared.record_error(format!("virtual display: {e}"));
            channel.send(ControlMessage::BeamEnd);
            channel.close();
            shared.set_state(SessionState::Stopped);
            return;
        }
    };
    let hidden_window = hider.as_mut().and_then(|hider| {
        match hider.hide(request.window.pid, Some(&request.window.title)) {
            Ok(window) => Some(window),
            Err(e) => {
                warn!("could not hide window: {e}; beaming unhidden");
                None
            }
        }
    });

    // Input injection into the (hidden) target.
    let mut injector =
        match InputInjector::new(pipeline.injection, pipeline.ax, request.window.pid) {
            Ok(injector) => Some(injector),
            Err(e) => {
                warn!("input injection unavailable: {e}");
                None
            }
        };

    // Video pipeline. Encoder context failure is fatal.
    let width = request.window.frame.width as u32;
    let height = request.window.frame.height as u32;
    let video = async {
        let socket = Arc::new(UdpSocket::from_std(bind_media_socket(0)?)?);
        let sender = MediaSender::new(socket, SocketAddr::new(remote, video_port));
        let encoder = VideoEncoder::new(width, height, &shared.config)?;
        Ok::<_, BeamError>((sender, encoder))
    }
    .await;
    let (video_sender, video_encoder) = match video {
        Ok(parts) => parts,
        Err(e) => {
            shared.record_error(format!("video pipeline: {e}"));
            if let Some(hider) = hider.as_mut() {
                hider.restore_all();
            }
            channel.send(ControlMessage::BeamEnd);
            channel.close();
            shared.set_state(SessionState::Stopped);
            return;
        }
    };
    let keyframe_flag = video_encoder.keyframe_handle();

    let (frame_tx, frame_rx) = mpsc::channel(4);
    if let Err(e) = pipeline.frame_source.start(frame_tx) {
        shared.record_error(format!("video capture: {e}"));
        if let Some(hider) = hider.as_mut() {
            hider.restore_all();
        }
        channel.send(ControlMessage::BeamEnd);
        channel.close();
        shared.set_state(SessionState::Stopped);
        return;
    }
    // The capturer signals here when its frame stream dies (target
    // window gone); that ends the whole session.
    let (capture_lost_tx, mut capture_lost_rx) = mpsc::channel::<&'static str>(2);
    let video_cancel = CancellationToken::new();
    let video_task = tokio::spawn(video_loop(
        video_encoder,
        video_sender,
        frame_rx,
        video_cancel.clone(),
        Arc::clone(&shared.counters.frames_encoded),
        capture_lost_tx,
    ));

    // Audio pipeline. Failures degrade to a silent beam.
    let mut audio_capture: Option<AudioCapture> = None;
    let mut audio_task = None;
    let audio_cancel = CancellationToken::new();
    if let Some(source) = pipeline.audio_source.take() {
        let mut capture = AudioCapture::new(source);
        let policy = MutePolicy::new(shared.config.mute_blacklist.clone());
        let muted = capture.request_mute(
            &policy,
            &request.window.bundle_id,
            request.total_app_windows,
            request.beamed_app_windows,
        );
        debug!("local mute: {muted}");

        match AudioEncoder::new(2, &shared.config) {
            Ok(encoder) => {
                let (pcm_tx, pcm_rx) = mpsc::channel(16);
                let started = capture.start(pcm_tx);
                let socket = bind_media_socket(0)
                    .and_then(|s| UdpSocket::from_std(s))
                    .map(Arc::new);
                match (started, socket) {
                    (Ok(()), Ok(socket)) => {
                        let sender =
                            MediaSender::new(socket, SocketAddr::new(remote, audio_port));
                        audio_task = Some(tokio::spawn(audio_loop(
                            encoder,
                            sender,
                            pcm_rx,
                            audio_cancel.clone(),
                            Arc::clone(&shared.counters.audio_packets_sent),
                        )));
                        audio_capture = Some(capture);
                    }
                    (started, socket) => {
                        warn!(
                            "audio pipeline unavailable (capture {:?}, socket {:?})",
                            started.err(),
                            socket.err()
                        );
                    }
                }
            }
            Err(e) => warn!("audio encoder unavailable: {e}"),
        }
    }

    // Cursor visibility poller.
    let (cursor_tx, mut cursor_rx) = mpsc::channel(8);
    let mut cursor_monitor = CursorMonitor::spawn(pipeline.cursor, cursor_tx);

    shared.set_state(SessionState::Active);
    info!("sender active: beaming '{}'", request.window.title);

    // Active loop: control-plane routing.
    loop {
        tokio::select! {
            cmd = shared.command_rx.recv() => match cmd {
                Some(SessionCommand::Stop) | None => break,
                Some(SessionCommand::ForwardInput(_)) => {} // receiver-only
            },
            Some(visible) = cursor_rx.recv() => {
                channel.send(ControlMessage::CursorState { visible });
            },
            Some(reason) = capture_lost_rx.recv() => {
                shared.record_error(reason);
                break;
            },
            event = channel.recv() => match event {
                Some(ChannelEvent::Message(ControlMessage::Input { event })) => {
                    if let Some(injector) = injector.as_mut() {
                        let frame = hidden_window
                            .and_then(|w| hider.as_ref().and_then(|h| h.window_frame(w)))
                            .unwrap_or(request.window.frame);
                        if let Err(e) = injector.inject(&event, &frame) {
                            debug!("input delivery failed: {e}");
                        }
                    }
                }
                Some(ChannelEvent::Message(ControlMessage::KeyframeRequest)) => {
                    keyframe_flag.store(true, Ordering::Relaxed);
                    shared
                        .counters
                        .keyframe_requests
                        .fetch_add(1, Ordering::Relaxed);
                }
                Some(ChannelEvent::Message(ControlMessage::BeamEnd))
                | Some(ChannelEvent::Disconnected)
                | None => break,
                Some(ChannelEvent::Message(_)) => {}
            },
        }
    }

    // Teardown. Leaving the loop cleared all routing; announce the end
    // first, then dismantle: capturers, encoder tasks, cursor poller,
    // input, hider, channel.
    shared.set_state(SessionState::Stopping);
    channel.send(ControlMessage::BeamEnd);

    pipeline.frame_source.stop();
    if let Some(capture) = audio_capture.as_mut() {
        capture.stop();
    }

    video_cancel.cancel();
    video_task.await.ok();
    audio_cancel.cancel();
    if let Some(task) = audio_task {
        task.await.ok();
    }

    cursor_monitor.stop().await;
    drop(injector);
    if let Some(mut hider) = hider {
        hider.restore_all();
    }

    channel.close();
    shared.set_state(SessionState::Stopped);
    info!("sender stopped");
}

// ── Pipeline loops ───────────────────────────────────────────────

async fn video_loop(
    mut encoder: VideoEncoder,
    sender: MediaSender,
    mut frames: mpsc::Receiver<crate::video::VideoFrame>,
    cancel: CancellationToken,
    frames_encoded: Arc<std::sync::atomic::AtomicU64>,
    capture_lost: mpsc::Sender<&'static str>,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            f = frames.recv() => match f {
                Some(f) => f,
                None => {
                    // The capturer is gone mid-beam.
                    let _ = capture_lost.try_send("video capture ended");
                    break;
                }
            },
        };
        match encoder.encode(&frame) {
            Ok(units) => {
                frames_encoded.fetch_add(1, Ordering::Relaxed);
                for unit in &units {
                    sender.send(unit);
                }
            }
            Err(e) => debug!("frame encode failed: {e}"),
        }
    }
}

async fn audio_loop(
    mut encoder: AudioEncoder,
    sender: MediaSender,
    mut blocks: mpsc::Receiver<crate::audio::PcmBlock>,
    cancel: CancellationToken,
    packets_sent: Arc<std::sync::atomic::AtomicU64>,
) {
    loop {
        let block = tokio::select! {
            _ = cancel.cancelled() => break,
            b = blocks.recv() => match b {
                Some(b) => b,
                None => break,
            },
        };
        match encoder.push(&block) {
            Ok(packets) => {
                for packet in &packets {
                    sender.send(packet);
                    packets_sent.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => debug!("audio encode failed: {e}"),
        }
    }
}
