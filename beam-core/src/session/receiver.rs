//! Receiver-side session: adopt the inbound connection, answer the
//! offer with system-chosen media ports, decode and present, forward
//! normalized input back to the sender.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::audio::{AudioDecoder, AudioOutput, AudioPlayback};
use crate::control::{ChannelEvent, ControlChannel, ControlMessage};
use crate::error::BeamError;
use crate::input::InputCapture;
use crate::session::{ActorShared, SessionCommand, SessionState};
use crate::transport::MediaReceiver;
use crate::video::{DisplayLayer, Renderer, RendererHandle, VideoDecoder};

// ── Wiring types ─────────────────────────────────────────────────

/// Presentation backends injected into a receiver session.
pub struct ReceiverPipeline {
    pub layer: Box<dyn DisplayLayer>,
    pub audio_output: Box<dyn AudioOutput>,
    /// Size of the local view showing the beam (for input
    /// normalization).
    pub view_size: (f64, f64),
}

// ── Actor ────────────────────────────────────────────────────────

pub(crate) async fn run(mut shared: ActorShared, stream: TcpStream, pipeline: ReceiverPipeline) {
    let mut channel = match ControlChannel::adopt(stream, &shared.config) {
        Ok(channel) => channel,
        Err(e) => {
            shared.record_error(format!("adopt failed: {e}"));
            shared.set_state(SessionState::Stopped);
            return;
        }
    };

    // The first message must be the offer.
    let offer = tokio::time::timeout(shared.config.heartbeat_timeout, async {
        loop {
            match channel.recv().await {
                Some(ChannelEvent::Message(ControlMessage::BeamOffer {
                    sender_name,
                    window_title,
                    width,
                    height,
                    has_audio,
                    bundle_id,
                })) => {
                    return Some((sender_name, window_title, width, height, has_audio, bundle_id))
                }
                Some(ChannelEvent::Message(ControlMessage::BeamEnd))
                | Some(ChannelEvent::Disconnected)
                | None => return None,
                Some(ChannelEvent::Message(other)) => {
                    debug!("ignoring pre-offer message {other:?}");
                }
            }
        }
    })
    .await;

    let (sender_name, window_title, width, height, has_audio, _bundle_id) = match offer {
        Ok(Some(offer)) => offer,
        _ => {
            shared.record_error("no beam_offer on inbound connection");
            channel.close();
            shared.set_state(SessionState::Stopped);
            return;
        }
    };
    info!("beam offer from '{sender_name}': '{window_title}' ({width}x{height}, audio: {has_audio})");

    // Media receivers on system-chosen ports.
    let (video_tx, video_rx) = mpsc::channel(16);
    let (audio_tx, audio_rx) = mpsc::channel(32);
    let receivers = (|| {
        let video = MediaReceiver::bind(0, shared.config.reassembly_gc_window, video_tx)?;
        let audio = MediaReceiver::bind(0, shared.config.reassembly_gc_window, audio_tx)?;
        Ok::<_, BeamError>((video, audio))
    })();
    let (mut video_receiver, mut audio_receiver) = match receivers {
        Ok(pair) => pair,
        Err(e) => {
            shared.record_error(format!("media sockets: {e}"));
            channel.close();
            shared.set_state(SessionState::Stopped);
            return;
        }
    };

    // Decode/present tasks.
    let renderer = Renderer::new(pipeline.layer);
    let (keyframe_tx, mut keyframe_rx) = mpsc::channel(4);
    let video_cancel = CancellationToken::new();
    let video_task = tokio::spawn(video_loop(
        video_rx,
        renderer.handle(),
        keyframe_tx,
        video_cancel.clone(),
        Arc::clone(&shared.counters.frames_rendered),
    ));

    let audio_cancel = CancellationToken::new();
    let audio_task = tokio::spawn(audio_loop(
        audio_rx,
        pipeline.audio_output,
        audio_cancel.clone(),
        Arc::clone(&shared.counters.audio_packets_played),
    ));

    channel.send(ControlMessage::BeamAccept {
        video_port: video_receiver.local_port(),
        audio_port: audio_receiver.local_port(),
    });

    let mut input_capture = InputCapture::new(pipeline.view_size.0, pipeline.view_size.1);
    shared.set_state(SessionState::Active);
    info!(
        "receiver active on video port {}, audio port {}",
        video_receiver.local_port(),
        audio_receiver.local_port()
    );

    // Active loop: control-plane routing.
    loop {
        tokio::select! {
            cmd = shared.command_rx.recv() => match cmd {
                Some(SessionCommand::Stop) | None => break,
                Some(SessionCommand::ForwardInput(view_event)) => {
                    let observation = input_capture.observe(view_event);
                    shared
                        .cursor_captured
                        .store(input_capture.cursor_captured(), Ordering::Relaxed);
                    if let Some(event) = observation.event {
                        channel.send(ControlMessage::Input { event });
                    }
                }
            },
            Some(()) = keyframe_rx.recv() => {
                channel.send(ControlMessage::KeyframeRequest);
                shared
                    .counters
                    .keyframe_requests
                    .fetch_add(1, Ordering::Relaxed);
            },
            event = channel.recv() => match event {
                Some(ChannelEvent::Message(ControlMessage::CursorState { visible })) => {
                    // Hidden sender cursor means the app wants raw
                    // deltas: enter capture. Visible releases it.
                    input_capture.set_cursor_captured(!visible);
                    shared.cursor_captured.store(!visible, Ordering::Relaxed);
                }
                Some(ChannelEvent::Message(ControlMessage::BeamEnd))
                | Some(ChannelEvent::Disconnected)
                | None => break,
                Some(ChannelEvent::Message(_)) => {}
            },
        }
    }

    // Teardown: receivers, decoders (drained), player (stopped inside
    // its task before drop), input (detached by leaving the loop),
    // then the renderer flush.
    shared.set_state(SessionState::Stopping);
    channel.send(ControlMessage::BeamEnd);

    video_receiver.stop().await;
    audio_receiver.stop().await;

    video_cancel.cancel();
    video_task.await.ok();
    audio_cancel.cancel();
    audio_task.await.ok();

    renderer.shutdown().await;

    channel.close();
    shared.set_state(SessionState::Stopped);
    info!("receiver stopped");
}

// ── Pipeline loops ───────────────────────────────────────────────

async fn video_loop(
    mut nals: mpsc::Receiver<crate::transport::NalUnit>,
    renderer: RendererHandle,
    keyframe_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
    frames_rendered: Arc<std::sync::atomic::AtomicU64>,
) {
    let mut decoder = VideoDecoder::new();
    loop {
        let nal = tokio::select! {
            _ = cancel.cancelled() => break,
            n = nals.recv() => match n {
                Some(n) => n,
                None => break,
            },
        };
        match decoder.submit(&nal) {
            Ok(Some(frame)) => {
                renderer.enqueue(frame);
                frames_rendered.store(renderer.frames_enqueued(), Ordering::Relaxed);
            }
            Ok(None) => {}
            Err(BeamError::NeedsKeyframe) => {
                // Reference loss: ask for a fresh IDR, drop the slice.
                let _ = keyframe_tx.try_send(());
            }
            Err(e) => debug!("video decode failed: {e}"),
        }
    }
}

async fn audio_loop(
    mut packets: mpsc::Receiver<crate::transport::NalUnit>,
    output: Box<dyn AudioOutput>,
    cancel: CancellationToken,
    packets_played: Arc<std::sync::atomic::AtomicU64>,
) {
    let mut decoder = AudioDecoder::new();
    let mut playback = AudioPlayback::new(output);
    loop {
        let packet = tokio::select! {
            _ = cancel.cancelled() => break,
            p = packets.recv() => match p {
                Some(p) => p,
                None => break,
            },
        };
        match decoder.decode(&packet.data) {
            Ok(Some(block)) => {
                if playback.play(&block).is_ok() {
                    packets_played.store(playback.packets_played(), Ordering::Relaxed);
                }
            }
            Ok(None) => {}
            Err(e) => debug!("audio decode failed: {e}"),
        }
    }
    // Engine stop before the playback object drops.
    playback.stop();
}
