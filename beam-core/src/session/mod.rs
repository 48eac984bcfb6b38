//! Session orchestration.
//!
//! One `Session` runs one beam from one side. The session itself is an
//! actor: a single task owns the control channel, the media pipelines
//! and the platform resources, and leaf components reach it only
//! through channels installed at wiring time (no back-pointers across
//! threads). The public [`Session`] value is a handle.
//!
//! ```text
//! SENDER                                   RECEIVER
//! startBeam(peer, window)                  inbound TCP connection
//!   idle → connecting                        │ (adopted)
//!   beam_offer ──────────────────────────►  first message
//!   ◄────────────────────────── beam_accept(videoPort, audioPort)
//!   build pipeline, hide window             build decoders/renderer
//!   connecting → active                      idle → active
//!   ... media over UDP, input/cursor over control ...
//!   beam_end (either side) → stopping → stopped
//! ```

mod receiver;
mod sender;

pub use receiver::ReceiverPipeline;
pub use sender::{BeamRequest, SenderPipeline};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::config::BeamConfig;
use crate::error::BeamError;
use crate::input::ViewEvent;
use crate::peer::Peer;

// ── SessionState ─────────────────────────────────────────────────

/// Lifecycle of one beam. Strictly monotonic: a session never moves
/// backwards, and once `Stopped` it is dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Active,
    Stopping,
    Stopped,
}

impl SessionState {
    fn rank(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Connecting => 1,
            Self::Active => 2,
            Self::Stopping => 3,
            Self::Stopped => 4,
        }
    }

    /// Move forward to `to`. Staying put is a no-op; moving backwards
    /// is an error.
    pub fn advance(&mut self, to: SessionState) -> Result<(), BeamError> {
        if to.rank() >= self.rank() {
            *self = to;
            Ok(())
        } else {
            Err(BeamError::InvalidTransition(
                "session state only moves forward",
            ))
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Active => "Active",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
        };
        write!(f, "{s}")
    }
}

/// Which end of the beam this session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

// ── Statistics ───────────────────────────────────────────────────

/// Shared pipeline counters, written by the pipeline tasks.
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionCounters {
    pub frames_encoded: Arc<AtomicU64>,
    pub audio_packets_sent: Arc<AtomicU64>,
    pub frames_rendered: Arc<AtomicU64>,
    pub audio_packets_played: Arc<AtomicU64>,
    pub keyframe_requests: Arc<AtomicU64>,
}

/// Snapshot of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Raw frames pushed through the video encoder (sender).
    pub frames_encoded: u64,
    /// AAC packets put on the wire (sender).
    pub audio_packets_sent: u64,
    /// Decoded frames that reached the renderer (receiver).
    pub frames_rendered: u64,
    /// Audio buffers handed to the playback engine (receiver).
    pub audio_packets_played: u64,
    /// Keyframe requests sent or honored.
    pub keyframe_requests: u64,
}

// ── Commands ─────────────────────────────────────────────────────

pub(crate) enum SessionCommand {
    Stop,
    /// Receiver role: a raw event observed on the display view.
    ForwardInput(ViewEvent),
}

// ── Shared actor plumbing ────────────────────────────────────────

pub(crate) struct ActorShared {
    pub config: BeamConfig,
    pub state_tx: watch::Sender<SessionState>,
    pub counters: SessionCounters,
    pub error: Arc<Mutex<Option<String>>>,
    pub cursor_captured: Arc<AtomicBool>,
    pub command_rx: mpsc::Receiver<SessionCommand>,
}

impl ActorShared {
    /// Advance the published state; backwards moves are ignored (the
    /// session is already further along).
    pub fn set_state(&self, to: SessionState) {
        self.state_tx.send_if_modified(|state| {
            let before = *state;
            state.advance(to).ok();
            *state != before
        });
    }

    /// Record the one-shot error string (first failure wins).
    pub fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        let mut slot = self.error.lock().unwrap();
        if slot.is_none() {
            debug!("session error: {message}");
            *slot = Some(message);
        }
    }
}

// ── Session ──────────────────────────────────────────────────────

/// Handle to a running session actor.
pub struct Session {
    role: Role,
    command_tx: mpsc::Sender<SessionCommand>,
    state_rx: watch::Receiver<SessionState>,
    counters: SessionCounters,
    error: Arc<Mutex<Option<String>>>,
    cursor_captured: Arc<AtomicBool>,
}

impl Session {
    /// Start beaming `request.window` to `peer` (sender role). The
    /// returned handle observes progress through [`state_watch`];
    /// failures surface as `Stopped` plus [`last_error`].
    ///
    /// [`state_watch`]: Self::state_watch
    /// [`last_error`]: Self::last_error
    pub fn start_sender(
        peer: &Peer,
        request: BeamRequest,
        pipeline: SenderPipeline,
        config: BeamConfig,
    ) -> Session {
        let (session, shared) = Session::wire(Role::Sender, config);
        let endpoint = peer.endpoint;
        tokio::spawn(async move {
            sender::run(shared, endpoint, request, pipeline).await;
        });
        session
    }

    /// Adopt an inbound control connection and run the receiver role.
    pub fn accept(
        stream: TcpStream,
        pipeline: ReceiverPipeline,
        config: BeamConfig,
    ) -> Session {
        let (session, shared) = Session::wire(Role::Receiver, config);
        tokio::spawn(async move {
            receiver::run(shared, stream, pipeline).await;
        });
        session
    }

    fn wire(role: Role, config: BeamConfig) -> (Session, ActorShared) {
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (command_tx, command_rx) = mpsc::channel(64);
        let counters = SessionCounters::default();
        let error = Arc::new(Mutex::new(None));
        let cursor_captured = Arc::new(AtomicBool::new(false));

        let shared = ActorShared {
            config,
            state_tx,
            counters: counters.clone(),
            error: Arc::clone(&error),
            cursor_captured: Arc::clone(&cursor_captured),
            command_rx,
        };
        let session = Session {
            role,
            command_tx,
            state_rx,
            counters,
            error,
            cursor_captured,
        };
        (session, shared)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch state transitions.
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Snapshot of the pipeline counters.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            frames_encoded: self.counters.frames_encoded.load(Ordering::Relaxed),
            audio_packets_sent: self.counters.audio_packets_sent.load(Ordering::Relaxed),
            frames_rendered: self.counters.frames_rendered.load(Ordering::Relaxed),
            audio_packets_played: self.counters.audio_packets_played.load(Ordering::Relaxed),
            keyframe_requests: self.counters.keyframe_requests.load(Ordering::Relaxed),
        }
    }

    /// The one-shot error string, if the session failed.
    pub fn last_error(&self) -> Option<String> {
        self.error.lock().unwrap().clone()
    }

    /// Receiver role: whether cursor-capture mode is active.
    pub fn cursor_captured(&self) -> bool {
        self.cursor_captured.load(Ordering::Relaxed)
    }

    /// Receiver role: feed one raw view event for normalization and
    /// forwarding. Dropped silently in any other state or role.
    pub fn forward_view_event(&self, event: ViewEvent) {
        let _ = self.command_tx.try_send(SessionCommand::ForwardInput(event));
    }

    /// Stop the session and wait for teardown. Idempotent.
    pub async fn stop(&self) {
        let _ = self.command_tx.send(SessionCommand::Stop).await;
        let mut watch = self.state_rx.clone();
        while !watch.borrow().is_stopped() {
            if watch.changed().await.is_err() {
                break; // actor gone; its last published state stands
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
