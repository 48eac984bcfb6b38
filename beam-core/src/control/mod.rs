//! Control channel: a single TCP stream carrying length-framed JSON
//! messages with a built-in heartbeat.
//!
//! `ControlChannel` wraps a `TcpStream` and splits it into background
//! reader / writer / heartbeat tasks communicating over mpsc channels.
//! The channel is one-shot: once disconnected it never reconnects, and
//! sends on a non-connected channel are silently dropped.
//!
//! Heartbeat: a `ping` goes out every `heartbeat_interval`; any received
//! `ping` is answered with an immediate `pong`; if no traffic at all is
//! seen for `heartbeat_timeout`, the peer is declared dead.

mod codec;
mod message;

pub use codec::{ControlCodec, MAX_CONTROL_FRAME};
pub use message::{ControlMessage, InputEvent, MouseButton};

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::BeamConfig;
use crate::error::BeamError;

// ── ChannelPhase ─────────────────────────────────────────────────

/// Lifecycle of a control channel.
///
/// ```text
///  Idle ──► Connecting ──► Connected ──► Disconnected
/// ```
///
/// One-shot: there is no path from `Connected` back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPhase {
    /// No connection attempted yet.
    #[default]
    Idle,
    /// TCP dial in progress.
    Connecting,
    /// Stream established; heartbeat running.
    Connected,
    /// Terminal state.
    Disconnected,
}

impl ChannelPhase {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Transition to `Connecting`. Valid from `Idle`.
    pub fn begin_connect(&mut self) -> Result<(), BeamError> {
        match self {
            Self::Idle => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(BeamError::InvalidTransition(
                "cannot connect: channel is not idle",
            )),
        }
    }

    /// Transition to `Connected`. Valid from `Idle` (adopted streams)
    /// and `Connecting`.
    pub fn establish(&mut self) -> Result<(), BeamError> {
        match self {
            Self::Idle | Self::Connecting => {
                *self = Self::Connected;
                Ok(())
            }
            _ => Err(BeamError::InvalidTransition(
                "cannot establish: channel already ran",
            )),
        }
    }

    /// Transition to `Disconnected`. Valid from anywhere; idempotent.
    pub fn disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

impl std::fmt::Display for ChannelPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
        };
        write!(f, "{s}")
    }
}

// ── ChannelEvent ─────────────────────────────────────────────────

/// What the owner of a channel receives.
#[derive(Debug)]
pub enum ChannelEvent {
    /// A protocol message (heartbeats are consumed internally).
    Message(ControlMessage),
    /// The channel reached its terminal state. No more events follow.
    Disconnected,
}

// ── ControlChannel ───────────────────────────────────────────────

/// A managed control connection to a single peer.
pub struct ControlChannel {
    outbound: mpsc::Sender<ControlMessage>,
    events: mpsc::Receiver<ChannelEvent>,
    phase_tx: Arc<watch::Sender<ChannelPhase>>,
    phase_rx: watch::Receiver<ChannelPhase>,
    remote_host: IpAddr,
    cancel: CancellationToken,
}

impl ControlChannel {
    /// Dial `addr` and wire the channel (connector role).
    pub async fn connect(addr: SocketAddr, config: &BeamConfig) -> Result<Self, BeamError> {
        let stream = TcpStream::connect(addr).await?;
        Self::adopt(stream, config)
    }

    /// Accept one inbound connection (listener role). The first
    /// established connection wins; the caller stops accepting for the
    /// lifetime of the session and later arrivals are simply dropped.
    pub async fn accept(listener: &TcpListener, config: &BeamConfig) -> Result<Self, BeamError> {
        let (stream, _) = listener.accept().await?;
        Self::adopt(stream, config)
    }

    /// Wrap an already-accepted connection (adopt role), e.g. one handed
    /// over by the discovery layer.
    pub fn adopt(stream: TcpStream, config: &BeamConfig) -> Result<Self, BeamError> {
        let _ = stream.set_nodelay(true);
        let remote_host = stream.peer_addr()?.ip();

        let (phase_tx, phase_rx) = watch::channel(ChannelPhase::Connected);
        let phase_tx = Arc::new(phase_tx);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ControlMessage>(64);
        let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>(64);
        let cancel = CancellationToken::new();
        let last_traffic = Arc::new(Mutex::new(Instant::now()));

        let (mut net_writer, mut net_reader) = Framed::new(stream, ControlCodec).split();

        // Writer task: drains the outbound queue onto the wire.
        {
            let phase_tx = Arc::clone(&phase_tx);
            let event_tx = event_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let msg = tokio::select! {
                        _ = cancel.cancelled() => break,
                        m = outbound_rx.recv() => match m {
                            Some(m) => m,
                            None => break,
                        },
                    };
                    if let Err(e) = net_writer.send(msg).await {
                        warn!("control write error: {e}");
                        mark_disconnected(&phase_tx, &event_tx, &cancel).await;
                        break;
                    }
                }
            });
        }

        // Reader task: heartbeats are handled here, everything else is
        // forwarded to the owner. Receive errors are terminal.
        {
            let phase_tx = Arc::clone(&phase_tx);
            let event_tx = event_tx.clone();
            let cancel = cancel.clone();
            let outbound = outbound_tx.clone();
            let last_traffic = Arc::clone(&last_traffic);
            tokio::spawn(async move {
                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => break,
                        n = net_reader.next() => n,
                    };
                    match next {
                        Some(Ok(msg)) => {
                            *last_traffic.lock().unwrap() = Instant::now();
                            match msg {
                                ControlMessage::Ping => {
                                    let _ = outbound.try_send(ControlMessage::Pong);
                                }
                                ControlMessage::Pong => {}
                                other => {
                                    if event_tx.send(ChannelEvent::Message(other)).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                        Some(Err(e)) => {
                            warn!("control read error: {e}");
                            mark_disconnected(&phase_tx, &event_tx, &cancel).await;
                            break;
                        }
                        None => {
                            debug!("control stream closed by peer");
                            mark_disconnected(&phase_tx, &event_tx, &cancel).await;
                            break;
                        }
                    }
                }
            });
        }

        // Heartbeat task: periodic ping plus silence detection.
        {
            let phase_tx = Arc::clone(&phase_tx);
            let event_tx = event_tx.clone();
            let cancel = cancel.clone();
            let outbound = outbound_tx.clone();
            let last_traffic = Arc::clone(&last_traffic);
            let interval = config.heartbeat_interval;
            let timeout = config.heartbeat_timeout;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    let _ = outbound.try_send(ControlMessage::Ping);
                    let silent = last_traffic.lock().unwrap().elapsed();
                    if silent > timeout {
                        warn!("control peer silent for {silent:?}; disconnecting");
                        mark_disconnected(&phase_tx, &event_tx, &cancel).await;
                        break;
                    }
                }
            });
        }

        Ok(Self {
            outbound: outbound_tx,
            events: event_rx,
            phase_tx,
            phase_rx,
            remote_host,
            cancel,
        })
    }

    /// Queue a message for the peer. Best effort and non-blocking; on a
    /// non-connected channel the message is silently dropped.
    pub fn send(&self, msg: ControlMessage) {
        if !self.phase().is_connected() {
            debug!("dropping {msg:?}: channel not connected");
            return;
        }
        if let Err(e) = self.outbound.try_send(msg) {
            debug!("dropping control message: {e}");
        }
    }

    /// Receive the next event. Returns `None` once the channel is done
    /// and all buffered events were drained.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ChannelPhase {
        *self.phase_rx.borrow()
    }

    /// The peer's IP, used as the destination for UDP media flows.
    pub fn remote_host(&self) -> IpAddr {
        self.remote_host
    }

    /// Tear the channel down locally. Idempotent; no `Disconnected`
    /// event is emitted for a self-initiated close.
    pub fn close(&self) {
        self.phase_tx.send_if_modified(|phase| {
            if matches!(phase, ChannelPhase::Disconnected) {
                false
            } else {
                phase.disconnect();
                true
            }
        });
        self.cancel.cancel();
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Flip the phase to `Disconnected` exactly once, emitting the terminal
/// event and cancelling all channel tasks.
async fn mark_disconnected(
    phase_tx: &watch::Sender<ChannelPhase>,
    event_tx: &mpsc::Sender<ChannelEvent>,
    cancel: &CancellationToken,
) {
    let changed = phase_tx.send_if_modified(|phase| {
        if phase.is_connected() {
            phase.disconnect();
            true
        } else {
            false
        }
    });
    if changed {
        let _ = event_tx.send(ChannelEvent::Disconnected).await;
    }
    cancel.cancel();
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> BeamConfig {
        BeamConfig {
            heartbeat_interval: Duration::from_millis(50),
            heartbeat_timeout: Duration::from_millis(400),
            ..BeamConfig::default()
        }
    }

    async fn channel_pair(config: &BeamConfig) -> (ControlChannel, ControlChannel) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connector = tokio::spawn({
            let config = config.clone();
            async move { ControlChannel::connect(addr, &config).await.unwrap() }
        });
        let accepted = ControlChannel::accept(&listener, config).await.unwrap();
        (connector.await.unwrap(), accepted)
    }

    #[tokio::test]
    async fn message_roundtrip() {
        let config = test_config();
        let (a, mut b) = channel_pair(&config).await;

        a.send(ControlMessage::KeyframeRequest);

        let event = tokio::time::timeout(Duration::from_secs(5), b.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        match event {
            ChannelEvent::Message(ControlMessage::KeyframeRequest) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn messages_arrive_in_send_order() {
        let config = test_config();
        let (a, mut b) = channel_pair(&config).await;

        for port in 1..=5u16 {
            a.send(ControlMessage::BeamAccept {
                video_port: port,
                audio_port: port,
            });
        }
        for expected in 1..=5u16 {
            let event = tokio::time::timeout(Duration::from_secs(5), b.recv())
                .await
                .expect("timeout")
                .expect("closed");
            match event {
                ChannelEvent::Message(ControlMessage::BeamAccept { video_port, .. }) => {
                    assert_eq!(video_port, expected)
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let config = test_config();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let channel = tokio::spawn({
            let config = config.clone();
            async move { ControlChannel::connect(addr, &config).await.unwrap() }
        });

        // Raw framed peer so we can observe heartbeat traffic.
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, ControlCodec);
        let _channel = channel.await.unwrap();

        framed.send(ControlMessage::Ping).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            assert!(Instant::now() < deadline, "no pong before deadline");
            match tokio::time::timeout(Duration::from_secs(5), framed.next())
                .await
                .expect("timeout")
                .expect("closed")
                .expect("read error")
            {
                ControlMessage::Pong => break,
                ControlMessage::Ping => continue, // the channel's own heartbeat
                other => panic!("unexpected message: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn silent_peer_is_declared_dead() {
        let config = test_config();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let channel = tokio::spawn({
            let config = config.clone();
            async move { ControlChannel::connect(addr, &config).await.unwrap() }
        });

        // Accept but never answer anything.
        let (stream, _) = listener.accept().await.unwrap();
        let mut channel = channel.await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), channel.recv())
            .await
            .expect("timeout")
            .expect("closed");
        assert!(matches!(event, ChannelEvent::Disconnected));
        assert_eq!(channel.phase(), ChannelPhase::Disconnected);
        drop(stream);
    }

    #[tokio::test]
    async fn send_after_close_is_silently_dropped() {
        let config = test_config();
        let (a, _b) = channel_pair(&config).await;
        a.close();
        assert_eq!(a.phase(), ChannelPhase::Disconnected);
        a.send(ControlMessage::BeamEnd); // must not panic
    }

    #[tokio::test]
    async fn peer_drop_is_terminal() {
        let config = test_config();
        let (a, b) = channel_pair(&config).await;
        drop(b);

        let mut a = a;
        let event = tokio::time::timeout(Duration::from_secs(5), a.recv())
            .await
            .expect("timeout")
            .expect("closed");
        assert!(matches!(event, ChannelEvent::Disconnected));
    }

    #[tokio::test]
    async fn remote_host_is_peer_ip() {
        let config = test_config();
        let (a, b) = channel_pair(&config).await;
        assert!(a.remote_host().is_loopback());
        assert!(b.remote_host().is_loopback());
    }

    #[test]
    fn phase_machine_happy_path() {
        let mut phase = ChannelPhase::default();
        assert_eq!(phase, ChannelPhase::Idle);
        phase.begin_connect().unwrap();
        assert_eq!(phase, ChannelPhase::Connecting);
        phase.establish().unwrap();
        assert!(phase.is_connected());
        phase.disconnect();
        assert_eq!(phase, ChannelPhase::Disconnected);
    }

    #[test]
    fn phase_machine_is_one_shot() {
        let mut phase = ChannelPhase::Disconnected;
        assert!(phase.begin_connect().is_err());
        assert!(phase.establish().is_err());
        phase.disconnect(); // idempotent
        assert_eq!(phase, ChannelPhase::Disconnected);
    }
}
