//! Domain-specific error types for the beam runtime.
//!
//! All fallible operations return `Result<T, BeamError>`.
//! No panics on untrusted input; every error is typed, and almost all
//! are recoverable. The exceptions kill the session: encoder context
//! creation and virtual display creation.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the beam runtime.
#[derive(Debug, Error)]
pub enum BeamError {
    // ── Wire / packet errors ─────────────────────────────────────
    /// A datagram was shorter than the fixed packet header.
    #[error("truncated packet header: {got} bytes (need {need})")]
    TruncatedHeader { got: usize, need: usize },

    /// A control frame declared a length at or beyond the hard cap.
    #[error("control frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A control frame body could not be parsed.
    #[error("malformed control frame: {0}")]
    MalformedFrame(String),

    /// A peer violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// An illegal state-machine transition was requested.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    // ── Connection errors ────────────────────────────────────────
    /// The TCP/UDP layer reported an error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// Send attempted on a channel that is not in the connected state.
    #[error("channel not connected")]
    NotConnected,

    /// No traffic from the peer within the heartbeat window.
    #[error("peer silent for {0:?}")]
    PeerTimeout(Duration),

    // ── Discovery errors ─────────────────────────────────────────
    /// The mDNS daemon or a register/browse call failed.
    #[error("discovery error: {0}")]
    Discovery(String),

    // ── Media errors ─────────────────────────────────────────────
    /// The video compression context could not be created or used.
    #[error("video encoder: {0}")]
    VideoEncode(String),

    /// The video decompression context could not be created or used.
    #[error("video decoder: {0}")]
    VideoDecode(String),

    /// A slice referenced state the decoder does not have; the session
    /// should request a fresh keyframe.
    #[error("decoder needs a keyframe")]
    NeedsKeyframe,

    /// AAC encoding failed.
    #[error("audio encoder: {0}")]
    AudioEncode(String),

    /// AAC decoding failed (malformed or incomplete packet).
    #[error("audio decoder: {0}")]
    AudioDecode(String),

    /// The playback engine refused a buffer or failed to start.
    #[error("audio output: {0}")]
    AudioOutput(String),

    // ── Platform errors ──────────────────────────────────────────
    /// No window matching the request was found for the process.
    #[error("no matching window for pid {pid}")]
    WindowNotFound { pid: i32 },

    /// Growing the virtual display would exceed the hard height cap.
    #[error("virtual display height {requested} exceeds cap {max}")]
    DisplayLimit { requested: u32, max: u32 },

    /// An accessibility lookup or action failed; callers fall back to
    /// the OS-event delivery path.
    #[error("accessibility: {0}")]
    Accessibility(String),

    /// The facility is not available on this platform.
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<serde_json::Error> for BeamError {
    fn from(e: serde_json::Error) -> Self {
        BeamError::MalformedFrame(e.to_string())
    }
}

impl From<String> for BeamError {
    fn from(s: String) -> Self {
        BeamError::Other(s)
    }
}

impl From<&str> for BeamError {
    fn from(s: &str) -> Self {
        BeamError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for BeamError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        BeamError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = BeamError::TruncatedHeader { got: 4, need: 12 };
        assert!(e.to_string().contains("4"));
        assert!(e.to_string().contains("12"));

        let e = BeamError::FrameTooLarge {
            size: 2_000_000,
            max: 1_000_000,
        };
        assert!(e.to_string().contains("2000000"));
    }

    #[test]
    fn from_string() {
        let e: BeamError = "something broke".into();
        assert!(matches!(e, BeamError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: BeamError = io_err.into();
        assert!(matches!(e, BeamError::Io(_)));
    }

    #[test]
    fn from_json() {
        let bad = serde_json::from_str::<serde_json::Value>("{nope");
        let e: BeamError = bad.unwrap_err().into();
        assert!(matches!(e, BeamError::MalformedFrame(_)));
    }
}
