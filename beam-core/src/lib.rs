//! # beam-core — window teleport runtime
//!
//! Beams a single interactive application window between two devices
//! on the same LAN: the sender captures the window's pixels and audio,
//! hides the window on a process-private virtual display, streams
//! media over UDP and replays the peer's input into the hidden window,
//! while the receiver shows the remote window and acts as a remote
//! control.
//!
//! ```text
//! SENDER                                      RECEIVER
//! ┌───────────────────────────┐               ┌───────────────────────────┐
//! │ FrameSource → VideoEncoder│    UDP (vid)  │ Reassembler → VideoDecoder│
//! │            → MediaSender  │ ────────────► │            → Renderer     │
//! │ AudioSource → AudioEncoder│    UDP (aud)  │ AudioDecoder → Playback   │
//! │            → MediaSender  │ ────────────► │                           │
//! │ InputInjector ◄─ Control  │  TCP control  │ Control ◄─ InputCapture   │
//! │ WindowHider   channel     │ ◄───────────► │ channel                   │
//! └───────────────────────────┘               └───────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module      | Purpose                                            |
//! |-------------|----------------------------------------------------|
//! | `packet`    | 12-byte media datagram header codec                |
//! | `transport` | UDP fragmentation, reassembly, receive loops       |
//! | `control`   | Length-framed JSON control channel with heartbeat  |
//! | `discovery` | DNS-SD advertise/browse and the control listener   |
//! | `video`     | H.264 capture/encode/decode/render pipeline        |
//! | `audio`     | AAC capture/encode/decode/playback pipeline        |
//! | `input`     | Event normalization (receiver) and injection (sender) |
//! | `hider`     | Virtual-display window hiding                      |
//! | `cursor`    | 3 Hz cursor-visibility poller                      |
//! | `session`   | The state machine tying everything together        |
//!
//! Platform facilities (window pixels, per-app audio taps, the
//! accessibility tree, event posting, the virtual display, cursor
//! state) enter through traits; in-memory implementations back the
//! tests and the loopback binaries.

pub mod audio;
pub mod config;
pub mod control;
pub mod cursor;
pub mod discovery;
pub mod error;
pub mod hider;
pub mod identity;
pub mod input;
pub mod packet;
pub mod peer;
pub mod session;
pub mod transport;
pub mod types;
pub mod video;

pub use config::BeamConfig;
pub use error::BeamError;
pub use identity::DeviceIdentity;
pub use peer::Peer;
pub use session::{
    BeamRequest, ReceiverPipeline, Role, SenderPipeline, Session, SessionState, SessionStats,
};
pub use types::{Point, Rect, WindowHandle};
