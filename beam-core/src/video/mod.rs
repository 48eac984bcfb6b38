//! Real-time video pipeline.
//!
//! ```text
//! SENDER                                     RECEIVER
//! ┌───────────────────────────┐              ┌────────────────────────┐
//! │ FrameSource (30 fps)      │              │ MediaReceiver          │
//! │   ↓                       │              │   ↓                    │
//! │ VideoEncoder (H.264)      │   UDP        │ VideoDecoder           │
//! │   ↓ NAL units             │ ──────────►  │   ↓ decoded frames     │
//! │ MediaSender (fragments)   │              │ Renderer → layer       │
//! └───────────────────────────┘              └────────────────────────┘
//! ```
//!
//! Loss recovery is keyframe-based: when the decoder loses reference
//! state the session sends `keyframe_request` and the encoder's next
//! frame becomes an IDR preceded by fresh parameter sets.

pub mod capture;
pub mod decoder;
pub mod encoder;
pub mod nal;
pub mod renderer;

pub use capture::{FrameSource, TestPatternSource, VideoFrame};
pub use decoder::{DecodedFrame, VideoDecoder, FRAME_DURATION_US};
pub use encoder::{pts_from_rtp, rtp_timestamp, VideoEncoder};
pub use nal::{annex_b, avcc, nal_kind, split_annex_b, NalKind};
pub use renderer::{CountingLayer, DisplayLayer, Renderer, RendererHandle};
