//! Real-time audio pipeline.
//!
//! Sender: per-application PCM capture (with optional local mute) into
//! AAC-LC packets over the audio UDP flow. Receiver: decode in arrival
//! order and schedule on a queued playback engine. The two directions
//! share no clock; the transport timestamp is a plain packet counter.

pub mod capture;
pub mod decoder;
pub mod encoder;
pub mod mute;
pub mod playback;

pub use capture::{AudioCapture, AudioSource, PcmBlock, SineSource, SAMPLE_RATE};
pub use decoder::AudioDecoder;
pub use encoder::{f32_to_i16, i16_to_f32, AudioEncoder, WINDOW_FRAMES};
pub use mute::MutePolicy;
pub use playback::{deinterleave, AudioOutput, AudioPlayback, NullOutput};

#[cfg(feature = "audio-cpal")]
pub use playback::CpalOutput;
