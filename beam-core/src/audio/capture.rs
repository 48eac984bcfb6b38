//! PCM sources.
//!
//! Per-application audio capture is a platform facility; the core
//! depends only on [`AudioSource`]. Blocks arrive in arbitrary sizes
//! as interleaved 32-bit float stereo at 48 kHz. The optional mute tap
//! silences the app locally without affecting the captured stream.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::audio::mute::MutePolicy;
use crate::error::BeamError;

/// Capture sample rate for the whole pipeline.
pub const SAMPLE_RATE: u32 = 48_000;

// ── PcmBlock ─────────────────────────────────────────────────────

/// A block of interleaved float PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBlock {
    /// Interleaved samples, `frames * channels` long.
    pub samples: Vec<f32>,
    pub channels: u32,
    pub sample_rate: u32,
}

impl PcmBlock {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

// ── AudioSource ──────────────────────────────────────────────────

/// Delivers PCM blocks for the captured application.
pub trait AudioSource: Send {
    /// Begin delivery into `sink`.
    fn start(&mut self, sink: mpsc::Sender<PcmBlock>) -> Result<(), BeamError>;

    /// Stop delivery. Idempotent.
    fn stop(&mut self);

    /// Attach or release the local mute tap. Returns whether the OS
    /// honored the request; capture output is unaffected either way.
    fn set_muted(&mut self, muted: bool) -> bool;
}

// ── AudioCapture ─────────────────────────────────────────────────

/// Orchestrates one audio source plus the local-mute decision.
pub struct AudioCapture {
    source: Box<dyn AudioSource>,
    locally_muted: bool,
}

impl AudioCapture {
    pub fn new(source: Box<dyn AudioSource>) -> Self {
        Self {
            source,
            locally_muted: false,
        }
    }

    /// Start PCM delivery.
    pub fn start(&mut self, sink: mpsc::Sender<PcmBlock>) -> Result<(), BeamError> {
        self.source.start(sink)
    }

    /// Ask for the local mute tap, gated by the blacklist rule.
    /// Returns whether the app ended up muted locally.
    pub fn request_mute(
        &mut self,
        policy: &MutePolicy,
        bundle_id: &str,
        total_windows: usize,
        beamed_windows: usize,
    ) -> bool {
        if policy.should_mute(bundle_id, total_windows, beamed_windows) {
            self.locally_muted = self.source.set_muted(true);
        } else {
            debug!("{bundle_id} is mute-blacklisted with non-beamed windows open");
            self.locally_muted = false;
        }
        self.locally_muted
    }

    /// Whether the mute tap is currently attached.
    pub fn is_locally_muted(&self) -> bool {
        self.locally_muted
    }

    /// Release the tap (if any) and stop the source.
    pub fn stop(&mut self) {
        if self.locally_muted {
            self.source.set_muted(false);
            self.locally_muted = false;
        }
        self.source.stop();
    }
}

// ── SineSource ───────────────────────────────────────────────────

/// Synthetic stereo source: a continuous sine tone delivered in
/// real-time blocks of deliberately irregular sizes.
pub struct SineSource {
    frequency: f32,
    cancel: Option<CancellationToken>,
    blocks_produced: Arc<AtomicU64>,
    muted: bool,
}

impl SineSource {
    pub fn new(frequency: f32) -> Self {
        Self {
            frequency,
            cancel: None,
            blocks_produced: Arc::new(AtomicU64::new(0)),
            muted: false,
        }
    }

    pub fn blocks_produced(&self) -> u64 {
        self.blocks_produced.load(Ordering::Relaxed)
    }

    /// Render `frames` of interleaved stereo sine starting at sample
    /// offset `start`.
    pub fn render(frequency: f32, start: u64, frames: usize) -> Vec<f32> {
        let mut samples = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let t = (start + i as u64) as f32 / SAMPLE_RATE as f32;
            let value = (TAU * frequency * t).sin() * 0.4;
            samples.push(value);
            samples.push(value);
        }
        samples
    }
}

impl AudioSource for SineSource {
    fn start(&mut self, sink: mpsc::Sender<PcmBlock>) -> Result<(), BeamError> {
        if self.cancel.is_some() {
            return Err(BeamError::Other("audio source already started".into()));
        }
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        let frequency = self.frequency;
        let blocks = Arc::clone(&self.blocks_produced);

        tokio::spawn(async move {
            // Block sizes cycle so consumers see arbitrary granularity.
            const BLOCK_SIZES: [usize; 4] = [240, 480, 512, 1024];
            let mut ticker = tokio::time::interval(Duration::from_millis(10));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut position: u64 = 0;
            let mut block: usize = 0;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let frames = BLOCK_SIZES[block % BLOCK_SIZES.len()];
                block += 1;
                let pcm = PcmBlock {
                    samples: SineSource::render(frequency, position, frames),
                    channels: 2,
                    sample_rate: SAMPLE_RATE,
                };
                position += frames as u64;
                if sink.try_send(pcm).is_ok() {
                    blocks.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }

    fn set_muted(&mut self, muted: bool) -> bool {
        self.muted = muted;
        true
    }
}

impl Drop for SineSource {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_block_frame_count() {
        let block = PcmBlock {
            samples: vec![0.0; 960],
            channels: 2,
            sample_rate: SAMPLE_RATE,
        };
        assert_eq!(block.frames(), 480);
    }

    #[test]
    fn sine_render_is_stereo_interleaved() {
        let samples = SineSource::render(440.0, 0, 64);
        assert_eq!(samples.len(), 128);
        for frame in samples.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
        // Starts at the zero crossing.
        assert!(samples[0].abs() < 1e-6);
    }

    #[tokio::test]
    async fn sine_source_delivers_blocks() {
        let mut source = SineSource::new(440.0);
        let (tx, mut rx) = mpsc::channel(32);
        source.start(tx).unwrap();

        let block = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout")
            .expect("closed");
        assert_eq!(block.channels, 2);
        assert_eq!(block.sample_rate, SAMPLE_RATE);
        assert!(block.frames() > 0);

        source.stop();
    }

    #[test]
    fn capture_applies_blacklist_rule() {
        let policy = MutePolicy::default();

        let mut capture = AudioCapture::new(Box::new(SineSource::new(440.0)));
        assert!(capture.request_mute(&policy, "com.apple.Safari", 5, 1));
        assert!(capture.is_locally_muted());
        capture.stop();
        assert!(!capture.is_locally_muted());

        let mut capture = AudioCapture::new(Box::new(SineSource::new(440.0)));
        assert!(!capture.request_mute(&policy, "com.google.Chrome", 3, 1));
        assert!(!capture.is_locally_muted());
        capture.stop();
    }
}
