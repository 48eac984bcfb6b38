//! Raw frame sources.
//!
//! Window pixel capture is a platform facility (the original uses the
//! OS screen-capture stack); the core only depends on the
//! [`FrameSource`] trait. [`TestPatternSource`] is the built-in
//! implementation used by tests and the loopback demo binaries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::BeamError;

// ── VideoFrame ───────────────────────────────────────────────────

/// One raw captured frame: tightly packed RGB rows.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes.
    pub data: Vec<u8>,
    /// Presentation timestamp in microseconds since capture start.
    pub pts_us: u64,
}

// ── FrameSource ──────────────────────────────────────────────────

/// Delivers raw frames for one window, paced to the configured rate.
///
/// Implementations must respect the minimum frame interval and must
/// stop delivering after `stop()` returns.
pub trait FrameSource: Send {
    /// Begin delivery into `sink`. Frames may be dropped if the sink
    /// is full; there is no back-pressure in the hot path.
    fn start(&mut self, sink: mpsc::Sender<VideoFrame>) -> Result<(), BeamError>;

    /// Stop delivery. Idempotent.
    fn stop(&mut self);
}

// ── TestPatternSource ────────────────────────────────────────────

/// Synthetic frame source: a moving gradient at a fixed rate.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    interval: Duration,
    cancel: Option<CancellationToken>,
    frames_produced: Arc<AtomicU64>,
}

impl TestPatternSource {
    /// Dimensions must be even (4:2:0 subsampling downstream).
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            cancel: None,
            frames_produced: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Frames generated so far.
    pub fn frames_produced(&self) -> u64 {
        self.frames_produced.load(Ordering::Relaxed)
    }

    /// Render one gradient frame for frame number `n`.
    pub fn render(width: u32, height: u32, n: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        let shift = (n * 4) as u32;
        for y in 0..height {
            for x in 0..width {
                data.push(((x + shift) % 256) as u8);
                data.push(((y + shift / 2) % 256) as u8);
                data.push(((x + y) % 256) as u8);
            }
        }
        data
    }
}

impl FrameSource for TestPatternSource {
    fn start(&mut self, sink: mpsc::Sender<VideoFrame>) -> Result<(), BeamError> {
        if self.cancel.is_some() {
            return Err(BeamError::Other("frame source already started".into()));
        }
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        let width = self.width;
        let height = self.height;
        let interval = self.interval;
        let frames = Arc::clone(&self.frames_produced);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut n: u64 = 0;
            let pts_step = interval.as_micros() as u64;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let frame = VideoFrame {
                    width,
                    height,
                    data: Self::render(width, height, n),
                    pts_us: n * pts_step,
                };
                // Drop frames when the pipeline is behind.
                if sink.try_send(frame).is_ok() {
                    frames.fetch_add(1, Ordering::Relaxed);
                }
                n += 1;
            }
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

impl Drop for TestPatternSource {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tests ────────────────────────────────────────────────────────
