//! Audio playback.
//!
//! The playback engine wants non-interleaved (planar) buffers, so each
//! received block is deinterleaved and scheduled in arrival order on a
//! simple queued output. There is no jitter buffer beyond whatever the
//! engine itself keeps.
//!
//! [`AudioOutput`] is the engine seam: the `audio-cpal` feature
//! provides a real device-backed implementation; [`NullOutput`]
//! counts and discards (tests, loopback demos, headless hosts).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::audio::capture::PcmBlock;
use crate::error::BeamError;

// ── Deinterleave ─────────────────────────────────────────────────

/// Split interleaved samples into per-channel planes.
pub fn deinterleave(samples: &[f32], channels: u32) -> Vec<Vec<f32>> {
    let channels = channels.max(1) as usize;
    let frames = samples.len() / channels;
    let mut planes = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            planes[ch].push(sample);
        }
    }
    planes
}

// ── AudioOutput ──────────────────────────────────────────────────

/// The playback engine seam.
pub trait AudioOutput: Send {
    /// Prepare the engine for the given stream format.
    fn start(&mut self, sample_rate: u32, channels: u32) -> Result<(), BeamError>;

    /// Schedule one planar buffer after everything already queued.
    fn write(&mut self, planes: &[Vec<f32>]) -> Result<(), BeamError>;

    /// Stop the engine. Must be called before the output is dropped.
    fn stop(&mut self);
}

/// Output that counts buffers and discards samples.
#[derive(Default)]
pub struct NullOutput {
    buffers: Arc<AtomicU64>,
}

impl NullOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counter of buffers that reached the engine.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.buffers)
    }
}

impl AudioOutput for NullOutput {
    fn start(&mut self, _sample_rate: u32, _channels: u32) -> Result<(), BeamError> {
        Ok(())
    }

    fn write(&mut self, _planes: &[Vec<f32>]) -> Result<(), BeamError> {
        self.buffers.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn stop(&mut self) {}
}

// ── AudioPlayback ────────────────────────────────────────────────

/// Schedules decoded blocks on the output in arrival order.
pub struct AudioPlayback {
    output: Box<dyn AudioOutput>,
    started: bool,
    packets_played: Arc<AtomicU64>,
}

impl AudioPlayback {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            started: false,
            packets_played: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Deinterleave and schedule one block. The engine is started
    /// lazily from the first block's format.
    pub fn play(&mut self, block: &PcmBlock) -> Result<(), BeamError> {
        if !self.started {
            self.output.start(block.sample_rate, block.channels)?;
            self.started = true;
        }
        let planes = deinterleave(&block.samples, block.channels);
        self.output.write(&planes)?;
        self.packets_played.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Buffers handed to the engine so far.
    pub fn packets_played(&self) -> u64 {
        self.packets_played.load(Ordering::Relaxed)
    }

    /// Shared play counter (for session statistics).
    pub fn play_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.packets_played)
    }

    /// Stop the engine. Engine stop happens before the output drops.
    pub fn stop(&mut self) {
        if self.started {
            self.output.stop();
            self.started = false;
            debug!("audio playback stopped");
        }
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Cpal output ──────────────────────────────────────────────────

#[cfg(feature = "audio-cpal")]
pub use cpal_output::CpalOutput;

/// Device-backed output through cpal.
///
/// The cpal stream is not `Send`, so a dedicated thread owns it and
/// takes commands over a channel; samples flow through a shared queue
/// that the stream callback drains (re-interleaved, as the device
/// expects).
#[cfg(feature = "audio-cpal")]
mod cpal_output {
    use super::{AudioOutput, BeamError};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::collections::VecDeque;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};

    enum StreamCommand {
        Stop,
    }

    pub struct CpalOutput {
        queue: Arc<Mutex<VecDeque<f32>>>,
        command_tx: Option<mpsc::Sender<StreamCommand>>,
        channels: u32,
    }

    impl CpalOutput {
        pub fn new() -> Self {
            Self {
                queue: Arc::new(Mutex::new(VecDeque::new())),
                command_tx: None,
                channels: 2,
            }
        }
    }

    impl Default for CpalOutput {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AudioOutput for CpalOutput {
        fn start(&mut self, sample_rate: u32, channels: u32) -> Result<(), BeamError> {
            self.channels = channels;
            let queue = Arc::clone(&self.queue);
            let (command_tx, command_rx) = mpsc::channel();
            let (ready_tx, ready_rx) = mpsc::channel();

            std::thread::Builder::new()
                .name("beam-audio-out".into())
                .spawn(move || {
                    let build = (|| {
                        let host = cpal::default_host();
                        let device = host
                            .default_output_device()
                            .ok_or_else(|| "no output device".to_string())?;
                        let config = cpal::StreamConfig {
                            channels: channels as u16,
                            sample_rate: cpal::SampleRate(sample_rate),
                            buffer_size: cpal::BufferSize::Default,
                        };
                        let callback_queue = Arc::clone(&queue);
                        let stream = device
                            .build_output_stream(
                                &config,
                                move |data: &mut [f32], _| {
                                    let mut q = callback_queue.lock().unwrap();
                                    for slot in data.iter_mut() {
                                        *slot = q.pop_front().unwrap_or(0.0);
                                    }
                                },
                                |e| tracing::warn!("cpal stream error: {e}"),
                                None,
                            )
                            .map_err(|e| e.to_string())?;
                        stream.play().map_err(|e| e.to_string())?;
                        Ok::<_, String>(stream)
                    })();

                    match build {
                        Ok(stream) => {
                            let _ = ready_tx.send(Ok(()));
                            // Hold the stream until told to stop.
                            while let Ok(cmd) = command_rx.recv() {
                                match cmd {
                                    StreamCommand::Stop => break,
                                }
                            }
                            drop(stream);
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                        }
                    }
                })
                .map_err(|e| BeamError::AudioOutput(e.to_string()))?;

            ready_rx
                .recv()
                .map_err(|_| BeamError::AudioOutput("output thread died".into()))?
                .map_err(BeamError::AudioOutput)?;
            self.command_tx = Some(command_tx);
            Ok(())
        }

        fn write(&mut self, planes: &[Vec<f32>]) -> Result<(), BeamError> {
            let frames = planes.first().map(|p| p.len()).unwrap_or(0);
            let mut queue = self.queue.lock().unwrap();
            for frame in 0..frames {
                for plane in planes {
                    queue.push_back(plane.get(frame).copied().unwrap_or(0.0));
                }
            }
            Ok(())
        }

        fn stop(&mut self) {
            if let Some(tx) = self.command_tx.take() {
                let _ = tx.send(StreamCommand::Stop);
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::SAMPLE_RATE;

    #[test]
    fn deinterleave_splits_channels() {
        let interleaved = vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0];
        let planes = deinterleave(&interleaved, 2);
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[0], vec![1.0, 2.0, 3.0]);
        assert_eq!(planes[1], vec![-1.0, -2.0, -3.0]);
    }

    #[test]
    fn deinterleave_mono_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        let planes = deinterleave(&samples, 1);
        assert_eq!(planes, vec![samples]);
    }

    #[test]
    fn playback_schedules_in_arrival_order() {
        let output = NullOutput::new();
        let counter = output.counter();
        let mut playback = AudioPlayback::new(Box::new(output));

        for _ in 0..5 {
            playback
                .play(&PcmBlock {
                    samples: vec![0.0; 2048],
                    channels: 2,
                    sample_rate: SAMPLE_RATE,
                })
                .unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 5);
        assert_eq!(playback.packets_played(), 5);

        playback.stop();
        playback.stop(); // idempotent
    }
}
