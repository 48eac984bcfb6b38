//! AAC-LC encoder.
//!
//! Fills fixed 1024-frame encoder windows incrementally from the PCM
//! stream (capture blocks arrive in arbitrary sizes) and emits one
//! self-contained ADTS packet per completed window. Packets always fit
//! a single transport fragment; the transport timestamp is a monotonic
//! packet counter, not a media clock.

use fdk_aac::enc::{AudioObjectType, BitRate, ChannelMode, Encoder, EncoderParams, Transport};

use crate::audio::capture::{PcmBlock, SAMPLE_RATE};
use crate::config::BeamConfig;
use crate::error::BeamError;
use crate::transport::NalUnit;

/// PCM frames per AAC encoder window.
pub const WINDOW_FRAMES: usize = 1024;

// ── Sample conversion ────────────────────────────────────────────

/// Convert float samples to the encoder's 16-bit format, clamped.
pub fn f32_to_i16(input: &[f32]) -> Vec<i16> {
    input
        .iter()
        .map(|&sample| (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)
        .collect()
}

/// Convert decoded 16-bit samples back to float.
pub fn i16_to_f32(input: &[i16]) -> Vec<f32> {
    input
        .iter()
        .map(|&sample| f32::from(sample) / f32::from(i16::MAX))
        .collect()
}

// ── AudioEncoder ─────────────────────────────────────────────────

/// AAC-LC compression context for one beam.
pub struct AudioEncoder {
    encoder: Encoder,
    channels: u32,
    /// Pending interleaved samples not yet forming a full window.
    window: Vec<i16>,
    /// Monotonic transport counter, one per emitted packet.
    packet_counter: u32,
    output_buf: Vec<u8>,
    packets_encoded: u64,
}

impl AudioEncoder {
    /// Create an encoder for `channels`-channel 48 kHz input.
    pub fn new(channels: u32, config: &BeamConfig) -> Result<Self, BeamError> {
        let channel_mode = match channels {
            1 => ChannelMode::Mono,
            2 => ChannelMode::Stereo,
            other => {
                return Err(BeamError::AudioEncode(format!(
                    "unsupported channel count {other}"
                )))
            }
        };

        let params = EncoderParams {
            bit_rate: BitRate::Cbr(config.audio_bitrate(channels)),
            sample_rate: SAMPLE_RATE,
            transport: Transport::Adts,
            audio_object_type: AudioObjectType::Mpeg4LowComplexity,
            channels: channel_mode,
        };
        let encoder = Encoder::new(params)
            .map_err(|e| BeamError::AudioEncode(format!("context creation: {e:?}")))?;

        Ok(Self {
            encoder,
            channels,
            window: Vec::with_capacity(WINDOW_FRAMES * channels as usize * 2),
            packet_counter: 0,
            // Worst-case AAC packet is 6144 bits per channel.
            output_buf: vec![0u8; 8192 * channels as usize],
            packets_encoded: 0,
        })
    }

    /// Feed one capture block; returns the packets completed by it.
    ///
    /// Each packet travels as a single-fragment transport unit whose
    /// timestamp is the packet counter.
    pub fn push(&mut self, block: &PcmBlock) -> Result<Vec<NalUnit>, BeamError> {
        if block.channels != self.channels {
            return Err(BeamError::AudioEncode(format!(
                "channel count changed from {} to {}",
                self.channels, block.channels
            )));
        }

        self.window.extend(f32_to_i16(&block.samples));

        let samples_per_window = WINDOW_FRAMES * self.channels as usize;
        let mut packets = Vec::new();

        while self.window.len() >= samples_per_window {
            let info = self
                .encoder
                .encode(&self.window[..samples_per_window], &mut self.output_buf)
                .map_err(|e| BeamError::AudioEncode(format!("{e:?}")))?;

            if info.input_consumed == 0 {
                break; // encoder refuses input; avoid spinning
            }
            self.window.drain(..info.input_consumed.min(self.window.len()));

            if info.output_size > 0 {
                packets.push(NalUnit::new(
                    self.output_buf[..info.output_size].to_vec(),
                    false,
                    self.packet_counter,
                ));
                self.packet_counter = self.packet_counter.wrapping_add(1);
                self.packets_encoded += 1;
            }
        }
        Ok(packets)
    }

    /// Packets emitted so far.
    pub fn packets_encoded(&self) -> u64 {
        self.packets_encoded
    }
}

// ── Tests ────────────────────────────────────────────────────────
