//! AAC decoder.
//!
//! Consumes one ADTS packet at a time and yields interleaved float
//! PCM. Total on garbage input: an empty packet produces no output and
//! malformed bytes produce a typed error, never a panic; the caller
//! logs and drops.

use fdk_aac::dec::{Decoder, DecoderError, Transport};

use crate::audio::capture::PcmBlock;
use crate::audio::encoder::i16_to_f32;
use crate::error::BeamError;

// ── AudioDecoder ─────────────────────────────────────────────────

/// AAC decompression state for one incoming audio flow.
pub struct AudioDecoder {
    decoder: Decoder,
    /// Scratch buffer sized for the largest AAC frame layout.
    pcm_buf: Vec<i16>,
    packets_decoded: u64,
}

impl AudioDecoder {
    pub fn new() -> Self {
        Self {
            decoder: Decoder::new(Transport::Adts),
            pcm_buf: vec![0i16; 2048 * 8],
            packets_decoded: 0,
        }
    }

    /// Decode one packet (transport payload with the header already
    /// stripped). Returns `None` when the decoder needs more data.
    pub fn decode(&mut self, packet: &[u8]) -> Result<Option<PcmBlock>, BeamError> {
        if packet.is_empty() {
            return Ok(None);
        }

        self.decoder
            .fill(packet)
            .map_err(|e| BeamError::AudioDecode(format!("fill: {e:?}")))?;

        match self.decoder.decode_frame(&mut self.pcm_buf) {
            Ok(()) => {}
            Err(DecoderError::NOT_ENOUGH_BITS) => return Ok(None),
            Err(e) => return Err(BeamError::AudioDecode(format!("{e:?}"))),
        }

        let decoded_samples = self.decoder.decoded_frame_size();
        if decoded_samples == 0 || decoded_samples > self.pcm_buf.len() {
            return Ok(None);
        }

        let info = self.decoder.stream_info();
        let channels = info.numChannels.max(1) as u32;
        let sample_rate = info.sampleRate.max(1) as u32;

        self.packets_decoded += 1;
        Ok(Some(PcmBlock {
            samples: i16_to_f32(&self.pcm_buf[..decoded_samples]),
            channels,
            sample_rate,
        }))
    }

    /// Packets successfully decoded so far.
    pub fn packets_decoded(&self) -> u64 {
        self.packets_decoded
    }
}

impl Default for AudioDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::{SineSource, SAMPLE_RATE};
    use crate::audio::encoder::{AudioEncoder, WINDOW_FRAMES};
    use crate::config::BeamConfig;

    #[test]
    fn codec_roundtrip_preserves_format() {
        let config = BeamConfig::default();
        let mut enc = AudioEncoder::new(2, &config).unwrap();
        let mut dec = AudioDecoder::new();

        // Three consecutive 1024-frame sine windows.
        let mut packets = Vec::new();
        for n in 0..3u64 {
            let block = PcmBlock {
                samples: SineSource::render(440.0, n * WINDOW_FRAMES as u64, WINDOW_FRAMES),
                channels: 2,
                sample_rate: SAMPLE_RATE,
            };
            packets.extend(enc.push(&block).unwrap());
        }
        assert!(!packets.is_empty());

        let mut decoded_blocks = Vec::new();
        for packet in &packets {
            if let Some(block) = dec.decode(&packet.data).unwrap() {
                decoded_blocks.push(block);
            }
        }
        assert!(!decoded_blocks.is_empty(), "nothing decoded");
        for block in &decoded_blocks {
            assert_eq!(block.frames(), WINDOW_FRAMES);
            assert_eq!(block.channels, 2);
            assert_eq!(block.sample_rate, SAMPLE_RATE);
        }
        assert_eq!(dec.packets_decoded(), decoded_blocks.len() as u64);
    }

    #[test]
    fn empty_input_produces_no_output() {
        let mut dec = AudioDecoder::new();
        assert!(dec.decode(&[]).unwrap().is_none());
    }

    #[test]
    fn garbage_input_does_not_panic() {
        let mut dec = AudioDecoder::new();
        // Four arbitrary bytes: either "need more data" or a typed
        // error is acceptable; a panic is not.
        let _ = dec.decode(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let _ = dec.decode(&[0xFF, 0xF1, 0x00, 0x00]);
        assert_eq!(dec.packets_decoded(), 0);
    }

    #[test]
    fn random_noise_does_not_panic() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut dec = AudioDecoder::new();
        for _ in 0..50 {
            let len = rng.gen_range(1..64);
            let noise: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let _ = dec.decode(&noise);
        }
    }
}
