//! Real-time H.264 encoder.
//!
//! Front end over openh264 configured for low latency: fixed bitrate,
//! no frame reordering (no B-frames), forced IDR cadence. Every
//! keyframe is preceded in the output by the current parameter sets
//! (SPS then PPS) at the same timestamp, so a receiver can always
//! bootstrap from the next keyframe group.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use openh264::encoder::{Encoder, EncoderConfig, RateControlMode};
use openh264::formats::YUVBuffer;
use openh264::OpenH264API;
use tracing::debug;

use crate::config::BeamConfig;
use crate::error::BeamError;
use crate::transport::NalUnit;
use crate::video::capture::VideoFrame;
use crate::video::nal::{nal_kind, split_annex_b, NalKind};

// ── Timestamp conversion ─────────────────────────────────────────

/// Convert a presentation time in microseconds to the 90 kHz RTP
/// clock, truncated to 32 bits.
pub fn rtp_timestamp(pts_us: u64) -> u32 {
    (pts_us * 9 / 100) as u32
}

/// Convert a 90 kHz RTP timestamp back to microseconds.
pub fn pts_from_rtp(rtp: u32) -> u64 {
    rtp as u64 * 100 / 9
}

// ── VideoEncoder ─────────────────────────────────────────────────

/// H.264 compression context for one beam.
///
/// Construction failure is fatal to the session; per-frame failures
/// are logged and the frame is dropped.
pub struct VideoEncoder {
    encoder: Encoder,
    width: u32,
    height: u32,
    /// Force-next flag: the next encoded frame becomes an IDR. Shared
    /// so the control-plane can request keyframes from another task.
    force_key: Arc<AtomicBool>,
    frames_since_idr: u32,
    max_keyframe_interval: u32,
    /// Most recent parameter sets seen from the compressor.
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
    frames_encoded: u64,
}

impl VideoEncoder {
    /// Create a compression context for `width` x `height` input.
    pub fn new(width: u32, height: u32, config: &BeamConfig) -> Result<Self, BeamError> {
        let encoder_config = EncoderConfig::new(width, height)
            .max_frame_rate(config.target_fps as f32)
            .rate_control_mode(RateControlMode::Bitrate)
            .set_bitrate_bps(config.video_bitrate);
        let encoder = Encoder::with_config(OpenH264API::from_source(), encoder_config)
            .map_err(|e| BeamError::VideoEncode(format!("context creation: {e}")))?;

        Ok(Self {
            encoder,
            width,
            height,
            force_key: Arc::new(AtomicBool::new(false)),
            frames_since_idr: 0,
            max_keyframe_interval: config.max_keyframe_interval,
            sps: None,
            pps: None,
            frames_encoded: 0,
        })
    }

    /// Handle for requesting a keyframe from another task (the session
    /// sets it when a `keyframe_request` arrives).
    pub fn keyframe_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.force_key)
    }

    /// Make the next encoded frame an IDR.
    pub fn force_keyframe(&self) {
        self.force_key.store(true, Ordering::Relaxed);
    }

    /// Frames pushed through the compressor so far.
    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    /// Encode one raw frame into zero or more NAL units.
    pub fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<NalUnit>, BeamError> {
        if frame.width != self.width || frame.height != self.height {
            return Err(BeamError::VideoEncode(format!(
                "frame size {}x{} does not match context {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }

        let force = self.force_key.swap(false, Ordering::Relaxed)
            || self.frames_since_idr >= self.max_keyframe_interval;
        if force {
            self.encoder.force_intra_frame(true);
        }

        let yuv = YUVBuffer::with_rgb(self.width as usize, self.height as usize, &frame.data);
        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| BeamError::VideoEncode(e.to_string()))?;
        let annex_b = bitstream.to_vec();

        let timestamp = rtp_timestamp(frame.pts_us);
        let raw: Vec<(NalKind, Vec<u8>)> = split_annex_b(&annex_b)
            .into_iter()
            .map(|nal| (nal_kind(nal), nal.to_vec()))
            .collect();

        let ordered = with_parameter_sets(raw, &mut self.sps, &mut self.pps);

        let mut idr_seen = false;
        let units: Vec<NalUnit> = ordered
            .into_iter()
            .map(|(kind, data)| {
                if kind == NalKind::IdrSlice {
                    idr_seen = true;
                }
                NalUnit::new(data, kind.is_keyframe(), timestamp)
            })
            .collect();

        if idr_seen {
            self.frames_since_idr = 0;
        } else {
            self.frames_since_idr += 1;
        }
        self.frames_encoded += 1;
        if units.is_empty() {
            debug!("encoder produced no output for pts {}", frame.pts_us);
        }
        Ok(units)
    }
}

/// Guarantee that an IDR slice is preceded by SPS and PPS in the same
/// delivery group, caching the most recent parameter sets across calls.
fn with_parameter_sets(
    nals: Vec<(NalKind, Vec<u8>)>,
    sps_cache: &mut Option<Vec<u8>>,
    pps_cache: &mut Option<Vec<u8>>,
) -> Vec<(NalKind, Vec<u8>)> {
    let mut out: Vec<(NalKind, Vec<u8>)> = Vec::with_capacity(nals.len() + 2);
    let mut sps_emitted = false;
    let mut pps_emitted = false;

    for (kind, data) in nals {
        match kind {
            NalKind::Sps => {
                *sps_cache = Some(data.clone());
                sps_emitted = true;
            }
            NalKind::Pps => {
                *pps_cache = Some(data.clone());
                pps_emitted = true;
            }
            NalKind::IdrSlice => {
                if !sps_emitted {
                    if let Some(sps) = sps_cache.clone() {
                        out.push((NalKind::Sps, sps));
                        sps_emitted = true;
                    }
                }
                if !pps_emitted {
                    if let Some(pps) = pps_cache.clone() {
                        out.push((NalKind::Pps, pps));
                        pps_emitted = true;
                    }
                }
            }
            _ => {}
        }
        out.push((kind, data));
    }
    out
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::capture::TestPatternSource;

    fn frame(width: u32, height: u32, n: u64) -> VideoFrame {
        VideoFrame {
            width,
            height,
            data: TestPatternSource::render(width, height, n),
            pts_us: n * 33_333,
        }
    }

    #[test]
    fn timestamp_conversions() {
        assert_eq!(rtp_timestamp(0), 0);
        assert_eq!(rtp_timestamp(1_000_000), 90_000);
        assert_eq!(rtp_timestamp(33_333), 2_999);
        // Truncation to 32 bits wraps.
        let big = (u32::MAX as u64 + 10) * 100 / 9;
        assert!(rtp_timestamp(big) < 90_000);

        let us = pts_from_rtp(90_000);
        assert_eq!(us, 1_000_000);
    }

    #[test]
    fn first_frame_emits_parameter_sets_then_idr() {
        let config = BeamConfig::default();
        let mut enc = VideoEncoder::new(64, 64, &config).unwrap();
        let units = enc.encode(&frame(64, 64, 0)).unwrap();

        let kinds: Vec<NalKind> = units.iter().map(|u| nal_kind(&u.data)).collect();
        let sps_at = kinds.iter().position(|k| *k == NalKind::Sps).expect("sps");
        let pps_at = kinds.iter().position(|k| *k == NalKind::Pps).expect("pps");
        let idr_at = kinds
            .iter()
            .position(|k| *k == NalKind::IdrSlice)
            .expect("idr");
        assert!(sps_at < pps_at && pps_at < idr_at);

        // SPS, PPS and IDR all marked keyframe, same timestamp.
        for unit in &units {
            assert_eq!(unit.timestamp, rtp_timestamp(0));
            if nal_kind(&unit.data).is_keyframe() {
                assert!(unit.is_keyframe);
            }
        }
    }

    #[test]
    fn force_keyframe_applies_to_next_frame() {
        let config = BeamConfig::default();
        let mut enc = VideoEncoder::new(64, 64, &config).unwrap();
        enc.encode(&frame(64, 64, 0)).unwrap();

        // Settle into delta frames.
        let deltas = enc.encode(&frame(64, 64, 1)).unwrap();
        assert!(deltas.iter().all(|u| !u.is_keyframe));

        enc.force_keyframe();
        let forced = enc.encode(&frame(64, 64, 2)).unwrap();
        assert!(
            forced
                .iter()
                .any(|u| nal_kind(&u.data) == NalKind::IdrSlice),
            "expected an IDR after force_keyframe"
        );
        // The flag is one-shot.
        let after = enc.encode(&frame(64, 64, 3)).unwrap();
        assert!(after.iter().all(|u| nal_kind(&u.data) != NalKind::IdrSlice));
    }

    #[test]
    fn keyframe_handle_works_across_owners() {
        let config = BeamConfig::default();
        let mut enc = VideoEncoder::new(64, 64, &config).unwrap();
        enc.encode(&frame(64, 64, 0)).unwrap();
        enc.encode(&frame(64, 64, 1)).unwrap();

        let handle = enc.keyframe_handle();
        handle.store(true, Ordering::Relaxed);
        let forced = enc.encode(&frame(64, 64, 2)).unwrap();
        assert!(forced
            .iter()
            .any(|u| nal_kind(&u.data) == NalKind::IdrSlice));
    }

    #[test]
    fn interval_cadence_forces_idr() {
        let config = BeamConfig {
            max_keyframe_interval: 5,
            ..BeamConfig::default()
        };
        let mut enc = VideoEncoder::new(64, 64, &config).unwrap();
        let mut idr_frames = Vec::new();
        for n in 0..12u64 {
            let units = enc.encode(&frame(64, 64, n)).unwrap();
            if units
                .iter()
                .any(|u| nal_kind(&u.data) == NalKind::IdrSlice)
            {
                idr_frames.push(n);
            }
        }
        assert!(idr_frames.len() >= 2, "cadence produced {idr_frames:?}");
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let config = BeamConfig::default();
        let mut enc = VideoEncoder::new(64, 64, &config).unwrap();
        let err = enc.encode(&frame(32, 32, 0)).unwrap_err();
        assert!(matches!(err, BeamError::VideoEncode(_)));
    }

    #[test]
    fn parameter_set_injection_before_bare_idr() {
        let mut sps = Some(vec![0x67, 0x01]);
        let mut pps = Some(vec![0x68, 0x02]);
        let out = with_parameter_sets(
            vec![(NalKind::IdrSlice, vec![0x65, 0x03])],
            &mut sps,
            &mut pps,
        );
        let kinds: Vec<NalKind> = out.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![NalKind::Sps, NalKind::Pps, NalKind::IdrSlice]);
    }

    #[test]
    fn parameter_sets_not_duplicated_when_already_present() {
        let mut sps = None;
        let mut pps = None;
        let out = with_parameter_sets(
            vec![
                (NalKind::Sps, vec![0x67, 0x01]),
                (NalKind::Pps, vec![0x68, 0x02]),
                (NalKind::IdrSlice, vec![0x65, 0x03]),
            ],
            &mut sps,
            &mut pps,
        );
        assert_eq!(out.len(), 3);
        assert_eq!(sps.as_deref(), Some(&[0x67, 0x01][..]));
        assert_eq!(pps.as_deref(), Some(&[0x68, 0x02][..]));
    }
}
