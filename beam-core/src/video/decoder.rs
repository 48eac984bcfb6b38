//! H.264 decoder front end.
//!
//! Consumes NAL units in arrival order. Parameter sets are cached;
//! when both are present and differ from the active pair, the
//! decompression context is rebuilt from them (the previous context is
//! released). Slices are only submitted once a context exists.
//!
//! The compression backend consumes Annex-B, so slices are framed with
//! start codes before submission; length-prefixed (AVCC) framing is
//! available in [`crate::video::nal`] for layers that require it.

use openh264::decoder::Decoder;
use openh264::OpenH264API;
use tracing::debug;

use crate::error::BeamError;
use crate::transport::NalUnit;
use crate::video::encoder::pts_from_rtp;
use crate::video::nal::{annex_b, nal_kind, NalKind};

// ── DecodedFrame ─────────────────────────────────────────────────

/// One decoded frame ready for display.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGB rows, `width * height * 3` bytes.
    pub data: Vec<u8>,
    /// Presentation timestamp in microseconds.
    pub pts_us: u64,
    /// Nominal display duration (1/30 s).
    pub duration_us: u64,
}

/// Nominal per-frame duration at the fixed 30 fps pipeline rate.
pub const FRAME_DURATION_US: u64 = 1_000_000 / 30;

// ── VideoDecoder ─────────────────────────────────────────────────

/// Decompression state for one incoming video flow.
pub struct VideoDecoder {
    context: Option<Decoder>,
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
    /// Parameter sets the active context was built from.
    active: Option<(Vec<u8>, Vec<u8>)>,
    frames_decoded: u64,
}

impl VideoDecoder {
    pub fn new() -> Self {
        Self {
            context: None,
            sps: None,
            pps: None,
            active: None,
            frames_decoded: 0,
        }
    }

    /// Whether a decompression context currently exists.
    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    /// Frames decoded so far.
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Feed one NAL in arrival order.
    ///
    /// Returns a decoded frame when the backend completes one.
    /// `Err(NeedsKeyframe)` means the caller should issue a
    /// `keyframe_request` and drop the slice; other errors are
    /// terminal for the context.
    pub fn submit(&mut self, nal: &NalUnit) -> Result<Option<DecodedFrame>, BeamError> {
        match nal_kind(&nal.data) {
            NalKind::Sps => {
                self.sps = Some(nal.data.clone());
                self.rebuild_if_changed()?;
                Ok(None)
            }
            NalKind::Pps => {
                self.pps = Some(nal.data.clone());
                self.rebuild_if_changed()?;
                Ok(None)
            }
            NalKind::IdrSlice | NalKind::Slice => self.decode_slice(nal),
            NalKind::Other(t) => {
                debug!("dropping unhandled NAL type {t}");
                Ok(None)
            }
        }
    }

    fn decode_slice(&mut self, nal: &NalUnit) -> Result<Option<DecodedFrame>, BeamError> {
        let Some(context) = self.context.as_mut() else {
            // No parameter sets yet: nothing can be decoded until the
            // sender provides a fresh keyframe group.
            return Err(BeamError::NeedsKeyframe);
        };

        let framed = annex_b(&nal.data);
        match context.decode(&framed) {
            Ok(Some(yuv)) => {
                let (width, height) = yuv.dimension_rgb();
                let mut data = vec![0u8; width * height * 3];
                yuv.write_rgb8(&mut data);
                self.frames_decoded += 1;
                Ok(Some(DecodedFrame {
                    width: width as u32,
                    height: height as u32,
                    data,
                    pts_us: pts_from_rtp(nal.timestamp),
                    duration_us: FRAME_DURATION_US,
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                // Reference state is gone (lost packets); recover via
                // the keyframe-request path rather than concealment.
                debug!("slice decode failed, requesting keyframe: {e}");
                Err(BeamError::NeedsKeyframe)
            }
        }
    }

    /// Rebuild the decompression context when a complete parameter-set
    /// pair differs from the one the active context was built from.
    fn rebuild_if_changed(&mut self) -> Result<(), BeamError> {
        let (Some(sps), Some(pps)) = (self.sps.clone(), self.pps.clone()) else {
            return Ok(());
        };
        if self.active.as_ref() == Some(&(sps.clone(), pps.clone())) {
            return Ok(());
        }

        // Releases any previous context.
        let mut context = Decoder::new(OpenH264API::from_source())
            .map_err(|e| BeamError::VideoDecode(format!("context: {e}")))?;

        // Prime the fresh context with the parameter sets; they produce
        // no frames on their own.
        for ps in [&sps, &pps] {
            if let Err(e) = context.decode(&annex_b(ps)) {
                return Err(BeamError::VideoDecode(format!("parameter sets: {e}")));
            }
        }

        self.context = Some(context);
        self.active = Some((sps, pps));
        debug!("decompression context rebuilt");
        Ok(())
    }
}

impl Default for VideoDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
