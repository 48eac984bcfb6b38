//! Length-framed JSON codec for the control stream.
//!
//! Each frame is a 4-byte big-endian length followed by a UTF-8 JSON
//! body, one message per frame. A declared length at or beyond 1 MB is
//! a protocol violation and kills the connection.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::control::message::ControlMessage;
use crate::error::BeamError;

/// Hard cap on a single control frame body.
pub const MAX_CONTROL_FRAME: usize = 1_000_000;

/// Codec for `Framed<TcpStream, ControlCodec>`.
#[derive(Debug, Default)]
pub struct ControlCodec;

impl Decoder for ControlCodec {
    type Item = ControlMessage;
    type Error = BeamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ControlMessage>, BeamError> {
        if src.len() < 4 {
            return Ok(None);
        }

        let declared = u32::from_be_bytes(src[0..4].try_into().unwrap()) as usize;
        if declared >= MAX_CONTROL_FRAME {
            return Err(BeamError::FrameTooLarge {
                size: declared,
                max: MAX_CONTROL_FRAME,
            });
        }

        if src.len() < 4 + declared {
            src.reserve(4 + declared - src.len());
            return Ok(None);
        }

        src.advance(4);
        let body = src.split_to(declared);
        let message = serde_json::from_slice(&body)?;
        Ok(Some(message))
    }
}

impl Encoder<ControlMessage> for ControlCodec {
    type Error = BeamError;

    fn encode(&mut self, item: ControlMessage, dst: &mut BytesMut) -> Result<(), BeamError> {
        let body = serde_json::to_vec(&item)?;
        if body.len() >= MAX_CONTROL_FRAME {
            return Err(BeamError::FrameTooLarge {
                size: body.len(),
                max: MAX_CONTROL_FRAME,
            });
        }
        dst.reserve(4 + body.len());
        dst.put_u32(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
