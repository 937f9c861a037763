//! Native messaging framing for tokio I/O.
//!
//! Framing: `[4 bytes: payload length, native-endian u32][N bytes: UTF-8 JSON]`
//!
//! Decoding is two-phase: [`FrameCodec`] yields raw payloads and
//! [`decode_frame`] turns them into messages, falling back to
//! [`RawEnvelope`] so a message of unknown type can still be answered.

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use super::protocol::{Inbound, MAX_INBOUND_SIZE, MAX_OUTBOUND_SIZE, Outbound, RawEnvelope};

/// Framing failures.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Frame-level codec: reads raw inbound payloads, writes [`Outbound`]
/// messages.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Length of the current frame being read, if the header has been consumed.
    pending_len: Option<usize>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self { pending_len: None }
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let payload_len = match self.pending_len {
            Some(len) => len,
            None => {
                if src.len() < 4 {
                    return Ok(None);
                }
                let len = src.get_u32_ne() as usize;
                if len > MAX_INBOUND_SIZE {
                    return Err(CodecError::PayloadTooLarge {
                        len,
                        max: MAX_INBOUND_SIZE,
                    });
                }
                self.pending_len = Some(len);
                len
            }
        };

        if src.len() < payload_len {
            src.reserve(payload_len - src.len());
            return Ok(None);
        }

        let payload = src.split_to(payload_len);
        self.pending_len = None;
        Ok(Some(payload))
    }
}

impl Encoder<Outbound> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_json(&item, MAX_OUTBOUND_SIZE, dst)
    }
}

/// Append `item` to `dst` as one length-prefixed JSON frame.
pub fn encode_json<T: Serialize>(item: &T, max: usize, dst: &mut BytesMut) -> Result<(), CodecError> {
    let payload = serde_json::to_vec(item)?;
    if payload.len() > max {
        return Err(CodecError::PayloadTooLarge {
            len: payload.len(),
            max,
        });
    }
    dst.reserve(4 + payload.len());
    dst.put_u32_ne(payload.len() as u32);
    dst.extend_from_slice(&payload);
    Ok(())
}

/// Result of attempting to decode a raw frame into a protocol message.
#[derive(Debug)]
pub enum DecodeResult {
    Ok(Box<Inbound>),
    /// Unknown type; the envelope carries the id to answer, if any.
    UnknownType(RawEnvelope),
    /// Could not even extract `{type}`.
    Malformed(serde_json::Error),
}

/// Attempt two-phase decode of a raw frame.
///
/// 1. Try to deserialize as [`Inbound`].
/// 2. On failure, try [`RawEnvelope`] to extract `{type, id}`.
/// 3. If both fail, return [`DecodeResult::Malformed`].
pub fn decode_frame(payload: &[u8]) -> DecodeResult {
    match serde_json::from_slice::<Inbound>(payload) {
        Ok(msg) => DecodeResult::Ok(Box::new(msg)),
        Err(e) => match serde_json::from_slice::<RawEnvelope>(payload) {
            Ok(envelope) => {
                tracing::debug!(msg_type = %envelope.msg_type, error = %e, "undecodable message");
                DecodeResult::UnknownType(envelope)
            }
            Err(e) => DecodeResult::Malformed(e),
        },
    }
}
