//! Stream framing layer
//!
//! TCP delivers bytes, not messages: several envelopes may arrive in one
//! read and one envelope may be split across many. Each frame is a JSON
//! envelope terminated by a single NUL byte; JSON escapes control
//! characters, so the delimiter can never appear inside a payload. The
//! decoder only parses once a full frame has accumulated and keeps any
//! residual bytes buffered for the next attempt, which makes reassembly
//! independent of how the transport chunks its reads.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::AppError;
use crate::message::{Envelope, Inbound};

/// Frame delimiter, guaranteed absent from JSON payload encoding.
pub const DELIMITER: u8 = 0x00;

/// Upper bound for a single frame. A connection that accumulates more
/// than this without a delimiter is not speaking the protocol.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// NUL-delimited envelope codec for use with `tokio_util::codec::Framed`.
#[derive(Debug, Default)]
pub struct EnvelopeCodec;

impl Decoder for EnvelopeCodec {
    type Item = Inbound;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>, AppError> {
        loop {
            let Some(pos) = src.iter().position(|&b| b == DELIMITER) else {
                if src.len() > MAX_FRAME_SIZE {
                    return Err(AppError::Frame(format!(
                        "frame exceeds {MAX_FRAME_SIZE} bytes without a delimiter"
                    )));
                }
                // Incomplete frame, wait for more bytes
                return Ok(None);
            };

            let frame = src.split_to(pos);
            src.advance(1); // consume the delimiter

            // Stray padding around frames (delimiter runs, 0xcc fill
            // some clients emit) is trimmed from the edges only; 0xcc
            // is a legal UTF-8 lead byte inside a JSON payload.
            let body = trim_padding(&frame);
            if body.is_empty() {
                continue;
            }

            return Ok(Some(Inbound::classify(body)));
        }
    }
}

fn trim_padding(frame: &[u8]) -> &[u8] {
    let is_pad = |b: &u8| *b == DELIMITER || *b == 0xcc;
    let Some(start) = frame.iter().position(|b| !is_pad(b)) else {
        return &[];
    };
    let end = frame.iter().rposition(|b| !is_pad(b)).unwrap_or(start) + 1;
    &frame[start..end]
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = AppError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), AppError> {
        let payload = serde_json::to_vec(&item)?;
        dst.reserve(payload.len() + 1);
        dst.put_slice(&payload);
        dst.put_u8(DELIMITER);
        Ok(())
    }
}
