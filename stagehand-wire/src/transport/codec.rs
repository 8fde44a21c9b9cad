//! Length-prefixed JSON framing codec.
//!
//! Wire format, both directions: `ASCII_DECIMAL(len(body)) ":" body`, where
//! `body` is one UTF-8 JSON value and the length counts its encoded bytes.
//! No maximum body size is enforced at this layer.

use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use super::FrameError;

/// Codec for `len:json` frames.
///
/// Stateless: the header is rescanned from the buffer start on each decode
/// attempt, so partial delivery (down to one byte at a time) reassembles
/// correctly.
///
/// A length-valid body that fails JSON parsing is consumed whole and
/// yielded as an `Err` item, not a decoder error: `Framed` treats a decoder
/// error as terminal, and the stream is still aligned on the next frame
/// boundary, so the connection must stay readable. Header errors and
/// truncation are real desyncs and do surface as decoder errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Result<Value, serde_json::Error>;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Scan the header: decimal digits terminated by a colon.
        let mut colon = None;
        for (i, &b) in src.iter().enumerate() {
            match b {
                b'0'..=b'9' => continue,
                b':' => {
                    colon = Some(i);
                    break;
                }
                other => {
                    return Err(FrameError::InvalidHeader(format!(
                        "unexpected byte 0x{other:02x} before ':'"
                    )));
                }
            }
        }
        let Some(colon) = colon else {
            // Header incomplete; wait for more bytes.
            return Ok(None);
        };
        if colon == 0 {
            return Err(FrameError::InvalidHeader(
                "empty length header".to_string(),
            ));
        }

        // The header bytes are guaranteed ASCII digits at this point.
        let digits = std::str::from_utf8(&src[..colon]).map_err(|_| {
            FrameError::InvalidHeader("length header is not ASCII".to_string())
        })?;
        let len: usize = digits
            .parse()
            .map_err(|_| FrameError::InvalidHeader(format!("unparseable length {digits:?}")))?;

        let frame_len = colon + 1 + len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(colon + 1);
        let body = src.split_to(len);
        Ok(Some(serde_json::from_slice(&body)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            // Peer closed mid-header or mid-body.
            None => Err(FrameError::Truncated { buffered: src.len() }),
        }
    }
}

impl Encoder<&Value> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &Value, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(item)?;
        let header = body.len().to_string();
        dst.reserve(header.len() + 1 + body.len());
        dst.put_slice(header.as_bytes());
        dst.put_u8(b':');
        dst.put_slice(&body);
        Ok(())
    }
}
