use std::marker::PhantomData;

use bytes::{Buf, BytesMut};
use prost::Message;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Result, WireError};

/// Upper bound on a single frame body.
///
/// The length prefix is attacker-controlled (or at least bug-controlled); refuse
/// to buffer more than this before we even start decoding the body.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024; // 16 MiB

/// A varint never needs more than 10 bytes to encode a `u64`.
const MAX_VARINT_LEN: usize = 10;

/// Varint-length-delimited protobuf framing.
///
/// Decodes messages of type `D` and encodes any protobuf message. The client
/// uses `DelimitedCodec<DebugEvent>`; the mock server uses
/// `DelimitedCodec<DebugRequest>`.
#[derive(Debug)]
pub struct DelimitedCodec<D> {
    max_frame_bytes: usize,
    _marker: PhantomData<fn() -> D>,
}

impl<D> DelimitedCodec<D> {
    pub fn new() -> Self {
        Self::with_max_frame_bytes(MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            _marker: PhantomData,
        }
    }
}

impl<D> Default for DelimitedCodec<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Clone for DelimitedCodec<D> {
    fn clone(&self) -> Self {
        Self::with_max_frame_bytes(self.max_frame_bytes)
    }
}

/// Returns `(body_len, prefix_len)` once the whole varint prefix is buffered.
fn peek_length_prefix(buf: &[u8]) -> Result<Option<(usize, usize)>> {
    let Some(end) = buf
        .iter()
        .take(MAX_VARINT_LEN)
        .position(|byte| byte & 0x80 == 0)
    else {
        if buf.len() >= MAX_VARINT_LEN {
            return Err(WireError::Protocol(
                "length prefix is longer than 10 bytes".to_string(),
            ));
        }
        return Ok(None);
    };

    let len = prost::decode_length_delimiter(&buf[..=end])
        .map_err(|err| WireError::Protocol(format!("invalid length prefix: {err}")))?;
    Ok(Some((len, end + 1)))
}

impl<D: Message + Default> Decoder for DelimitedCodec<D> {
    type Item = D;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<D>> {
        let Some((len, prefix)) = peek_length_prefix(&src[..])? else {
            return Ok(None);
        };

        if len > self.max_frame_bytes {
            return Err(WireError::Protocol(format!(
                "frame length {len} exceeds maximum allowed size {}",
                self.max_frame_bytes
            )));
        }

        let total = prefix + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(prefix);
        let body = src.split_to(len).freeze();
        D::decode(body)
            .map(Some)
            .map_err(|err| WireError::Protocol(format!("malformed message: {err}")))
    }
}

impl<D, E: Message> Encoder<E> for DelimitedCodec<D> {
    type Error = WireError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<()> {
        let len = item.encoded_len();
        if len > self.max_frame_bytes {
            return Err(WireError::Protocol(format!(
                "outgoing message of {len} bytes exceeds maximum allowed size {}",
                self.max_frame_bytes
            )));
        }
        dst.reserve(prost::length_delimiter_len(len) + len);
        item.encode_length_delimited(dst)
            .map_err(|err| WireError::Protocol(format!("failed to encode message: {err}")))
    }
}
