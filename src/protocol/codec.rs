// Frame codec
// [4B little-endian body length][body: one JSON object tagged by "Type"]

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::protocol::message::{ProtocolMessage, WireMessage};

pub const LENGTH_PREFIX: usize = 4;
pub const MAX_FRAME_LEN: usize = 64 * 1024;

pub fn encode_frame(message: &ProtocolMessage) -> Result<Bytes, ProtocolError> {
    let wire = WireMessage::from_message(message)?;
    let body = serde_json::to_vec(&wire)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(body.len()));
    }

    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX + body.len());
    frame.put_u32_le(body.len() as u32);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Decodes one frame body. An unrecognised "Type" is not an error: it comes
/// back as `ProtocolMessage::Unknown` so the dispatcher can log and drop it.
pub fn decode_frame_body(body: &[u8]) -> Result<Vec<ProtocolMessage>, ProtocolError> {
    let value: serde_json::Value = serde_json::from_slice(body)?;

    let tag = match value.get("Type").and_then(|tag| tag.as_str()) {
        Some(tag) => tag,
        None => {
            return Err(ProtocolError::MissingField {
                message_type: "frame",
                field: "Type",
            })
        }
    };
    if !WireMessage::is_known_type(tag) {
        return Ok(vec![ProtocolMessage::Unknown(tag.to_string())]);
    }

    let wire: WireMessage = serde_json::from_value(value)?;
    wire.into_messages()
}

/// Accumulates stream bytes and splits them into frame bodies.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Read target for the socket.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    #[cfg(test)]
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Returns the next complete body, `None` if more bytes are needed.
    /// An oversized length prefix is unrecoverable for the stream.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        if self.buf.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX];
        prefix.copy_from_slice(&self.buf[..LENGTH_PREFIX]);
        let body_len = u32::from_le_bytes(prefix) as usize;
        if body_len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge(body_len));
        }

        if self.buf.len() < LENGTH_PREFIX + body_len {
            self.buf.reserve(LENGTH_PREFIX + body_len - self.buf.len());
            return Ok(None);
        }

        self.buf.advance(LENGTH_PREFIX);
        Ok(Some(self.buf.split_to(body_len).freeze()))
    }
}
