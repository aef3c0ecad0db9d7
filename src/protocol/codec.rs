//! Protocol codec for encoding/decoding messages
//!
//! Handles serialization and framing. Frames are newline-delimited JSON:
//! the encoder appends the terminator to each compact document, the decoder
//! buffers partial reads until a full line is available, so torn or
//! coalesced TCP reads never produce a torn message.

use bytes::{BufMut, BytesMut};
use std::io;
use thiserror::Error;

use super::{Request, Response, FRAME_DELIMITER, MAX_FRAME_SIZE};

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("frame too large: {0} bytes (max: {1})")]
    FrameTooLarge(usize, usize),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encodes requests into the wire format
#[derive(Debug, Default)]
pub struct Encoder;

impl Encoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode a request into a buffer as one newline-terminated frame
    pub fn encode(&mut self, request: &Request, buf: &mut BytesMut) -> Result<(), CodecError> {
        let payload = serde_json::to_vec(request)?;

        if payload.len() >= MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge(payload.len(), MAX_FRAME_SIZE));
        }

        buf.put_slice(&payload);
        buf.put_u8(FRAME_DELIMITER);
        Ok(())
    }
}

/// Decodes replies from the wire format
#[derive(Debug, Default)]
pub struct Decoder {
    /// Bytes already scanned for a delimiter, skipped on the next pass
    scanned: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self { scanned: 0 }
    }

    /// Attempt to decode one reply from the buffer.
    /// Returns Ok(None) if more data is needed.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Response>, CodecError> {
        if let Some(offset) = buf[self.scanned..]
            .iter()
            .position(|&b| b == FRAME_DELIMITER)
        {
            let line = buf.split_to(self.scanned + offset + 1);
            self.scanned = 0;

            let response: Response = serde_json::from_slice(&line[..line.len() - 1])?;
            return Ok(Some(response));
        }

        self.scanned = buf.len();
        if buf.len() >= MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge(buf.len(), MAX_FRAME_SIZE));
        }

        Ok(None)
    }
}
