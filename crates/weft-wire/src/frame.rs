//! Line framing for byte transports
//!
//! Frame = one JSON-encoded envelope + `\n`

use bytes::{BufMut, Bytes, BytesMut};

use weft_core::{WeftError, WeftResult};

use crate::Envelope;

/// Frame terminator
pub const FRAME_DELIMITER: u8 = b'\n';

/// Maximum encoded envelope size, delimiter excluded
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Encode an envelope as a single delimited line
pub fn encode_frame(envelope: &Envelope) -> WeftResult<Bytes> {
    let json = serde_json::to_vec(envelope)?;
    if json.len() > MAX_FRAME_SIZE {
        return Err(WeftError::FrameTooLarge {
            size: json.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(json.len() + 1);
    buf.put_slice(&json);
    buf.put_u8(FRAME_DELIMITER);
    Ok(buf.freeze())
}

/// Decode one line (with or without its delimiter)
pub fn decode_frame(line: &[u8]) -> WeftResult<Envelope> {
    let line = line.strip_suffix(&[FRAME_DELIMITER]).unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.len() > MAX_FRAME_SIZE {
        return Err(WeftError::FrameTooLarge {
            size: line.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(serde_json::from_slice(line)?)
}
