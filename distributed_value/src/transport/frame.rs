//! Length-delimited framing for scalar and vector payloads.
//!
//! ```text
//! frame   := u32 LE length | body
//! body    := 0x01 | i64 LE                       (scalar)
//!          | 0x02 | u32 LE count | f32 LE × count (vector)
//! ```

use std::io::{Read, Write};

use thiserror::Error;

use super::Payload;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame too large: {len} > {max}")]
    TooLarge { len: u32, max: u32 },
    #[error("unexpected EOF while reading frame")]
    UnexpectedEof,
    #[error("connection closed")]
    Closed,
    #[error("unknown payload kind: {0}")]
    BadKind(u8),
    #[error("payload length mismatch: got {got} bytes, expected {expected}")]
    BadLength { got: usize, expected: usize },
}

/// Largest frame body accepted, in bytes.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

const KIND_SCALAR: u8 = 1;
const KIND_VECTOR: u8 = 2;

/// Write one length-prefixed frame and flush.
pub fn write_frame<W: Write>(w: &mut W, body: &[u8]) -> Result<(), FrameError> {
    let len: u32 = body.len().try_into().map_err(|_| FrameError::TooLarge {
        len: u32::MAX,
        max: MAX_FRAME_LEN,
    })?;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    w.write_all(&len.to_le_bytes())?;
    w.write_all(body)?;
    w.flush()?;
    Ok(())
}

/// Read one frame body.
///
/// A clean EOF before the length prefix is `Closed`; EOF anywhere else is
/// `UnexpectedEof`.
pub fn read_frame<R: Read>(r: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut len_bytes = [0u8; 4];
    match r.read(&mut len_bytes[..1])? {
        0 => return Err(FrameError::Closed),
        _ => read_exact_or_eof(r, &mut len_bytes[1..])?,
    }
    let len = u32::from_le_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    let mut body = vec![0u8; len as usize];
    read_exact_or_eof(r, &mut body)?;
    Ok(body)
}

fn read_exact_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(), FrameError> {
    let mut off = 0usize;
    while off < buf.len() {
        match r.read(&mut buf[off..])? {
            0 => return Err(FrameError::UnexpectedEof),
            n => off += n,
        }
    }
    Ok(())
}

/// Encode a payload as a frame body.
pub fn encode_payload(payload: &Payload) -> Vec<u8> {
    match payload {
        Payload::Scalar(value) => {
            let mut out = Vec::with_capacity(9);
            out.push(KIND_SCALAR);
            out.extend_from_slice(&value.to_le_bytes());
            out
        }
        Payload::Vector(values) => {
            let mut out = Vec::with_capacity(5 + values.len() * 4);
            out.push(KIND_VECTOR);
            out.extend_from_slice(&(values.len() as u32).to_le_bytes());
            for &v in values {
                out.extend_from_slice(&v.to_le_bytes());
            }
            out
        }
    }
}

/// Decode a frame body into a payload.
pub fn decode_payload(body: &[u8]) -> Result<Payload, FrameError> {
    let (&kind, rest) = body.split_first().ok_or(FrameError::BadLength {
        got: 0,
        expected: 1,
    })?;
    match kind {
        KIND_SCALAR => {
            let bytes: [u8; 8] = rest.try_into().map_err(|_| FrameError::BadLength {
                got: rest.len(),
                expected: 8,
            })?;
            Ok(Payload::Scalar(i64::from_le_bytes(bytes)))
        }
        KIND_VECTOR => {
            if rest.len() < 4 {
                return Err(FrameError::BadLength {
                    got: rest.len(),
                    expected: 4,
                });
            }
            let (count, data) = rest.split_at(4);
            let count = u32::from_le_bytes([count[0], count[1], count[2], count[3]]) as usize;
            if data.len() != count * 4 {
                return Err(FrameError::BadLength {
                    got: data.len(),
                    expected: count * 4,
                });
            }
            let values = data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            Ok(Payload::Vector(values))
        }
        other => Err(FrameError::BadKind(other)),
    }
}

/// Frame and write one payload.
pub fn write_payload<W: Write>(w: &mut W, payload: &Payload) -> Result<(), FrameError> {
    write_frame(w, &encode_payload(payload))
}

/// Read and decode one payload.
pub fn read_payload<R: Read>(r: &mut R) -> Result<Payload, FrameError> {
    decode_payload(&read_frame(r)?)
}
