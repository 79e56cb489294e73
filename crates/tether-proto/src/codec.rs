use std::io::{self, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    constants::{LEN_PREFIX, MAX_PAYLOAD},
    error::ProtoError,
};

/// Encode `payload` into a single frame buffer.
///
/// Fails with [`ProtoError::PayloadTooLarge`] when the payload does not fit
/// the `u16` length prefix.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, ProtoError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(ProtoError::PayloadTooLarge(payload.len()));
    }

    let mut out = BytesMut::with_capacity(LEN_PREFIX + payload.len());
    out.put_u16_le(payload.len() as u16);
    out.extend_from_slice(payload);
    Ok(out.freeze())
}

/// Write one frame to `w` and flush it.
///
/// Size is validated before anything touches the writer. On a write or flush
/// error some bytes may already be on the wire, so the stream must be treated
/// as unusable afterwards.
pub fn write_frame<W: Write + ?Sized>(w: &mut W, payload: &[u8]) -> Result<(), ProtoError> {
    let frame = encode_frame(payload)?;
    w.write_all(&frame).map_err(ProtoError::SendFailed)?;
    w.flush().map_err(ProtoError::SendFailed)?;
    Ok(())
}

/// Block until one full frame has been read from `r`.
///
/// Returns `Ok(None)` on clean end-of-stream, including a stream that ends
/// in the middle of a frame. A truncated payload is never surfaced.
pub fn read_frame<R: Read + ?Sized>(r: &mut R) -> Result<Option<Bytes>, ProtoError> {
    read_frame_limited(r, MAX_PAYLOAD)
}

/// Same as [`read_frame`], but rejects frames whose announced payload length
/// exceeds `max_payload` before reading any payload bytes.
pub fn read_frame_limited<R: Read + ?Sized>(
    r: &mut R,
    max_payload: usize,
) -> Result<Option<Bytes>, ProtoError> {
    let mut len_buf = [0u8; LEN_PREFIX];
    if !read_exact_or_eof(r, &mut len_buf)? {
        return Ok(None);
    }

    let len = u16::from_le_bytes(len_buf) as usize;
    if len > max_payload {
        return Err(ProtoError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    if !read_exact_or_eof(r, &mut payload)? {
        return Ok(None);
    }
    Ok(Some(Bytes::from(payload)))
}

/// `read_exact` that maps a short read into `false` instead of an error.
fn read_exact_or_eof<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> Result<bool, ProtoError> {
    match r.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(ProtoError::ReceiveFailed(e)),
    }
}
