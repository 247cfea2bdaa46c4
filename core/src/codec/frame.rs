use std::io::{ErrorKind, Read, Write};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::types::CodecError;
use crate::constants::{FRAME_PREFIX_LEN, MAX_FRAME_LEN, READ_PREALLOC_LIMIT};

/// Encode one JSON frame into a fresh buffer.
///
/// Layout:
///
/// ```text
/// [ length (4, big-endian u32) ]
/// [ UTF-8 JSON (length) ]
/// ```
pub fn encode_frame<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    let json = serde_json::to_vec(value)?;
    if json.len() > MAX_FRAME_LEN {
        return Err(CodecError::Malformed(format!(
            "frame of {} bytes exceeds the {} byte limit",
            json.len(),
            MAX_FRAME_LEN
        )));
    }

    let mut out = Vec::with_capacity(FRAME_PREFIX_LEN + json.len());
    out.write_u32::<BigEndian>(json.len() as u32)?;
    out.extend_from_slice(&json);
    Ok(out)
}

pub fn write_frame<W, T>(w: &mut W, value: &T) -> Result<(), CodecError>
where
    W: Write + ?Sized,
    T: Serialize + ?Sized,
{
    let buf = encode_frame(value)?;
    w.write_all(&buf)?;
    Ok(())
}

/// Read one JSON frame and deserialize it.
///
/// Returns `EndOfStream` when the stream ends exactly at the prefix.
pub fn read_frame<R, T>(r: &mut R) -> Result<T, CodecError>
where
    R: Read + ?Sized,
    T: DeserializeOwned,
{
    let body = read_frame_bytes(r)?;
    Ok(serde_json::from_slice(&body)?)
}

/// Read the raw JSON bytes of one frame.
pub fn read_frame_bytes<R: Read + ?Sized>(r: &mut R) -> Result<Vec<u8>, CodecError> {
    let len = read_prefix(r)?;
    if len > MAX_FRAME_LEN {
        return Err(CodecError::TruncatedStream(format!(
            "length prefix {} exceeds the {} byte limit",
            len, MAX_FRAME_LEN
        )));
    }
    read_exact_or_truncated(r, len)
}

/// Read exactly `len` bytes; a short read is a truncated stream, never EOF.
///
/// `len` comes from the peer, so the buffer grows with the bytes that
/// actually arrive instead of being allocated up front.
pub fn read_exact_or_truncated<R: Read + ?Sized>(r: &mut R, len: usize) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(len.min(READ_PREALLOC_LIMIT));
    let want = u64::try_from(len).map_err(|_| CodecError::TruncatedStream(format!("expected {} body bytes", len)))?;
    match (&mut *r).take(want).read_to_end(&mut buf) {
        Ok(n) if n == len => Ok(buf),
        Ok(n) => Err(CodecError::TruncatedStream(format!("expected {} body bytes, got {}", len, n))),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(CodecError::TruncatedStream(format!(
            "expected {} body bytes",
            len
        ))),
        Err(e) => Err(CodecError::Io(e)),
    }
}

fn read_prefix<R: Read + ?Sized>(r: &mut R) -> Result<usize, CodecError> {
    let mut buf = [0u8; FRAME_PREFIX_LEN];
    let mut off = 0;

    while off < FRAME_PREFIX_LEN {
        match r.read(&mut buf[off..]) {
            Ok(0) if off == 0 => return Err(CodecError::EndOfStream),
            Ok(0) => {
                return Err(CodecError::TruncatedStream(format!(
                    "length prefix cut after {} of {} bytes",
                    off, FRAME_PREFIX_LEN
                )))
            }
            Ok(n) => off += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CodecError::Io(e)),
        }
    }

    Ok(BigEndian::read_u32(&buf) as usize)
}
