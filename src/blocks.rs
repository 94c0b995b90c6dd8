// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Front-coded string blocks.
//!
//! A block holds up to [`BLOCK_STRIDE`](crate::format::BLOCK_STRIDE)
//! consecutive strings from the frozen pool. Entry 0 is stored in full
//! and acts as the block base; every later entry stores the length of
//! its common prefix with the base plus the remaining suffix bytes.
//! Each block may independently be deflated with a zlib stream; the
//! decoder detects compression by attempting to inflate and falling
//! back to the raw bytes.
//!
//! ```text
//! u16 stride
//! u16 kind=1 | u32 len    | len bytes          (entry 0, full)
//! u16 kind=2 | u16 prefix | u32 suflen | bytes (entries 1..)
//! ```
//!
//! `string_id → (block = id / stride, entry = id % stride)`; decoding
//! scans the block from the front, carrying the base.

use crate::error::{Error, Result};
use crate::format::BLOCK_STRIDE;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{self, Read, Write};

const KIND_FULL: u16 = 1;
const KIND_DELTA: u16 = 2;

const COMPRESS_LEVEL: u32 = 6;

/// Longest common prefix of `base` and `s` in bytes, backed off to a
/// character boundary so a delta entry never splits a code point.
fn common_prefix(base: &str, s: &str) -> usize {
    let mut n = base
        .as_bytes()
        .iter()
        .zip(s.as_bytes())
        .take_while(|(a, b)| a == b)
        .count();
    n = n.min(usize::from(u16::MAX));
    while !s.is_char_boundary(n) {
        n -= 1;
    }
    n
}

/// Encode one block of consecutive pool strings.
pub(crate) fn encode_block(items: &[String], compress: bool) -> io::Result<Vec<u8>> {
    let mut payload = Vec::new();
    payload.write_u16::<LittleEndian>(BLOCK_STRIDE as u16)?;
    let mut base: Option<&str> = None;
    for s in items {
        match base {
            None => {
                payload.write_u16::<LittleEndian>(KIND_FULL)?;
                payload.write_u32::<LittleEndian>(s.len() as u32)?;
                payload.extend_from_slice(s.as_bytes());
                base = Some(s);
            }
            Some(b) => {
                let prefix = common_prefix(b, s);
                let suffix = &s.as_bytes()[prefix..];
                payload.write_u16::<LittleEndian>(KIND_DELTA)?;
                payload.write_u16::<LittleEndian>(prefix as u16)?;
                payload.write_u32::<LittleEndian>(suffix.len() as u32)?;
                payload.extend_from_slice(suffix);
            }
        }
    }
    if compress {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::new(COMPRESS_LEVEL));
        enc.write_all(&payload)?;
        return enc.finish();
    }
    Ok(payload)
}

/// Inflate a block payload, or hand back the raw bytes when it is not a
/// zlib stream.
pub(crate) fn inflate_or_raw(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    match ZlibDecoder::new(raw).read_to_end(&mut out) {
        Ok(_) => out,
        Err(_) => raw.to_vec(),
    }
}

fn truncated() -> Error {
    Error::InvalidFormat("truncated string block".into())
}

fn take<'a>(payload: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8]> {
    let end = pos.checked_add(n).filter(|&e| e <= payload.len());
    let end = end.ok_or_else(truncated)?;
    let bytes = &payload[*pos..end];
    *pos = end;
    Ok(bytes)
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes)
        .map_err(|_| Error::InvalidFormat("invalid UTF-8 in string block".into()))
}

/// Decode entry `index` of an (already inflated) block payload.
pub(crate) fn decode_entry(payload: &[u8], index: usize) -> Result<String> {
    let mut pos = 0usize;
    let stride = LittleEndian::read_u16(take(payload, &mut pos, 2)?);
    if u32::from(stride) != BLOCK_STRIDE {
        return Err(Error::InvalidFormat(format!("bad block stride {stride}")));
    }
    let mut base: Option<String> = None;
    for i in 0..=index {
        let kind = LittleEndian::read_u16(take(payload, &mut pos, 2)?);
        let s = match kind {
            KIND_FULL => {
                let len = LittleEndian::read_u32(take(payload, &mut pos, 4)?) as usize;
                let s = utf8(take(payload, &mut pos, len)?)?.to_owned();
                base = Some(s.clone());
                s
            }
            KIND_DELTA => {
                let prefix = usize::from(LittleEndian::read_u16(take(payload, &mut pos, 2)?));
                let suflen = LittleEndian::read_u32(take(payload, &mut pos, 4)?) as usize;
                let suffix = utf8(take(payload, &mut pos, suflen)?)?;
                let b = base
                    .as_deref()
                    .ok_or_else(|| Error::InvalidFormat("delta entry before base".into()))?;
                if prefix > b.len() || !b.is_char_boundary(prefix) {
                    return Err(Error::InvalidFormat(format!(
                        "prefix length {prefix} outside block base"
                    )));
                }
                let mut s = String::with_capacity(prefix + suffix.len());
                s.push_str(&b[..prefix]);
                s.push_str(suffix);
                s
            }
            other => {
                return Err(Error::InvalidFormat(format!(
                    "unknown string entry kind {other}"
                )));
            }
        };
        if i == index {
            return Ok(s);
        }
    }
    Err(Error::InvalidFormat("string index past end of block".into()))
}
