//! Typed primitive read/write protocol.
//!
//! # Wire layout
//!
//! | Kind     | Bytes | Encoding                                          |
//! |----------|-------|---------------------------------------------------|
//! | `int`    | 4     | big-endian two's complement                       |
//! | `uint`   | 4     | big-endian                                        |
//! | `size`   | 4     | big-endian `u32`, range-checked on write          |
//! | `long64` | 8     | high `u32` half then low `u32` half, big-endian   |
//! | `float`  | 4     | big-endian IEEE-754 single precision              |
//! | `string` | 4+n+1 | `uint` length, `n` payload bytes, one `0x00`      |
//!
//! The width of `size` is fixed at 32 bits regardless of the host pointer
//! width, so files written on 64-bit hosts stay readable on 32-bit hosts.
//!
//! Writers are extension traits over [`std::io::Write`] / [`std::io::Read`],
//! in the manner of `byteorder`.  The byteorder traits are never imported
//! here, as their `read_int`/`write_uint` would collide with ours.  Strings are decoded through a
//! [`StringDecoder`], which owns the reusable decode buffer.

use std::io::{Read, Write};

use byteorder::BigEndian;

use crate::config::SioConfig;
use crate::error::{Result, SioError};

/// Default ceiling on a decoded string length (16 MiB).
pub const MAX_STRING_LEN: u32 = 16 * 1024 * 1024;
/// Initial capacity of a fresh decode buffer.
pub const DEFAULT_DECODE_BUFFER: usize = 1024;

// ── Write ────────────────────────────────────────────────────────────────────

pub trait SioWriteExt: Write {
    fn write_int(&mut self, v: i32) -> Result<()> {
        byteorder::WriteBytesExt::write_i32::<BigEndian>(self, v)?;
        Ok(())
    }

    fn write_uint(&mut self, v: u32) -> Result<()> {
        byteorder::WriteBytesExt::write_u32::<BigEndian>(self, v)?;
        Ok(())
    }

    /// Write a pointer-sized value as a portable 32-bit quantity.
    fn write_size(&mut self, v: usize) -> Result<()> {
        let narrow = u32::try_from(v).map_err(|_| SioError::EncodingOverflow {
            field: "size",
            value: v as u64,
            max:   u32::MAX as u64,
        })?;
        self.write_uint(narrow)
    }

    fn write_long64(&mut self, v: i64) -> Result<()> {
        let bits = v as u64;
        self.write_uint((bits >> 32) as u32)?;
        self.write_uint(bits as u32)
    }

    fn write_float(&mut self, v: f32) -> Result<()> {
        byteorder::WriteBytesExt::write_f32::<BigEndian>(self, v)?;
        Ok(())
    }

    /// Write `[len][bytes][NUL]`.  `s` may contain embedded zero bytes.
    fn write_string(&mut self, s: impl AsRef<[u8]>) -> Result<()> {
        let bytes = s.as_ref();
        let len = u32::try_from(bytes.len()).map_err(|_| SioError::EncodingOverflow {
            field: "string length",
            value: bytes.len() as u64,
            max:   u32::MAX as u64,
        })?;
        self.write_uint(len)?;
        self.write_all(bytes)?;
        self.write_all(&[0])?;
        Ok(())
    }
}

impl<W: Write + ?Sized> SioWriteExt for W {}

// ── Read ─────────────────────────────────────────────────────────────────────

pub trait SioReadExt: Read {
    fn read_int(&mut self) -> Result<i32> {
        Ok(byteorder::ReadBytesExt::read_i32::<BigEndian>(self)?)
    }

    fn read_uint(&mut self) -> Result<u32> {
        Ok(byteorder::ReadBytesExt::read_u32::<BigEndian>(self)?)
    }

    fn read_size(&mut self) -> Result<usize> {
        let v = self.read_uint()?;
        usize::try_from(v)
            .map_err(|_| SioError::malformed(format!("size {v} exceeds host pointer width")))
    }

    fn read_long64(&mut self) -> Result<i64> {
        let high = self.read_uint()? as u64;
        let low  = self.read_uint()? as u64;
        Ok(((high << 32) | low) as i64)
    }

    fn read_float(&mut self) -> Result<f32> {
        Ok(byteorder::ReadBytesExt::read_f32::<BigEndian>(self)?)
    }
}

impl<R: Read + ?Sized> SioReadExt for R {}

// ── String decoding ──────────────────────────────────────────────────────────

/// Reusable decode buffer for length-prefixed strings.
///
/// [`read`](StringDecoder::read) returns a slice that borrows the decoder,
/// so the result must be copied out before the next string is decoded.
/// The buffer keeps a NUL after the payload, but the payload itself may
/// contain zero bytes; always use the returned length.
///
/// One decode at a time per decoder.  Give each stream its own decoder.
#[derive(Debug)]
pub struct StringDecoder {
    buf:     Vec<u8>,
    max_len: u32,
}

impl Default for StringDecoder {
    fn default() -> Self {
        Self::with_limits(DEFAULT_DECODE_BUFFER, MAX_STRING_LEN)
    }
}

impl StringDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(initial_capacity: usize, max_len: u32) -> Self {
        Self { buf: vec![0u8; initial_capacity.max(1)], max_len }
    }

    pub fn from_config(config: &SioConfig) -> Self {
        Self::with_limits(config.initial_buffer_size, config.max_string_len)
    }

    /// Current buffer size in bytes.  Grows on demand, never shrinks.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn read<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<&[u8]> {
        let len = reader.read_uint()?;
        if len > self.max_len {
            return Err(SioError::malformed(format!(
                "string length {len} exceeds ceiling {}", self.max_len
            )));
        }
        let len = len as usize;
        if self.buf.len() < len + 1 {
            self.buf.resize(len + 1, 0);
        }
        reader.read_exact(&mut self.buf[..len + 1])?;
        if self.buf[len] != 0 {
            return Err(SioError::malformed(format!(
                "string of length {len} is not NUL-terminated"
            )));
        }
        Ok(&self.buf[..len])
    }

    pub fn read_owned<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<Vec<u8>> {
        Ok(self.read(reader)?.to_vec())
    }

    /// Decode a string that must be valid UTF-8.
    pub fn read_utf8<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<String> {
        let bytes = self.read(reader)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| SioError::malformed(format!("string is not UTF-8: {e}")))
    }
}
