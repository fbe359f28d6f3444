// This file is part of TRINCI.
//
// Copyright (C) 2021 Affidaty Spa.
//
// TRINCI is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the
// Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// TRINCI is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License
// for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with TRINCI. If not, see <https://www.gnu.org/licenses/>.

//! Deterministic binary codec used by every hashed structure.
//!
//! The wire format is MessagePack restricted to four shapes:
//! - lists, encoded as arrays with their element count;
//! - integers, encoded as `bin` holding the minimal big-endian two's
//!   complement representation of the value;
//! - byte strings, encoded as `bin` (absent values are encoded as `nil`);
//! - text strings, encoded as `str`.
//!
//! For any tuple of values there is exactly one encoding.

use crate::{Error, ErrorKind, Result};
use rmp::Marker;

/// Max width of an encoded integer.
const INT_BYTES_LEN_MAX: usize = 8;

fn codec_error<E>(err: E) -> Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    Error::new_ext(ErrorKind::MalformedData, err)
}

/// Minimal two's complement big-endian representation of `value`.
/// Zero is encoded as a single zero byte.
pub fn int_to_bytes(value: i64) -> Vec<u8> {
    let mut bytes = [0u8; INT_BYTES_LEN_MAX];
    let mut v = value;
    for idx in (0..INT_BYTES_LEN_MAX).rev() {
        bytes[idx] = (v & 0xff) as u8;
        v >>= 8;
        let sign_bit = bytes[idx] & 0x80 != 0;
        if (v == 0 && !sign_bit) || (v == -1 && sign_bit) {
            return bytes[idx..].to_vec();
        }
    }
    bytes.to_vec()
}

/// Inverse of [`int_to_bytes`].
///
/// # Errors
///
/// Empty, oversized or non-minimal representations are rejected with a
/// `MalformedData` error kind.
pub fn bytes_to_int(bytes: &[u8]) -> Result<i64> {
    if bytes.is_empty() || bytes.len() > INT_BYTES_LEN_MAX {
        return Err(codec_error(format!("bad integer length {}", bytes.len())));
    }
    let mut value: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
    for b in bytes {
        value = (value << 8) | *b as i64;
    }
    if int_to_bytes(value) != bytes {
        return Err(codec_error("non minimal integer encoding"));
    }
    Ok(value)
}

/// Streaming encoder.
///
/// Lists are opened by announcing their element count and then writing the
/// elements one after the other, nested lists included.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder::default()
    }

    /// Open a list of `len` elements.
    pub fn write_list(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len).map_err(codec_error)?;
        rmp::encode::write_array_len(&mut self.buf, len).map_err(codec_error)?;
        Ok(())
    }

    pub fn write_int(&mut self, value: i64) -> Result<()> {
        self.write_bytes(&int_to_bytes(value))
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        rmp::encode::write_bin(&mut self.buf, value).map_err(codec_error)
    }

    /// Write bytes or `nil` when absent.
    pub fn write_nullable_bytes(&mut self, value: Option<&[u8]>) -> Result<()> {
        match value {
            Some(value) => self.write_bytes(value),
            None => self.write_nil(),
        }
    }

    pub fn write_str(&mut self, value: &str) -> Result<()> {
        rmp::encode::write_str(&mut self.buf, value).map_err(codec_error)
    }

    pub fn write_nil(&mut self) -> Result<()> {
        rmp::encode::write_nil(&mut self.buf).map_err(codec_error)
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Streaming decoder over a borrowed buffer.
#[derive(Debug)]
pub struct Decoder<'a> {
    rd: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder { rd: buf }
    }

    /// Read a list header, returns the number of elements that follow.
    pub fn read_list(&mut self) -> Result<usize> {
        let len = rmp::decode::read_array_len(&mut self.rd).map_err(codec_error)?;
        Ok(len as usize)
    }

    pub fn read_int(&mut self) -> Result<i64> {
        let bytes = self.read_bin()?;
        bytes_to_int(bytes)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        self.read_bin().map(|bytes| bytes.to_vec())
    }

    /// Read bytes, `nil` decodes as `None`.
    pub fn read_nullable_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        if self.peek_nil() {
            rmp::decode::read_nil(&mut self.rd).map_err(codec_error)?;
            return Ok(None);
        }
        self.read_bytes().map(Some)
    }

    pub fn read_str(&mut self) -> Result<String> {
        let len = rmp::decode::read_str_len(&mut self.rd).map_err(codec_error)?;
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(codec_error)
    }

    /// Check that the whole input has been consumed.
    pub fn finish(self) -> Result<()> {
        match self.rd.is_empty() {
            true => Ok(()),
            false => Err(codec_error(format!("{} trailing bytes", self.rd.len()))),
        }
    }

    fn peek_nil(&self) -> bool {
        matches!(self.rd.first(), Some(b) if Marker::from_u8(*b) == Marker::Null)
    }

    fn read_bin(&mut self) -> Result<&'a [u8]> {
        let len = rmp::decode::read_bin_len(&mut self.rd).map_err(codec_error)?;
        self.take(len as usize)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.rd.len() < len {
            return Err(codec_error("unexpected end of input"));
        }
        let (head, tail) = self.rd.split_at(len);
        self.rd = tail;
        Ok(head)
    }
}
