use byteorder::{BigEndian, ByteOrder};

use crate::error::ProtocolError;

/// Maximum length of a device name on the wire, excluding the terminating NUL.
pub const NAME_MAX_LEN: usize = 20;

/// A write position into a caller-supplied byte buffer.
///
/// All integers on the wire are big-endian; this module is the only place
/// where byte order appears. Every operation bounds-checks against the
/// underlying slice and advances the position on success.
pub struct WriteCursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WriteCursor<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        WriteCursor { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Writes the low `width` bytes of `value`, most significant byte first.
    /// Bits of `value` above the declared width are dropped; the sender is
    /// responsible for range.
    pub fn write_uint(&mut self, value: u64, width: usize) -> Result<(), ProtocolError> {
        if width == 0 || width > 8 {
            return Err(ProtocolError::BadWidth(width));
        }
        if self.remaining() < width {
            return Err(ProtocolError::BufferTooSmall {
                needed: width,
                available: self.remaining(),
            });
        }
        let value = if width == 8 {
            value
        } else {
            value & ((1u64 << (width * 8)) - 1)
        };
        BigEndian::write_uint(&mut self.buf[self.pos..self.pos + width], value, width);
        self.pos += width;
        Ok(())
    }

    /// Writes `s` followed by a terminating NUL. The name portion is bounded
    /// by [`NAME_MAX_LEN`]; anything after an embedded NUL in `s` is ignored.
    pub fn write_cstr(&mut self, s: &str) -> Result<(), ProtocolError> {
        let bytes = match s.as_bytes().iter().position(|&b| b == 0) {
            Some(end) => &s.as_bytes()[..end],
            None => s.as_bytes(),
        };
        if bytes.len() > NAME_MAX_LEN {
            return Err(ProtocolError::NameTooLong(NAME_MAX_LEN));
        }
        if self.remaining() < bytes.len() + 1 {
            return Err(ProtocolError::BufferTooSmall {
                needed: bytes.len() + 1,
                available: self.remaining(),
            });
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        self.buf[self.pos] = 0;
        self.pos += 1;
        Ok(())
    }
}

/// A read position into a byte buffer, the counterpart of [`WriteCursor`].
pub struct ReadCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ReadCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ReadCursor { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Reads a `width`-byte big-endian unsigned integer.
    pub fn read_uint(&mut self, width: usize) -> Result<u64, ProtocolError> {
        if width == 0 || width > 8 {
            return Err(ProtocolError::BadWidth(width));
        }
        if self.remaining() < width {
            return Err(ProtocolError::BufferTooSmall {
                needed: width,
                available: self.remaining(),
            });
        }
        let value = BigEndian::read_uint(&self.buf[self.pos..self.pos + width], width);
        self.pos += width;
        Ok(value)
    }

    /// Reads bytes up to and including a terminating NUL and returns the
    /// string before it. Fails if no NUL appears within [`NAME_MAX_LEN`] + 1
    /// bytes.
    pub fn read_cstr(&mut self) -> Result<String, ProtocolError> {
        let window = &self.buf[self.pos..];
        let limit = window.len().min(NAME_MAX_LEN + 1);
        let end = window[..limit]
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::UnterminatedName)?;
        let s = String::from_utf8_lossy(&window[..end]).into_owned();
        self.pos += end + 1;
        Ok(s)
    }
}
