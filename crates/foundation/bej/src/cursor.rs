use byteorder::{ByteOrder as _, LittleEndian};

use rudder_util::u64_to_usize;

use crate::decode::BejError;


/// Bounded sequential reader over a borrowed byte view.
///
/// The position never moves backwards except through [`seek`], and a failed
/// read never advances it past the end of the view.
///
/// [`seek`]: ByteCursor::seek
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos:  usize,
}

impl<'a> ByteCursor<'a> {
    #[inline]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// The number of bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// The current absolute position within the view.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Set the position to an absolute offset. The offset may equal the
    /// view's length, leaving nothing to read.
    pub fn seek(&mut self, pos: usize) -> Result<(), BejError> {
        if pos > self.data.len() {
            return Err(BejError::OutOfRange);
        }
        self.pos = pos;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, BejError> {
        let byte = *self.data.get(self.pos).ok_or(BejError::EndOfInput)?;
        self.pos += 1;
        Ok(byte)
    }

    /// Borrow the next `count` bytes and advance past them.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], BejError> {
        if self.remaining() < count {
            return Err(BejError::EndOfInput);
        }
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    /// Advance past `count` bytes without interpreting them. Used to step
    /// over payloads whose declared length is authoritative.
    pub fn skip(&mut self, count: u64) -> Result<(), BejError> {
        let count = u64_to_usize(count).ok_or(BejError::EndOfInput)?;
        if self.remaining() < count {
            return Err(BejError::EndOfInput);
        }
        self.pos += count;
        Ok(())
    }

    /// Read a BEJ nonnegative integer: one length byte, then that many bytes
    /// of little-endian unsigned value, zero-extended to 64 bits.
    ///
    /// A zero length byte is the one-byte encoding of the value 0. Lengths
    /// above eight cannot fit the result and fail with [`BejError::Overflow`].
    pub fn read_nnint(&mut self) -> Result<u64, BejError> {
        let width = self.read_u8()?;
        if width == 0 {
            return Ok(0);
        }
        if width > 8 {
            return Err(BejError::Overflow);
        }

        let bytes = self.read_bytes(usize::from(width))?;
        Ok(LittleEndian::read_uint(bytes, bytes.len()))
    }
}
