//! Bounds-checked cursor over proof buffers

use crate::{Hash32, ProofError, Result, HASH_LENGTH};

pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, needed: usize) -> Result<&'a [u8]> {
        let available = self.remaining();
        if needed > available {
            return Err(ProofError::TruncatedProof {
                offset: self.offset,
                needed,
                available,
            });
        }
        let out = &self.buf[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        let mut out = [0u8; 8];
        out.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(out))
    }

    pub fn read_hash(&mut self) -> Result<Hash32> {
        let mut out = [0u8; HASH_LENGTH];
        out.copy_from_slice(self.take(HASH_LENGTH)?);
        Ok(out)
    }

    /// Bitcoin compact-size integer: one byte below 0xfd, otherwise a
    /// 0xfd/0xfe/0xff marker followed by a little-endian u16/u32/u64.
    pub fn read_varint(&mut self) -> Result<u64> {
        match self.read_u8()? {
            0xfd => self.read_u16_le().map(u64::from),
            0xfe => self.read_u32_le().map(u64::from),
            0xff => self.read_u64_le(),
            n => Ok(u64::from(n)),
        }
    }
}

pub(crate) fn write_varint(out: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        out.push(n as u8);
    } else if n <= u64::from(u16::MAX) {
        out.push(0xfd);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= u64::from(u32::MAX) {
        out.push(0xfe);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&n.to_le_bytes());
    }
}
