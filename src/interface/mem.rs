//! Guest memory access.
//!
//! Every address here is an absolute guest address.  Out-of-range accesses
//! are errors rather than panics: a bad mailbox address is a protocol
//! violation the dispatcher has to report upward.

use thiserror::Error;

/// Failure to touch guest memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemError {
    /// `len` bytes at `addr` are not backed by guest memory.
    #[error("guest access of {len} bytes at {addr:#x} is out of bounds")]
    OutOfBounds { addr: u64, len: usize },
}

/// Byte-range access to the simulated address space.
pub trait MemIf {
    /// Fill `buf` with the bytes starting at `addr`.
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemError>;

    /// Store `data` starting at `addr`.
    fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), MemError>;

    /// Convenience used when walking NUL-terminated strings.
    fn read_uint8(&self, addr: u64) -> Result<u8, MemError> {
        let mut byte = [0u8; 1];
        self.read(addr, &mut byte)?;
        Ok(byte[0])
    }
}

/// A flat chunk of guest memory starting at `base`.
#[derive(Debug, Clone)]
pub struct VecMemory {
    base: u64,
    bytes: Vec<u8>,
}

impl VecMemory {
    /// Zero-filled memory covering `[base, base + size)`.
    pub fn new(base: u64, size: usize) -> Self {
        VecMemory {
            base,
            bytes: vec![0; size],
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Direct view of the backing bytes (host-side inspection only).
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    fn range(&self, addr: u64, len: usize) -> Result<std::ops::Range<usize>, MemError> {
        let oob = MemError::OutOfBounds { addr, len };
        let start = addr.checked_sub(self.base).ok_or(oob)?;
        let start = usize::try_from(start).map_err(|_| oob)?;
        let end = start.checked_add(len).ok_or(oob)?;
        if end > self.bytes.len() {
            return Err(oob);
        }
        Ok(start..end)
    }
}

impl MemIf for VecMemory {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemError> {
        let range = self.range(addr, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), MemError> {
        let range = self.range(addr, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_back_what_was_written() {
        let mut mem = VecMemory::new(0x1000, 64);
        mem.write(0x1010, b"hello").unwrap();
        let mut buf = [0u8; 5];
        mem.read(0x1010, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(mem.read_uint8(0x1014).unwrap(), b'o');
    }

    #[test]
    fn accesses_outside_the_region_fail() {
        let mut mem = VecMemory::new(0x1000, 16);
        let mut buf = [0u8; 4];
        assert_eq!(
            mem.read(0xfff, &mut buf),
            Err(MemError::OutOfBounds { addr: 0xfff, len: 4 })
        );
        assert!(mem.read(0x100e, &mut buf).is_err());
        assert!(mem.write(u64::MAX, &[1]).is_err());
        // the last byte is still fine
        assert!(mem.write(0x100f, &[1]).is_ok());
    }
}
