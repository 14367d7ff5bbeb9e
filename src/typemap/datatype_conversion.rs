//! Type conversion helpers for pulling syscall arguments out of guest memory.
//!
//! Guest words are 64 bits wide and stored in the guest's byte order.  Path
//! and name arguments arrive either as a `(pointer, length)` pair or as a bare
//! pointer to a NUL-terminated string.

use std::ffi::CString;

use crate::interface::{Endianness, MemError, MemIf};
use crate::sysdefs::constants::{GUEST_IO_CHUNK, MAILBOX_WORDS, WORD_SIZE};

/// Read the 8-word mailbox at `addr` and convert each word to host order.
pub fn read_mailbox(
    mem: &dyn MemIf,
    addr: u64,
    endianness: Endianness,
) -> Result<[u64; MAILBOX_WORDS], MemError> {
    let mut raw = [0u8; MAILBOX_WORDS * WORD_SIZE];
    mem.read(addr, &mut raw)?;
    let mut words = [0u64; MAILBOX_WORDS];
    for (word, chunk) in words.iter_mut().zip(raw.chunks_exact(WORD_SIZE)) {
        let mut bytes = [0u8; WORD_SIZE];
        bytes.copy_from_slice(chunk);
        *word = endianness.u64_from_target(bytes);
    }
    Ok(words)
}

pub fn read_word(mem: &dyn MemIf, addr: u64, endianness: Endianness) -> Result<u64, MemError> {
    let mut bytes = [0u8; WORD_SIZE];
    mem.read(addr, &mut bytes)?;
    Ok(endianness.u64_from_target(bytes))
}

pub fn write_word(
    mem: &mut dyn MemIf,
    addr: u64,
    value: u64,
    endianness: Endianness,
) -> Result<(), MemError> {
    mem.write(addr, &endianness.u64_to_target(value))
}

/// Copy `len` guest bytes at `ptr`.
///
/// The length comes from the guest, so the copy grows one chunk at a time:
/// a bogus length hits the end of guest memory long before the allocator
/// gives up.
pub fn read_guest_bytes(mem: &dyn MemIf, ptr: u64, len: u64) -> Result<Vec<u8>, MemError> {
    let mut buf = Vec::new();
    let mut done = 0u64;
    while done < len {
        let n = (len - done).min(GUEST_IO_CHUNK as u64) as usize;
        let addr = ptr
            .checked_add(done)
            .ok_or(MemError::OutOfBounds { addr: ptr, len: n })?;
        let start = buf.len();
        buf.resize(start + n, 0);
        mem.read(addr, &mut buf[start..])?;
        done += n as u64;
    }
    Ok(buf)
}

/// Read a `(pointer, length)` name argument.  The buffer normally carries
/// its own terminator; anything from the first NUL on is dropped.
pub fn read_sized_name(mem: &dyn MemIf, ptr: u64, len: u64) -> Result<Vec<u8>, MemError> {
    let mut buf = read_guest_bytes(mem, ptr, len)?;
    if let Some(nul) = buf.iter().position(|&b| b == 0) {
        buf.truncate(nul);
    }
    Ok(buf)
}

/// Read a NUL-terminated guest string one byte at a time.
pub fn read_cstr(mem: &dyn MemIf, ptr: u64) -> Result<Vec<u8>, MemError> {
    let mut buf = Vec::new();
    let mut addr = ptr;
    loop {
        let byte = mem.read_uint8(addr)?;
        if byte == 0 {
            return Ok(buf);
        }
        buf.push(byte);
        addr = addr.wrapping_add(1);
    }
}

/// Turn bytes that are known to be NUL-free into a C string.
pub fn to_cstring(bytes: Vec<u8>) -> CString {
    // read_sized_name / read_cstr already cut at the first NUL
    CString::new(bytes).unwrap_or_default()
}
