//! The compression pass.
//!
//! This is not a general-purpose compressor.  It targets snapshot files full
//! of long repeated runs.  Each step looks at (up to) the next 255 input
//! bytes and emits exactly three bytes: `offset`, `length`, `literal`.
//!
//!   - `offset` is how far back in the history window the match starts
//!     (0 for "no match"),
//!   - `length` is how many input bytes the step consumes (at least 1),
//!   - `literal` is the first of those input bytes.
//!
//! Both offset and length are single bytes, which is why the window and the
//! lookahead are both capped at 255.

use std::fs::File;
use std::io::{self, Write};
use std::os::unix::fs::FileExt;

/// Size of the history window and of one lookahead read.
pub const WINDOW_SIZE: usize = 255;
/// Bytes emitted per encode step.
pub const STEP_SIZE: u64 = 3;

/// Positional reads, so the pass can run over a file or a byte slice.
pub trait PositionalRead {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

impl PositionalRead for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        FileExt::read_at(self, buf, offset)
    }
}

impl PositionalRead for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(self.len());
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }
}

/// The last (up to) 255 bytes the encoder has consumed.
struct HistoryWindow {
    buf: [u8; WINDOW_SIZE],
    head: usize,
    len: usize,
}

impl HistoryWindow {
    fn new() -> Self {
        HistoryWindow {
            buf: [0; WINDOW_SIZE],
            head: 0,
            len: 0,
        }
    }

    /// Append a byte, evicting the oldest once full.
    fn push(&mut self, byte: u8) {
        self.buf[(self.head + self.len) % WINDOW_SIZE] = byte;
        if self.len < WINDOW_SIZE {
            self.len += 1;
        } else {
            self.head = (self.head + 1) % WINDOW_SIZE;
        }
    }

    /// `i`-th oldest byte.  `i < len`.
    fn get(&self, i: usize) -> u8 {
        debug_assert!(i < self.len);
        self.buf[(self.head + i) % WINDOW_SIZE]
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Find the best `(offset, length)` for the lookahead `chunk`.
///
/// A candidate at distance `j` may run for at most `j` bytes (it never reads
/// past the newest window byte) and at most `chunk.len()` bytes.  Ties keep
/// the shortest distance.  No match beats a literal unless it is at least two
/// bytes long.
fn longest_match(window: &HistoryWindow, chunk: &[u8]) -> (usize, usize) {
    let (mut offset, mut length) = (0, 1);
    for j in 1..=window.len() {
        let k = window.len() - j;
        if chunk[0] != window.get(k) {
            continue;
        }
        let cur_len = (0..j.min(chunk.len()))
            .take_while(|&l| chunk[l] == window.get(k + l))
            .count();
        if cur_len > length {
            offset = j;
            length = cur_len;
        }
    }
    (offset, length)
}

/// Encode everything in `input` from byte `start` on into `out`.
///
/// Returns the number of encode steps, so the output is always
/// `STEP_SIZE * steps` bytes long.  Any I/O failure aborts the pass.
pub fn compress_pass<R, W>(input: &R, start: u64, out: &mut W) -> io::Result<u64>
where
    R: PositionalRead + ?Sized,
    W: Write,
{
    let mut window = HistoryWindow::new();
    let mut chunk = [0u8; WINDOW_SIZE];
    let mut cursor = start;
    let mut steps = 0;

    loop {
        let n = input.read_at(&mut chunk, cursor)?;
        if n == 0 {
            break;
        }
        let chunk = &chunk[..n];
        let (offset, length) = longest_match(&window, chunk);
        debug_assert!(offset <= WINDOW_SIZE && (1..=WINDOW_SIZE).contains(&length));
        out.write_all(&[offset as u8, length as u8, chunk[0]])?;

        for &byte in &chunk[..length] {
            window.push(byte);
        }
        cursor += length as u64;
        steps += 1;
    }
    Ok(steps)
}

/// In-memory convenience wrapper around [`compress_pass`].
pub fn compress_bytes(input: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() / 4 + STEP_SIZE as usize);
    compress_pass(input, 0, &mut out)?;
    Ok(out)
}
