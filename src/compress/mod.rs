//! Background compression of checkpoint files.
//!
//! The guest hands us a file; a detached worker squeezes it with a small
//! sliding-window encoder and swaps the result in if it is worth it.  The
//! guest learns the outcome only by polling its job slot.
//!
//! - [`encoder`]: the literal/back-reference pass itself
//! - [`compressor`]: one job slot and its state machine
//! - [`pool`]: a fixed set of slots, admission and polling

pub mod compressor;
pub mod encoder;
pub mod pool;

pub use compressor::{Compressor, JobState};
pub use pool::{CompressorPool, PollStatus, SubmitError};

use crate::sysdefs::constants::{
    DEFAULT_COMPRESSOR_SLOTS, DEFAULT_THRESHOLD_DENOMINATOR, DEFAULT_THRESHOLD_NUMERATOR,
    DEFAULT_WRITE_BUF_SIZE,
};

/// Keep a compressed file only if `compressed / original < numerator / denominator`.
///
/// Kept as a ratio of integers so the accept/reject boundary is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub numerator: u64,
    pub denominator: u64,
}

impl Threshold {
    /// `None` when the denominator is zero.
    pub fn new(numerator: u64, denominator: u64) -> Option<Self> {
        if denominator == 0 {
            return None;
        }
        Some(Threshold {
            numerator,
            denominator,
        })
    }

    /// Whether a file that went from `original` to `compressed` bytes should
    /// be replaced.
    pub fn accepts(&self, compressed: u64, original: u64) -> bool {
        u128::from(compressed) * u128::from(self.denominator)
            < u128::from(original) * u128::from(self.numerator)
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold {
            numerator: DEFAULT_THRESHOLD_NUMERATOR,
            denominator: DEFAULT_THRESHOLD_DENOMINATOR,
        }
    }
}

impl std::str::FromStr for Threshold {
    type Err = String;

    /// Parses `NUM/DEN`, e.g. `9/10`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (num, den) = s
            .split_once('/')
            .ok_or_else(|| format!("threshold `{}` is not of the form NUM/DEN", s))?;
        let num = num
            .trim()
            .parse()
            .map_err(|e| format!("bad threshold numerator `{}`: {}", num, e))?;
        let den = den
            .trim()
            .parse()
            .map_err(|e| format!("bad threshold denominator `{}`: {}", den, e))?;
        Threshold::new(num, den).ok_or_else(|| "threshold denominator must not be zero".to_string())
    }
}

/// Shape of a compressor pool.  Every slot gets the same settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressorConfig {
    pub slots: usize,
    pub write_buf_size: usize,
    pub threshold: Threshold,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        CompressorConfig {
            slots: DEFAULT_COMPRESSOR_SLOTS,
            write_buf_size: DEFAULT_WRITE_BUF_SIZE,
            threshold: Threshold::default(),
        }
    }
}
