//! A fixed set of compressor slots shared with detached worker threads.

use std::ffi::CString;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::thread;

use thiserror::Error;

use super::compressor::{Compressor, JobDir, JobState};
use super::CompressorConfig;

#[derive(Debug, Error)]
pub enum SubmitError {
    /// Every slot is busy or holds an unconsumed result.
    #[error("all compressor slots are in use")]
    PoolFull,
    /// The directory descriptor could not be duplicated for the worker.
    #[error("bad directory descriptor: {0}")]
    BadDirectory(#[source] std::io::Error),
}

/// What a poll of one slot observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Not finished, or nothing to report (an idle slot looks the same).
    Running,
    Succeeded,
    Failed,
}

/// The pool.  Cloning is cheap and every clone sees the same slots.
#[derive(Debug, Clone)]
pub struct CompressorPool {
    slots: Arc<[Compressor]>,
}

impl CompressorPool {
    pub fn new(config: CompressorConfig) -> Self {
        let slots = (0..config.slots)
            .map(|_| Compressor::new(config.write_buf_size, config.threshold))
            .collect();
        CompressorPool { slots }
    }

    pub fn num_compressors(&self) -> usize {
        self.slots.len()
    }

    /// Start compressing `file_name` (relative to host directory `dirfd`) in
    /// the background.  Never blocks; returns the slot to poll.
    pub fn submit(&self, dirfd: RawFd, file_name: CString) -> Result<usize, SubmitError> {
        let dir = JobDir::from_host_fd(dirfd).map_err(SubmitError::BadDirectory)?;
        let index = self
            .slots
            .iter()
            .position(Compressor::try_claim)
            .ok_or(SubmitError::PoolFull)?;

        log::info!("compressor {} accepted {:?}", index, file_name);
        let slots = Arc::clone(&self.slots);
        let spawned = thread::Builder::new()
            .name(format!("compressor-{}", index))
            .spawn(move || {
                slots[index].compress(&dir, &file_name);
            });
        // The handle is dropped: nobody joins a compression worker.
        if let Err(e) = spawned {
            log::warn!("could not start compressor {}: {}", index, e);
            self.slots[index].fail();
        }
        Ok(index)
    }

    /// Non-blocking look at slot `index`.  A terminal result is consumed:
    /// the slot goes back to idle and the next poll reports `Running`.
    ///
    /// # Panics
    /// If `index` is not a slot of this pool.
    pub fn poll(&self, index: usize) -> PollStatus {
        match self.slots[index].take_if_done() {
            JobState::Done => PollStatus::Succeeded,
            JobState::Error => PollStatus::Failed,
            _ => PollStatus::Running,
        }
    }

    /// Current state of a slot without consuming anything.
    pub fn state(&self, index: usize) -> Option<JobState> {
        self.slots.get(index).map(Compressor::state)
    }
}
