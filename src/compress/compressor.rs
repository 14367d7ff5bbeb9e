//! One compression job slot.
//!
//! A slot moves `Idle -> Ready -> Compressing -> {Done | Error}`.  The pool
//! claims an idle slot (`Ready`), the worker thread runs the job
//! (`Compressing`, then a terminal state exactly once), and the terminal
//! state sticks until the guest polls it and the pool puts the slot back to
//! `Idle`.
//!
//! The state is the only thing shared between the worker and the dispatch
//! thread, so it lives in an atomic: the worker publishes with `Release`,
//! the poller observes with `Acquire`.

use std::ffi::{CStr, CString};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::sync::atomic::{AtomicU8, Ordering};

use tempfile::{Builder, NamedTempFile, TempPath};
use thiserror::Error;

use super::encoder::compress_pass;
use super::Threshold;
use crate::sysdefs::constants::HOST_AT_FDCWD;

/// Marker written as the first byte of every compressed file.
pub const COMPRESSED_MARKER: u8 = 1;

const TEMP_FILE_PREFIX: &str = "semihost-compress-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    Idle = 0,
    Ready = 1,
    Compressing = 2,
    Done = 3,
    Error = 4,
}

impl JobState {
    fn from_u8(v: u8) -> JobState {
        match v {
            0 => JobState::Idle,
            1 => JobState::Ready,
            2 => JobState::Compressing,
            3 => JobState::Done,
            _ => JobState::Error,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Error)
    }
}

/// Why a job ended in `Error`.  Only ever logged.
#[derive(Debug, Error)]
pub enum CompressError {
    #[error("cannot open source file: {0}")]
    OpenSource(#[source] io::Error),
    #[error("cannot create temporary file: {0}")]
    CreateTemp(#[source] io::Error),
    #[error("source does not start with a zero byte")]
    NotEligible,
    #[error("compression pass failed: {0}")]
    Pass(#[source] io::Error),
    #[error("cannot replace source file: {0}")]
    Replace(#[source] io::Error),
}

/// The directory a job's file name is relative to.
///
/// Always a descriptor of our own: a duplicate of the guest's directory fd,
/// or the working directory as it was at submit time.  The guest closing
/// (or reusing) its fd, or a later `chdir`, cannot move a running job.
#[derive(Debug)]
pub struct JobDir(OwnedFd);

impl JobDir {
    /// Duplicate a host directory fd, or pin the current directory when
    /// handed the host `AT_FDCWD`.
    pub fn from_host_fd(dirfd: RawFd) -> io::Result<JobDir> {
        let fd = if dirfd == HOST_AT_FDCWD {
            unsafe {
                libc::openat(
                    HOST_AT_FDCWD,
                    b".\0".as_ptr().cast(),
                    libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC,
                )
            }
        } else {
            unsafe { libc::fcntl(dirfd, libc::F_DUPFD_CLOEXEC, 0) }
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(JobDir(unsafe { OwnedFd::from_raw_fd(fd) }))
    }

    fn raw(&self) -> RawFd {
        self.0.as_raw_fd()
    }

    fn openat(&self, name: &CStr, flags: libc::c_int, mode: libc::c_uint) -> io::Result<File> {
        let fd = unsafe { libc::openat(self.raw(), name.as_ptr(), flags | libc::O_CLOEXEC, mode) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(unsafe { File::from_raw_fd(fd) })
    }
}

/// A single job slot.
#[derive(Debug)]
pub struct Compressor {
    state: AtomicU8,
    write_buf_size: usize,
    threshold: Threshold,
}

impl Compressor {
    pub fn new(write_buf_size: usize, threshold: Threshold) -> Self {
        Compressor {
            state: AtomicU8::new(JobState::Idle as u8),
            write_buf_size,
            threshold,
        }
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: JobState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// `Idle -> Ready`.  Fails if the slot is in any other state, so two
    /// submitters can never claim the same slot.
    pub fn try_claim(&self) -> bool {
        self.state
            .compare_exchange(
                JobState::Idle as u8,
                JobState::Ready as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Terminal -> `Idle`, handing back the terminal state that was consumed.
    /// Non-terminal states are returned untouched.
    pub fn take_if_done(&self) -> JobState {
        let state = self.state();
        if state.is_terminal()
            && self
                .state
                .compare_exchange(state as u8, JobState::Idle as u8, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            return state;
        }
        state
    }

    /// Mark a claimed slot as failed without running anything (used when the
    /// worker thread cannot even be started).
    pub fn fail(&self) {
        self.set_state(JobState::Error);
    }

    /// Run a claimed job to completion on the calling thread.
    pub fn compress(&self, dir: &JobDir, file_name: &CStr) -> JobState {
        debug_assert_eq!(self.state(), JobState::Ready);
        self.set_state(JobState::Compressing);

        let result = match self.run(dir, file_name) {
            Ok(kept) => {
                log::info!(
                    "compressed {:?}: {}",
                    file_name,
                    if kept { "replaced" } else { "not worth keeping" }
                );
                JobState::Done
            }
            Err(e) => {
                log::warn!("compressing {:?} failed: {}", file_name, e);
                JobState::Error
            }
        };
        self.set_state(result);
        result
    }

    /// Returns whether the compressed version replaced the source.
    fn run(&self, dir: &JobDir, file_name: &CStr) -> Result<bool, CompressError> {
        let mut source = dir
            .openat(file_name, libc::O_RDONLY, 0)
            .map_err(CompressError::OpenSource)?;
        let temp = Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .tempfile()
            .map_err(CompressError::CreateTemp)?;

        let mut first = [0u8; 1];
        match source.read(&mut first) {
            Ok(1) if first[0] == 0 => {}
            Ok(_) => return Err(CompressError::NotEligible),
            Err(e) => return Err(CompressError::Pass(e)),
        }

        let compressed_size = self
            .write_compressed(&source, &temp)
            .map_err(CompressError::Pass)?;
        let original_size = source.metadata().map_err(CompressError::Pass)?.len();
        drop(source);

        // From here on the temp file is only needed by path.  Dropping the
        // TempPath on any early return removes it.
        let temp_path = temp.into_temp_path();
        if !self.threshold.accepts(compressed_size, original_size) {
            log::debug!(
                "{:?}: {} -> {} bytes is above the threshold",
                file_name,
                original_size,
                compressed_size
            );
            temp_path.close().map_err(CompressError::Replace)?;
            return Ok(false);
        }
        replace_file(temp_path, dir, file_name).map_err(CompressError::Replace)?;
        Ok(true)
    }

    /// Write the marker and the encoded body.  Returns the compressed size.
    fn write_compressed(&self, source: &File, temp: &NamedTempFile) -> io::Result<u64> {
        let mut out = BufWriter::with_capacity(self.write_buf_size, temp.as_file());
        out.write_all(&[COMPRESSED_MARKER])?;
        compress_pass(source, 1, &mut out)?;
        // Explicit flush: BufWriter's own drop-time flush swallows errors.
        out.flush()?;
        drop(out);
        Ok(temp.as_file().metadata()?.len())
    }
}

/// Renames `from` (a host path) to `name` inside `dir`.
type RenameFn = fn(&CStr, &JobDir, &CStr) -> io::Result<()>;

fn rename_into(from: &CStr, dir: &JobDir, name: &CStr) -> io::Result<()> {
    let ret = unsafe { libc::renameat(HOST_AT_FDCWD, from.as_ptr(), dir.raw(), name.as_ptr()) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Move the finished temp file over the source.
///
/// A plain rename when both live on one filesystem; otherwise copy the bytes
/// over the original and delete the temp file.
fn replace_file(temp_path: TempPath, dir: &JobDir, file_name: &CStr) -> io::Result<()> {
    replace_file_with(temp_path, dir, file_name, rename_into)
}

fn replace_file_with(
    temp_path: TempPath,
    dir: &JobDir,
    file_name: &CStr,
    rename: RenameFn,
) -> io::Result<()> {
    let c_temp = CString::new(temp_path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    match rename(&c_temp, dir, file_name) {
        Ok(()) => {
            // The temp path is gone now, don't let TempPath try to delete it.
            temp_path.keep().map_err(|e| e.error)?;
            return Ok(());
        }
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {}
        Err(e) => return Err(e),
    }

    log::debug!("{:?}: temp dir is on another filesystem, copying", file_name);
    let mut from = File::open(&temp_path)?;
    let mut to = dir.openat(
        file_name,
        libc::O_WRONLY | libc::O_TRUNC | libc::O_CREAT,
        0o644,
    )?;
    io::copy(&mut from, &mut to)?;
    to.sync_all()?;
    temp_path.close()
}
