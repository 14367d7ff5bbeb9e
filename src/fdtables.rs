//! This module provides an fdtable, an abstraction which keeps the guest from
//! ever seeing a real host file descriptor.  The guest is handed small dense
//! indices; each one is bound to exactly one host fd while it is allocated.
//!
//! There is one table per proxy instance and no locking: the table is only
//! ever touched by the thread that runs the dispatcher.

use crate::sysdefs::constants::{GUEST_AT_FDCWD, HOST_AT_FDCWD};

/// Value of a free slot.  Also what `lookup` hands back for an unknown index,
/// so that the host call fails with EBADF on its own.
pub const FDT_INVALID_FD: i32 = -1;

/// Virtual fd -> host fd map.
#[derive(Debug, Default)]
pub struct FdTable {
    fds: Vec<i32>,
}

impl FdTable {
    /// An empty table.  Most callers want [`FdTable::with_stdio`].
    pub fn new() -> Self {
        FdTable { fds: Vec::new() }
    }

    /// A table whose slots 0, 1 and 2 are bound to the given host fds.
    ///
    /// The proxy passes a dup of stdin and two dups of stdout, so the guest's
    /// stderr ends up on the same stream as its stdout.
    pub fn with_stdio(stdin_fd: i32, stdout_fd: i32, stderr_fd: i32) -> Self {
        let mut table = FdTable::new();
        table.allocate(stdin_fd);
        table.allocate(stdout_fd);
        table.allocate(stderr_fd);
        table
    }

    /// Bind `realfd` to the lowest free index, growing by one slot if every
    /// slot is in use.
    pub fn allocate(&mut self, realfd: i32) -> u64 {
        // Check the fds in order.
        let index = match self.fds.iter().position(|&fd| fd == FDT_INVALID_FD) {
            Some(index) => index,
            None => {
                self.fds.push(FDT_INVALID_FD);
                self.fds.len() - 1
            }
        };
        self.fds[index] = realfd;
        index as u64
    }

    /// Mark `virtualfd` free.  The caller has already closed the host fd.
    pub fn deallocate(&mut self, virtualfd: u64) {
        if let Some(slot) = usize::try_from(virtualfd)
            .ok()
            .and_then(|i| self.fds.get_mut(i))
        {
            *slot = FDT_INVALID_FD;
        }
    }

    /// Translate a guest fd into the host fd to pass to libc.
    ///
    /// The guest's `AT_FDCWD` never touches the table; it becomes the host's
    /// `AT_FDCWD`.  Out of range and free indices yield [`FDT_INVALID_FD`].
    pub fn lookup(&self, virtualfd: u64) -> i32 {
        // Only the low 32 bits are significant, like an `int` argument.
        if virtualfd as i32 == GUEST_AT_FDCWD {
            return HOST_AT_FDCWD;
        }
        usize::try_from(virtualfd)
            .ok()
            .and_then(|i| self.fds.get(i))
            .copied()
            .unwrap_or(FDT_INVALID_FD)
    }

    /// Number of slots, free or not.
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }
}
