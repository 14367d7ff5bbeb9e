//! System syscalls: process exit, argument vector, and the compression
//! pool's guest interface.

use super::dispatcher::{DispatchError, SyscallArgs, SyscallProxy};
use crate::compress::{PollStatus, SubmitError};
use crate::interface::SyscallHost;
use crate::sysdefs::constants::{
    COMPRESS_QUERY_DONE, COMPRESS_QUERY_ERROR, COMPRESS_QUERY_PENDING, WORD_SIZE,
};
use crate::sysdefs::err_const::{io_errno, neg_errno};

impl<H: SyscallHost> SyscallProxy<H> {
    /// exit(code)
    pub(crate) fn sys_exit(&mut self, a: &SyscallArgs) -> u64 {
        self.host.set_exit_code(a[0] << 1 | 1);
        0
    }

    /// getmainvars(buf, limit)
    ///
    /// Lays out `argc`, the argv pointers, a NULL, an empty envp (another
    /// NULL), then the strings themselves.  Pointers are guest addresses
    /// into the same buffer.
    pub(crate) fn sys_getmainvars(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (pbuf, limit) = (a[0], a[1]);
        let endianness = self.host.endianness();
        let args = self.host.target_args();

        let header_words = args.len() + 3;
        let mut words = Vec::with_capacity(header_words);
        let mut strings = Vec::new();
        words.push(args.len() as u64);
        let mut str_addr = pbuf.wrapping_add((header_words * WORD_SIZE) as u64);
        for arg in args {
            words.push(str_addr);
            strings.extend_from_slice(arg.as_bytes());
            strings.push(0);
            str_addr = str_addr.wrapping_add(arg.len() as u64 + 1);
        }
        // argv terminator, then envp
        words.push(0);
        words.push(0);

        let mut blob = Vec::with_capacity(header_words * WORD_SIZE + strings.len());
        for word in words {
            blob.extend_from_slice(&endianness.u64_to_target(word));
        }
        blob.extend_from_slice(&strings);

        if blob.len() as u64 > limit {
            return Ok(neg_errno(libc::ENOMEM));
        }
        self.host.memif().write(pbuf, &blob)?;
        Ok(0)
    }

    /// compressfile(dirfd, path, pathlen)
    ///
    /// Returns the slot to poll, or -1 when every slot is busy.
    pub(crate) fn sys_compressfile(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (dirfd, pname, len) = (a[0], a[1], a[2]);
        let path = self.guest_path(pname, len)?;
        match self.compressors.submit(self.fds.lookup(dirfd), path) {
            Ok(index) => Ok(index as u64),
            Err(SubmitError::PoolFull) => {
                log::debug!("compressfile: no free compressor");
                Ok(-1i64 as u64)
            }
            Err(SubmitError::BadDirectory(e)) => Ok(io_errno(&e)),
        }
    }

    /// compressquery(id)
    pub(crate) fn sys_compressquery(&mut self, a: &SyscallArgs) -> u64 {
        let id = a[0];
        if id >= self.compressors.num_compressors() as u64 {
            return -1i64 as u64;
        }
        match self.compressors.poll(id as usize) {
            PollStatus::Succeeded => COMPRESS_QUERY_DONE,
            PollStatus::Failed => COMPRESS_QUERY_ERROR,
            PollStatus::Running => COMPRESS_QUERY_PENDING,
        }
    }
}
