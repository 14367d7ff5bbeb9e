//! Mailbox dispatch.
//!
//! The guest writes `[number, arg0 .. arg6]` (eight words, guest byte order)
//! at some address and hands us that address as a command payload.  We
//! decode the words, run the handler, and overwrite word 0 with the result.
//!
//! An unknown syscall number means guest and host disagree about the
//! protocol.  That is reported as a [`DispatchError`] rather than a result
//! word; the embedder is expected to stop the run.

use std::io;

use thiserror::Error;

use crate::compress::{CompressorConfig, CompressorPool};
use crate::fdtables::FdTable;
use crate::interface::{MemError, SyscallHost};
use crate::sysdefs::constants::Sysno;
use crate::typemap::{read_mailbox, read_sized_name, to_cstring, write_word, SandboxRoot};

/// The seven argument words of a request.  Handlers ignore the ones they
/// don't use.
pub type SyscallArgs = [u64; 7];

/// Protocol-level failures.  None of these can be reported to the guest.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("bad syscall #{0}")]
    UnknownSyscall(u64),
    #[error(transparent)]
    Memory(#[from] MemError),
}

/// What a command payload turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Odd payload: the guest reported its exit status.
    Exit { code: i32 },
    /// Even payload: a syscall was serviced; send this response back.
    Respond(u64),
}

/// Construction-time settings for a proxy.
#[derive(Debug, Clone, Default)]
pub struct SyscallConfig {
    pub sandbox: SandboxRoot,
    pub compressor: CompressorConfig,
}

/// One proxy instance: a host, its fd table, its sandbox and its pool.
pub struct SyscallProxy<H: SyscallHost> {
    pub(crate) host: H,
    pub(crate) fds: FdTable,
    pub(crate) sandbox: SandboxRoot,
    pub(crate) compressors: CompressorPool,
}

impl<H: SyscallHost> SyscallProxy<H> {
    /// Set up a proxy whose guest stdin is our stdin and whose guest stdout
    /// and stderr both go to our stdout.
    pub fn new(host: H, config: SyscallConfig) -> io::Result<Self> {
        let stdin_fd = dup_stdio(libc::STDIN_FILENO)?;
        let stdout_fd0 = dup_stdio(libc::STDOUT_FILENO)?;
        let stdout_fd1 = dup_stdio(libc::STDOUT_FILENO)?;
        Ok(SyscallProxy {
            host,
            fds: FdTable::with_stdio(stdin_fd, stdout_fd0, stdout_fd1),
            sandbox: config.sandbox,
            compressors: CompressorPool::new(config.compressor),
        })
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn fds(&self) -> &FdTable {
        &self.fds
    }

    pub fn sandbox(&self) -> &SandboxRoot {
        &self.sandbox
    }

    pub fn compressors(&self) -> &CompressorPool {
        &self.compressors
    }

    /// Entry point for the "syscall" command device.
    pub fn handle_command(&mut self, payload: u64) -> Result<CommandOutcome, DispatchError> {
        if payload & 1 != 0 {
            // test pass/fail
            self.host.set_exit_code(payload);
            let code = self.host.exit_code();
            if code != 0 {
                eprintln!("*** FAILED *** (tohost = {})", code);
            }
            return Ok(CommandOutcome::Exit { code });
        }
        self.dispatch(payload)?;
        Ok(CommandOutcome::Respond(1))
    }

    /// Service the request sitting in the mailbox at `mm`.
    pub fn dispatch(&mut self, mm: u64) -> Result<(), DispatchError> {
        let endianness = self.host.endianness();
        let words = read_mailbox(self.host.memif(), mm, endianness).map_err(|e| {
            log::error!("cannot read mailbox at {:#x}: {}", mm, e);
            e
        })?;

        let n = words[0];
        let Some(sysno) = Sysno::lookup(n) else {
            log::error!("bad syscall #{}", n);
            return Err(DispatchError::UnknownSyscall(n));
        };
        let mut args: SyscallArgs = [0; 7];
        args.copy_from_slice(&words[1..]);

        let ret = self.invoke(sysno, &args).map_err(|e| {
            log::error!("{}: {}", sysno.name(), e);
            e
        })?;
        log::debug!("{}({:x?}) = {}", sysno.name(), &args, ret as i64);

        write_word(self.host.memif(), mm, ret, endianness)?;
        Ok(())
    }

    /// Run the handler for a validated syscall number.
    pub fn invoke(&mut self, sysno: Sysno, args: &SyscallArgs) -> Result<u64, DispatchError> {
        match sysno {
            Sysno::Getcwd => self.sys_getcwd(args),
            Sysno::Fcntl => Ok(self.sys_fcntl(args)),
            Sysno::Mkdirat => self.sys_mkdirat(args),
            Sysno::Unlinkat => self.sys_unlinkat(args),
            Sysno::Linkat => self.sys_linkat(args),
            Sysno::Renameat => self.sys_renameat(args),
            Sysno::Ftruncate => Ok(self.sys_ftruncate(args)),
            Sysno::Faccessat => self.sys_faccessat(args),
            Sysno::Chdir => self.sys_chdir(args),
            Sysno::Openat => self.sys_openat(args),
            Sysno::Close => Ok(self.sys_close(args)),
            Sysno::Lseek => Ok(self.sys_lseek(args)),
            Sysno::Read => self.sys_read(args),
            Sysno::Write => self.sys_write(args),
            Sysno::Pread => self.sys_pread(args),
            Sysno::Pwrite => self.sys_pwrite(args),
            Sysno::Sendfile => self.sys_sendfile(args),
            Sysno::Fstatat => self.sys_fstatat(args),
            Sysno::Fstat => self.sys_fstat(args),
            Sysno::Exit => Ok(self.sys_exit(args)),
            Sysno::Statx => self.sys_statx(args),
            Sysno::Lstat => self.sys_lstat(args),
            Sysno::Getmainvars => self.sys_getmainvars(args),
            Sysno::Getfdpath => self.sys_getfdpath(args),
            Sysno::Compressfile => self.sys_compressfile(args),
            Sysno::Compressquery => Ok(self.sys_compressquery(args)),
        }
    }

    /// Read a `(pointer, length)` path argument and sandbox it.
    pub(crate) fn guest_path(&mut self, ptr: u64, len: u64) -> Result<std::ffi::CString, MemError> {
        let name = read_sized_name(self.host.memif(), ptr, len)?;
        Ok(to_cstring(self.sandbox.apply(&name)))
    }
}

impl<H: SyscallHost> Drop for SyscallProxy<H> {
    fn drop(&mut self) {
        // Close whatever the guest left open, including our stdio dups.
        for index in 0..self.fds.len() as u64 {
            let fd = self.fds.lookup(index);
            if fd >= 0 {
                unsafe { libc::close(fd) };
                self.fds.deallocate(index);
            }
        }
    }
}

fn dup_stdio(fd: i32) -> io::Result<i32> {
    let dup = unsafe { libc::dup(fd) };
    if dup < 0 {
        return Err(io::Error::new(
            io::Error::last_os_error().kind(),
            "could not dup stdin/stdout",
        ));
    }
    Ok(dup)
}
