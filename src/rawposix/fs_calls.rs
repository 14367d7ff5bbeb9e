//! File System Syscall Implementation
//!
//! Every handler here performs exactly one host call.  Descriptor arguments
//! go through the fd table, path arguments through the sandbox, and the
//! result is either the call's non-negative return or `-errno`.
//!
//! A handler only returns `Err` when guest memory itself cannot be accessed.

use std::os::unix::ffi::OsStrExt;

use super::dispatcher::{DispatchError, SyscallArgs, SyscallProxy};
use crate::interface::SyscallHost;
use crate::sysdefs::constants::GUEST_IO_CHUNK;
use crate::sysdefs::data::StatData;
use crate::sysdefs::err_const::{io_errno, neg_errno, sysret_errno};
use crate::typemap::{read_cstr, read_guest_bytes, read_word, to_cstring, write_word};

impl<H: SyscallHost> SyscallProxy<H> {
    /// read(fd, buf, len)
    pub(crate) fn sys_read(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (fd, pbuf, len) = (a[0], a[1], a[2]);
        let mut buf = vec![0u8; io_len(len)];
        let ret = unsafe { libc::read(self.fds.lookup(fd), buf.as_mut_ptr().cast(), buf.len()) };
        let word = sysret_errno(ret as i64);
        if ret > 0 {
            self.host.memif().write(pbuf, &buf[..ret as usize])?;
        }
        Ok(word)
    }

    /// pread(fd, buf, len, offset)
    pub(crate) fn sys_pread(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (fd, pbuf, len, off) = (a[0], a[1], a[2], a[3]);
        let mut buf = vec![0u8; io_len(len)];
        let ret = unsafe {
            libc::pread(
                self.fds.lookup(fd),
                buf.as_mut_ptr().cast(),
                buf.len(),
                off as libc::off_t,
            )
        };
        let word = sysret_errno(ret as i64);
        if ret > 0 {
            self.host.memif().write(pbuf, &buf[..ret as usize])?;
        }
        Ok(word)
    }

    /// write(fd, buf, len)
    pub(crate) fn sys_write(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (fd, pbuf, len) = (a[0], a[1], a[2]);
        let buf = read_guest_bytes(self.host.memif(), pbuf, len)?;
        let ret = unsafe { libc::write(self.fds.lookup(fd), buf.as_ptr().cast(), buf.len()) };
        Ok(sysret_errno(ret as i64))
    }

    /// pwrite(fd, buf, len, offset)
    pub(crate) fn sys_pwrite(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (fd, pbuf, len, off) = (a[0], a[1], a[2], a[3]);
        let buf = read_guest_bytes(self.host.memif(), pbuf, len)?;
        let ret = unsafe {
            libc::pwrite(
                self.fds.lookup(fd),
                buf.as_ptr().cast(),
                buf.len(),
                off as libc::off_t,
            )
        };
        Ok(sysret_errno(ret as i64))
    }

    /// close(fd)
    ///
    /// The slot is only released once the host close succeeded.
    pub(crate) fn sys_close(&mut self, a: &SyscallArgs) -> u64 {
        let fd = a[0];
        if unsafe { libc::close(self.fds.lookup(fd)) } < 0 {
            return sysret_errno(-1);
        }
        self.fds.deallocate(fd);
        0
    }

    /// lseek(fd, offset, whence)
    pub(crate) fn sys_lseek(&mut self, a: &SyscallArgs) -> u64 {
        let ret = unsafe { libc::lseek(self.fds.lookup(a[0]), a[1] as libc::off_t, a[2] as i32) };
        sysret_errno(ret as i64)
    }

    /// fcntl(fd, cmd, arg)
    pub(crate) fn sys_fcntl(&mut self, a: &SyscallArgs) -> u64 {
        let ret = unsafe { libc::fcntl(self.fds.lookup(a[0]), a[1] as i32, a[2] as libc::c_long) };
        sysret_errno(i64::from(ret))
    }

    /// ftruncate(fd, len)
    pub(crate) fn sys_ftruncate(&mut self, a: &SyscallArgs) -> u64 {
        let ret = unsafe { libc::ftruncate(self.fds.lookup(a[0]), a[1] as libc::off_t) };
        sysret_errno(i64::from(ret))
    }

    /// fstat(fd, statbuf)
    pub(crate) fn sys_fstat(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (fd, pbuf) = (a[0], a[1]);
        // Declare statbuf by ourselves
        let mut statbuf: libc::stat = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::fstat(self.fds.lookup(fd), &mut statbuf) };
        self.finish_stat(ret, &statbuf, pbuf)
    }

    /// lstat(path, pathlen, statbuf)
    pub(crate) fn sys_lstat(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (pname, len, pbuf) = (a[0], a[1], a[2]);
        let path = self.guest_path(pname, len)?;
        let mut statbuf: libc::stat = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::lstat(path.as_ptr(), &mut statbuf) };
        self.finish_stat(ret, &statbuf, pbuf)
    }

    /// fstatat(dirfd, path, pathlen, statbuf, flags)
    pub(crate) fn sys_fstatat(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (dirfd, pname, len, pbuf, flags) = (a[0], a[1], a[2], a[3], a[4]);
        let path = self.guest_path(pname, len)?;
        let mut statbuf: libc::stat = unsafe { std::mem::zeroed() };
        let ret = unsafe {
            libc::fstatat(self.fds.lookup(dirfd), path.as_ptr(), &mut statbuf, flags as i32)
        };
        self.finish_stat(ret, &statbuf, pbuf)
    }

    /// Shared tail of the stat family: errno on failure, otherwise write the
    /// guest-layout image.
    fn finish_stat(
        &mut self,
        ret: libc::c_int,
        statbuf: &libc::stat,
        pbuf: u64,
    ) -> Result<u64, DispatchError> {
        let word = sysret_errno(i64::from(ret));
        if ret == 0 {
            let image = StatData::from_libc(statbuf).encode(self.host.endianness());
            self.host.memif().write(pbuf, &image)?;
        }
        Ok(word)
    }

    /// statx(dirfd, path, pathlen, flags, mask, statxbuf)
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    pub(crate) fn sys_statx(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        use crate::sysdefs::data::StatxData;

        let (dirfd, pname, len, flags, mask, pbuf) = (a[0], a[1], a[2], a[3], a[4], a[5]);
        let path = self.guest_path(pname, len)?;
        let mut statxbuf: libc::statx = unsafe { std::mem::zeroed() };
        let ret = unsafe {
            libc::statx(
                self.fds.lookup(dirfd),
                path.as_ptr(),
                flags as i32,
                mask as u32,
                &mut statxbuf,
            )
        };
        let word = sysret_errno(i64::from(ret));
        if ret == 0 {
            let image = StatxData::from_libc(&statxbuf).encode(self.host.endianness());
            self.host.memif().write(pbuf, &image)?;
        }
        Ok(word)
    }

    /// The host has no statx: report ENOSYS like a kernel without it would.
    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    pub(crate) fn sys_statx(&mut self, _a: &SyscallArgs) -> Result<u64, DispatchError> {
        Ok(neg_errno(libc::ENOSYS))
    }

    /// openat(dirfd, path, pathlen, flags, mode)
    pub(crate) fn sys_openat(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (dirfd, pname, len, flags, mode) = (a[0], a[1], a[2], a[3], a[4]);
        let path = self.guest_path(pname, len)?;
        let fd = unsafe {
            libc::openat(
                self.fds.lookup(dirfd),
                path.as_ptr(),
                flags as i32,
                mode as libc::c_uint,
            )
        };
        if fd < 0 {
            return Ok(sysret_errno(-1));
        }
        Ok(self.fds.allocate(fd))
    }

    /// faccessat(dirfd, path, pathlen, mode)
    pub(crate) fn sys_faccessat(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (dirfd, pname, len, mode) = (a[0], a[1], a[2], a[3]);
        let path = self.guest_path(pname, len)?;
        let ret = unsafe { libc::faccessat(self.fds.lookup(dirfd), path.as_ptr(), mode as i32, 0) };
        Ok(sysret_errno(i64::from(ret)))
    }

    /// renameat(olddirfd, oldpath, oldlen, newdirfd, newpath, newlen)
    pub(crate) fn sys_renameat(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (odirfd, popath, olen, ndirfd, pnpath, nlen) = (a[0], a[1], a[2], a[3], a[4], a[5]);
        let opath = self.guest_path(popath, olen)?;
        let npath = self.guest_path(pnpath, nlen)?;
        let ret = unsafe {
            libc::renameat(
                self.fds.lookup(odirfd),
                opath.as_ptr(),
                self.fds.lookup(ndirfd),
                npath.as_ptr(),
            )
        };
        Ok(sysret_errno(i64::from(ret)))
    }

    /// linkat(olddirfd, oldpath, oldlen, newdirfd, newpath, newlen, flags)
    pub(crate) fn sys_linkat(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (odirfd, poname, olen, ndirfd, pnname, nlen, flags) =
            (a[0], a[1], a[2], a[3], a[4], a[5], a[6]);
        let oname = self.guest_path(poname, olen)?;
        let nname = self.guest_path(pnname, nlen)?;
        let ret = unsafe {
            libc::linkat(
                self.fds.lookup(odirfd),
                oname.as_ptr(),
                self.fds.lookup(ndirfd),
                nname.as_ptr(),
                flags as i32,
            )
        };
        Ok(sysret_errno(i64::from(ret)))
    }

    /// unlinkat(dirfd, path, pathlen, flags)
    pub(crate) fn sys_unlinkat(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (dirfd, pname, len, flags) = (a[0], a[1], a[2], a[3]);
        let path = self.guest_path(pname, len)?;
        let ret = unsafe { libc::unlinkat(self.fds.lookup(dirfd), path.as_ptr(), flags as i32) };
        Ok(sysret_errno(i64::from(ret)))
    }

    /// mkdirat(dirfd, path, pathlen, mode)
    pub(crate) fn sys_mkdirat(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (dirfd, pname, len, mode) = (a[0], a[1], a[2], a[3]);
        let path = self.guest_path(pname, len)?;
        let ret = unsafe {
            libc::mkdirat(self.fds.lookup(dirfd), path.as_ptr(), mode as libc::mode_t)
        };
        Ok(sysret_errno(i64::from(ret)))
    }

    /// chdir(path), path is NUL-terminated
    pub(crate) fn sys_chdir(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let name = read_cstr(self.host.memif(), a[0])?;
        let path = to_cstring(self.sandbox.apply(&name));
        let ret = unsafe { libc::chdir(path.as_ptr()) };
        Ok(sysret_errno(i64::from(ret)))
    }

    /// getcwd(buf, size)
    ///
    /// Returns the length written, including the terminating NUL.
    pub(crate) fn sys_getcwd(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (pbuf, size) = (a[0], a[1]);
        let cwd = match std::env::current_dir() {
            Ok(cwd) => cwd,
            Err(e) => return Ok(io_errno(&e)),
        };
        let mut guest_cwd = self.sandbox.reverse(cwd.as_os_str().as_bytes());
        if size <= guest_cwd.len() as u64 {
            return Ok(neg_errno(libc::ENOMEM));
        }
        guest_cwd.push(0);
        self.host.memif().write(pbuf, &guest_cwd)?;
        Ok(guest_cwd.len() as u64)
    }

    /// getfdpath(fd, buf, size)
    ///
    /// Like readlink: no terminator, silently truncated to `size`.
    pub(crate) fn sys_getfdpath(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (fd, pbuf, size) = (a[0], a[1], a[2]);
        let link = format!("/proc/self/fd/{}", self.fds.lookup(fd));
        let target = match std::fs::read_link(link) {
            Ok(target) => target,
            Err(e) => return Ok(io_errno(&e)),
        };
        let mut guest_path = self.sandbox.reverse(target.as_os_str().as_bytes());
        guest_path.truncate(usize::try_from(size).unwrap_or(usize::MAX));
        if !guest_path.is_empty() {
            self.host.memif().write(pbuf, &guest_path)?;
        }
        Ok(guest_path.len() as u64)
    }

    /// sendfile(out_fd, in_fd, offset_ptr, count)
    ///
    /// A zero `offset_ptr` means "use and advance the file position".
    /// Otherwise the 64-bit offset is read from guest memory and the updated
    /// offset written back.
    #[cfg(target_os = "linux")]
    pub(crate) fn sys_sendfile(&mut self, a: &SyscallArgs) -> Result<u64, DispatchError> {
        let (out_fd, in_fd, poffset, count) = (a[0], a[1], a[2], a[3]);
        let endianness = self.host.endianness();
        let mut offset: libc::off_t = 0;
        let offsetp: *mut libc::off_t = if poffset == 0 {
            std::ptr::null_mut()
        } else {
            offset = read_word(self.host.memif(), poffset, endianness)? as libc::off_t;
            &mut offset as *mut libc::off_t
        };
        let ret = unsafe {
            libc::sendfile(
                self.fds.lookup(out_fd),
                self.fds.lookup(in_fd),
                offsetp,
                count as usize,
            )
        };
        let word = sysret_errno(ret as i64);
        if ret >= 0 && poffset != 0 {
            write_word(self.host.memif(), poffset, offset as u64, endianness)?;
        }
        Ok(word)
    }

    #[cfg(not(target_os = "linux"))]
    pub(crate) fn sys_sendfile(&mut self, _a: &SyscallArgs) -> Result<u64, DispatchError> {
        Ok(neg_errno(libc::ENOSYS))
    }
}

/// Host buffer size for a guest read of `len` bytes.
fn io_len(len: u64) -> usize {
    len.min(GUEST_IO_CHUNK as u64) as usize
}
