//! Turning host call results into guest result words.
//!
//! The guest tells success from failure by sign alone: a non-negative word
//! is the call's result, a negative one is `-errno`.

/// Errno of the last failed libc call on this thread.
pub fn get_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
}

/// `-errno` as a guest word.
pub fn neg_errno(errno: i32) -> u64 {
    (-i64::from(errno)) as u64
}

/// Map a libc-style return (`-1` means "look at errno") onto a guest word.
/// Must be called right after the libc call, before anything else can
/// clobber errno.
pub fn sysret_errno(ret: i64) -> u64 {
    if ret == -1 {
        neg_errno(get_errno())
    } else {
        ret as u64
    }
}

/// `-errno` for an `io::Error` coming out of std.
pub fn io_errno(e: &std::io::Error) -> u64 {
    neg_errno(e.raw_os_error().unwrap_or(libc::EIO))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_keep_their_sign() {
        assert_eq!(sysret_errno(0), 0);
        assert_eq!(sysret_errno(42), 42);
        assert_eq!(neg_errno(libc::ENOENT) as i64, -i64::from(libc::ENOENT));
        let e = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(io_errno(&e) as i64, -i64::from(libc::EACCES));
    }

    #[test]
    fn failed_call_reports_its_errno() {
        let ret = unsafe { libc::close(-1) };
        assert_eq!(sysret_errno(i64::from(ret)) as i64, -i64::from(libc::EBADF));
    }
}
