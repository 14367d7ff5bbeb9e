//! Guest ABI constants.
//!
//! Syscall numbers follow the RISC-V Linux numbering, plus a private range
//! (2011+) for calls that only make sense under a proxy.

// Let's not have clippy warn for names like AT_FDCWD.
#![allow(clippy::upper_case_acronyms)]

/// Number of entries in the dispatch table.  Anything at or above this is
/// rejected before the lookup.
pub const SYSCALL_TABLE_SIZE: u64 = 2048;

/// Number of words in the mailbox: the syscall number followed by 7 args.
pub const MAILBOX_WORDS: usize = 8;
/// Size in bytes of one guest word.
pub const WORD_SIZE: usize = 8;

/// `AT_FDCWD` as the guest spells it.
pub const GUEST_AT_FDCWD: i32 = -100;
/// `AT_FDCWD` as the host spells it.
pub const HOST_AT_FDCWD: i32 = libc::AT_FDCWD;

/// Largest single transfer between the host and guest memory.  `read` and
/// `pread` are cut to this length (a short read); guest buffers are staged
/// in pieces of this size.
pub const GUEST_IO_CHUNK: usize = 1 << 20;

/// Defaults for the background compressor pool.
pub const DEFAULT_COMPRESSOR_SLOTS: usize = 64;
pub const DEFAULT_WRITE_BUF_SIZE: usize = 1024;
pub const DEFAULT_THRESHOLD_NUMERATOR: u64 = 9;
pub const DEFAULT_THRESHOLD_DENOMINATOR: u64 = 10;

/// Result words of `compressquery`.
pub const COMPRESS_QUERY_DONE: u64 = 0;
pub const COMPRESS_QUERY_ERROR: u64 = 1;
pub const COMPRESS_QUERY_PENDING: u64 = 2;

#[doc(hidden)]
macro_rules! reversible_enum {
    ($(#[$settings: meta])* $visibility: vis enum $enumname:ident {
        $($valuename: ident = $value: expr,)*
    }) => {
        $(#[$settings])*
        $visibility enum $enumname {
            $($valuename = $value,)*
        }

        impl $enumname {
            /// Map a raw number back onto the enum, if it names a variant.
            $visibility fn from_discriminant(v: u64) -> Option<Self> {
                match v {
                    $($value => Some($enumname::$valuename),)*
                    _ => None,
                }
            }

            /// Every variant, in declaration order.
            $visibility const ALL: &'static [$enumname] = &[$($enumname::$valuename,)*];
        }
    }
}

reversible_enum! {
    /// Every syscall the proxy knows how to service.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(u64)]
    pub enum Sysno {
        Getcwd = 17,
        Fcntl = 25,
        Mkdirat = 34,
        Unlinkat = 35,
        Linkat = 37,
        Renameat = 38,
        Ftruncate = 46,
        Faccessat = 48,
        Chdir = 49,
        Openat = 56,
        Close = 57,
        Lseek = 62,
        Read = 63,
        Write = 64,
        Pread = 67,
        Pwrite = 68,
        Sendfile = 71,
        Fstatat = 79,
        Fstat = 80,
        Exit = 93,
        Statx = 291,
        Lstat = 1039,
        Getmainvars = 2011,
        Getfdpath = 2012,
        Compressfile = 2013,
        Compressquery = 2014,
    }
}

impl Sysno {
    /// Validate a raw number taken out of the mailbox.
    pub fn lookup(n: u64) -> Option<Sysno> {
        if n >= SYSCALL_TABLE_SIZE {
            return None;
        }
        Sysno::from_discriminant(n)
    }

    pub fn name(self) -> &'static str {
        match self {
            Sysno::Getcwd => "getcwd",
            Sysno::Fcntl => "fcntl",
            Sysno::Mkdirat => "mkdirat",
            Sysno::Unlinkat => "unlinkat",
            Sysno::Linkat => "linkat",
            Sysno::Renameat => "renameat",
            Sysno::Ftruncate => "ftruncate",
            Sysno::Faccessat => "faccessat",
            Sysno::Chdir => "chdir",
            Sysno::Openat => "openat",
            Sysno::Close => "close",
            Sysno::Lseek => "lseek",
            Sysno::Read => "read",
            Sysno::Write => "write",
            Sysno::Pread => "pread",
            Sysno::Pwrite => "pwrite",
            Sysno::Sendfile => "sendfile",
            Sysno::Fstatat => "fstatat",
            Sysno::Fstat => "fstat",
            Sysno::Exit => "exit",
            Sysno::Statx => "statx",
            Sysno::Lstat => "lstat",
            Sysno::Getmainvars => "getmainvars",
            Sysno::Getfdpath => "getfdpath",
            Sysno::Compressfile => "compressfile",
            Sysno::Compressquery => "compressquery",
        }
    }
}
