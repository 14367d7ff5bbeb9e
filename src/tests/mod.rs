//! Proxy-level tests.  Each test builds a proxy over a flat `VecMemory`,
//! fills in a mailbox and runs it through `handle_command`, exactly like a
//! simulator would.

mod sys_tests;

pub mod setup {
    use std::sync::{Mutex, MutexGuard};

    use lazy_static::lazy_static;

    use crate::interface::{Endianness, MemIf, SimpleHost, VecMemory};
    use crate::rawposix::{CommandOutcome, SyscallConfig, SyscallProxy};
    use crate::sysdefs::constants::{Sysno, MAILBOX_WORDS, WORD_SIZE};
    use crate::typemap::SandboxRoot;

    lazy_static! {
        // Tests that change or read the process working directory hold this.
        // This has a junk value (a bool).  Could be anything...
        #[derive(Debug)]
        static ref TESTMUTEX: Mutex<bool> = {
            Mutex::new(true)
        };
    }

    pub const MEM_BASE: u64 = 0x8000_0000;
    pub const MEM_SIZE: usize = 1 << 16;
    pub const MAILBOX: u64 = MEM_BASE;
    /// Where tests put path strings.
    pub const NAMES: u64 = MEM_BASE + 0x100;
    pub const NAMES2: u64 = MEM_BASE + 0x400;
    /// Where tests put data buffers.
    pub const BUF: u64 = MEM_BASE + 0x1000;

    pub type TestProxy = SyscallProxy<SimpleHost<VecMemory>>;

    pub fn lock_cwd() -> MutexGuard<'static, bool> {
        TESTMUTEX.lock().unwrap_or_else(|e| {
            TESTMUTEX.clear_poison();
            e.into_inner()
        })
    }

    pub fn proxy_with(
        endianness: Endianness,
        sandbox: SandboxRoot,
        args: &[&str],
    ) -> TestProxy {
        let mem = VecMemory::new(MEM_BASE, MEM_SIZE);
        let args = args.iter().map(|a| (*a).to_string()).collect();
        let config = SyscallConfig {
            sandbox,
            ..SyscallConfig::default()
        };
        SyscallProxy::new(SimpleHost::new(mem, args, endianness), config).unwrap()
    }

    pub fn proxy() -> TestProxy {
        proxy_with(Endianness::Little, SandboxRoot::unconfined(), &["prog"])
    }

    /// A proxy confined to a fresh temporary directory.
    pub fn sandboxed() -> (TestProxy, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        let sandbox = SandboxRoot::from_resolved(root.to_str().unwrap().as_bytes());
        (proxy_with(Endianness::Little, sandbox, &["prog"]), dir)
    }

    pub fn put(p: &mut TestProxy, addr: u64, bytes: &[u8]) {
        p.host_mut().mem.write(addr, bytes).unwrap();
    }

    pub fn get(p: &TestProxy, addr: u64, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        p.host().mem.read(addr, &mut buf).unwrap();
        buf
    }

    /// Store a NUL-terminated name, returning the `(ptr, len)` argument pair.
    pub fn put_name(p: &mut TestProxy, addr: u64, name: &str) -> (u64, u64) {
        let mut bytes = name.as_bytes().to_vec();
        bytes.push(0);
        put(p, addr, &bytes);
        (addr, bytes.len() as u64)
    }

    pub fn write_mailbox(p: &mut TestProxy, n: u64, args: &[u64]) {
        assert!(args.len() < MAILBOX_WORDS);
        let e = p.host().endianness;
        let mut raw = Vec::with_capacity(MAILBOX_WORDS * WORD_SIZE);
        raw.extend_from_slice(&e.u64_to_target(n));
        for i in 0..MAILBOX_WORDS - 1 {
            raw.extend_from_slice(&e.u64_to_target(args.get(i).copied().unwrap_or(0)));
        }
        put(p, MAILBOX, &raw);
    }

    pub fn read_result(p: &TestProxy) -> i64 {
        let mut bytes = [0u8; WORD_SIZE];
        bytes.copy_from_slice(&get(p, MAILBOX, WORD_SIZE));
        p.host().endianness.u64_from_target(bytes) as i64
    }

    /// Issue one syscall and return the signed result word.
    pub fn syscall(p: &mut TestProxy, sysno: Sysno, args: &[u64]) -> i64 {
        write_mailbox(p, sysno as u64, args);
        assert_eq!(p.handle_command(MAILBOX).unwrap(), CommandOutcome::Respond(1));
        read_result(p)
    }

    pub fn le_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    pub fn le_u64(bytes: &[u8], at: usize) -> u64 {
        u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
    }
}
