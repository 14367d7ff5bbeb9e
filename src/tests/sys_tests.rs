#[allow(unused_parens)]
#[cfg(test)]
pub mod sys_tests {

    use super::super::setup::*;
    use crate::compress::{CompressorConfig, Threshold};
    use crate::interface::{Endianness, SimpleHost, VecMemory};
    use crate::rawposix::{SyscallConfig, SyscallProxy};
    use crate::sysdefs::constants::{Sysno, GUEST_AT_FDCWD};
    use crate::typemap::SandboxRoot;

    use std::time::{Duration, Instant};

    const AT: u64 = GUEST_AT_FDCWD as u64;

    fn compress_proxy(slots: usize) -> (TestProxy, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        let config = SyscallConfig {
            sandbox: SandboxRoot::from_resolved(root.to_str().unwrap().as_bytes()),
            compressor: CompressorConfig {
                slots,
                write_buf_size: 64,
                threshold: Threshold::new(1, 2).unwrap(),
            },
        };
        let host = SimpleHost::new(
            VecMemory::new(MEM_BASE, MEM_SIZE),
            vec!["prog".to_string()],
            Endianness::Little,
        );
        (SyscallProxy::new(host, config).unwrap(), dir)
    }

    /// Poll a job from the guest side until it leaves "pending".
    fn query_until_done(p: &mut TestProxy, id: i64) -> i64 {
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            let status = syscall(p, Sysno::Compressquery, &[id as u64]);
            if status != 2 || Instant::now() > deadline {
                return status;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    pub fn ut_sys_getmainvars_layout() {
        let mut p = proxy_with(
            Endianness::Little,
            SandboxRoot::unconfined(),
            &["prog", "-n", "42"],
        );
        assert_eq!(syscall(&mut p, Sysno::Getmainvars, &[BUF, 4096]), 0);

        // argc, three pointers, argv NULL, envp NULL
        let header = get(&p, BUF, 6 * 8);
        let word = |i: usize| le_u64(&header, i * 8);
        assert_eq!(word(0), 3);
        assert_eq!(word(4), 0);
        assert_eq!(word(5), 0);

        let strings = BUF + 6 * 8;
        assert_eq!(word(1), strings);
        assert_eq!(word(2), strings + 5);
        assert_eq!(word(3), strings + 8);
        assert_eq!(get(&p, strings, 11), b"prog\0-n\042\0");
    }

    #[test]
    pub fn ut_sys_getmainvars_big_endian() {
        let mut p = proxy_with(Endianness::Big, SandboxRoot::unconfined(), &["a"]);
        assert_eq!(syscall(&mut p, Sysno::Getmainvars, &[BUF, 4096]), 0);
        let header = get(&p, BUF, 4 * 8);
        assert_eq!(&header[..8], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(
            u64::from_be_bytes(header[8..16].try_into().unwrap()),
            BUF + 4 * 8
        );
    }

    #[test]
    pub fn ut_sys_getmainvars_too_small() {
        let mut p = proxy_with(Endianness::Little, SandboxRoot::unconfined(), &["prog"]);
        put(&mut p, BUF, &[0xee; 64]);
        // needs 4 words plus "prog\0"
        assert_eq!(
            syscall(&mut p, Sysno::Getmainvars, &[BUF, 36]),
            -i64::from(libc::ENOMEM)
        );
        assert_eq!(get(&p, BUF, 64), vec![0xee; 64]);
        assert_eq!(syscall(&mut p, Sysno::Getmainvars, &[BUF, 37]), 0);
    }

    #[test]
    pub fn ut_sys_compressfile_end_to_end() {
        let (mut p, dir) = compress_proxy(4);
        std::fs::write(dir.path().join("ckpt"), vec![0u8; 1000]).unwrap();

        let (name, len) = put_name(&mut p, NAMES, "/ckpt");
        let id = syscall(&mut p, Sysno::Compressfile, &[AT, name, len]);
        assert!((0..4).contains(&id));
        assert_eq!(query_until_done(&mut p, id), 0);
        // consumed
        assert_eq!(syscall(&mut p, Sysno::Compressquery, &[id as u64]), 2);

        let out = std::fs::read(dir.path().join("ckpt")).unwrap();
        assert_eq!(out[0], 1);
        assert_eq!(out.len(), 37);
    }

    #[test]
    pub fn ut_sys_compressfile_relative_to_dirfd() {
        let (mut p, dir) = compress_proxy(4);
        std::fs::create_dir(dir.path().join("snap")).unwrap();
        std::fs::write(dir.path().join("snap/ckpt"), vec![0u8; 1000]).unwrap();

        let (name, len) = put_name(&mut p, NAMES, "/snap");
        let dirfd = syscall(
            &mut p,
            Sysno::Openat,
            &[AT, name, len, (libc::O_RDONLY | libc::O_DIRECTORY) as u64, 0],
        );
        assert!(dirfd >= 3);

        let (name, len) = put_name(&mut p, NAMES, "ckpt");
        let id = syscall(&mut p, Sysno::Compressfile, &[dirfd as u64, name, len]);
        assert!(id >= 0);
        // the job holds its own copy of the directory
        assert_eq!(syscall(&mut p, Sysno::Close, &[dirfd as u64]), 0);
        assert_eq!(query_until_done(&mut p, id), 0);
        assert_eq!(std::fs::read(dir.path().join("snap/ckpt")).unwrap().len(), 37);
    }

    #[test]
    pub fn ut_sys_compressfile_survives_chdir() {
        let _guard = lock_cwd();
        let before = std::env::current_dir().unwrap();
        let (mut p, dir) = compress_proxy(4);
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::create_dir(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("a/ckpt"), vec![0u8; 1000]).unwrap();

        let (a, _) = put_name(&mut p, NAMES, "/a");
        let (b, _) = put_name(&mut p, NAMES2, "/b");
        assert_eq!(syscall(&mut p, Sysno::Chdir, &[a]), 0);
        let (name, len) = put_name(&mut p, BUF, "ckpt");
        let id = syscall(&mut p, Sysno::Compressfile, &[AT, name, len]);
        assert!(id >= 0);
        // the guest moves on before the job finishes
        assert_eq!(syscall(&mut p, Sysno::Chdir, &[b]), 0);
        let status = query_until_done(&mut p, id);
        std::env::set_current_dir(&before).unwrap();

        assert_eq!(status, 0);
        assert_eq!(std::fs::read(dir.path().join("a/ckpt")).unwrap().len(), 37);
        assert!(!dir.path().join("b/ckpt").exists());
    }

    #[test]
    pub fn ut_sys_compressfile_failures() {
        let (mut p, _dir) = compress_proxy(1);
        let (name, len) = put_name(&mut p, NAMES, "/missing");
        let id = syscall(&mut p, Sysno::Compressfile, &[AT, name, len]);
        assert_eq!(id, 0);

        // the only slot is held until its result is read
        let deadline = Instant::now() + Duration::from_secs(30);
        while p.compressors().state(0) != Some(crate::compress::JobState::Error)
            && Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(syscall(&mut p, Sysno::Compressfile, &[AT, name, len]), -1);
        assert_eq!(syscall(&mut p, Sysno::Compressquery, &[0]), 1);
        assert_eq!(syscall(&mut p, Sysno::Compressquery, &[0]), 2);

        // unknown directory descriptor
        assert_eq!(
            syscall(&mut p, Sysno::Compressfile, &[40, name, len]),
            -i64::from(libc::EBADF)
        );
        // out of range job ids
        assert_eq!(syscall(&mut p, Sysno::Compressquery, &[1]), -1);
        assert_eq!(syscall(&mut p, Sysno::Compressquery, &[u64::MAX]), -1);
    }
}
