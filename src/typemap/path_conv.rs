/// Path conversion related API
///
/// This file provides the "chroot emulation" used by the handlers: absolute
/// guest paths are rewritten to live under a host directory, and host paths
/// flowing back to the guest (getcwd, getfdpath) have that directory hidden
/// again.
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("could not chroot to {}: {source}", .path.display())]
    Unreachable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The host directory that confines every absolute guest path.
///
/// `SandboxRoot::unconfined()` disables the rewriting entirely.  The root is
/// stored without a trailing slash, so the host root `/` is stored as the
/// empty string and both directions become the identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxRoot {
    root: Option<Vec<u8>>,
}

impl SandboxRoot {
    /// No sandbox: paths pass through untouched.
    pub fn unconfined() -> Self {
        SandboxRoot { root: None }
    }

    /// Resolve `dir` to its real absolute host path and use it as the root.
    ///
    /// The directory is probed by changing into it and asking for the working
    /// directory, then changing back, so symlinks are resolved and a
    /// directory we are not allowed to enter is rejected up front.  This
    /// touches the process working directory; call it during startup only.
    pub fn resolve(dir: &Path) -> Result<Self, SandboxError> {
        let err = |source| SandboxError::Unreachable {
            path: dir.to_path_buf(),
            source,
        };
        let saved = std::env::current_dir().map_err(err)?;
        std::env::set_current_dir(dir).map_err(err)?;
        let resolved = std::env::current_dir();
        std::env::set_current_dir(&saved).map_err(err)?;
        let resolved = resolved.map_err(err)?;
        log::debug!("sandbox root resolved to {}", resolved.display());
        Ok(Self::from_resolved(resolved.as_os_str().as_bytes()))
    }

    /// Like [`SandboxRoot::resolve`], but a failure ends the process.  A
    /// sandbox that cannot be set up leaves no safe way to run the guest.
    pub fn resolve_or_exit(dir: &Path) -> Self {
        match Self::resolve(dir) {
            Ok(root) => root,
            Err(e) => {
                log::error!("{}", e);
                eprintln!("{}", e);
                std::process::exit(-1);
            }
        }
    }

    /// Use an already-resolved absolute host path as the root.
    pub fn from_resolved(root: &[u8]) -> Self {
        let mut root = root.to_vec();
        while root.last() == Some(&b'/') {
            root.pop();
        }
        SandboxRoot { root: Some(root) }
    }

    pub fn is_confined(&self) -> bool {
        self.root.is_some()
    }

    /// The root as a host path, if one is configured.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref().map(|r| {
            if r.is_empty() {
                Path::new("/")
            } else {
                Path::new(OsStr::from_bytes(r))
            }
        })
    }

    /// Guest path -> host path.  Relative paths are left alone.
    pub fn apply(&self, path: &[u8]) -> Vec<u8> {
        match &self.root {
            Some(root) if path.first() == Some(&b'/') => {
                let mut host = Vec::with_capacity(root.len() + path.len());
                host.extend_from_slice(root);
                host.extend_from_slice(path);
                host
            }
            _ => path.to_vec(),
        }
    }

    /// Host path -> guest path.
    ///
    /// Anything outside the root collapses to `/` so host layout never leaks
    /// to the guest.  The match is on a component boundary: a root of `/a`
    /// does not claim `/ab`.
    pub fn reverse(&self, host_path: &[u8]) -> Vec<u8> {
        let Some(root) = &self.root else {
            return host_path.to_vec();
        };
        match host_path.strip_prefix(root.as_slice()) {
            Some([]) => b"/".to_vec(),
            Some(rest) if rest[0] == b'/' => rest.to_vec(),
            _ => b"/".to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfined_is_identity() {
        let sandbox = SandboxRoot::unconfined();
        assert!(!sandbox.is_confined());
        assert_eq!(sandbox.apply(b"/etc/passwd"), b"/etc/passwd");
        assert_eq!(sandbox.reverse(b"/home/user"), b"/home/user");
    }

    #[test]
    fn absolute_paths_are_prefixed_relative_ones_are_not() {
        let sandbox = SandboxRoot::from_resolved(b"/srv/guest");
        assert_eq!(sandbox.apply(b"/bin/sh"), b"/srv/guest/bin/sh");
        assert_eq!(sandbox.apply(b"data/file"), b"data/file");
        assert_eq!(sandbox.apply(b""), b"");
    }

    #[test]
    fn round_trip_for_absolute_paths() {
        let sandbox = SandboxRoot::from_resolved(b"/srv/guest/");
        for path in [&b"/"[..], b"/a", b"/a/b/c", b"/srv/guest", b"//x"] {
            assert_eq!(sandbox.reverse(&sandbox.apply(path)), path);
        }
    }

    #[test]
    fn paths_outside_the_root_collapse_to_slash() {
        let sandbox = SandboxRoot::from_resolved(b"/a");
        assert_eq!(sandbox.reverse(b"/ab"), b"/");
        assert_eq!(sandbox.reverse(b"/b/a"), b"/");
        assert_eq!(sandbox.reverse(b"/"), b"/");
        assert_eq!(sandbox.reverse(b"/a"), b"/");
        assert_eq!(sandbox.reverse(b"/a/"), b"/");
        assert_eq!(sandbox.reverse(b"/a/b"), b"/b");
    }

    #[test]
    fn host_root_as_sandbox_root_is_transparent() {
        let sandbox = SandboxRoot::from_resolved(b"/");
        assert_eq!(sandbox.root(), Some(Path::new("/")));
        assert_eq!(sandbox.apply(b"/x/y"), b"/x/y");
        assert_eq!(sandbox.reverse(b"/x/y"), b"/x/y");
    }

    #[test]
    fn resolving_follows_symlinks_and_restores_cwd() {
        let _thelock = crate::tests::setup::lock_cwd();
        let before = std::env::current_dir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let real = std::fs::canonicalize(dir.path()).unwrap().join("real");
        std::fs::create_dir(&real).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let sandbox = SandboxRoot::resolve(&link).unwrap();
        assert_eq!(sandbox.root(), Some(real.as_path()));
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn resolving_a_missing_directory_fails() {
        let _thelock = crate::tests::setup::lock_cwd();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(SandboxRoot::resolve(&missing).is_err());
    }
}
