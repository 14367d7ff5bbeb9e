//! The syscall proxy: mailbox decoding plus one handler per guest syscall.
//!
//! Handlers are split the usual way: file system calls in [`fs_calls`],
//! everything else (exit, argv, compression) in [`sys_calls`].

pub mod dispatcher;
pub mod fs_calls;
pub mod sys_calls;

pub use dispatcher::{CommandOutcome, DispatchError, SyscallArgs, SyscallConfig, SyscallProxy};
