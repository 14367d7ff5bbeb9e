//! Host side of a semihosting bridge.
//!
//! A simulated program running on a simulated processor cannot talk to the
//! host operating system directly.  Instead it writes a small request record
//! (the "mailbox") into its own memory and pokes the host.  This crate reads
//! that record, performs the matching host system call on the program's
//! behalf and writes the result back, translating word size, endianness,
//! file descriptors and paths on the way.
//!
//! Besides plain syscall proxying, the simulated program can ask the host to
//! shrink checkpoint files in the background (see [`compress`]).
//!
//! The pieces, leaves first:
//!   - [`fdtables`]: virtual fd -> host fd indirection
//!   - [`typemap`]: path sandboxing and endianness / guest-memory conversion
//!   - [`sysdefs`]: constants and the fixed-layout `stat` / `statx` images
//!   - [`compress`]: the compression job state machine and its slot pool
//!   - [`rawposix`]: the dispatcher and the individual syscall handlers
//!   - [`interface`]: the collaborators we need from the simulator

// ********************** CLIPPY DISCUSSION **************************** //
// Pedantic warnings during development, denial only in CI.
#![warn(clippy::all, clippy::pedantic)]
// Casting between guest words (u64), host fds (i32) and libc sizes happens
// everywhere in the handlers.  Annotating each one is not worth it.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::module_name_repetitions
)]
// ********************* END CLIPPY DISCUSSION ************************* //

pub mod compress;
pub mod fdtables;
pub mod interface;
pub mod rawposix;
pub mod sysdefs;
pub mod typemap;

pub use compress::{CompressorConfig, CompressorPool, JobState, PollStatus, Threshold};
pub use interface::{Endianness, MemError, MemIf, SimpleHost, SyscallHost, VecMemory};
pub use rawposix::{CommandOutcome, DispatchError, SyscallConfig, SyscallProxy};
pub use typemap::path_conv::{SandboxError, SandboxRoot};

#[cfg(test)]
mod tests;
