//! Collaborators the proxy needs from the embedding simulator.
//!
//! The simulator owns guest memory and the run's bookkeeping (exit code,
//! guest command line, byte order).  We only see them through the two traits
//! re-exported here.  Simple implementations are provided so the proxy can be
//! driven without a full simulator (tests, benches, the CLI tool).

pub mod host;
pub mod mem;

pub use host::{Endianness, SimpleHost, SyscallHost};
pub use mem::{MemError, MemIf, VecMemory};
