//! The simulator-side environment the proxy runs inside.

use super::mem::MemIf;

/// Byte order of the simulated machine.
///
/// Every multi-byte value that crosses into or out of guest memory goes
/// through one of these helpers, field by field.  Nothing is ever copied
/// across in host order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    pub fn u16_to_target(self, v: u16) -> [u8; 2] {
        match self {
            Endianness::Little => v.to_le_bytes(),
            Endianness::Big => v.to_be_bytes(),
        }
    }

    pub fn u32_to_target(self, v: u32) -> [u8; 4] {
        match self {
            Endianness::Little => v.to_le_bytes(),
            Endianness::Big => v.to_be_bytes(),
        }
    }

    pub fn u64_to_target(self, v: u64) -> [u8; 8] {
        match self {
            Endianness::Little => v.to_le_bytes(),
            Endianness::Big => v.to_be_bytes(),
        }
    }

    pub fn i64_to_target(self, v: i64) -> [u8; 8] {
        self.u64_to_target(v as u64)
    }

    pub fn u64_from_target(self, bytes: [u8; 8]) -> u64 {
        match self {
            Endianness::Little => u64::from_le_bytes(bytes),
            Endianness::Big => u64::from_be_bytes(bytes),
        }
    }
}

/// Everything the proxy needs from the simulator besides the fd table and
/// the filesystem.
pub trait SyscallHost {
    /// Guest memory.
    fn memif(&mut self) -> &mut dyn MemIf;

    /// Record the run's raw "tohost" value.  Always odd: `code << 1 | 1`.
    fn set_exit_code(&mut self, tohost: u64);

    /// Decoded exit code of the run (the raw value shifted right by one).
    fn exit_code(&self) -> i32;

    /// The command line handed to the guest (argv, starting with argv[0]).
    fn target_args(&self) -> &[String];

    fn endianness(&self) -> Endianness;
}

/// A minimal host: one memory, a fixed argv and a byte order.
#[derive(Debug)]
pub struct SimpleHost<M: MemIf> {
    pub mem: M,
    pub args: Vec<String>,
    pub endianness: Endianness,
    tohost: Option<u64>,
}

impl<M: MemIf> SimpleHost<M> {
    pub fn new(mem: M, args: Vec<String>, endianness: Endianness) -> Self {
        SimpleHost {
            mem,
            args,
            endianness,
            tohost: None,
        }
    }

    /// Whether the guest has reported an exit code yet.
    pub fn exited(&self) -> bool {
        self.tohost.is_some()
    }
}

impl<M: MemIf> SyscallHost for SimpleHost<M> {
    fn memif(&mut self) -> &mut dyn MemIf {
        &mut self.mem
    }

    fn set_exit_code(&mut self, tohost: u64) {
        self.tohost = Some(tohost);
    }

    fn exit_code(&self) -> i32 {
        self.tohost.map_or(0, |t| (t >> 1) as i32)
    }

    fn target_args(&self) -> &[String] {
        &self.args
    }

    fn endianness(&self) -> Endianness {
        self.endianness
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::VecMemory;

    #[test]
    fn big_and_little_disagree_on_layout() {
        assert_eq!(Endianness::Little.u32_to_target(0x0102_0304), [4, 3, 2, 1]);
        assert_eq!(Endianness::Big.u32_to_target(0x0102_0304), [1, 2, 3, 4]);
        assert_eq!(Endianness::Big.u16_to_target(0xabcd), [0xab, 0xcd]);
        assert_eq!(Endianness::Little.i64_to_target(-1), [0xff; 8]);
        let bytes = Endianness::Big.u64_to_target(0x1122_3344_5566_7788);
        assert_eq!(Endianness::Big.u64_from_target(bytes), 0x1122_3344_5566_7788);
        assert_eq!(Endianness::Little.u64_from_target(bytes), 0x8877_6655_4433_2211);
    }

    #[test]
    fn exit_code_is_decoded_from_tohost() {
        let mut host = SimpleHost::new(VecMemory::new(0, 8), vec![], Endianness::Little);
        assert!(!host.exited());
        host.set_exit_code(3 << 1 | 1);
        assert!(host.exited());
        assert_eq!(host.exit_code(), 3);
        host.set_exit_code(1);
        assert_eq!(host.exit_code(), 0);
    }
}
