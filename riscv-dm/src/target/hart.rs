//! The Debug Module's view of a hart.

/// Width of a register or memory access, as encoded in `aarsize`/`aamsize`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AccessSize {
    U8 = 0,
    U16 = 1,
    U32 = 2,
    U64 = 3,
}

impl AccessSize {
    /// Decode `aarsize` or `aamsize`. 128 bit accesses are not supported.
    pub fn parse(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::U8),
            1 => Some(Self::U16),
            2 => Some(Self::U32),
            3 => Some(Self::U64),
            _ => None,
        }
    }

    pub fn bytes(self) -> u64 {
        1 << self as u64
    }

    /// Mask of the bits covered by an access of this size.
    pub fn mask(self) -> u64 {
        match self {
            Self::U64 => u64::MAX,
            size => (1 << (8 * size.bytes())) - 1,
        }
    }
}

/// A failed hart operation, reported to the debugger through `cmderr`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("An exception occurred")]
    Exception,
    #[error("A bus error occurred")]
    Bus,
    #[error("The access is not supported")]
    Unsupported,
    #[error("The hart is not halted")]
    NotHalted,
}

/// Run control and state access of a hart.
///
/// Implemented by the CPU model. The Debug Module calls into it only from its
/// commit phase, never while computing the next register state.
pub trait HartControlPort {
    /// Request the hart to enter debug mode.
    fn halt(&mut self);

    /// Request the hart to leave debug mode.
    fn resume(&mut self);

    fn is_halted(&self) -> bool;

    /// Whether the hart exists and is powered.
    fn is_available(&self) -> bool;

    /// Read a register, numbered as in `regno` of the access register command.
    fn read_register(&mut self, regno: u16, size: AccessSize) -> Result<u64, Fault>;

    fn write_register(&mut self, regno: u16, size: AccessSize, value: u64) -> Result<(), Fault>;

    fn read_memory(&mut self, address: u64, size: AccessSize, virt: bool) -> Result<u64, Fault>;

    fn write_memory(
        &mut self,
        address: u64,
        size: AccessSize,
        virt: bool,
        value: u64,
    ) -> Result<(), Fault>;

    /// Execute the program buffer until it completes or faults.
    fn execute_program_buffer(&mut self, progbuf: &[u32]) -> Result<(), Fault>;

    /// Drive the hart reset. Called with `true` on assertion and `false` on
    /// release of `hartreset` or `ndmreset`.
    fn reset(&mut self, _asserted: bool) {}
}

impl<H: HartControlPort + ?Sized> HartControlPort for Box<H> {
    fn halt(&mut self) {
        (**self).halt()
    }

    fn resume(&mut self) {
        (**self).resume()
    }

    fn is_halted(&self) -> bool {
        (**self).is_halted()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn read_register(&mut self, regno: u16, size: AccessSize) -> Result<u64, Fault> {
        (**self).read_register(regno, size)
    }

    fn write_register(&mut self, regno: u16, size: AccessSize, value: u64) -> Result<(), Fault> {
        (**self).write_register(regno, size, value)
    }

    fn read_memory(&mut self, address: u64, size: AccessSize, virt: bool) -> Result<u64, Fault> {
        (**self).read_memory(address, size, virt)
    }

    fn write_memory(
        &mut self,
        address: u64,
        size: AccessSize,
        virt: bool,
        value: u64,
    ) -> Result<(), Fault> {
        (**self).write_memory(address, size, virt, value)
    }

    fn execute_program_buffer(&mut self, progbuf: &[u32]) -> Result<(), Fault> {
        (**self).execute_program_buffer(progbuf)
    }

    fn reset(&mut self, asserted: bool) {
        (**self).reset(asserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(0, Some(AccessSize::U8), 1, 0xff)]
    #[test_case(1, Some(AccessSize::U16), 2, 0xffff)]
    #[test_case(2, Some(AccessSize::U32), 4, 0xffff_ffff)]
    #[test_case(3, Some(AccessSize::U64), 8, u64::MAX)]
    fn access_sizes(encoded: u32, size: Option<AccessSize>, bytes: u64, mask: u64) {
        assert_eq!(AccessSize::parse(encoded), size);
        let size = size.unwrap();
        assert_eq!(size.bytes(), bytes);
        assert_eq!(size.mask(), mask);
    }

    #[test]
    fn wide_accesses_are_not_supported() {
        assert_eq!(AccessSize::parse(4), None);
        assert_eq!(AccessSize::parse(7), None);
    }
}
