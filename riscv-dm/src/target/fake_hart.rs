#![allow(missing_docs)] // Don't require docs for test code
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::target::hart::{AccessSize, Fault, HartControlPort};

/// `regno` of the first general purpose register.
pub const GPR_BASE: u16 = 0x1000;
/// `regno` of the `dcsr` CSR.
pub const DCSR: u16 = 0x7b0;
/// `regno` of the `dpc` CSR, which holds the PC while halted.
pub const DPC: u16 = 0x7b1;

/// Reset value of `dcsr`: external debug version 4, machine mode.
const DCSR_RESET: u64 = 0x4000_0003;

/// A call into the hart, as recorded by [`FakeHart`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Halt,
    Resume,
    ReadRegister {
        regno: u16,
        size: AccessSize,
    },
    WriteRegister {
        regno: u16,
        size: AccessSize,
        value: u64,
    },
    ReadMemory {
        address: u64,
        size: AccessSize,
        virt: bool,
    },
    WriteMemory {
        address: u64,
        size: AccessSize,
        virt: bool,
        value: u64,
    },
    ExecuteProgramBuffer {
        progbuf: Vec<u32>,
    },
    Reset {
        asserted: bool,
    },
}

#[derive(Debug)]
struct FakeHartState {
    halted: bool,
    available: bool,
    halt_on_request: bool,
    registers: BTreeMap<u16, u64>,
    memory: BTreeMap<u64, u8>,
    progbuf_result: Result<(), Fault>,
    halt_requests: usize,
    resume_requests: usize,
    operations: Vec<Operation>,
}

/// A hart model for tests and dry runs.
///
/// Clones share the same state, so a test can keep a handle while the Debug
/// Module owns another one.
#[derive(Debug, Clone)]
pub struct FakeHart {
    state: Arc<Mutex<FakeHartState>>,
}

impl Default for FakeHart {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHart {
    /// A running, available hart with 32 general purpose registers, `dcsr`
    /// and `dpc`, and no memory.
    pub fn new() -> Self {
        let mut registers: BTreeMap<u16, u64> =
            (0..32).map(|index| (GPR_BASE + index, 0)).collect();
        registers.insert(DCSR, DCSR_RESET);
        registers.insert(DPC, 0);

        Self {
            state: Arc::new(Mutex::new(FakeHartState {
                halted: false,
                available: true,
                halt_on_request: true,
                registers,
                memory: BTreeMap::new(),
                progbuf_result: Ok(()),
                halt_requests: 0,
                resume_requests: 0,
                operations: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeHartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn halted(self) -> Self {
        self.set_halted(true);
        self
    }

    /// Change the run state directly, without recording an operation.
    pub fn set_halted(&self, halted: bool) {
        self.lock().halted = halted;
    }

    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// If disabled, halt requests are recorded but the hart keeps running.
    pub fn set_halt_on_request(&self, halt_on_request: bool) {
        self.lock().halt_on_request = halt_on_request;
    }

    pub fn set_program_buffer_result(&self, result: Result<(), Fault>) {
        self.lock().progbuf_result = result;
    }

    pub fn set_pc(&self, pc: u64) {
        self.set_register(DPC, pc);
    }

    pub fn pc(&self) -> u64 {
        self.register(DPC).unwrap_or_default()
    }

    /// Create or overwrite a register.
    pub fn set_register(&self, regno: u16, value: u64) {
        self.lock().registers.insert(regno, value);
    }

    pub fn register(&self, regno: u16) -> Option<u64> {
        self.lock().registers.get(&regno).copied()
    }

    /// Make `len` bytes starting at `base` accessible, initialized to zero.
    pub fn map_memory(&self, base: u64, len: u64) {
        let mut state = self.lock();
        for address in base..base + len {
            state.memory.entry(address).or_insert(0);
        }
    }

    /// Store bytes into mapped or unmapped memory, mapping it.
    pub fn load_memory(&self, base: u64, data: &[u8]) {
        let mut state = self.lock();
        for (address, byte) in (base..).zip(data) {
            state.memory.insert(address, *byte);
        }
    }

    pub fn memory(&self, address: u64) -> Option<u8> {
        self.lock().memory.get(&address).copied()
    }

    pub fn halt_requests(&self) -> usize {
        self.lock().halt_requests
    }

    pub fn resume_requests(&self) -> usize {
        self.lock().resume_requests
    }

    /// All recorded operations, oldest first.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }
}

impl FakeHartState {
    fn check_halted(&self) -> Result<(), Fault> {
        if self.halted {
            Ok(())
        } else {
            Err(Fault::NotHalted)
        }
    }
}

impl HartControlPort for FakeHart {
    fn halt(&mut self) {
        let mut state = self.lock();
        state.operations.push(Operation::Halt);
        state.halt_requests += 1;
        if state.halt_on_request && state.available {
            state.halted = true;
        }
    }

    fn resume(&mut self) {
        let mut state = self.lock();
        state.operations.push(Operation::Resume);
        state.resume_requests += 1;
        state.halted = false;
    }

    fn is_halted(&self) -> bool {
        self.lock().halted
    }

    fn is_available(&self) -> bool {
        self.lock().available
    }

    fn read_register(&mut self, regno: u16, size: AccessSize) -> Result<u64, Fault> {
        let mut state = self.lock();
        state.operations.push(Operation::ReadRegister { regno, size });
        state.check_halted()?;

        let value = state.registers.get(&regno).ok_or(Fault::Exception)?;
        Ok(value & size.mask())
    }

    fn write_register(&mut self, regno: u16, size: AccessSize, value: u64) -> Result<(), Fault> {
        let mut state = self.lock();
        state
            .operations
            .push(Operation::WriteRegister { regno, size, value });
        state.check_halted()?;

        let register = state.registers.get_mut(&regno).ok_or(Fault::Exception)?;
        // x0 is hardwired to zero
        if regno != GPR_BASE {
            *register = value & size.mask();
        }
        Ok(())
    }

    fn read_memory(&mut self, address: u64, size: AccessSize, virt: bool) -> Result<u64, Fault> {
        let mut state = self.lock();
        state.operations.push(Operation::ReadMemory {
            address,
            size,
            virt,
        });

        (0..size.bytes()).try_fold(0u64, |value, offset| {
            let byte = state.memory.get(&(address + offset)).ok_or(Fault::Bus)?;
            Ok(value | (*byte as u64) << (8 * offset))
        })
    }

    fn write_memory(
        &mut self,
        address: u64,
        size: AccessSize,
        virt: bool,
        value: u64,
    ) -> Result<(), Fault> {
        let mut state = self.lock();
        state.operations.push(Operation::WriteMemory {
            address,
            size,
            virt,
            value,
        });

        let range = address..address + size.bytes();
        if range.clone().any(|a| !state.memory.contains_key(&a)) {
            return Err(Fault::Bus);
        }

        for (offset, address) in range.enumerate() {
            state
                .memory
                .insert(address, (value >> (8 * offset)) as u8);
        }
        Ok(())
    }

    fn execute_program_buffer(&mut self, progbuf: &[u32]) -> Result<(), Fault> {
        let mut state = self.lock();
        state.operations.push(Operation::ExecuteProgramBuffer {
            progbuf: progbuf.to_vec(),
        });
        state.check_halted()?;

        state.progbuf_result
    }

    fn reset(&mut self, asserted: bool) {
        let mut state = self.lock();
        state.operations.push(Operation::Reset { asserted });
        if !asserted {
            state.halted = false;
            for index in 0..32 {
                state.registers.insert(GPR_BASE + index, 0);
            }
            state.registers.insert(DCSR, DCSR_RESET);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn registers_require_halt() {
        let mut hart = FakeHart::new();

        assert_eq!(
            hart.read_register(GPR_BASE + 1, AccessSize::U64),
            Err(Fault::NotHalted)
        );

        hart.halt();
        hart.write_register(GPR_BASE + 1, AccessSize::U32, 0x1_2345_6789)
            .unwrap();

        assert_eq!(
            hart.read_register(GPR_BASE + 1, AccessSize::U64),
            Ok(0x2345_6789)
        );
        assert_eq!(
            hart.read_register(0x300, AccessSize::U64),
            Err(Fault::Exception)
        );
    }

    #[test]
    fn x0_is_hardwired() {
        let mut hart = FakeHart::new().halted();

        hart.write_register(GPR_BASE, AccessSize::U64, 5).unwrap();

        assert_eq!(hart.read_register(GPR_BASE, AccessSize::U64), Ok(0));
    }

    #[test]
    fn memory_is_little_endian() {
        let mut hart = FakeHart::new();
        hart.map_memory(0x8000_0000, 16);

        hart.write_memory(0x8000_0000, AccessSize::U32, false, 0x1122_3344)
            .unwrap();

        assert_eq!(hart.memory(0x8000_0000), Some(0x44));
        assert_eq!(hart.memory(0x8000_0003), Some(0x11));
        assert_eq!(
            hart.read_memory(0x8000_0002, AccessSize::U16, false),
            Ok(0x1122)
        );
    }

    #[test]
    fn unmapped_memory_is_a_bus_error() {
        let mut hart = FakeHart::new();
        hart.map_memory(0x1000, 2);

        assert_eq!(
            hart.read_memory(0x1000, AccessSize::U32, false),
            Err(Fault::Bus)
        );
        assert_eq!(
            hart.write_memory(0x1001, AccessSize::U16, false, 0),
            Err(Fault::Bus)
        );
        // A failed write leaves memory untouched.
        assert_eq!(hart.memory(0x1001), Some(0));
    }

    #[test]
    fn clones_share_state() {
        let hart = FakeHart::new();
        let mut port = hart.clone();

        port.halt();
        port.resume();

        assert!(!hart.is_halted());
        assert_eq!(hart.halt_requests(), 1);
        assert_eq!(
            hart.operations(),
            vec![Operation::Halt, Operation::Resume]
        );
    }
}
