//! IR and DR scans on top of [`JtagPins`].

use bitvec::prelude::*;

use crate::architecture::riscv::dtm::{IDCODE_ADDRESS, IR_LENGTH};
use crate::probe::{common::IdCode, DebugProbeError, JtagPins};
use crate::target::tap::TapState;

/// One TCK cycle of a scan.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScanCycle {
    /// TMS level for the rising edge.
    pub tms: bool,
    /// TDI level for the rising edge.
    pub tdi: bool,
    /// Whether TDO carries a bit of the data register during this cycle.
    pub capture: bool,
}

impl ScanCycle {
    fn tms(tms: bool) -> Self {
        Self {
            tms,
            tdi: false,
            capture: false,
        }
    }
}

/// Drives a single TAP through IR and DR scans.
///
/// Every scan starts and ends in Run-Test/Idle. The instruction register is
/// only rewritten when the requested instruction differs from the last one.
#[derive(Debug)]
pub struct ScanChainDriver<P> {
    pins: P,
    ir_len: u32,
    /// The instruction loaded by the last IR scan, `None` if unknown.
    current_ir: Option<u32>,
    state: TapState,
    idle_cycles: u8,
}

impl<P: JtagPins> ScanChainDriver<P> {
    /// A driver for a TAP with the five bit instruction register of a RISC-V
    /// Debug Transport Module.
    pub fn new(pins: P) -> Self {
        Self::with_ir_len(pins, IR_LENGTH)
    }

    /// A driver for a TAP with an `ir_len` bit instruction register.
    pub fn with_ir_len(pins: P, ir_len: u32) -> Self {
        Self {
            pins,
            ir_len,
            current_ir: None,
            // Nothing is known about the TAP until the first reset.
            state: TapState::TestLogicReset,
            idle_cycles: 0,
        }
    }

    /// Clocks out tms and tdi and samples tdo. Starts on a falling edge, TDI
    /// is sampled on the rising edge, TDO is sampled after the falling edge.
    fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool, DebugProbeError> {
        self.pins.set_pins(false, tms, tdi)?;
        let tdo = self.pins.get_tdo()?;
        self.pins.set_pins(true, tms, tdi)?;

        self.state = self.state.next(tms);
        Ok(tdo)
    }

    /// Reset the TAP through the reset lines and with five TMS high edges, in
    /// case `trst` is not connected, then go to Run-Test/Idle.
    pub fn reset(&mut self, trst: bool, srst: bool) -> Result<(), DebugProbeError> {
        self.pins.reset_tap(trst, srst)?;

        for _ in 0..5 {
            self.clock(true, false)?;
        }
        self.clock(false, false)?;

        // Test-Logic-Reset selects IDCODE
        self.current_ir = Some(IDCODE_ADDRESS);
        tracing::trace!("TAP reset, state {:?}", self.state);
        Ok(())
    }

    /// The pin sequence for a scan of `dr` into the data register selected by
    /// `ir`, starting from Run-Test/Idle.
    pub fn build_scan_sequence(&self, ir: u32, dr: &BitSlice) -> Vec<ScanCycle> {
        let mut sequence = Vec::new();

        if self.current_ir != Some(ir) {
            // Run-Test/Idle -> Select-DR -> Select-IR -> Capture-IR -> Shift-IR
            sequence.extend([true, true, false, false].map(ScanCycle::tms));
            let ir_bits = (0..self.ir_len).map(|bit| bit < 32 && ir & (1 << bit) != 0);
            shift(&mut sequence, ir_bits, false);
            // Exit1-IR -> Update-IR -> Run-Test/Idle
            sequence.extend([true, false].map(ScanCycle::tms));
        }

        // Run-Test/Idle -> Select-DR -> Capture-DR -> Shift-DR
        sequence.extend([true, false, false].map(ScanCycle::tms));
        shift(&mut sequence, dr.iter().by_vals(), true);
        // Exit1-DR -> Update-DR -> Run-Test/Idle
        sequence.extend([true, false].map(ScanCycle::tms));

        sequence
    }

    /// Scan `dr` into the data register selected by `ir` and return the bits
    /// shifted out, followed by the configured number of idle cycles.
    pub fn scan(&mut self, ir: u32, dr: &BitSlice) -> Result<BitVec, DebugProbeError> {
        if self.state != TapState::RunTestIdle {
            self.reset(false, false)?;
        }

        let sequence = self.build_scan_sequence(ir, dr);
        let mut captured = BitVec::with_capacity(dr.len());

        for cycle in sequence {
            let tdo = self.clock(cycle.tms, cycle.tdi)?;
            if cycle.capture {
                captured.push(tdo);
            }
        }
        self.current_ir = Some(ir);

        self.idle(self.idle_cycles as usize)?;
        Ok(captured)
    }

    /// Write `len` bits of `value` to the data register selected by `ir` and
    /// return the previous contents.
    pub fn write_read_register(
        &mut self,
        ir: u32,
        value: u128,
        len: u32,
    ) -> Result<u128, DebugProbeError> {
        tracing::trace!("write_read_register({:#x}, {:#x}, {})", ir, value, len);
        let mut data = bitvec![0; len as usize];
        for (bit, mut slot) in data.iter_mut().enumerate() {
            *slot = bit < 128 && value & (1 << bit) != 0;
        }

        let captured = self.scan(ir, &data)?;
        let result = captured
            .iter()
            .by_vals()
            .enumerate()
            .filter(|(bit, tdo)| *tdo && *bit < 128)
            .fold(0u128, |value, (bit, _)| value | 1 << bit);

        tracing::trace!("write_read_register result: {:#x}", result);
        Ok(result)
    }

    /// Stay in Run-Test/Idle for the given number of clock cycles.
    pub fn idle(&mut self, clock_cycles: usize) -> Result<(), DebugProbeError> {
        for _ in 0..clock_cycles {
            self.clock(false, false)?;
        }
        Ok(())
    }

    /// Extra Run-Test/Idle cycles after every scan.
    pub fn idle_cycles(&self) -> u8 {
        self.idle_cycles
    }

    /// Set the number of Run-Test/Idle cycles after every scan.
    pub fn set_idle_cycles(&mut self, idle_cycles: u8) {
        tracing::trace!("set_idle_cycles({})", idle_cycles);
        self.idle_cycles = idle_cycles;
    }

    /// Read the IDCODE register.
    pub fn read_idcode(&mut self) -> Result<IdCode, DebugProbeError> {
        let dr = self.scan(IDCODE_ADDRESS, &bitvec![0; 32])?;
        let idcode = IdCode::from_dr(&dr).unwrap_or_default();
        tracing::debug!("Found IDCODE {}", idcode);
        Ok(idcode)
    }

    /// The TAP state, as far as the driver knows.
    pub fn state(&self) -> TapState {
        self.state
    }

    /// The pin interface the driver clocks.
    pub fn pins(&self) -> &P {
        &self.pins
    }

    /// Mutable access to the pin interface. Changing the TAP state behind
    /// the driver's back requires a [`reset`](Self::reset) afterwards.
    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }

    /// Give back the pin interface.
    pub fn into_inner(self) -> P {
        self.pins
    }
}

/// Append the cycles of a shift, entered from Capture. The last bit is
/// clocked in on the transition to Exit1.
fn shift(sequence: &mut Vec<ScanCycle>, bits: impl ExactSizeIterator<Item = bool>, capture: bool) {
    let len = bits.len();
    sequence.extend(bits.enumerate().map(|(index, tdi)| ScanCycle {
        tms: index + 1 == len,
        tdi,
        capture,
    }));
}
