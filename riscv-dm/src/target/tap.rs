//! IEEE 1149.1 Test Access Port.

use crate::architecture::riscv::dtm::{IDCODE_ADDRESS, IR_LENGTH};

/// The sixteen states of the TAP controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TapState {
    TestLogicReset,
    RunTestIdle,
    SelectDrScan,
    CaptureDr,
    ShiftDr,
    Exit1Dr,
    PauseDr,
    Exit2Dr,
    UpdateDr,
    SelectIrScan,
    CaptureIr,
    ShiftIr,
    Exit1Ir,
    PauseIr,
    Exit2Ir,
    UpdateIr,
}

impl TapState {
    /// All states, in declaration order.
    pub const ALL: [TapState; 16] = [
        Self::TestLogicReset,
        Self::RunTestIdle,
        Self::SelectDrScan,
        Self::CaptureDr,
        Self::ShiftDr,
        Self::Exit1Dr,
        Self::PauseDr,
        Self::Exit2Dr,
        Self::UpdateDr,
        Self::SelectIrScan,
        Self::CaptureIr,
        Self::ShiftIr,
        Self::Exit1Ir,
        Self::PauseIr,
        Self::Exit2Ir,
        Self::UpdateIr,
    ];

    /// State after a rising TCK edge with the given TMS level.
    pub fn next(self, tms: bool) -> Self {
        match (self, tms) {
            (Self::TestLogicReset, false) => Self::RunTestIdle,
            (Self::TestLogicReset, true) => Self::TestLogicReset,
            (Self::RunTestIdle, false) => Self::RunTestIdle,
            (Self::RunTestIdle, true) => Self::SelectDrScan,

            (Self::SelectDrScan, false) => Self::CaptureDr,
            (Self::SelectDrScan, true) => Self::SelectIrScan,
            (Self::CaptureDr, false) => Self::ShiftDr,
            (Self::CaptureDr, true) => Self::Exit1Dr,
            (Self::ShiftDr, false) => Self::ShiftDr,
            (Self::ShiftDr, true) => Self::Exit1Dr,
            (Self::Exit1Dr, false) => Self::PauseDr,
            (Self::Exit1Dr, true) => Self::UpdateDr,
            (Self::PauseDr, false) => Self::PauseDr,
            (Self::PauseDr, true) => Self::Exit2Dr,
            (Self::Exit2Dr, false) => Self::ShiftDr,
            (Self::Exit2Dr, true) => Self::UpdateDr,
            (Self::UpdateDr, false) => Self::RunTestIdle,
            (Self::UpdateDr, true) => Self::SelectDrScan,

            (Self::SelectIrScan, false) => Self::CaptureIr,
            (Self::SelectIrScan, true) => Self::TestLogicReset,
            (Self::CaptureIr, false) => Self::ShiftIr,
            (Self::CaptureIr, true) => Self::Exit1Ir,
            (Self::ShiftIr, false) => Self::ShiftIr,
            (Self::ShiftIr, true) => Self::Exit1Ir,
            (Self::Exit1Ir, false) => Self::PauseIr,
            (Self::Exit1Ir, true) => Self::UpdateIr,
            (Self::PauseIr, false) => Self::PauseIr,
            (Self::PauseIr, true) => Self::Exit2Ir,
            (Self::Exit2Ir, false) => Self::ShiftIr,
            (Self::Exit2Ir, true) => Self::UpdateIr,
            (Self::UpdateIr, false) => Self::RunTestIdle,
            (Self::UpdateIr, true) => Self::SelectDrScan,
        }
    }

    fn is_shift(self) -> bool {
        matches!(self, Self::ShiftDr | Self::ShiftIr)
    }
}

/// The bits between TDI and TDO while a register is shifted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShiftRegister {
    /// Register contents, bit 0 is next on TDO.
    pub value: u128,
    /// Number of bits in the register.
    pub len: u32,
}

impl ShiftRegister {
    pub fn new(value: u128, len: u32) -> Self {
        Self {
            value: value & mask(len),
            len,
        }
    }

    /// Shift one bit towards TDO, `tdi` enters at the top.
    fn shift(&mut self, tdi: bool) {
        if self.len == 0 {
            return;
        }

        self.value >>= 1;
        if tdi {
            self.value |= 1 << (self.len - 1);
        }
    }
}

fn mask(len: u32) -> u128 {
    if len >= 128 {
        u128::MAX
    } else {
        (1 << len) - 1
    }
}

/// The instruction specific data registers behind the TAP.
pub trait DataRegisterHandler {
    /// Contents loaded in Capture-DR for the current `instruction`.
    ///
    /// `None` leaves the shift register untouched.
    fn capture_dr(&mut self, instruction: u32) -> Option<ShiftRegister>;

    /// Called in Update-DR with the shifted in contents.
    fn update_dr(&mut self, instruction: u32, dr: ShiftRegister);

    /// Called on every rising TCK edge with the state the TAP was in.
    fn clock(&mut self, _state: TapState) {}
}

/// A TAP controller with a five bit instruction register.
///
/// The controller acts on rising TCK edges only. On every edge it first
/// performs the action of the current state and then moves to the next state.
#[derive(Debug)]
pub struct TapStateMachine<H> {
    state: TapState,
    ir: u32,
    dr: ShiftRegister,
    handler: H,
}

impl<H: DataRegisterHandler> TapStateMachine<H> {
    pub fn new(handler: H) -> Self {
        Self {
            state: TapState::TestLogicReset,
            ir: IDCODE_ADDRESS,
            dr: ShiftRegister::default(),
            handler,
        }
    }

    /// Asynchronous reset through `trst`.
    pub fn reset(&mut self) {
        tracing::trace!("TAP reset");
        self.state = TapState::TestLogicReset;
        self.ir = IDCODE_ADDRESS;
    }

    /// Advance by one TCK edge and return the TDO level seen during the edge.
    pub fn advance(&mut self, tck_rising: bool, tms: bool, tdi: bool) -> bool {
        let tdo = self.tdo();

        if !tck_rising {
            return tdo;
        }

        match self.state {
            TapState::TestLogicReset => self.ir = IDCODE_ADDRESS,
            TapState::CaptureIr => {
                self.dr = ShiftRegister::new(((self.ir & !0b11) | 0b01) as u128, IR_LENGTH);
            }
            TapState::ShiftIr | TapState::ShiftDr => self.dr.shift(tdi),
            TapState::UpdateIr => {
                self.ir = (self.dr.value & mask(IR_LENGTH)) as u32;
                tracing::trace!("IR <- {:#04x}", self.ir);
            }
            TapState::CaptureDr => {
                if let Some(dr) = self.handler.capture_dr(self.ir) {
                    self.dr = dr;
                }
            }
            TapState::UpdateDr => self.handler.update_dr(self.ir, self.dr),
            _ => {}
        }

        self.handler.clock(self.state);
        self.state = self.state.next(tms);

        tdo
    }

    /// The current TDO level. Only driven in the shift states.
    pub fn tdo(&self) -> bool {
        self.state.is_shift() && self.dr.value & 1 == 1
    }

    pub fn state(&self) -> TapState {
        self.state
    }

    /// The instruction currently in effect.
    pub fn ir(&self) -> u32 {
        self.ir
    }

    pub fn dr(&self) -> ShiftRegister {
        self.dr
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }
}
