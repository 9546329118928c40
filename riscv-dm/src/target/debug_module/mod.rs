//! The Debug Module: register bank and abstract command execution.
//!
//! Every clock the module computes its next state from the current state and
//! the inputs of the cycle (an optional DMI access, the run state of all harts
//! and the result of the last hart request). Hart side effects are collected
//! as [`HartAction`]s and performed after the new state has been committed, so
//! nothing observes a half updated register bank.

use crate::architecture::riscv::registers::{
    AbstractCommandErrorKind, Dmcontrol, DmRegister, MAX_DATA_COUNT, MAX_PROGBUF_SIZE,
};
use crate::config::DebugModuleConfig;
use crate::target::dmi::{DmiStatus, DmiTransactionInterface};
use crate::target::hart::{AccessSize, Fault, HartControlPort};

mod bank;
mod command;

use command::{CommandState, Execution};

/// Run state of a hart, sampled once per clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct HartStatus {
    pub halted: bool,
    pub available: bool,
}

/// A register access arriving over DMI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DmiAccess {
    Read(u32),
    Write(u32, u32),
}

/// A request to a hart, answered with the value read (or 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PortRequest {
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
    ExecuteProgramBuffer(Vec<u32>),
}

/// A side effect on a hart, performed after the state update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HartAction {
    Halt(usize),
    Resume(usize),
    Reset { hart: usize, asserted: bool },
    Request { hart: usize, request: PortRequest },
}

/// All registers and internal state of the Debug Module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DmState {
    dmactive: bool,
    ndmreset: bool,
    hartreset: bool,
    hartsel: u32,
    resethaltreq: bool,
    /// The last value written to `dmcontrol`, for edge detection.
    last_dmcontrol: Dmcontrol,

    haltreq: bool,
    resumereq: bool,
    resumeack: bool,
    havereset: Vec<bool>,

    cmderr: AbstractCommandErrorKind,
    command: u32,
    command_state: CommandState,
    execution: Option<Execution>,
    autoexecdata: u32,
    autoexecprogbuf: u32,

    data: [u32; MAX_DATA_COUNT],
    progbuf: [u32; MAX_PROGBUF_SIZE],
}

impl DmState {
    fn new(hart_count: usize) -> Self {
        Self {
            dmactive: false,
            ndmreset: false,
            hartreset: false,
            hartsel: 0,
            resethaltreq: false,
            last_dmcontrol: Dmcontrol(0),
            haltreq: false,
            resumereq: false,
            resumeack: false,
            havereset: vec![true; hart_count],
            cmderr: AbstractCommandErrorKind::None,
            command: 0,
            command_state: CommandState::Idle,
            execution: None,
            autoexecdata: 0,
            autoexecprogbuf: 0,
            data: [0; MAX_DATA_COUNT],
            progbuf: [0; MAX_PROGBUF_SIZE],
        }
    }

    fn is_busy(&self) -> bool {
        self.command_state != CommandState::Idle
    }

    fn selected_hart(&self) -> usize {
        self.hartsel as usize
    }

    /// Record an abstract command error. The first error sticks.
    fn raise(&mut self, error: AbstractCommandErrorKind) {
        if self.cmderr == AbstractCommandErrorKind::None {
            tracing::debug!("cmderr <- {:?}", error);
            self.cmderr = error;
        }
    }

    fn data64(&self) -> u64 {
        (self.data[1] as u64) << 32 | self.data[0] as u64
    }
}

/// Everything the Debug Module samples in one clock.
#[derive(Debug)]
pub(crate) struct Inputs<'a> {
    pub access: Option<DmiAccess>,
    pub harts: &'a [HartStatus],
    /// Result of the request issued in the previous clock.
    pub port: Option<Result<u64, Fault>>,
}

impl Inputs<'_> {
    fn hart(&self, index: usize) -> Option<HartStatus> {
        self.harts.get(index).copied()
    }
}

/// The outcome of one clock.
#[derive(Debug)]
pub(crate) struct Step {
    pub next: DmState,
    /// Data returned for a read access.
    pub response: u32,
    pub actions: Vec<HartAction>,
}

/// Compute the state after one clock. Pure, `state` is never modified.
pub(crate) fn compute_next(
    state: &DmState,
    inputs: &Inputs<'_>,
    config: &DebugModuleConfig,
) -> Step {
    let mut next = state.clone();
    let mut actions = Vec::new();
    let selected = inputs.hart(state.selected_hart());

    // Requests are levels until the selected hart reaches the requested state.
    if let Some(hart) = selected {
        if state.haltreq && hart.halted {
            next.haltreq = false;
        }
        if state.resumereq && !hart.halted {
            next.resumereq = false;
            next.resumeack = true;
        }
    }

    let response = match inputs.access {
        Some(DmiAccess::Read(address)) => {
            bank::read(state, &mut next, DmRegister::from_address(address), inputs, config)
        }
        Some(DmiAccess::Write(address, value)) => {
            bank::write(
                state,
                &mut next,
                DmRegister::from_address(address),
                value,
                inputs,
                config,
            );
            0
        }
        None => 0,
    };

    command::advance(state, &mut next, inputs, config, &mut actions);

    reset_actions(state, &mut next, inputs, &mut actions);

    let hart = next.selected_hart();
    if hart < inputs.harts.len() {
        if next.haltreq && !state.haltreq {
            actions.push(HartAction::Halt(hart));
        }
        if next.resumereq && !state.resumereq {
            actions.push(HartAction::Resume(hart));
        }
    }

    Step {
        next,
        response,
        actions,
    }
}

/// `ndmreset` resets every hart, `hartreset` the selected one. Both act on
/// transitions of the written value.
fn reset_actions(
    state: &DmState,
    next: &mut DmState,
    inputs: &Inputs<'_>,
    actions: &mut Vec<HartAction>,
) {
    if next.ndmreset != state.ndmreset {
        tracing::debug!("ndmreset {}", if next.ndmreset { "asserted" } else { "released" });
        for hart in 0..inputs.harts.len() {
            actions.push(HartAction::Reset {
                hart,
                asserted: next.ndmreset,
            });
        }

        if !next.ndmreset {
            next.havereset.iter_mut().for_each(|flag| *flag = true);
            if next.resethaltreq {
                actions.extend((0..inputs.harts.len()).map(HartAction::Halt));
            }
        }
    }

    let hart = next.selected_hart();
    if next.hartreset != state.hartreset && hart < inputs.harts.len() {
        actions.push(HartAction::Reset {
            hart,
            asserted: next.hartreset,
        });

        if !next.hartreset {
            next.havereset[hart] = true;
            if next.resethaltreq {
                actions.push(HartAction::Halt(hart));
            }
        }
    }
}

/// A RISC-V Debug Module serving a fixed set of harts.
///
/// Harts are addressed by their index in the vector passed to
/// [`DebugModule::new`], which is the value of `dmcontrol.hartsel`.
#[derive(Debug)]
pub struct DebugModule<H> {
    config: DebugModuleConfig,
    harts: Vec<H>,
    state: DmState,
    port_result: Option<Result<u64, Fault>>,
}

impl<H: HartControlPort> DebugModule<H> {
    pub fn new(config: DebugModuleConfig, harts: Vec<H>) -> Self {
        let state = DmState::new(harts.len());
        Self {
            config: config.clamped(),
            harts,
            state,
            port_result: None,
        }
    }

    /// Advance by one clock without a register access.
    pub fn step(&mut self) {
        self.clock(None);
    }

    /// Clock until no abstract command is executing, at most `max_steps` times.
    ///
    /// Returns `false` if the command is still running afterwards.
    pub fn run_until_idle(&mut self, max_steps: usize) -> bool {
        for _ in 0..max_steps {
            if !self.is_busy() {
                return true;
            }
            self.step();
        }
        !self.is_busy()
    }

    fn clock(&mut self, access: Option<DmiAccess>) -> u32 {
        let harts: Vec<HartStatus> = self
            .harts
            .iter()
            .map(|hart| HartStatus {
                halted: hart.is_halted(),
                available: hart.is_available(),
            })
            .collect();

        let inputs = Inputs {
            access,
            harts: &harts,
            port: self.port_result.take(),
        };

        let Step {
            next,
            response,
            actions,
        } = compute_next(&self.state, &inputs, &self.config);

        if next.command_state != self.state.command_state {
            tracing::trace!(
                "abstract command: {:?} -> {:?}",
                self.state.command_state,
                next.command_state
            );
        }

        self.state = next;

        for action in actions {
            self.perform(action);
        }

        response
    }

    fn perform(&mut self, action: HartAction) {
        tracing::trace!("Performing {:?}", action);

        match action {
            HartAction::Halt(index) => {
                if let Some(hart) = self.harts.get_mut(index) {
                    hart.halt();
                }
            }
            HartAction::Resume(index) => {
                if let Some(hart) = self.harts.get_mut(index) {
                    hart.resume();
                }
            }
            HartAction::Reset { hart, asserted } => {
                if let Some(hart) = self.harts.get_mut(hart) {
                    hart.reset(asserted);
                }
            }
            HartAction::Request { hart, request } => {
                let result = match self.harts.get_mut(hart) {
                    Some(hart) => Self::request(hart, request),
                    None => Err(Fault::Unsupported),
                };
                self.port_result = Some(result);
            }
        }
    }

    fn request(hart: &mut H, request: PortRequest) -> Result<u64, Fault> {
        match request {
            PortRequest::ReadRegister { regno, size } => hart.read_register(regno, size),
            PortRequest::WriteRegister { regno, size, value } => {
                hart.write_register(regno, size, value).map(|()| 0)
            }
            PortRequest::ReadMemory {
                address,
                size,
                virt,
            } => hart.read_memory(address, size, virt),
            PortRequest::WriteMemory {
                address,
                size,
                virt,
                value,
            } => hart.write_memory(address, size, virt, value).map(|()| 0),
            PortRequest::ExecuteProgramBuffer(progbuf) => {
                hart.execute_program_buffer(&progbuf).map(|()| 0)
            }
        }
    }

    /// Whether an abstract command is executing (`abstractcs.busy`).
    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    /// The pending abstract command error (`abstractcs.cmderr`).
    pub fn cmderr(&self) -> AbstractCommandErrorKind {
        self.state.cmderr
    }

    /// The last accepted value of the `command` register, which reads as 0
    /// over DMI.
    pub fn command(&self) -> u32 {
        self.state.command
    }

    /// Currently selected hart (`dmcontrol.hartsel`).
    pub fn hart_select(&self) -> u32 {
        self.state.hartsel
    }

    pub fn config(&self) -> &DebugModuleConfig {
        &self.config
    }

    pub fn harts(&self) -> &[H] {
        &self.harts
    }

    pub fn harts_mut(&mut self) -> &mut [H] {
        &mut self.harts
    }

    pub fn into_harts(self) -> Vec<H> {
        self.harts
    }
}

impl<H: HartControlPort> DmiTransactionInterface for DebugModule<H> {
    fn read(&mut self, address: u32) -> (u32, DmiStatus) {
        let value = self.clock(Some(DmiAccess::Read(address)));
        tracing::trace!("Read {:?}: {:#010x}", DmRegister::from_address(address), value);
        (value, DmiStatus::Success)
    }

    fn write(&mut self, address: u32, data: u32) -> DmiStatus {
        tracing::trace!("Write {:?}: {:#010x}", DmRegister::from_address(address), data);
        self.clock(Some(DmiAccess::Write(address, data)));
        DmiStatus::Success
    }

    fn hard_reset(&mut self) {
        tracing::debug!("Debug module hard reset");
        self.state = DmState::new(self.harts.len());
        self.port_result = None;
    }

    fn tick(&mut self) {
        self.step();
    }
}
