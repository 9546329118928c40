//! Abstract command execution.
//!
//! A command takes several clocks: `Init` decodes `command` and issues the
//! first hart request, `Request` waits for its result and `Response` stores it,
//! possibly chaining a program buffer execution.

use super::{DmState, HartAction, Inputs, PortRequest};
use crate::architecture::riscv::registers::{
    AbstractCommandErrorKind, AbstractCommandType, AccessMemoryCommand, AccessRegisterCommand,
    Command,
};
use crate::config::DebugModuleConfig;
use crate::target::hart::{AccessSize, Fault};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CommandState {
    Idle,
    Init,
    Request,
    Response,
    /// Quick access: waiting for the hart to halt.
    WaitHalted,
}

/// The hart request a command is currently waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Transfer {
    Register {
        regno: u16,
        size: AccessSize,
        write: bool,
    },
    Memory {
        size: AccessSize,
        virt: bool,
        write: bool,
    },
    ProgramBuffer,
}

/// Bookkeeping of the command in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Execution {
    hart: usize,
    transfer: Transfer,
    postincrement: bool,
    postexec: bool,
    quick: bool,
    result: Option<Result<u64, Fault>>,
}

impl From<Fault> for AbstractCommandErrorKind {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::Exception => Self::Exception,
            Fault::Bus => Self::Bus,
            Fault::Unsupported => Self::NotSupported,
            Fault::NotHalted => Self::HaltResume,
        }
    }
}

pub(super) fn advance(
    state: &DmState,
    next: &mut DmState,
    inputs: &Inputs<'_>,
    config: &DebugModuleConfig,
    actions: &mut Vec<HartAction>,
) {
    match state.command_state {
        CommandState::Idle => {}
        CommandState::Init => init(state, next, inputs, config, actions),
        CommandState::Request => {
            if let Some(result) = inputs.port {
                if let Some(execution) = next.execution.as_mut() {
                    execution.result = Some(result);
                }
                next.command_state = CommandState::Response;
            }
        }
        CommandState::Response => response(state, next, config, actions),
        CommandState::WaitHalted => {
            let Some(execution) = &state.execution else {
                finish(next, false);
                return;
            };

            if inputs.hart(execution.hart).is_some_and(|hart| hart.halted) {
                request(next, execution.hart, program_buffer(state, config), actions);
            }
        }
    }
}

fn init(
    state: &DmState,
    next: &mut DmState,
    inputs: &Inputs<'_>,
    config: &DebugModuleConfig,
    actions: &mut Vec<HartAction>,
) {
    let command = Command(state.command);
    let hart = state.selected_hart();

    let Some(cmdtype) = AbstractCommandType::parse(command.cmdtype()) else {
        tracing::debug!("Unsupported command type {:#x}", command.cmdtype());
        return fail(next, AbstractCommandErrorKind::NotSupported);
    };

    if !inputs.hart(hart).is_some_and(|hart| hart.available) {
        tracing::debug!("Abstract command for unavailable hart {}", hart);
        return fail(next, AbstractCommandErrorKind::HaltResume);
    }

    match cmdtype {
        AbstractCommandType::AccessRegister => {
            let command = AccessRegisterCommand(state.command);
            let Some(size) = AccessSize::parse(command.aarsize()) else {
                return fail(next, AbstractCommandErrorKind::NotSupported);
            };

            let transfer = if command.transfer() {
                Transfer::Register {
                    regno: command.regno() as u16,
                    size,
                    write: command.write(),
                }
            } else if command.postexec() {
                Transfer::ProgramBuffer
            } else {
                next.command_state = CommandState::Idle;
                return;
            };

            next.execution = Some(Execution {
                hart,
                transfer,
                postincrement: command.aarpostincrement(),
                postexec: command.postexec(),
                quick: false,
                result: None,
            });

            let port_request = match transfer {
                Transfer::Register {
                    regno,
                    size,
                    write: true,
                } => PortRequest::WriteRegister {
                    regno,
                    size,
                    value: state.data64() & size.mask(),
                },
                Transfer::Register { regno, size, .. } => {
                    PortRequest::ReadRegister { regno, size }
                }
                _ => program_buffer(state, config),
            };
            request(next, hart, port_request, actions);
        }
        AbstractCommandType::QuickAccess => {
            if inputs.hart(hart).is_some_and(|hart| hart.halted) {
                tracing::debug!("Quick access on halted hart {}", hart);
                return fail(next, AbstractCommandErrorKind::HaltResume);
            }

            next.execution = Some(Execution {
                hart,
                transfer: Transfer::ProgramBuffer,
                postincrement: false,
                postexec: false,
                quick: true,
                result: None,
            });
            next.haltreq = true;
            next.command_state = CommandState::WaitHalted;
        }
        AbstractCommandType::AccessMemory => {
            let command = AccessMemoryCommand(state.command);
            let Some(size) = AccessSize::parse(command.aamsize()) else {
                return fail(next, AbstractCommandErrorKind::NotSupported);
            };

            // The address lives in data2 and data3.
            if config.data_count < 4 {
                return fail(next, AbstractCommandErrorKind::NotSupported);
            }

            let address = memory_address(state);
            let virt = command.aamvirtual();
            let write = command.write();

            next.execution = Some(Execution {
                hart,
                transfer: Transfer::Memory { size, virt, write },
                postincrement: command.aampostincrement(),
                postexec: false,
                quick: false,
                result: None,
            });

            let port_request = if write {
                PortRequest::WriteMemory {
                    address,
                    size,
                    virt,
                    value: state.data64() & size.mask(),
                }
            } else {
                PortRequest::ReadMemory {
                    address,
                    size,
                    virt,
                }
            };
            request(next, hart, port_request, actions);
        }
    }
}

fn response(
    state: &DmState,
    next: &mut DmState,
    config: &DebugModuleConfig,
    actions: &mut Vec<HartAction>,
) {
    let Some(execution) = &state.execution else {
        finish(next, false);
        return;
    };
    let result = execution.result.unwrap_or(Err(Fault::Unsupported));

    match execution.transfer {
        Transfer::Register { regno, size, write } => {
            if let (Ok(value), false) = (result, write) {
                store_read(next, value, size);
            }

            if execution.postincrement {
                let mut command = AccessRegisterCommand(next.command);
                command.set_regno(regno.wrapping_add(1) as u32);
                next.command = command.0;
            }

            match result {
                Err(fault) => {
                    next.raise(fault.into());
                    finish(next, execution.quick);
                }
                Ok(_) if execution.postexec => {
                    let hart = execution.hart;
                    if let Some(execution) = next.execution.as_mut() {
                        execution.transfer = Transfer::ProgramBuffer;
                        execution.result = None;
                    }
                    request(next, hart, program_buffer(state, config), actions);
                }
                Ok(_) => finish(next, execution.quick),
            }
        }
        Transfer::Memory { size, write, .. } => {
            if let (Ok(value), false) = (result, write) {
                store_read(next, value, size);
            }

            if execution.postincrement {
                let address = memory_address(state).wrapping_add(size.bytes());
                next.data[2] = address as u32;
                next.data[3] = (address >> 32) as u32;
            }

            if let Err(fault) = result {
                next.raise(fault.into());
            }
            finish(next, execution.quick);
        }
        Transfer::ProgramBuffer => {
            if let Err(fault) = result {
                next.raise(fault.into());
            }
            finish(next, execution.quick);
        }
    }
}

/// Copy a read value into data0 and data1. Accesses narrower than 64 bits
/// clear data1.
fn store_read(next: &mut DmState, value: u64, size: AccessSize) {
    let value = value & size.mask();
    next.data[0] = value as u32;
    next.data[1] = (value >> 32) as u32;
}

fn memory_address(state: &DmState) -> u64 {
    (state.data[3] as u64) << 32 | state.data[2] as u64
}

fn program_buffer(state: &DmState, config: &DebugModuleConfig) -> PortRequest {
    PortRequest::ExecuteProgramBuffer(state.progbuf[..config.progbuf_size as usize].to_vec())
}

fn request(next: &mut DmState, hart: usize, request: PortRequest, actions: &mut Vec<HartAction>) {
    actions.push(HartAction::Request { hart, request });
    next.command_state = CommandState::Request;
}

fn fail(next: &mut DmState, error: AbstractCommandErrorKind) {
    next.raise(error);
    next.execution = None;
    next.command_state = CommandState::Idle;
}

/// End the command. Quick access resumes the hart even if it failed.
fn finish(next: &mut DmState, quick: bool) {
    next.execution = None;
    next.command_state = CommandState::Idle;

    if quick {
        next.resumereq = true;
        next.resumeack = false;
    }
}
