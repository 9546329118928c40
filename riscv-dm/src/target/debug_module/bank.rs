//! Register side of the Debug Module.
//!
//! Reads return values derived from the state of the previous clock, all side
//! effects go into `next`.

use super::{DmState, HartStatus, Inputs};
use crate::architecture::riscv::registers::{
    AbstractCommandErrorKind, Abstractauto, Abstractcs, Dmcontrol, DmRegister, Dmstatus,
    Hartinfo, DEBUG_MODULE_VERSION,
};
use crate::config::DebugModuleConfig;

pub(super) fn read(
    state: &DmState,
    next: &mut DmState,
    register: DmRegister,
    inputs: &Inputs<'_>,
    config: &DebugModuleConfig,
) -> u32 {
    match register {
        DmRegister::Data(index) if index < config.data_count as usize => {
            if state.autoexecdata & (1 << index) != 0 {
                autoexec(state, next);
            }
            state.data[index]
        }
        DmRegister::Progbuf(index) if index < config.progbuf_size as usize => {
            if state.autoexecprogbuf & (1 << index) != 0 {
                autoexec(state, next);
            }
            state.progbuf[index]
        }
        DmRegister::Dmcontrol => {
            let mut dmcontrol = Dmcontrol(0);
            dmcontrol.set_hartsel(state.hartsel);
            dmcontrol.set_hartreset(state.hartreset);
            dmcontrol.set_ndmreset(state.ndmreset);
            dmcontrol.set_dmactive(state.dmactive);
            dmcontrol.0
        }
        DmRegister::Dmstatus => dmstatus(state, inputs).0,
        DmRegister::Hartinfo => {
            let mut hartinfo = Hartinfo(0);
            if inputs
                .hart(state.selected_hart())
                .is_some_and(|hart| hart.available)
            {
                hartinfo.set_nscratch(config.nscratch as u32);
            }
            hartinfo.0
        }
        DmRegister::Abstractcs => {
            let mut abstractcs = Abstractcs(0);
            abstractcs.set_progbufsize(config.progbuf_size as u32);
            abstractcs.set_busy(state.is_busy());
            abstractcs.set_cmderr(state.cmderr as u32);
            abstractcs.set_datacount(config.data_count as u32);
            abstractcs.0
        }
        DmRegister::Abstractauto => {
            let mut abstractauto = Abstractauto(0);
            abstractauto.set_autoexecdata(state.autoexecdata);
            abstractauto.set_autoexecprogbuf(state.autoexecprogbuf);
            abstractauto.0
        }
        DmRegister::Haltsum0 => inputs
            .harts
            .iter()
            .take(32)
            .enumerate()
            .filter(|(_, hart)| hart.halted)
            .fold(0, |sum, (index, _)| sum | 1 << index),
        // `command` is write only.
        DmRegister::Command => 0,
        DmRegister::Data(_) | DmRegister::Progbuf(_) | DmRegister::Unmapped(_) => 0,
    }
}

pub(super) fn write(
    state: &DmState,
    next: &mut DmState,
    register: DmRegister,
    value: u32,
    inputs: &Inputs<'_>,
    config: &DebugModuleConfig,
) {
    match register {
        DmRegister::Data(index) if index < config.data_count as usize => {
            if state.is_busy() {
                next.raise(AbstractCommandErrorKind::Busy);
                return;
            }
            next.data[index] = value;
            if state.autoexecdata & (1 << index) != 0 {
                autoexec(state, next);
            }
        }
        DmRegister::Progbuf(index) if index < config.progbuf_size as usize => {
            if state.is_busy() {
                next.raise(AbstractCommandErrorKind::Busy);
                return;
            }
            next.progbuf[index] = value;
            if state.autoexecprogbuf & (1 << index) != 0 {
                autoexec(state, next);
            }
        }
        DmRegister::Dmcontrol => write_dmcontrol(state, next, Dmcontrol(value), inputs),
        DmRegister::Abstractcs => {
            // cmderr is write 1 to clear.
            let clear = Abstractcs(value).cmderr();
            if clear != 0 {
                next.cmderr = AbstractCommandErrorKind::parse(state.cmderr as u32 & !clear);
                tracing::debug!("Clearing cmderr {:?} -> {:?}", state.cmderr, next.cmderr);
            }
        }
        DmRegister::Command => {
            if state.cmderr != AbstractCommandErrorKind::None {
                tracing::debug!(
                    "Ignoring command {:#010x}, cmderr is {:?}",
                    value,
                    state.cmderr
                );
            } else if state.is_busy() {
                next.raise(AbstractCommandErrorKind::Busy);
            } else {
                next.command = value;
                next.command_state = super::CommandState::Init;
            }
        }
        DmRegister::Abstractauto => {
            let abstractauto = Abstractauto(value);
            next.autoexecdata = abstractauto.autoexecdata() & mask(config.data_count);
            next.autoexecprogbuf = abstractauto.autoexecprogbuf() & mask(config.progbuf_size);
        }
        DmRegister::Dmstatus
        | DmRegister::Hartinfo
        | DmRegister::Haltsum0
        | DmRegister::Data(_)
        | DmRegister::Progbuf(_)
        | DmRegister::Unmapped(_) => {
            tracing::debug!("Ignoring write of {:#010x} to {:?}", value, register);
        }
    }
}

fn mask(bits: u8) -> u32 {
    match bits {
        32.. => u32::MAX,
        bits => (1 << bits) - 1,
    }
}

/// Re-run the last command after an access to a data or program buffer
/// register with its autoexec bit set.
fn autoexec(state: &DmState, next: &mut DmState) {
    if state.cmderr != AbstractCommandErrorKind::None {
        return;
    }

    if state.is_busy() {
        next.raise(AbstractCommandErrorKind::Busy);
    } else {
        tracing::trace!("autoexec of command {:#010x}", state.command);
        next.command_state = super::CommandState::Init;
    }
}

fn write_dmcontrol(
    state: &DmState,
    next: &mut DmState,
    dmcontrol: Dmcontrol,
    inputs: &Inputs<'_>,
) {
    let previous = state.last_dmcontrol;
    let hartsel = dmcontrol.hartsel() & hartsel_mask(inputs.harts.len());

    next.dmactive = dmcontrol.dmactive();
    next.ndmreset = dmcontrol.ndmreset();
    next.hartreset = dmcontrol.hartreset();
    next.hartsel = hartsel;
    next.last_dmcontrol = dmcontrol;

    let hart = inputs.hart(hartsel as usize);
    let halted = hart.is_some_and(|hart| hart.halted);

    if dmcontrol.haltreq() && !previous.haltreq() {
        if halted && !dmcontrol.ndmreset() {
            tracing::debug!("haltreq for hart {} which is already halted", hartsel);
            next.raise(AbstractCommandErrorKind::HaltResume);
        } else {
            next.haltreq = true;
        }
    }

    // haltreq takes priority, resumereq is ignored while it is set.
    if dmcontrol.resumereq() && !previous.resumereq() && !dmcontrol.haltreq() {
        if halted {
            next.resumereq = true;
            next.resumeack = false;
        } else {
            tracing::debug!("resumereq for hart {} which is not halted", hartsel);
            next.raise(AbstractCommandErrorKind::HaltResume);
        }
    }

    if dmcontrol.ackhavereset() {
        if let Some(flag) = next.havereset.get_mut(hartsel as usize) {
            *flag = false;
        }
    }

    if dmcontrol.setresethaltreq() {
        next.resethaltreq = true;
    } else if dmcontrol.clrresethaltreq() {
        next.resethaltreq = false;
    }
}

/// Writable `hartsel` bits: enough to address every hart and one past the
/// last, so a debugger can discover the number of harts.
fn hartsel_mask(hart_count: usize) -> u32 {
    let bits = (usize::BITS - hart_count.leading_zeros()).clamp(1, 20);
    (1 << bits) - 1
}

fn dmstatus(state: &DmState, inputs: &Inputs<'_>) -> Dmstatus {
    let mut dmstatus = Dmstatus(0);
    dmstatus.set_version(DEBUG_MODULE_VERSION);
    dmstatus.set_authenticated(true);
    dmstatus.set_hasresethaltreq(true);

    let hart = state.selected_hart();
    match inputs.hart(hart) {
        None => {
            dmstatus.set_allnonexistent(true);
            dmstatus.set_anynonexistent(true);
        }
        Some(HartStatus {
            available: false, ..
        }) => {
            dmstatus.set_allunavail(true);
            dmstatus.set_anyunavail(true);
        }
        Some(HartStatus { halted: true, .. }) => {
            dmstatus.set_allhalted(true);
            dmstatus.set_anyhalted(true);
        }
        Some(_) => {
            dmstatus.set_allrunning(true);
            dmstatus.set_anyrunning(true);
        }
    }

    if state.resumeack {
        dmstatus.set_allresumeack(true);
        dmstatus.set_anyresumeack(true);
    }

    if state.havereset.get(hart).copied().unwrap_or(false) {
        dmstatus.set_allhavereset(true);
        dmstatus.set_anyhavereset(true);
    }

    dmstatus
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(0, 0)]
    #[test_case(1, 0x1)]
    #[test_case(4, 0xf)]
    #[test_case(12, 0xfff)]
    #[test_case(16, 0xffff)]
    fn autoexec_masks(bits: u8, expected: u32) {
        assert_eq!(mask(bits), expected);
    }

    #[test_case(1, 0x1)]
    #[test_case(2, 0x3)]
    #[test_case(4, 0x7)]
    #[test_case(8, 0xf)]
    fn hartsel_masks(hart_count: usize, expected: u32) {
        assert_eq!(hartsel_mask(hart_count), expected);
    }
}
