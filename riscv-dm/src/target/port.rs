//! The JTAG pins of the simulated target.

use crate::config::DebugModuleConfig;
use crate::probe::{DebugProbeError, JtagPins};
use crate::target::dmi::DmiTransactionInterface;
use crate::target::dtm::DebugTransportModule;
use crate::target::tap::TapStateMachine;

/// Pin level access to a TAP with a Debug Transport Module behind it.
///
/// The TAP is clocked on every rising edge of TCK seen through
/// [`set_pins`](Self::set_pins). `trst` resets the TAP, a rising edge of `srst`
/// hard resets the DMI target.
#[derive(Debug)]
pub struct JtagDebugPort<D> {
    tap: TapStateMachine<DebugTransportModule<D>>,
    tck: bool,
    srst: bool,
}

impl<D: DmiTransactionInterface> JtagDebugPort<D> {
    pub fn new(config: &DebugModuleConfig, dmi: D) -> Self {
        Self {
            tap: TapStateMachine::new(DebugTransportModule::new(config, dmi)),
            tck: false,
            srst: false,
        }
    }

    pub fn reset_tap(&mut self, trst: bool, srst: bool) {
        if trst {
            self.tap.reset();
        }

        if srst && !self.srst {
            tracing::debug!("srst asserted, resetting the debug module");
            self.tap.handler_mut().dmi_mut().hard_reset();
        }
        self.srst = srst;
    }

    pub fn set_pins(&mut self, tck: bool, tms: bool, tdi: bool) {
        let rising = tck && !self.tck;
        self.tck = tck;
        self.tap.advance(rising, tms, tdi);
    }

    pub fn get_tdo(&self) -> bool {
        self.tap.tdo()
    }

    pub fn tap(&self) -> &TapStateMachine<DebugTransportModule<D>> {
        &self.tap
    }

    pub fn dtm(&self) -> &DebugTransportModule<D> {
        self.tap.handler()
    }

    pub fn dmi(&self) -> &D {
        self.tap.handler().dmi()
    }

    pub fn dmi_mut(&mut self) -> &mut D {
        self.tap.handler_mut().dmi_mut()
    }
}

impl<D: DmiTransactionInterface> JtagPins for JtagDebugPort<D> {
    fn reset_tap(&mut self, trst: bool, srst: bool) -> Result<(), DebugProbeError> {
        JtagDebugPort::reset_tap(self, trst, srst);
        Ok(())
    }

    fn set_pins(&mut self, tck: bool, tms: bool, tdi: bool) -> Result<(), DebugProbeError> {
        JtagDebugPort::set_pins(self, tck, tms, tdi);
        Ok(())
    }

    fn get_tdo(&mut self) -> Result<bool, DebugProbeError> {
        Ok(JtagDebugPort::get_tdo(self))
    }
}
