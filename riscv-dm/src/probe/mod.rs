//! Host side access to a JTAG scan chain.
//!
//! Everything in here works on the [`JtagPins`] abstraction, which is the
//! lowest common denominator of bit-banged probes: set the three input pins,
//! sample TDO, drive the reset lines.

pub mod bitbang;
pub mod common;
pub mod scan_chain;

/// An error during the communication with a debug probe.
#[derive(thiserror::Error, Debug)]
pub enum DebugProbeError {
    /// The transport to the probe failed.
    #[error("Communication with the probe failed")]
    Io(#[from] std::io::Error),
    /// The probe answered a TDO read with something other than `0` or `1`.
    #[error("The probe answered a TDO read with the unexpected byte {0:#04x}")]
    UnexpectedTdo(u8),
    /// The probe closed the connection.
    #[error("The probe closed the connection")]
    Disconnected,
}

/// Pin level access to a JTAG TAP.
///
/// TDI and TMS are sampled by the TAP on the rising edge of TCK, TDO changes
/// on the falling edge.
pub trait JtagPins {
    /// Drive the TAP reset (`trst`) and system reset (`srst`) lines.
    ///
    /// `true` means the reset is asserted.
    fn reset_tap(&mut self, trst: bool, srst: bool) -> Result<(), DebugProbeError>;

    /// Drive TCK, TMS and TDI.
    fn set_pins(&mut self, tck: bool, tms: bool, tdi: bool) -> Result<(), DebugProbeError>;

    /// Sample TDO.
    fn get_tdo(&mut self) -> Result<bool, DebugProbeError>;
}

impl<P: JtagPins + ?Sized> JtagPins for &mut P {
    fn reset_tap(&mut self, trst: bool, srst: bool) -> Result<(), DebugProbeError> {
        (**self).reset_tap(trst, srst)
    }

    fn set_pins(&mut self, tck: bool, tms: bool, tdi: bool) -> Result<(), DebugProbeError> {
        (**self).set_pins(tck, tms, tdi)
    }

    fn get_tdo(&mut self) -> Result<bool, DebugProbeError> {
        (**self).get_tdo()
    }
}

impl<P: JtagPins + ?Sized> JtagPins for Box<P> {
    fn reset_tap(&mut self, trst: bool, srst: bool) -> Result<(), DebugProbeError> {
        (**self).reset_tap(trst, srst)
    }

    fn set_pins(&mut self, tck: bool, tms: bool, tdi: bool) -> Result<(), DebugProbeError> {
        (**self).set_pins(tck, tms, tdi)
    }

    fn get_tdo(&mut self) -> Result<bool, DebugProbeError> {
        (**self).get_tdo()
    }
}
