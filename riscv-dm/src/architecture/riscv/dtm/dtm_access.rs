use crate::architecture::riscv::communication_interface::RiscvError;
use crate::probe::DebugProbeError;
use std::fmt;
use std::time::Duration;

/// Register access to a Debug Module over some transport.
pub trait DtmAccess: fmt::Debug {
    /// Perform interface-specific initialisation upon attaching.
    fn init(&mut self) -> Result<(), RiscvError> {
        Ok(())
    }

    /// Clear the sticky error state, if applicable
    fn clear_error_state(&mut self) -> Result<(), RiscvError>;

    /// Reset the Debug Module and abort any `dmi` access in progress.
    fn hard_reset(&mut self) -> Result<(), RiscvError>;

    /// Read an address on the `dmi` bus. If a busy value is returned, the access is
    /// retried until the transfer either succeeds, or the timeout expires.
    fn read_with_timeout(&mut self, address: u32, timeout: Duration) -> Result<u32, RiscvError>;

    /// Write an address to the `dmi` bus. If a busy value is returned, the access is
    /// retried until the transfer either succeeds, or the timeout expires.
    fn write_with_timeout(
        &mut self,
        address: u32,
        value: u32,
        timeout: Duration,
    ) -> Result<(), RiscvError>;

    /// Returns an idcode used for chip detection, `None` if the transport has
    /// no TAP.
    fn read_idcode(&mut self) -> Result<Option<u32>, DebugProbeError>;
}
