//! DMI access without a JTAG transport in between.

use std::time::{Duration, Instant};

use crate::architecture::riscv::communication_interface::RiscvError;
use crate::architecture::riscv::dtm::dtm_access::DtmAccess;
use crate::probe::DebugProbeError;
use crate::target::dmi::{DmiStatus, DmiTransactionInterface};

/// [`DtmAccess`] directly on a [`DmiTransactionInterface`], for example a
/// [`DmiClient`](crate::target::bridge::DmiClient) or a
/// [`DebugModule`](crate::target::debug_module::DebugModule).
///
/// Busy accesses are retried after a [`tick`](DmiTransactionInterface::tick)
/// of the target.
#[derive(Debug)]
pub struct DirectDtm<D> {
    dmi: D,
}

impl<D: DmiTransactionInterface> DirectDtm<D> {
    pub fn new(dmi: D) -> Self {
        Self { dmi }
    }

    pub fn dmi(&self) -> &D {
        &self.dmi
    }

    pub fn dmi_mut(&mut self) -> &mut D {
        &mut self.dmi
    }

    pub fn into_inner(self) -> D {
        self.dmi
    }

    fn access_with_timeout(
        &mut self,
        timeout: Duration,
        mut access: impl FnMut(&mut D) -> (u32, DmiStatus),
    ) -> Result<u32, RiscvError> {
        let start_time = Instant::now();

        loop {
            match access(&mut self.dmi) {
                (value, DmiStatus::Success) => return Ok(value),
                (_, DmiStatus::Busy) => {
                    tracing::debug!("dmi busy, retrying");
                    self.dmi.tick();
                }
                (_, status) => {
                    tracing::warn!("dmi access failed with {:?}", status);
                    return Err(RiscvError::DtmOperationFailed);
                }
            }

            if start_time.elapsed() > timeout {
                return Err(RiscvError::Timeout);
            }
        }
    }
}

impl<D: DmiTransactionInterface + std::fmt::Debug> DtmAccess for DirectDtm<D> {
    fn clear_error_state(&mut self) -> Result<(), RiscvError> {
        // Nothing is sticky without a DTM.
        Ok(())
    }

    fn hard_reset(&mut self) -> Result<(), RiscvError> {
        self.dmi.hard_reset();
        Ok(())
    }

    fn read_with_timeout(&mut self, address: u32, timeout: Duration) -> Result<u32, RiscvError> {
        self.access_with_timeout(timeout, |dmi| dmi.read(address))
    }

    fn write_with_timeout(
        &mut self,
        address: u32,
        value: u32,
        timeout: Duration,
    ) -> Result<(), RiscvError> {
        self.access_with_timeout(timeout, |dmi| (0, dmi.write(address, value)))?;
        Ok(())
    }

    fn read_idcode(&mut self) -> Result<Option<u32>, DebugProbeError> {
        Ok(None)
    }
}
