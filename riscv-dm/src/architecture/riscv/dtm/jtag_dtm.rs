//! JTAG access to the Debug Transport Module.

use std::time::{Duration, Instant};

use crate::architecture::riscv::communication_interface::RiscvError;
use crate::architecture::riscv::dtm::dtm_access::DtmAccess;
use crate::architecture::riscv::dtm::{
    Dtmcs, DMI_ADDRESS, DMI_ADDRESS_BIT_OFFSET, DTMCS_ADDRESS, DTMCS_WIDTH, DTM_VERSION,
};
use crate::probe::{scan_chain::ScanChainDriver, DebugProbeError, JtagPins};
use crate::target::dmi::{DmiRequest, DmiResponse, DmiStatus};

/// Access to the Debug Transport Module (DTM),
/// which is used to communicate with the RISC-V debug module.
#[derive(Debug)]
pub struct JtagDtm<P> {
    driver: ScanChainDriver<P>,

    /// Number of address bits in the DMI register
    abits: u32,
}

impl<P: JtagPins> JtagDtm<P> {
    pub fn new(driver: ScanChainDriver<P>) -> Self {
        Self { driver, abits: 0 }
    }

    pub fn driver(&self) -> &ScanChainDriver<P> {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut ScanChainDriver<P> {
        &mut self.driver
    }

    pub fn into_inner(self) -> ScanChainDriver<P> {
        self.driver
    }

    /// Number of address bits in the `dmi` register, known after [`DtmAccess::init`].
    pub fn abits(&self) -> u32 {
        self.abits
    }

    fn transform_dmi_result(response_value: u128, abits: u32) -> Result<u32, DmiStatus> {
        let response = DmiResponse::from_dr(response_value, abits);

        // Verify that the transfer was ok
        match response.status {
            DmiStatus::Success => Ok(response.data),
            status => Err(status),
        }
    }

    /// Perform an access to the dmi register of the JTAG Transport module.
    ///
    /// Every access both writes and reads from the register, which means a value is always
    /// returned. The `op` is checked for errors, and if it is not equal to zero, an error is returned.
    fn dmi_register_access(
        &mut self,
        op: DmiRequest,
    ) -> Result<Result<u32, DmiStatus>, DebugProbeError> {
        let bit_size = self.abits + DMI_ADDRESS_BIT_OFFSET;

        self.driver
            .write_read_register(DMI_ADDRESS, op.to_dr(), bit_size)
            .map(|value| Self::transform_dmi_result(value, self.abits))
    }

    fn dmi_register_access_with_timeout(
        &mut self,
        op: DmiRequest,
        timeout: Duration,
    ) -> Result<u32, RiscvError> {
        let start_time = Instant::now();

        loop {
            match self.dmi_register_access(op)? {
                Ok(result) => return Ok(result),
                Err(DmiStatus::Busy) => {
                    // Operation still in progress, reset dmi status and try again.
                    tracing::debug!("dmi busy during {:?}, retrying", op.op);
                    self.dmi_reset()?;
                    self.driver
                        .set_idle_cycles(self.driver.idle_cycles().saturating_add(1));
                }
                Err(status) => {
                    tracing::warn!("dmi {:?} failed with {:?}", op.op, status);
                    return Err(RiscvError::DtmOperationFailed);
                }
            };

            if start_time.elapsed() > timeout {
                return Err(RiscvError::Timeout);
            }
        }
    }

    fn dmi_reset(&mut self) -> Result<(), DebugProbeError> {
        let mut dtmcs = Dtmcs(0);
        dtmcs.set_dmireset(true);

        self.write_dtmcs(dtmcs)?;

        Ok(())
    }

    fn write_dtmcs(&mut self, dtmcs: Dtmcs) -> Result<Dtmcs, DebugProbeError> {
        let value = self
            .driver
            .write_read_register(DTMCS_ADDRESS, dtmcs.0 as u128, DTMCS_WIDTH)?;

        Ok(Dtmcs(value as u32))
    }
}

impl<P: JtagPins + std::fmt::Debug> DtmAccess for JtagDtm<P> {
    fn init(&mut self) -> Result<(), RiscvError> {
        self.driver.reset(false, false)?;
        let dtmcs = self.write_dtmcs(Dtmcs(0))?;

        if dtmcs.0 == 0 {
            return Err(RiscvError::NoRiscvTarget);
        }

        tracing::debug!("{:?}", dtmcs);

        if dtmcs.version() != DTM_VERSION {
            return Err(RiscvError::UnsupportedDebugTransportModuleVersion(
                dtmcs.version() as u8,
            ));
        }

        // Setup the number of idle cycles between JTAG accesses
        self.driver.set_idle_cycles(dtmcs.idle() as u8);
        self.abits = dtmcs.abits();

        Ok(())
    }

    fn clear_error_state(&mut self) -> Result<(), RiscvError> {
        self.dmi_reset()?;

        Ok(())
    }

    fn hard_reset(&mut self) -> Result<(), RiscvError> {
        let mut dtmcs = Dtmcs(0);
        dtmcs.set_dmihardreset(true);

        self.write_dtmcs(dtmcs)?;

        Ok(())
    }

    fn read_with_timeout(&mut self, address: u32, timeout: Duration) -> Result<u32, RiscvError> {
        // Prepare the read by sending a read request with the register address
        self.dmi_register_access_with_timeout(DmiRequest::read(address), timeout)?;

        // Read back the response from the previous request.
        self.dmi_register_access_with_timeout(DmiRequest::nop(), timeout)
    }

    fn write_with_timeout(
        &mut self,
        address: u32,
        value: u32,
        timeout: Duration,
    ) -> Result<(), RiscvError> {
        self.dmi_register_access_with_timeout(DmiRequest::write(address, value), timeout)?;

        Ok(())
    }

    fn read_idcode(&mut self) -> Result<Option<u32>, DebugProbeError> {
        let idcode = self.driver.read_idcode()?;

        Ok(Some(idcode.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DebugModuleConfig;
    use crate::target::debug_module::DebugModule;
    use crate::target::dmi::DmiTransactionInterface;
    use crate::target::fake_hart::FakeHart;
    use crate::target::port::JtagDebugPort;
    use pretty_assertions::assert_eq;

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn port(idle_cycles: u8) -> JtagDebugPort<DebugModule<FakeHart>> {
        let config = DebugModuleConfig {
            idle_cycles,
            ..Default::default()
        };
        JtagDebugPort::new(&config, DebugModule::new(config.clone(), vec![FakeHart::new()]))
    }

    /// A TAP that is not connected, TDO is stuck at one level.
    #[derive(Debug)]
    struct Stuck(bool);

    impl JtagPins for Stuck {
        fn reset_tap(&mut self, _trst: bool, _srst: bool) -> Result<(), DebugProbeError> {
            Ok(())
        }

        fn set_pins(&mut self, _tck: bool, _tms: bool, _tdi: bool) -> Result<(), DebugProbeError> {
            Ok(())
        }

        fn get_tdo(&mut self) -> Result<bool, DebugProbeError> {
            Ok(self.0)
        }
    }

    /// A DMI target rejecting every access.
    #[derive(Debug)]
    struct Failing;

    impl DmiTransactionInterface for Failing {
        fn read(&mut self, _address: u32) -> (u32, DmiStatus) {
            (0, DmiStatus::Failed)
        }

        fn write(&mut self, _address: u32, _data: u32) -> DmiStatus {
            DmiStatus::Failed
        }

        fn hard_reset(&mut self) {}
    }

    #[test]
    fn init_reads_dtmcs() {
        let mut port = port(3);
        let mut dtm = JtagDtm::new(ScanChainDriver::new(&mut port));

        dtm.init().unwrap();

        assert_eq!(dtm.abits(), 7);
        assert_eq!(dtm.driver().idle_cycles(), 3);
    }

    #[test]
    fn init_without_target() {
        let mut dtm = JtagDtm::new(ScanChainDriver::new(Stuck(false)));

        assert!(matches!(dtm.init(), Err(RiscvError::NoRiscvTarget)));
    }

    #[test]
    fn init_with_unsupported_version() {
        let mut dtm = JtagDtm::new(ScanChainDriver::new(Stuck(true)));

        assert!(matches!(
            dtm.init(),
            Err(RiscvError::UnsupportedDebugTransportModuleVersion(15))
        ));
    }

    #[test]
    fn write_then_read() {
        let mut port = port(1);
        let mut dtm = JtagDtm::new(ScanChainDriver::new(&mut port));
        dtm.init().unwrap();

        dtm.write_with_timeout(0x04, 0xdead_beef, TIMEOUT).unwrap();
        dtm.write_with_timeout(0x05, 0x1234_5678, TIMEOUT).unwrap();

        assert_eq!(dtm.read_with_timeout(0x04, TIMEOUT).unwrap(), 0xdead_beef);
        assert_eq!(dtm.read_with_timeout(0x05, TIMEOUT).unwrap(), 0x1234_5678);
        // Reading dmstatus: version 2, authenticated
        assert_eq!(dtm.read_with_timeout(0x11, TIMEOUT).unwrap() & 0x8f, 0x82);
    }

    #[test]
    fn busy_accesses_are_retried_with_more_idle_cycles() {
        let mut port = port(4);
        let mut dtm = JtagDtm::new(ScanChainDriver::new(&mut port));
        dtm.init().unwrap();
        dtm.driver_mut().set_idle_cycles(0);

        dtm.write_with_timeout(0x04, 0x55, TIMEOUT).unwrap();
        assert_eq!(dtm.read_with_timeout(0x04, TIMEOUT).unwrap(), 0x55);

        assert!(dtm.driver().idle_cycles() > 0);
    }

    #[test]
    fn busy_access_times_out() {
        let mut port = port(7);
        let mut dtm = JtagDtm::new(ScanChainDriver::new(&mut port));
        dtm.init().unwrap();
        dtm.driver_mut().set_idle_cycles(0);

        dtm.write_with_timeout(0x04, 0x55, TIMEOUT).unwrap();

        assert!(matches!(
            dtm.read_with_timeout(0x04, Duration::ZERO),
            Err(RiscvError::Timeout)
        ));
    }

    #[test]
    fn failed_access_is_an_error() {
        let config = DebugModuleConfig::default();
        let mut port = JtagDebugPort::new(&config, Failing);
        let mut dtm = JtagDtm::new(ScanChainDriver::new(&mut port));
        dtm.init().unwrap();

        assert!(matches!(
            dtm.read_with_timeout(0x11, TIMEOUT),
            Err(RiscvError::DtmOperationFailed)
        ));
    }

    #[test]
    fn hard_reset_clears_the_debug_module() {
        let mut port = port(1);
        let mut dtm = JtagDtm::new(ScanChainDriver::new(&mut port));
        dtm.init().unwrap();

        dtm.write_with_timeout(0x04, 0x55, TIMEOUT).unwrap();
        dtm.hard_reset().unwrap();

        assert_eq!(dtm.read_with_timeout(0x04, TIMEOUT).unwrap(), 0);
    }

    #[test]
    fn idcode() {
        let mut port = port(1);
        let mut dtm = JtagDtm::new(ScanChainDriver::new(&mut port));

        assert_eq!(dtm.read_idcode().unwrap(), Some(0x10e3_1913));
    }
}
