//! The JTAG Debug Transport Module.
//!
//! Implements the data registers behind the TAP: `IDCODE`, `dtmcs`, `dmi` and
//! `BYPASS`. A `dmi` scan is executed in Update-DR, its result shows up in the
//! Capture-DR of the next `dmi` scan.

use crate::architecture::riscv::dtm::{
    Dtmcs, BYPASS_ADDRESS, DMI_ADDRESS, DMI_ADDRESS_BIT_OFFSET, DTMCS_ADDRESS, DTMCS_WIDTH,
    DTM_VERSION, IDCODE_ADDRESS,
};
use crate::config::DebugModuleConfig;
use crate::target::dmi::{DmiOp, DmiRequest, DmiResponse, DmiStatus, DmiTransactionInterface};
use crate::target::tap::{DataRegisterHandler, ShiftRegister, TapState};

/// Debug Transport Module connecting a TAP to a [`DmiTransactionInterface`].
#[derive(Debug)]
pub struct DebugTransportModule<D> {
    dmi: D,
    idcode: u32,
    abits: u32,
    idle_cycles: u8,

    /// Sticky status of the last `dmi` access, reported as `dmistat`.
    status: DmiStatus,
    /// Result of the last read.
    data: u32,
    /// Address of the last request.
    address: u32,
    /// Run-Test/Idle cycles until the last access completed.
    in_flight: u8,
    bypass: bool,
}

impl<D: DmiTransactionInterface> DebugTransportModule<D> {
    pub fn new(config: &DebugModuleConfig, dmi: D) -> Self {
        let config = config.clamped();
        Self {
            dmi,
            idcode: config.idcode,
            abits: config.abits,
            idle_cycles: config.idle_cycles,
            status: DmiStatus::Success,
            data: 0,
            address: 0,
            in_flight: 0,
            bypass: false,
        }
    }

    /// Sticky status of the `dmi` register.
    pub fn status(&self) -> DmiStatus {
        self.status
    }

    /// Whether a `dmi` access is still in progress.
    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }

    pub fn dmi(&self) -> &D {
        &self.dmi
    }

    pub fn dmi_mut(&mut self) -> &mut D {
        &mut self.dmi
    }

    pub fn into_dmi(self) -> D {
        self.dmi
    }

    fn dmi_width(&self) -> u32 {
        DMI_ADDRESS_BIT_OFFSET + self.abits
    }

    fn dtmcs(&self) -> Dtmcs {
        let mut dtmcs = Dtmcs(0);
        dtmcs.set_version(DTM_VERSION);
        dtmcs.set_abits(self.abits);
        dtmcs.set_dmistat(self.status as u32);
        dtmcs.set_idle(self.idle_cycles as u32);
        dtmcs
    }

    fn write_dtmcs(&mut self, dtmcs: Dtmcs) {
        if dtmcs.dmihardreset() {
            tracing::debug!("dtmcs.dmihardreset: resetting the debug module");
            self.dmi.hard_reset();
            self.status = DmiStatus::Success;
            self.in_flight = 0;
        }

        if dtmcs.dmireset() {
            tracing::debug!("dtmcs.dmireset: clearing sticky status {:?}", self.status);
            self.status = DmiStatus::Success;
        }
    }

    fn capture_dmi(&mut self) -> ShiftRegister {
        if self.in_flight > 0 && self.status == DmiStatus::Success {
            tracing::debug!("dmi captured while an access is in progress");
            self.status = DmiStatus::Busy;
        }

        let response = DmiResponse {
            address: self.address,
            data: self.data,
            status: self.status,
        };

        ShiftRegister::new(response.to_dr(), self.dmi_width())
    }

    fn update_dmi(&mut self, request: DmiRequest) {
        if self.status != DmiStatus::Success {
            tracing::debug!(
                "Dropping {:?}, dmi status is {:?}",
                request.op,
                self.status
            );
            return;
        }

        if self.in_flight > 0 {
            tracing::debug!("Dropping {:?}, previous access in progress", request.op);
            self.status = DmiStatus::Busy;
            return;
        }

        self.address = request.address;

        let status = match request.op {
            DmiOp::Nop => return,
            DmiOp::Read => {
                let (data, status) = self.dmi.read(request.address);
                tracing::trace!("dmi read {:#04x} -> {:#010x}", request.address, data);
                self.data = data;
                status
            }
            DmiOp::Write => {
                tracing::trace!("dmi write {:#04x} <- {:#010x}", request.address, request.data);
                self.dmi.write(request.address, request.data)
            }
            DmiOp::Reserved => {
                tracing::warn!("Ignoring dmi request with reserved op");
                return;
            }
        };

        if status != DmiStatus::Success {
            self.status = status;
        }

        self.in_flight = self.idle_cycles;
    }
}

impl<D: DmiTransactionInterface> DataRegisterHandler for DebugTransportModule<D> {
    fn capture_dr(&mut self, instruction: u32) -> Option<ShiftRegister> {
        match instruction {
            IDCODE_ADDRESS => Some(ShiftRegister::new(self.idcode as u128, 32)),
            DTMCS_ADDRESS => Some(ShiftRegister::new(self.dtmcs().0 as u128, DTMCS_WIDTH)),
            DMI_ADDRESS => Some(self.capture_dmi()),
            BYPASS_ADDRESS => Some(ShiftRegister::new(self.bypass as u128, 1)),
            _ => None,
        }
    }

    fn update_dr(&mut self, instruction: u32, dr: ShiftRegister) {
        match instruction {
            DTMCS_ADDRESS => self.write_dtmcs(Dtmcs(dr.value as u32)),
            DMI_ADDRESS => self.update_dmi(DmiRequest::from_dr(dr.value, self.abits)),
            BYPASS_ADDRESS => self.bypass = dr.value & 1 == 1,
            _ => {}
        }
    }

    fn clock(&mut self, state: TapState) {
        if state == TapState::RunTestIdle && self.in_flight > 0 {
            self.in_flight -= 1;
        }

        self.dmi.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// A register file where every read returns the address plus 0x1000.
    #[derive(Debug, Default)]
    struct Registers {
        writes: Vec<(u32, u32)>,
        reads: Vec<u32>,
        hard_resets: usize,
    }

    impl DmiTransactionInterface for Registers {
        fn read(&mut self, address: u32) -> (u32, DmiStatus) {
            self.reads.push(address);
            (address + 0x1000, DmiStatus::Success)
        }

        fn write(&mut self, address: u32, data: u32) -> DmiStatus {
            self.writes.push((address, data));
            DmiStatus::Success
        }

        fn hard_reset(&mut self) {
            self.hard_resets += 1;
        }
    }

    fn dtm(idle_cycles: u8) -> DebugTransportModule<Registers> {
        let config = DebugModuleConfig {
            idle_cycles,
            ..Default::default()
        };
        DebugTransportModule::new(&config, Registers::default())
    }

    /// Capture, then update with `request`, as a scan does.
    fn scan(dtm: &mut DebugTransportModule<Registers>, request: DmiRequest) -> DmiResponse {
        let captured = dtm.capture_dr(DMI_ADDRESS).unwrap();
        dtm.update_dr(
            DMI_ADDRESS,
            ShiftRegister::new(request.to_dr(), captured.len),
        );
        DmiResponse::from_dr(captured.value, 7)
    }

    fn idle(dtm: &mut DebugTransportModule<Registers>, cycles: usize) {
        for _ in 0..cycles {
            dtm.clock(TapState::RunTestIdle);
        }
    }

    #[test]
    fn dtmcs_reports_configuration() {
        let mut dtm = dtm(3);

        let dtmcs = Dtmcs(dtm.capture_dr(DTMCS_ADDRESS).unwrap().value as u32);

        assert_eq!(dtmcs.version(), 1);
        assert_eq!(dtmcs.abits(), 7);
        assert_eq!(dtmcs.idle(), 3);
        assert_eq!(dtmcs.dmistat(), 0);
    }

    #[test]
    fn dtmcs_reports_clamped_configuration() {
        let config = DebugModuleConfig {
            abits: 100,
            idle_cycles: 9,
            ..Default::default()
        };
        let mut dtm = DebugTransportModule::new(&config, Registers::default());

        let dtmcs = Dtmcs(dtm.capture_dr(DTMCS_ADDRESS).unwrap().value as u32);

        assert_eq!(dtmcs.abits(), 32);
        assert_eq!(dtmcs.idle(), 7);
    }

    #[test]
    fn read_result_appears_in_next_capture() {
        let mut dtm = dtm(1);

        scan(&mut dtm, DmiRequest::read(0x11));
        idle(&mut dtm, 1);
        let response = scan(&mut dtm, DmiRequest::nop());

        assert_eq!(
            response,
            DmiResponse {
                address: 0x11,
                data: 0x1011,
                status: DmiStatus::Success
            }
        );
        assert_eq!(dtm.dmi().reads, vec![0x11]);
    }

    #[test]
    fn capture_during_access_reports_busy_and_drops_request() {
        let mut dtm = dtm(2);

        scan(&mut dtm, DmiRequest::write(0x04, 1));
        idle(&mut dtm, 1);
        let response = scan(&mut dtm, DmiRequest::write(0x05, 2));

        assert_eq!(response.status, DmiStatus::Busy);
        assert_eq!(dtm.status(), DmiStatus::Busy);
        assert_eq!(dtm.dmi().writes, vec![(0x04, 1)]);

        // The sticky status blocks further requests until dmireset.
        idle(&mut dtm, 4);
        let response = scan(&mut dtm, DmiRequest::write(0x05, 2));
        assert_eq!(response.status, DmiStatus::Busy);
        assert_eq!(dtm.dmi().writes, vec![(0x04, 1)]);

        let mut dtmcs = Dtmcs(0);
        dtmcs.set_dmireset(true);
        dtm.update_dr(DTMCS_ADDRESS, ShiftRegister::new(dtmcs.0 as u128, 32));

        let response = scan(&mut dtm, DmiRequest::write(0x05, 2));
        assert_eq!(response.status, DmiStatus::Success);
        assert_eq!(dtm.dmi().writes, vec![(0x04, 1), (0x05, 2)]);
    }

    #[test]
    fn dmihardreset_resets_debug_module_and_status() {
        let mut dtm = dtm(2);

        scan(&mut dtm, DmiRequest::write(0x04, 1));
        scan(&mut dtm, DmiRequest::nop());
        assert_eq!(dtm.status(), DmiStatus::Busy);

        let mut dtmcs = Dtmcs(0);
        dtmcs.set_dmihardreset(true);
        dtm.update_dr(DTMCS_ADDRESS, ShiftRegister::new(dtmcs.0 as u128, 32));

        assert_eq!(dtm.dmi().hard_resets, 1);
        assert_eq!(dtm.status(), DmiStatus::Success);
        assert!(!dtm.is_busy());
    }

    #[test]
    fn idcode_and_bypass() {
        let mut dtm = dtm(1);

        assert_eq!(
            dtm.capture_dr(IDCODE_ADDRESS),
            Some(ShiftRegister::new(0x10e3_1913, 32))
        );

        dtm.update_dr(BYPASS_ADDRESS, ShiftRegister::new(1, 1));
        assert_eq!(
            dtm.capture_dr(BYPASS_ADDRESS),
            Some(ShiftRegister::new(1, 1))
        );

        assert_eq!(dtm.capture_dr(0x05), None);
    }
}
