//! Debug Module Communication
//!
//! This module implements communication with a
//! Debug Module, as described in the RISCV debug
//! specification v0.13.2 .

use std::time::{Duration, Instant};

use crate::architecture::riscv::dtm::dtm_access::DtmAccess;
use crate::architecture::riscv::registers::{
    AbstractCommandErrorKind, AbstractCommandType, Abstractcs, AccessMemoryCommand,
    AccessRegisterCommand, Command, Data0, Data1, Data2, Data3, DebugRegister, Dmcontrol,
    Dmstatus, Haltsum0, DEBUG_MODULE_VERSION, PROGBUF0_ADDRESS,
};
use crate::probe::DebugProbeError;

/// Timeout for a single DMI access and for the Debug Module to react to a
/// request.
const RISCV_TIMEOUT: Duration = Duration::from_secs(1);

/// `regno` of the `dpc` CSR.
const DPC: u16 = 0x7b1;

/// Some error occurred when working with the RISC-V core.
#[derive(thiserror::Error, Debug)]
pub enum RiscvError {
    /// An error occurred during transport
    #[error("Error during transport")]
    DebugProbe(#[from] DebugProbeError),
    /// DMI operation failed
    #[error("DMI operation failed")]
    DtmOperationFailed,
    /// DMI operation is in progress
    #[error("DMI operation is in progress")]
    DtmOperationInProcess,
    /// An error with operating the debug probe occurred.
    #[error("Error occurred during execution of an abstract command: {0}")]
    AbstractCommand(AbstractCommandErrorKind),
    /// The request for reset, resume or halt was not acknowledged.
    #[error("The core did not acknowledge a request for reset, resume or halt")]
    RequestNotAcknowledged,
    /// A timeout occurred during DMI access.
    #[error("Timeout during DMI access.")]
    Timeout,
    /// The connected target is not a RISC-V device.
    #[error("Connected target is not a RISC-V device.")]
    NoRiscvTarget,
    /// The target uses an unsupported debug transport version.
    #[error("Target uses an unsupported debug transport version: {0}")]
    UnsupportedDebugTransportModuleVersion(u8),
    /// The target uses an unsupported debug module version.
    #[error("Target uses an unsupported debug module version: {0}")]
    UnsupportedDebugModuleVersion(u8),
    /// The selected hart does not exist.
    #[error("Hart {0} does not exist")]
    HartNotFound(u32),
    /// The program buffer is too small for the supplied program.
    #[error("The program buffer holds {available} instructions, {required} are required")]
    ProgramBufferTooSmall {
        /// The number of instructions required.
        required: usize,
        /// The size of the program buffer.
        available: usize,
    },
}

/// A interface that implements controls for RISC-V cores.
#[derive(Debug)]
pub struct RiscvCommunicationInterface<'a> {
    dtm: Box<dyn DtmAccess + 'a>,
    timeout: Duration,

    /// Currently selected hart
    hartsel: u32,
    /// Number of data registers for abstract commands
    data_count: usize,
    /// Size of the program buffer, in 32-bit words
    progbuf_size: usize,
}

impl<'a> RiscvCommunicationInterface<'a> {
    pub fn new(dtm: Box<dyn DtmAccess + 'a>) -> Self {
        Self {
            dtm,
            timeout: RISCV_TIMEOUT,
            hartsel: 0,
            data_count: 0,
            progbuf_size: 0,
        }
    }

    /// Change the timeout used for DMI accesses and abstract commands.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn dtm(&mut self) -> &mut (dyn DtmAccess + 'a) {
        self.dtm.as_mut()
    }

    /// Number of `data` registers, known after [`enable_debug_module`](Self::enable_debug_module).
    pub fn data_count(&self) -> usize {
        self.data_count
    }

    /// Size of the program buffer, known after [`enable_debug_module`](Self::enable_debug_module).
    pub fn progbuf_size(&self) -> usize {
        self.progbuf_size
    }

    /// Initialise the transport and activate the Debug Module.
    pub fn enable_debug_module(&mut self) -> Result<(), RiscvError> {
        tracing::debug!("Building RISC-V interface");
        self.dtm.init()?;

        // enable the debug module
        let control = self.dmcontrol();
        self.write_dm_register(control)?;

        // read the version of the debug module
        let status: Dmstatus = self.read_dm_register()?;
        tracing::debug!("{:?}", status);

        if status.version() != DEBUG_MODULE_VERSION {
            return Err(RiscvError::UnsupportedDebugModuleVersion(
                status.version() as u8,
            ));
        }

        let abstractcs: Abstractcs = self.read_dm_register()?;
        self.data_count = abstractcs.datacount() as usize;
        self.progbuf_size = abstractcs.progbufsize() as usize;

        tracing::debug!(
            "{} data registers, program buffer of {} words",
            self.data_count,
            self.progbuf_size
        );

        Ok(())
    }

    /// `dmcontrol` with `dmactive` and the selected hart.
    fn dmcontrol(&self) -> Dmcontrol {
        let mut dmcontrol = Dmcontrol(0);
        dmcontrol.set_dmactive(true);
        dmcontrol.set_hartsel(self.hartsel);
        dmcontrol
    }

    /// Select the hart all further requests go to.
    pub fn select_hart(&mut self, hart: u32) -> Result<(), RiscvError> {
        let mut control = self.dmcontrol();
        control.set_hartsel(hart);
        self.write_dm_register(control)?;

        let status: Dmstatus = self.read_dm_register()?;
        if status.anynonexistent() {
            tracing::warn!("Hart {} does not exist", hart);
            let control = self.dmcontrol();
            self.write_dm_register(control)?;
            return Err(RiscvError::HartNotFound(hart));
        }

        self.hartsel = hart;
        Ok(())
    }

    pub fn read_dm_register<R: DebugRegister>(&mut self) -> Result<R, RiscvError> {
        tracing::debug!("Reading DM register '{}' at {:#010x}", R::NAME, R::ADDRESS);

        let register_value = self.read_dm_register_untyped(R::ADDRESS as u32)?;

        tracing::debug!(
            "Read DM register '{}' at {:#010x} = {:#010x}",
            R::NAME,
            R::ADDRESS,
            register_value
        );

        Ok(register_value.into())
    }

    /// Read from a DM register
    pub fn read_dm_register_untyped(&mut self, address: u32) -> Result<u32, RiscvError> {
        self.dtm.read_with_timeout(address, self.timeout)
    }

    pub fn write_dm_register<R: DebugRegister>(&mut self, register: R) -> Result<(), RiscvError> {
        let data: u32 = register.into();

        tracing::debug!(
            "Write DM register '{}' at {:#010x} = {:#010x}",
            R::NAME,
            R::ADDRESS,
            data
        );

        self.write_dm_register_untyped(R::ADDRESS as u32, data)
    }

    /// Write to a DM register
    pub fn write_dm_register_untyped(
        &mut self,
        address: u32,
        value: u32,
    ) -> Result<(), RiscvError> {
        self.dtm.write_with_timeout(address, value, self.timeout)
    }

    /// Whether the selected hart is halted.
    pub fn core_halted(&mut self) -> Result<bool, RiscvError> {
        let dmstatus: Dmstatus = self.read_dm_register()?;

        Ok(dmstatus.allhalted())
    }

    fn wait_for_status(
        &mut self,
        timeout: Duration,
        done: impl Fn(Dmstatus) -> bool,
    ) -> Result<(), RiscvError> {
        let start = Instant::now();

        loop {
            let dmstatus: Dmstatus = self.read_dm_register()?;
            if done(dmstatus) {
                return Ok(());
            }

            if start.elapsed() > timeout {
                tracing::warn!("Request not acknowledged: {:?}", dmstatus);
                return Err(RiscvError::Timeout);
            }
        }
    }

    /// Halt the selected hart and wait until it is halted.
    pub fn halt(&mut self, timeout: Duration) -> Result<(), RiscvError> {
        if self.core_halted()? {
            tracing::debug!("Hart {} already halted", self.hartsel);
            return Ok(());
        }

        // write 1 to the haltreq register, which is part
        // of the dmcontrol register
        tracing::debug!("Halting hart {}, setting haltreq bit", self.hartsel);

        let mut dmcontrol = self.dmcontrol();
        dmcontrol.set_haltreq(true);
        self.write_dm_register(dmcontrol)?;

        self.wait_for_status(timeout, |dmstatus| dmstatus.allhalted())?;

        // clear the halt request
        let dmcontrol = self.dmcontrol();
        self.write_dm_register(dmcontrol)?;

        Ok(())
    }

    /// Resume the selected hart and wait for the acknowledgement.
    pub fn resume(&mut self, timeout: Duration) -> Result<(), RiscvError> {
        if !self.core_halted()? {
            tracing::debug!("Hart {} already running", self.hartsel);
            return Ok(());
        }

        // set resume request
        let mut dmcontrol = self.dmcontrol();
        dmcontrol.set_resumereq(true);
        self.write_dm_register(dmcontrol)?;

        // check if request has been acknowleged
        self.wait_for_status(timeout, |dmstatus| dmstatus.allresumeack())?;

        // clear resume request
        let dmcontrol = self.dmcontrol();
        self.write_dm_register(dmcontrol)?;

        Ok(())
    }

    /// Reset the selected hart through `hartreset`, or the whole system
    /// through `ndmreset` if `hartreset` is not supported. With `halt`, the
    /// hart halts right after the reset.
    pub fn reset(&mut self, halt: bool) -> Result<(), RiscvError> {
        if halt {
            let mut dmcontrol = self.dmcontrol();
            dmcontrol.set_setresethaltreq(true);
            self.write_dm_register(dmcontrol)?;
        }

        tracing::debug!("Resetting hart {}, setting hartreset bit", self.hartsel);

        let mut dmcontrol = self.dmcontrol();
        dmcontrol.set_hartreset(true);
        self.write_dm_register(dmcontrol)?;

        // Read back register to verify reset is supported
        let readback: Dmcontrol = self.read_dm_register()?;

        let mut dmcontrol = self.dmcontrol();
        if readback.hartreset() {
            tracing::debug!("Clearing hartreset bit");
            // Reset is performed by setting the bit high, and then low again
            self.write_dm_register(dmcontrol)?;
        } else {
            // Hartreset is not supported, whole core needs to be reset
            tracing::debug!("Hartreset bit not supported, using ndmreset");
            dmcontrol.set_ndmreset(true);
            self.write_dm_register(dmcontrol)?;

            tracing::debug!("Clearing ndmreset bit");
            dmcontrol.set_ndmreset(false);
            self.write_dm_register(dmcontrol)?;
        }

        // check that cores have reset
        let readback: Dmstatus = self.read_dm_register()?;

        if !readback.allhavereset() {
            tracing::warn!("Dmstatus: {:?}", readback);
            return Err(RiscvError::RequestNotAcknowledged);
        }

        // acknowledge the reset
        let mut dmcontrol = self.dmcontrol();
        dmcontrol.set_ackhavereset(true);
        dmcontrol.set_clrresethaltreq(halt);
        self.write_dm_register(dmcontrol)?;

        if halt {
            self.wait_for_status(self.timeout, |dmstatus| dmstatus.allhalted())?;
        }

        Ok(())
    }

    /// Execute an abstract command and wait for it to complete.
    ///
    /// A command error is cleared and returned as [`RiscvError::AbstractCommand`].
    pub fn execute_abstract_command(&mut self, command: u32) -> Result<(), RiscvError> {
        tracing::debug!("Executing abstract command {:#010x}", command);
        self.write_dm_register(Command(command))?;

        let start = Instant::now();

        // poll busy flag in abstractcs
        let abstractcs = loop {
            let abstractcs: Abstractcs = self.read_dm_register()?;

            if !abstractcs.busy() {
                break abstractcs;
            }

            if start.elapsed() > self.timeout {
                return Err(RiscvError::Timeout);
            }
        };

        tracing::debug!("abstractcs: {:?}", abstractcs);

        // check cmderr
        if let Err(error) = AbstractCommandErrorKind::check(abstractcs) {
            // clear cmderr
            let mut abstractcs_clear = Abstractcs(0);
            abstractcs_clear.set_cmderr(0x7);

            self.write_dm_register(abstractcs_clear)?;

            return Err(RiscvError::AbstractCommand(error));
        }

        Ok(())
    }

    /// Read a register of the selected hart with an access register command.
    pub fn abstract_cmd_register_read(&mut self, regno: u16) -> Result<u64, RiscvError> {
        let mut command = AccessRegisterCommand(0);
        command.set_cmdtype(AbstractCommandType::AccessRegister as u32);
        command.set_transfer(true);
        command.set_aarsize(3);
        command.set_regno(regno as u32);

        self.execute_abstract_command(command.0)?;

        let low: Data0 = self.read_dm_register()?;
        let high: Data1 = self.read_dm_register()?;

        Ok((high.0 as u64) << 32 | low.0 as u64)
    }

    /// Write a register of the selected hart with an access register command.
    pub fn abstract_cmd_register_write(
        &mut self,
        regno: u16,
        value: u64,
    ) -> Result<(), RiscvError> {
        self.write_dm_register(Data0(value as u32))?;
        self.write_dm_register(Data1((value >> 32) as u32))?;

        let mut command = AccessRegisterCommand(0);
        command.set_cmdtype(AbstractCommandType::AccessRegister as u32);
        command.set_transfer(true);
        command.set_write(true);
        command.set_aarsize(3);
        command.set_regno(regno as u32);

        self.execute_abstract_command(command.0)
    }

    /// Read the program counter of the halted hart from `dpc`.
    pub fn read_pc(&mut self) -> Result<u64, RiscvError> {
        self.abstract_cmd_register_read(DPC)
    }

    fn memory_command(
        &mut self,
        address: u64,
        write: bool,
    ) -> Result<AccessMemoryCommand, RiscvError> {
        self.write_dm_register(Data2(address as u32))?;
        self.write_dm_register(Data3((address >> 32) as u32))?;

        let mut command = AccessMemoryCommand(0);
        command.set_cmdtype(AbstractCommandType::AccessMemory as u32);
        command.set_aamsize(2);
        command.set_aampostincrement(true);
        command.set_write(write);
        Ok(command)
    }

    /// Read 32 bit words starting at `address` with access memory commands.
    pub fn read_memory(&mut self, address: u64, data: &mut [u32]) -> Result<(), RiscvError> {
        tracing::debug!("Reading {} words at {:#010x}", data.len(), address);
        let command = self.memory_command(address, false)?;

        for word in data.iter_mut() {
            self.execute_abstract_command(command.0)?;
            let value: Data0 = self.read_dm_register()?;
            *word = value.0;
        }

        Ok(())
    }

    /// Write 32 bit words starting at `address` with access memory commands.
    pub fn write_memory(&mut self, address: u64, data: &[u32]) -> Result<(), RiscvError> {
        tracing::debug!("Writing {} words at {:#010x}", data.len(), address);
        let command = self.memory_command(address, true)?;

        for word in data {
            self.write_dm_register(Data0(*word))?;
            self.execute_abstract_command(command.0)?;
        }

        Ok(())
    }

    /// Load `instructions` into the program buffer and execute it on the
    /// selected hart.
    pub fn execute_program_buffer(&mut self, instructions: &[u32]) -> Result<(), RiscvError> {
        if instructions.len() > self.progbuf_size {
            return Err(RiscvError::ProgramBufferTooSmall {
                required: instructions.len(),
                available: self.progbuf_size,
            });
        }

        for (address, instruction) in (PROGBUF0_ADDRESS..).zip(instructions) {
            self.write_dm_register_untyped(address, *instruction)?;
        }

        // command: postexec
        let mut postexec_cmd = AccessRegisterCommand(0);
        postexec_cmd.set_postexec(true);

        self.execute_abstract_command(postexec_cmd.0)
    }

    /// The halt state of the first 32 harts, one bit per hart.
    pub fn halt_summary(&mut self) -> Result<u32, RiscvError> {
        let summary: Haltsum0 = self.read_dm_register()?;

        Ok(summary.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::architecture::riscv::dtm::direct_dtm::DirectDtm;
    use crate::config::DebugModuleConfig;
    use crate::target::debug_module::DebugModule;
    use crate::target::dmi::{DmiStatus, DmiTransactionInterface};
    use crate::target::fake_hart::{FakeHart, Operation, GPR_BASE};
    use crate::target::hart::HartControlPort;
    use pretty_assertions::assert_eq;

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn interface(harts: Vec<FakeHart>) -> RiscvCommunicationInterface<'static> {
        let dm = DebugModule::new(DebugModuleConfig::default(), harts);
        let mut interface = RiscvCommunicationInterface::new(Box::new(DirectDtm::new(dm)));
        interface.enable_debug_module().unwrap();
        interface
    }

    /// A Debug Module of another version.
    #[derive(Debug)]
    struct Legacy;

    impl DmiTransactionInterface for Legacy {
        fn read(&mut self, _address: u32) -> (u32, DmiStatus) {
            // dmstatus.version = 1, debug specification 0.11
            (1, DmiStatus::Success)
        }

        fn write(&mut self, _address: u32, _data: u32) -> DmiStatus {
            DmiStatus::Success
        }

        fn hard_reset(&mut self) {}
    }

    #[test]
    fn enable_reads_capabilities() {
        let interface = interface(vec![FakeHart::new()]);

        assert_eq!(interface.data_count(), 4);
        assert_eq!(interface.progbuf_size(), 16);
    }

    #[test]
    fn enable_rejects_other_versions() {
        let mut interface = RiscvCommunicationInterface::new(Box::new(DirectDtm::new(Legacy)));

        assert!(matches!(
            interface.enable_debug_module(),
            Err(RiscvError::UnsupportedDebugModuleVersion(1))
        ));
    }

    #[test]
    fn halt_and_resume() {
        let hart = FakeHart::new();
        let mut interface = interface(vec![hart.clone()]);

        interface.halt(TIMEOUT).unwrap();
        assert!(hart.is_halted());
        assert!(interface.core_halted().unwrap());

        // Halting again does not raise a new request.
        interface.halt(TIMEOUT).unwrap();
        assert_eq!(hart.halt_requests(), 1);

        interface.resume(TIMEOUT).unwrap();
        assert!(!hart.is_halted());
        assert_eq!(hart.resume_requests(), 1);

        interface.resume(TIMEOUT).unwrap();
        assert_eq!(hart.resume_requests(), 1);
    }

    #[test]
    fn halt_times_out_if_the_hart_ignores_it() {
        let hart = FakeHart::new();
        hart.set_halt_on_request(false);
        let mut interface = interface(vec![hart]);

        assert!(matches!(
            interface.halt(Duration::from_millis(1)),
            Err(RiscvError::Timeout)
        ));
    }

    #[test]
    fn register_access() {
        let hart = FakeHart::new().halted();
        hart.set_register(GPR_BASE + 8, 0x1_2345_6789);
        hart.set_pc(0x8000_0000);
        let mut interface = interface(vec![hart.clone()]);

        assert_eq!(
            interface.abstract_cmd_register_read(GPR_BASE + 8).unwrap(),
            0x1_2345_6789
        );
        assert_eq!(interface.read_pc().unwrap(), 0x8000_0000);

        interface
            .abstract_cmd_register_write(GPR_BASE + 9, 0xffff_0000_0000_ffff)
            .unwrap();
        assert_eq!(hart.register(GPR_BASE + 9), Some(0xffff_0000_0000_ffff));
    }

    #[test]
    fn command_errors_are_cleared() {
        let hart = FakeHart::new();
        let mut interface = interface(vec![hart.clone()]);

        // The hart is running
        assert!(matches!(
            interface.abstract_cmd_register_read(GPR_BASE),
            Err(RiscvError::AbstractCommand(
                AbstractCommandErrorKind::HaltResume
            ))
        ));

        interface.halt(TIMEOUT).unwrap();
        assert!(matches!(
            interface.abstract_cmd_register_read(0xc000),
            Err(RiscvError::AbstractCommand(
                AbstractCommandErrorKind::Exception
            ))
        ));

        let abstractcs: Abstractcs = interface.read_dm_register().unwrap();
        assert_eq!(abstractcs.cmderr(), 0);
        assert_eq!(interface.abstract_cmd_register_read(GPR_BASE).unwrap(), 0);
    }

    #[test]
    fn memory_access() {
        let hart = FakeHart::new();
        hart.map_memory(0x8000_0000, 0x20);
        let mut interface = interface(vec![hart.clone()]);

        interface
            .write_memory(0x8000_0000, &[0x0403_0201, 0x0807_0605])
            .unwrap();
        assert_eq!(hart.memory(0x8000_0004), Some(0x05));

        let mut data = [0; 2];
        interface.read_memory(0x8000_0000, &mut data).unwrap();
        assert_eq!(data, [0x0403_0201, 0x0807_0605]);

        assert!(matches!(
            interface.read_memory(0x9000_0000, &mut data),
            Err(RiscvError::AbstractCommand(AbstractCommandErrorKind::Bus))
        ));
    }

    #[test]
    fn select_hart() {
        let harts = vec![FakeHart::new(), FakeHart::new()];
        let mut interface = interface(harts.clone());

        interface.select_hart(1).unwrap();
        interface.halt(TIMEOUT).unwrap();

        assert!(!harts[0].is_halted());
        assert!(harts[1].is_halted());
        assert_eq!(interface.halt_summary().unwrap(), 0b10);

        assert!(matches!(
            interface.select_hart(2),
            Err(RiscvError::HartNotFound(2))
        ));
        // The previous selection is kept.
        assert!(interface.core_halted().unwrap());
    }

    #[test]
    fn program_buffer() {
        let hart = FakeHart::new().halted();
        let mut interface = interface(vec![hart.clone()]);
        let ebreak = 0x0010_0073;

        interface.execute_program_buffer(&[0x0000_0013, ebreak]).unwrap();

        let progbuf = hart.operations().into_iter().find_map(|operation| match operation {
            Operation::ExecuteProgramBuffer { progbuf } => Some(progbuf),
            _ => None,
        });
        assert_eq!(progbuf.map(|progbuf| progbuf[..2].to_vec()), Some(vec![0x13, ebreak]));

        assert!(matches!(
            interface.execute_program_buffer(&[0; 17]),
            Err(RiscvError::ProgramBufferTooSmall {
                required: 17,
                available: 16
            })
        ));
    }

    #[test]
    fn reset_and_halt() {
        let hart = FakeHart::new();
        hart.set_register(GPR_BASE + 1, 7);
        let mut interface = interface(vec![hart.clone()]);

        interface.reset(true).unwrap();

        assert!(hart.is_halted());
        assert_eq!(hart.register(GPR_BASE + 1), Some(0));
        let dmstatus: Dmstatus = interface.read_dm_register().unwrap();
        assert!(!dmstatus.allhavereset());
    }
}
