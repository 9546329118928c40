//! Debug Module registers, as seen on the DMI bus.

use bitfield::bitfield;

/// A register of the Debug Module, addressed over DMI.
pub trait DebugRegister: Into<u32> + From<u32> {
    /// Address on the DMI bus.
    const ADDRESS: u8;
    /// Name used in log output.
    const NAME: &'static str;
}

/// Address of `data0`, the other data registers follow.
pub const DATA0_ADDRESS: u32 = 0x04;
/// Address of `progbuf0`, the other program buffer words follow.
pub const PROGBUF0_ADDRESS: u32 = 0x20;

/// Maximum number of `data` registers.
pub const MAX_DATA_COUNT: usize = 12;
/// Maximum number of `progbuf` words.
pub const MAX_PROGBUF_SIZE: usize = 16;

/// Debug Module version 0.13, reported in `dmstatus.version`.
pub const DEBUG_MODULE_VERSION: u32 = 2;

bitfield! {
    /// `dmcontrol` register, located at address 0x10
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Dmcontrol(u32);
    impl Debug;

    pub haltreq, set_haltreq: 31;
    pub resumereq, set_resumereq: 30;
    pub hartreset, set_hartreset: 29;
    pub ackhavereset, set_ackhavereset: 28;
    pub hasel, set_hasel: 26;
    pub hartsello, set_hartsello: 25, 16;
    pub hartselhi, set_hartselhi: 15, 6;
    pub setresethaltreq, set_setresethaltreq: 3;
    pub clrresethaltreq, set_clrresethaltreq: 2;
    pub ndmreset, set_ndmreset: 1;
    pub dmactive, set_dmactive: 0;
}

debug_register!(Dmcontrol, 0x10, "dmcontrol");

impl Dmcontrol {
    /// Currently selected hart, combined from `hartselhi` and `hartsello`.
    pub fn hartsel(&self) -> u32 {
        self.hartselhi() << 10 | self.hartsello()
    }

    /// Set `hartselhi` and `hartsello` from a hart index.
    pub fn set_hartsel(&mut self, value: u32) {
        self.set_hartsello(value & 0x3ff);
        self.set_hartselhi((value >> 10) & 0x3ff);
    }
}

bitfield! {
    /// Readonly `dmstatus` register.
    ///
    /// Located at address 0x11
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Dmstatus(u32);
    impl Debug;

    pub impebreak, set_impebreak: 22;
    pub allhavereset, set_allhavereset: 19;
    pub anyhavereset, set_anyhavereset: 18;
    pub allresumeack, set_allresumeack: 17;
    pub anyresumeack, set_anyresumeack: 16;
    pub allnonexistent, set_allnonexistent: 15;
    pub anynonexistent, set_anynonexistent: 14;
    pub allunavail, set_allunavail: 13;
    pub anyunavail, set_anyunavail: 12;
    pub allrunning, set_allrunning: 11;
    pub anyrunning, set_anyrunning: 10;
    pub allhalted, set_allhalted: 9;
    pub anyhalted, set_anyhalted: 8;
    pub authenticated, set_authenticated: 7;
    pub authbusy, set_authbusy: 6;
    pub hasresethaltreq, set_hasresethaltreq: 5;
    pub confstrptrvalid, set_confstrptrvalid: 4;
    pub version, set_version: 3, 0;
}

debug_register!(Dmstatus, 0x11, "dmstatus");

bitfield! {
    /// `hartinfo` register, located at address 0x12
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Hartinfo(u32);
    impl Debug;

    pub nscratch, set_nscratch: 23, 20;
    pub dataaccess, set_dataaccess: 16;
    pub datasize, set_datasize: 15, 12;
    pub dataaddr, set_dataaddr: 11, 0;
}

debug_register!(Hartinfo, 0x12, "hartinfo");

bitfield! {
    /// Abstract Control and Status, located at address 0x16
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Abstractcs(u32);
    impl Debug;

    pub progbufsize, set_progbufsize: 28, 24;
    pub busy, set_busy: 12;
    pub cmderr, set_cmderr: 10, 8;
    pub datacount, set_datacount: 3, 0;
}

debug_register!(Abstractcs, 0x16, "abstractcs");

bitfield! {
    /// `command` register, located at address 0x17
    ///
    /// Only `cmdtype` has a fixed meaning, the remaining bits depend on it.
    /// See [`AccessRegisterCommand`] and [`AccessMemoryCommand`].
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Command(u32);
    impl Debug;

    pub cmdtype, set_cmdtype: 31, 24;
    pub control, set_control: 23, 0;
}

debug_register!(Command, 0x17, "command");

bitfield! {
    /// Abstract command to access a register of the selected hart (`cmdtype` 0).
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct AccessRegisterCommand(u32);
    impl Debug;

    pub cmdtype, set_cmdtype: 31, 24;
    pub aarsize, set_aarsize: 22, 20;
    pub aarpostincrement, set_aarpostincrement: 19;
    pub postexec, set_postexec: 18;
    pub transfer, set_transfer: 17;
    pub write, set_write: 16;
    pub regno, set_regno: 15, 0;
}

debug_register!(AccessRegisterCommand, 0x17, "command");

bitfield! {
    /// Abstract command to access memory through the selected hart (`cmdtype` 2).
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct AccessMemoryCommand(u32);
    impl Debug;

    pub cmdtype, set_cmdtype: 31, 24;
    pub aamvirtual, set_aamvirtual: 23;
    pub aamsize, set_aamsize: 22, 20;
    pub aampostincrement, set_aampostincrement: 19;
    pub write, set_write: 16;
    pub target_specific, set_target_specific: 15, 14;
}

debug_register!(AccessMemoryCommand, 0x17, "command");

bitfield! {
    /// Abstract Command Autoexec, located at address 0x18
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Abstractauto(u32);
    impl Debug;

    pub autoexecprogbuf, set_autoexecprogbuf: 31, 16;
    pub autoexecdata, set_autoexecdata: 11, 0;
}

debug_register!(Abstractauto, 0x18, "abstractauto");

data_register! { pub Data0, 0x04, "data0" }
data_register! { pub Data1, 0x05, "data1" }
data_register! { pub Data2, 0x06, "data2" }
data_register! { pub Data3, 0x07, "data3" }

data_register! { pub Progbuf0, 0x20, "progbuf0" }
data_register! { pub Progbuf1, 0x21, "progbuf1" }

data_register! { pub Haltsum0, 0x40, "haltsum0" }

/// The kind of an abstract command, selected by `command.cmdtype`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AbstractCommandType {
    AccessRegister = 0,
    QuickAccess = 1,
    AccessMemory = 2,
}

impl AbstractCommandType {
    pub fn parse(cmdtype: u32) -> Option<Self> {
        match cmdtype {
            0 => Some(Self::AccessRegister),
            1 => Some(Self::QuickAccess),
            2 => Some(Self::AccessMemory),
            _ => None,
        }
    }
}

/// Values of the `cmderr` field in `abstractcs`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum AbstractCommandErrorKind {
    /// No error.
    #[default]
    None = 0,
    /// A command was written or triggered while another one was executing.
    Busy = 1,
    /// The command or one of its options is not supported.
    NotSupported = 2,
    /// An exception occurred while executing the command.
    Exception = 3,
    /// The hart was not in the halt/run state the command requires.
    HaltResume = 4,
    /// A bus error occurred while accessing memory.
    Bus = 5,
    _Reserved = 6,
    /// Any other error.
    Other = 7,
}

impl AbstractCommandErrorKind {
    pub fn parse(value: u32) -> Self {
        match value & 0x7 {
            0 => Self::None,
            1 => Self::Busy,
            2 => Self::NotSupported,
            3 => Self::Exception,
            4 => Self::HaltResume,
            5 => Self::Bus,
            6 => Self::_Reserved,
            _ => Self::Other,
        }
    }

    /// Check the `cmderr` field of an [`Abstractcs`] value.
    pub fn check(status: Abstractcs) -> Result<(), Self> {
        match Self::parse(status.cmderr()) {
            Self::None => Ok(()),
            error => Err(error),
        }
    }
}

impl std::fmt::Display for AbstractCommandErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let description = match self {
            Self::None => "no error",
            Self::Busy => "busy",
            Self::NotSupported => "not supported",
            Self::Exception => "exception",
            Self::HaltResume => "halt/resume",
            Self::Bus => "bus error",
            Self::_Reserved => "reserved",
            Self::Other => "other",
        };
        f.write_str(description)
    }
}

/// The registers of the Debug Module, decoded from a DMI address.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DmRegister {
    Data(usize),
    Dmcontrol,
    Dmstatus,
    Hartinfo,
    Abstractcs,
    Command,
    Abstractauto,
    Progbuf(usize),
    Haltsum0,
    Unmapped(u32),
}

impl DmRegister {
    /// Decode a DMI address.
    pub fn from_address(address: u32) -> Self {
        match address {
            0x04..=0x0f => Self::Data((address - DATA0_ADDRESS) as usize),
            0x10 => Self::Dmcontrol,
            0x11 => Self::Dmstatus,
            0x12 => Self::Hartinfo,
            0x16 => Self::Abstractcs,
            0x17 => Self::Command,
            0x18 => Self::Abstractauto,
            0x20..=0x2f => Self::Progbuf((address - PROGBUF0_ADDRESS) as usize),
            0x40 => Self::Haltsum0,
            other => Self::Unmapped(other),
        }
    }

    /// DMI address of the register.
    pub fn address(&self) -> u32 {
        match *self {
            Self::Data(index) => DATA0_ADDRESS + index as u32,
            Self::Dmcontrol => Dmcontrol::ADDRESS as u32,
            Self::Dmstatus => Dmstatus::ADDRESS as u32,
            Self::Hartinfo => Hartinfo::ADDRESS as u32,
            Self::Abstractcs => Abstractcs::ADDRESS as u32,
            Self::Command => Command::ADDRESS as u32,
            Self::Abstractauto => Abstractauto::ADDRESS as u32,
            Self::Progbuf(index) => PROGBUF0_ADDRESS + index as u32,
            Self::Haltsum0 => Haltsum0::ADDRESS as u32,
            Self::Unmapped(address) => address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(0x04, DmRegister::Data(0))]
    #[test_case(0x0f, DmRegister::Data(11))]
    #[test_case(0x10, DmRegister::Dmcontrol)]
    #[test_case(0x11, DmRegister::Dmstatus)]
    #[test_case(0x12, DmRegister::Hartinfo)]
    #[test_case(0x16, DmRegister::Abstractcs)]
    #[test_case(0x17, DmRegister::Command)]
    #[test_case(0x18, DmRegister::Abstractauto)]
    #[test_case(0x20, DmRegister::Progbuf(0))]
    #[test_case(0x2f, DmRegister::Progbuf(15))]
    #[test_case(0x40, DmRegister::Haltsum0)]
    #[test_case(0x13, DmRegister::Unmapped(0x13))]
    fn decode_dmi_address(address: u32, register: DmRegister) {
        assert_eq!(DmRegister::from_address(address), register);
        assert_eq!(register.address(), address);
    }

    #[test]
    fn hartsel_spans_both_fields() {
        let mut dmcontrol = Dmcontrol(0);
        dmcontrol.set_hartsel(0x4_0403);

        assert_eq!(dmcontrol.hartsello(), 0x003);
        assert_eq!(dmcontrol.hartselhi(), 0x101);
        assert_eq!(dmcontrol.hartsel(), 0x4_0403);
    }

    #[test]
    fn access_register_command_layout() {
        let mut command = AccessRegisterCommand(0);
        command.set_aarsize(3);
        command.set_transfer(true);
        command.set_regno(0x7b1);

        assert_eq!(command.0, 0x0032_07b1);
    }

    #[test]
    fn cmderr_check() {
        let mut abstractcs = Abstractcs(0);
        assert_eq!(AbstractCommandErrorKind::check(abstractcs), Ok(()));

        abstractcs.set_cmderr(AbstractCommandErrorKind::HaltResume as u32);
        assert_eq!(
            AbstractCommandErrorKind::check(abstractcs),
            Err(AbstractCommandErrorKind::HaltResume)
        );
    }
}
