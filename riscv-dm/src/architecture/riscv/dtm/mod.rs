//! Debug Transport Module (DTM) handling
//!
//! The DTM is responsible for access to the debug module. The JTAG
//! instructions and the `dtmcs` layout defined here are shared by the host
//! side client ([`jtag_dtm::JtagDtm`]) and the simulated target
//! ([`crate::target::dtm::DebugTransportModule`]).

use bitfield::bitfield;

pub mod direct_dtm;
pub mod dtm_access;
pub mod jtag_dtm;

/// Width of the JTAG instruction register.
pub const IR_LENGTH: u32 = 5;

/// The `IDCODE` JTAG instruction.
pub const IDCODE_ADDRESS: u32 = 0x01;

/// Address of the `dtmcs` JTAG register.
pub const DTMCS_ADDRESS: u32 = 0x10;

/// Width of the `dtmcs` JTAG register.
pub const DTMCS_WIDTH: u32 = 32;

/// Address of the `dmi` JTAG register
pub const DMI_ADDRESS: u32 = 0x11;

/// The `BYPASS` JTAG instruction.
pub const BYPASS_ADDRESS: u32 = 0x1f;

/// Offset of the `address` field in the `dmi` JTAG register.
pub const DMI_ADDRESS_BIT_OFFSET: u32 = 34;

/// Offset of the `value` field in the `dmi` JTAG register.
pub const DMI_VALUE_BIT_OFFSET: u32 = 2;

pub const DMI_OP_MASK: u128 = 0x3;

/// DTM version 0.13, reported in `dtmcs.version`.
pub const DTM_VERSION: u32 = 1;

bitfield! {
    /// The `dtmcs` register
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Dtmcs(u32);
    impl Debug;

    pub dmihardreset, set_dmihardreset: 17;
    pub dmireset, set_dmireset: 16;
    pub idle, set_idle: 14, 12;
    pub dmistat, set_dmistat: 11, 10;
    pub abits, set_abits: 9, 4;
    pub version, set_version: 3, 0;
}
