//! The Debug Module Interface: addressed 32 bit register transactions.

use crate::architecture::riscv::dtm::{DMI_ADDRESS_BIT_OFFSET, DMI_OP_MASK, DMI_VALUE_BIT_OFFSET};

/// The `op` field of a `dmi` scan, as written by the debugger.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DmiOp {
    Nop = 0,
    Read = 1,
    Write = 2,
    Reserved = 3,
}

impl DmiOp {
    fn parse(value: u8) -> Self {
        match value & 0x3 {
            0 => Self::Nop,
            1 => Self::Read,
            2 => Self::Write,
            _ => Self::Reserved,
        }
    }
}

/// Possible return values in the op field of
/// the dmi register.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum DmiStatus {
    #[default]
    Success = 0,
    Reserved = 1,
    Failed = 2,
    Busy = 3,
}

impl DmiStatus {
    pub fn parse(value: u8) -> Option<Self> {
        let status = match value {
            0 => Self::Success,
            1 => Self::Reserved,
            2 => Self::Failed,
            3 => Self::Busy,
            _ => return None,
        };

        Some(status)
    }
}

/// A request shifted into the `dmi` register.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DmiRequest {
    pub address: u32,
    pub data: u32,
    pub op: DmiOp,
}

impl DmiRequest {
    pub fn nop() -> Self {
        Self {
            address: 0,
            data: 0,
            op: DmiOp::Nop,
        }
    }

    pub fn read(address: u32) -> Self {
        Self {
            address,
            data: 0,
            op: DmiOp::Read,
        }
    }

    pub fn write(address: u32, data: u32) -> Self {
        Self {
            address,
            data,
            op: DmiOp::Write,
        }
    }

    /// Decode the contents of the `dmi` shift register.
    pub fn from_dr(value: u128, abits: u32) -> Self {
        let (address, data, op) = split_dr(value, abits);
        Self {
            address,
            data,
            op: DmiOp::parse(op),
        }
    }

    /// Encode into the bits shifted into the `dmi` register.
    pub fn to_dr(self) -> u128 {
        join_dr(self.address, self.data, self.op as u8)
    }
}

/// The contents of the `dmi` register in Capture-DR.
///
/// Carries the result of the request shifted in during the previous scan.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DmiResponse {
    pub address: u32,
    pub data: u32,
    pub status: DmiStatus,
}

impl DmiResponse {
    pub fn from_dr(value: u128, abits: u32) -> Self {
        let (address, data, op) = split_dr(value, abits);
        Self {
            address,
            data,
            // Two bits always parse.
            status: DmiStatus::parse(op).unwrap_or(DmiStatus::Reserved),
        }
    }

    pub fn to_dr(self) -> u128 {
        join_dr(self.address, self.data, self.status as u8)
    }
}

fn split_dr(value: u128, abits: u32) -> (u32, u32, u8) {
    let address_mask = (1u128 << abits) - 1;
    let address = ((value >> DMI_ADDRESS_BIT_OFFSET) & address_mask) as u32;
    let data = (value >> DMI_VALUE_BIT_OFFSET) as u32;
    let op = (value & DMI_OP_MASK) as u8;
    (address, data, op)
}

fn join_dr(address: u32, data: u32, op: u8) -> u128 {
    ((address as u128) << DMI_ADDRESS_BIT_OFFSET)
        | ((data as u128) << DMI_VALUE_BIT_OFFSET)
        | op as u128
}

/// Register level access to a Debug Module.
///
/// The Debug Transport Module translates `dmi` scans into calls of this
/// trait. Implementations never fail with an error, problems are reported
/// through the returned [`DmiStatus`].
pub trait DmiTransactionInterface {
    /// Read the register at `address`.
    fn read(&mut self, address: u32) -> (u32, DmiStatus);

    /// Write `data` to the register at `address`.
    fn write(&mut self, address: u32, data: u32) -> DmiStatus;

    /// Reset the Debug Module to its power-on state (`dtmcs.dmihardreset`).
    fn hard_reset(&mut self);

    /// Advance clock driven state by one cycle.
    fn tick(&mut self) {}
}

impl<D: DmiTransactionInterface + ?Sized> DmiTransactionInterface for &mut D {
    fn read(&mut self, address: u32) -> (u32, DmiStatus) {
        (**self).read(address)
    }

    fn write(&mut self, address: u32, data: u32) -> DmiStatus {
        (**self).write(address, data)
    }

    fn hard_reset(&mut self) {
        (**self).hard_reset()
    }

    fn tick(&mut self) {
        (**self).tick()
    }
}

impl<D: DmiTransactionInterface + ?Sized> DmiTransactionInterface for Box<D> {
    fn read(&mut self, address: u32) -> (u32, DmiStatus) {
        (**self).read(address)
    }

    fn write(&mut self, address: u32, data: u32) -> DmiStatus {
        (**self).write(address, data)
    }

    fn hard_reset(&mut self) {
        (**self).hard_reset()
    }

    fn tick(&mut self) {
        (**self).tick()
    }
}
