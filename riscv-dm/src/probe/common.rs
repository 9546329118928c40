//! Types shared between the host side drivers.

use bitfield::bitfield;
use bitvec::{field::BitField, slice::BitSlice};

bitfield! {
    /// A JTAG IDCODE.
    ///
    /// Identifies the Test Access Port, it is captured into DR whenever the
    /// TAP leaves Test-Logic-Reset.
    #[derive(Copy, Clone, Default, Eq, PartialEq)]
    pub struct IdCode(u32);
    impl Debug;

    u8;
    /// The IDCODE version.
    pub version, set_version: 31, 28;

    u16;
    /// The part number.
    pub part_number, set_part_number: 27, 12;

    /// The JEDEC JEP-106 Manufacturer ID.
    pub manufacturer, set_manufacturer: 11, 1;

    u8;
    /// The continuation code of the JEDEC JEP-106 Manufacturer ID.
    pub manufacturer_continuation, set_manufacturer_continuation: 11, 8;

    /// The identity code of the JEDEC JEP-106 Manufacturer ID.
    pub manufacturer_identity, set_manufacturer_identity: 7, 1;

    bool;
    /// The least-significant bit.
    /// Always set.
    pub lsbit, set_lsbit: 0;
}

impl std::fmt::Display for IdCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(mfn) = self.manufacturer_name() {
            write!(f, "0x{:08X} ({})", self.0, mfn)
        } else {
            write!(f, "0x{:08X}", self.0)
        }
    }
}

impl From<IdCode> for u32 {
    fn from(idcode: IdCode) -> Self {
        idcode.0
    }
}

impl From<u32> for IdCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl IdCode {
    /// Returns `true` iff the IDCODE's least significant bit is `1`
    /// and the 7-bit `manufacturer_identity` is set to one of the non-reserved values in the range `[1,126]`.
    pub fn valid(&self) -> bool {
        self.lsbit() && (self.manufacturer_identity() != 0) && (self.manufacturer_identity() != 127)
    }

    /// Return the manufacturer name, if available.
    pub fn manufacturer_name(&self) -> Option<&'static str> {
        let cc = self.manufacturer_continuation();
        let id = self.manufacturer_identity();
        jep106::JEP106Code::new(cc, id).get()
    }

    /// Decode the first 32 bits shifted out of DR after selecting IDCODE.
    pub(crate) fn from_dr(dr: &BitSlice) -> Option<Self> {
        (dr.len() >= 32).then(|| Self(dr[..32].load_le::<u32>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitvec::prelude::*;
    use pretty_assertions::assert_eq;

    const ARM_TAP: IdCode = IdCode(0x4BA00477);
    const RISCV_TAP: IdCode = IdCode(0x10e31913);

    #[test]
    fn id_code_display() {
        assert_eq!(ARM_TAP.to_string(), "0x4BA00477 (ARM Ltd)");
    }

    #[test]
    fn id_code_fields() {
        assert_eq!(RISCV_TAP.version(), 0x1);
        assert_eq!(RISCV_TAP.part_number(), 0x0e31);
        assert_eq!(RISCV_TAP.manufacturer(), 0x489);
        assert_eq!(RISCV_TAP.manufacturer_continuation(), 0x9);
        assert_eq!(RISCV_TAP.manufacturer_identity(), 0x09);
        assert!(RISCV_TAP.valid());
    }

    #[test]
    fn id_code_without_lsbit_is_invalid() {
        assert!(!IdCode(0x10e31912).valid());
        assert!(!IdCode(0xffff_ffff).valid());
    }

    #[test]
    fn id_code_from_dr() {
        let mut dr = bitvec![0; 32];
        dr.store_le(RISCV_TAP.0);

        assert_eq!(IdCode::from_dr(&dr), Some(RISCV_TAP));
        assert_eq!(IdCode::from_dr(&dr[..31]), None);
    }
}
