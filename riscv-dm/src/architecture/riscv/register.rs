/// Implement [`DebugRegister`](super::registers::DebugRegister) and the raw
/// value conversions for a register newtype over `u32`.
macro_rules! debug_register {
    ($i:ident, $addr:expr, $name:expr) => {
        impl $crate::architecture::riscv::registers::DebugRegister for $i {
            const ADDRESS: u8 = $addr;
            const NAME: &'static str = $name;
        }

        impl From<$i> for u32 {
            fn from(register: $i) -> Self {
                register.0
            }
        }

        impl From<u32> for $i {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }
    };
}

/// A debug register without any fields.
macro_rules! data_register {
    (pub $i:ident, $addr:expr, $name:expr) => {
        #[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
        #[doc = concat!("`", $name, "` register.")]
        pub struct $i(pub u32);

        debug_register!($i, $addr, $name);
    };
}
