//! # RISC-V external debug, from the pins to the hart
//!
//! This crate models both ends of the RISC-V external debug transport
//! (debug specification 0.13):
//!
//! * the **target side**: a JTAG TAP feeding a Debug Transport Module, which
//!   forwards DMI transactions to a Debug Module with its register bank and
//!   abstract command executor. The Debug Module talks to the harts through
//!   the [`HartControlPort`] trait.
//! * the **host side**: a [`ScanChainDriver`] that turns IR/DR scans into pin
//!   wiggles, a [`JtagDtm`] that speaks the DMI protocol including busy
//!   handling, and a [`RiscvCommunicationInterface`] offering halt, resume and
//!   register/memory access through abstract commands.
//!
//! Both sides meet at the [`JtagPins`] trait, either in process through a
//! [`JtagDebugPort`] or over TCP with the OpenOCD remote-bitbang protocol.
//!
//! ## Reading the program counter of a halted hart
//!
//! ```
//! use riscv_dm::{
//!     DebugModule, DebugModuleConfig, FakeHart, JtagDebugPort, JtagDtm,
//!     RiscvCommunicationInterface, ScanChainDriver,
//! };
//!
//! let hart = FakeHart::new();
//! hart.set_pc(0x8000_0000);
//!
//! let config = DebugModuleConfig::default();
//! let dm = DebugModule::new(config.clone(), vec![hart.clone()]);
//! let mut port = JtagDebugPort::new(&config, dm);
//!
//! let dtm = JtagDtm::new(ScanChainDriver::new(&mut port));
//! let mut interface = RiscvCommunicationInterface::new(Box::new(dtm));
//! interface.enable_debug_module()?;
//! interface.halt(std::time::Duration::from_millis(100))?;
//!
//! assert_eq!(interface.read_pc()?, 0x8000_0000);
//! # Ok::<(), riscv_dm::Error>(())
//! ```

/// All the interface bits for the supported architectures.
pub mod architecture;
#[warn(missing_docs)]
pub mod config;
mod error;
#[warn(missing_docs)]
pub mod probe;
pub mod target;

pub use crate::architecture::riscv::communication_interface::{
    RiscvCommunicationInterface, RiscvError,
};
pub use crate::architecture::riscv::dtm::direct_dtm::DirectDtm;
pub use crate::architecture::riscv::dtm::dtm_access::DtmAccess;
pub use crate::architecture::riscv::dtm::jtag_dtm::JtagDtm;
pub use crate::config::{ConfigError, DebugModuleConfig};
pub use crate::error::Error;
pub use crate::probe::{
    bitbang::{BitBangAdapter, RemoteBitBangServer},
    common::IdCode,
    scan_chain::ScanChainDriver,
    DebugProbeError, JtagPins,
};
pub use crate::target::{
    bridge::{dmi_channel, DmiClient, DmiServer},
    debug_module::DebugModule,
    dmi::{DmiOp, DmiRequest, DmiStatus, DmiTransactionInterface},
    dtm::DebugTransportModule,
    hart::{AccessSize, Fault, HartControlPort},
    port::JtagDebugPort,
    tap::{TapState, TapStateMachine},
};

// Exports only used in tests
#[cfg(any(test, feature = "test"))]
pub use crate::target::fake_hart::FakeHart;
#[cfg(any(test, feature = "test"))]
pub use crate::target::fake_hart::Operation as HartOperation;
