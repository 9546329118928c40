//! The simulated target side of the debug transport.
//!
//! Data flows from the pins through the layers in this module:
//!
//! [`port::JtagDebugPort`] (pins) → [`tap::TapStateMachine`] (scans) →
//! [`dtm::DebugTransportModule`] (`dtmcs`/`dmi`) →
//! [`dmi::DmiTransactionInterface`] → [`debug_module::DebugModule`]
//! (registers, abstract commands) → [`hart::HartControlPort`].
//!
//! The [`bridge`] allows the pin side and the Debug Module to live on
//! different threads.

pub mod bridge;
pub mod debug_module;
pub mod dmi;
pub mod dtm;
#[cfg(any(test, feature = "test"))]
pub mod fake_hart;
pub mod hart;
pub mod port;
pub mod tap;
