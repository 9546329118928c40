use crate::architecture::riscv::communication_interface::RiscvError;
use crate::config::ConfigError;
use crate::probe::DebugProbeError;
use thiserror::Error;

/// The overarching error type of this crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("An error with the usage of the probe occured")]
    Probe(#[from] DebugProbeError),
    #[error("A RISC-V debug protocol error occured")]
    Riscv(#[from] RiscvError),
    #[error("The debug module configuration is invalid")]
    Config(#[from] ConfigError),
}
