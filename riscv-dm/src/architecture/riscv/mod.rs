//! RISC-V external debug support (debug specification 0.13)

#[macro_use]
mod register;

pub mod communication_interface;
pub mod dtm;
pub mod registers;
