//! The OpenOCD `remote_bitbang` protocol.
//!
//! Every pin change is one ASCII character on a byte stream, usually a TCP
//! connection. The protocol is described in the OpenOCD documentation:
//! [remote_bitbang](https://github.com/openocd-org/openocd/blob/b6b4f9d46a48aadc1de6bb5152ff4913661c9059/doc/manual/jtag/drivers/remote_bitbang.txt)
//!
//! [`BitBangAdapter`] is the client side, driving a remote TAP.
//! [`RemoteBitBangServer`] is the server side, driving a local [`JtagPins`]
//! implementation from a stream.
//!
//! [`JtagPins`]: crate::probe::JtagPins

mod bitbang_adapter;
mod server;

pub use bitbang_adapter::BitBangAdapter;
pub use server::RemoteBitBangServer;

/// Port OpenOCD and most simulators use for `remote_bitbang`.
pub const DEFAULT_PORT: u16 = 44853;

/// The command setting TCK, TMS and TDI.
fn write_command(tck: bool, tms: bool, tdi: bool) -> u8 {
    b'0' + ((tck as u8) << 2 | (tms as u8) << 1 | tdi as u8)
}

/// The command driving the reset lines.
fn reset_command(trst: bool, srst: bool) -> u8 {
    match (trst, srst) {
        (false, false) => b'r',
        (false, true) => b's',
        (true, false) => b't',
        (true, true) => b'u',
    }
}
