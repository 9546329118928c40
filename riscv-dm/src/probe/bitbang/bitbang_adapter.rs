use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::{reset_command, write_command};
use crate::probe::{DebugProbeError, JtagPins};

/// Abstracts the bit bang encoding scheme to generic read/write/quit functions.
///
/// Commands are buffered until TDO is read or the adapter is flushed.
#[derive(Debug)]
pub struct BitBangAdapter<S: Write> {
    stream: S,
    pending: Vec<u8>,
}

impl BitBangAdapter<TcpStream> {
    /// Connect to a `remote_bitbang` server.
    pub fn connect(address: impl ToSocketAddrs) -> io::Result<Self> {
        let socket = TcpStream::connect(address)?;
        socket.set_read_timeout(Some(Duration::from_millis(500)))?;
        socket.set_write_timeout(Some(Duration::from_millis(500)))?;
        // Every TDO read is a round trip.
        socket.set_nodelay(true)?;

        tracing::debug!("Connected to remote bitbang server {:?}", socket.peer_addr());
        Ok(Self::new(socket))
    }
}

impl<S: Read + Write> BitBangAdapter<S> {
    /// Speak the remote bitbang protocol on an already connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            pending: Vec::new(),
        }
    }

    /// Send all buffered commands.
    pub fn flush(&mut self) -> Result<(), DebugProbeError> {
        if !self.pending.is_empty() {
            self.stream.write_all(&self.pending)?;
            self.pending.clear();
        }
        self.stream.flush()?;
        Ok(())
    }

    /// Control the JTAG reset lines.
    pub fn reset(&mut self, trst: bool, srst: bool) {
        self.pending.push(reset_command(trst, srst));
    }

    /// Set the value of TCK, TMS, and TDI.
    pub fn write(&mut self, tck: bool, tms: bool, tdi: bool) {
        self.pending.push(write_command(tck, tms, tdi));
    }

    /// Read TDO.
    pub fn read(&mut self) -> Result<bool, DebugProbeError> {
        self.pending.push(b'R');
        self.flush()?;

        let mut tdo = [0; 1];
        if self.stream.read(&mut tdo)? != 1 {
            return Err(DebugProbeError::Disconnected);
        }

        match tdo[0] {
            b'0' => Ok(false),
            b'1' => Ok(true),
            other => Err(DebugProbeError::UnexpectedTdo(other)),
        }
    }

    /// Tell the bit bang server we are done sending messages.
    pub fn quit(&mut self) -> Result<(), DebugProbeError> {
        self.pending.push(b'Q');
        self.flush()
    }

    /// The underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

impl<S: Read + Write> JtagPins for BitBangAdapter<S> {
    fn reset_tap(&mut self, trst: bool, srst: bool) -> Result<(), DebugProbeError> {
        self.reset(trst, srst);
        Ok(())
    }

    fn set_pins(&mut self, tck: bool, tms: bool, tdi: bool) -> Result<(), DebugProbeError> {
        self.write(tck, tms, tdi);
        Ok(())
    }

    fn get_tdo(&mut self) -> Result<bool, DebugProbeError> {
        self.read()
    }
}

impl<S: Write> Drop for BitBangAdapter<S> {
    fn drop(&mut self) {
        // We are dropping the object, don't care if the connection failed
        self.pending.push(b'Q');
        let _ = self.stream.write_all(&self.pending);
        let _ = self.stream.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::bitbang::tests::MockStream;
    use pretty_assertions::assert_eq;

    #[test]
    fn commands_are_sent_before_reading_tdo() {
        let mut adapter = BitBangAdapter::new(MockStream::new(b"10"));

        adapter.set_pins(false, true, false).unwrap();
        assert!(adapter.get_tdo().unwrap());
        adapter.set_pins(true, true, false).unwrap();
        adapter.reset_tap(true, false).unwrap();
        assert_eq!(adapter.get_ref().output, b"2R");

        assert!(!adapter.get_tdo().unwrap());
        assert_eq!(adapter.get_ref().output, b"2R6tR");

        adapter.quit().unwrap();
        assert_eq!(adapter.get_ref().output, b"2R6tRQ");
    }

    #[test]
    fn closed_connection() {
        let mut adapter = BitBangAdapter::new(MockStream::new(b""));

        assert!(matches!(
            adapter.get_tdo(),
            Err(DebugProbeError::Disconnected)
        ));
    }

    #[test]
    fn unexpected_tdo() {
        let mut adapter = BitBangAdapter::new(MockStream::new(b"x"));

        assert!(matches!(
            adapter.get_tdo(),
            Err(DebugProbeError::UnexpectedTdo(b'x'))
        ));
    }
}
