use std::io::{Read, Write};
use std::net::TcpListener;

use crate::probe::{DebugProbeError, JtagPins};

/// Serves `remote_bitbang` connections into a [`JtagPins`] target, for
/// example a simulated [`JtagDebugPort`](crate::target::port::JtagDebugPort).
#[derive(Debug)]
pub struct RemoteBitBangServer<P> {
    target: P,
}

impl<P: JtagPins> RemoteBitBangServer<P> {
    /// Serve connections into `target`.
    pub fn new(target: P) -> Self {
        Self { target }
    }

    /// Accept one connection on `listener` and serve it until the client
    /// quits or disconnects.
    pub fn accept(&mut self, listener: &TcpListener) -> Result<(), DebugProbeError> {
        let (stream, peer) = listener.accept()?;
        stream.set_nodelay(true)?;
        tracing::info!("Remote bitbang client connected from {}", peer);

        self.serve(stream)
    }

    /// Execute the commands read from `stream` until `Q` or the end of the
    /// stream. TDO reads are answered on the same stream.
    pub fn serve(&mut self, mut stream: impl Read + Write) -> Result<(), DebugProbeError> {
        let mut buffer = [0; 4096];
        let mut responses = Vec::new();

        loop {
            let len = stream.read(&mut buffer)?;
            if len == 0 {
                tracing::debug!("Remote bitbang client disconnected");
                return Ok(());
            }

            for &command in &buffer[..len] {
                if !self.execute(command, &mut responses)? {
                    stream.write_all(&responses)?;
                    stream.flush()?;
                    tracing::debug!("Remote bitbang client quit");
                    return Ok(());
                }
            }

            if !responses.is_empty() {
                stream.write_all(&responses)?;
                stream.flush()?;
                responses.clear();
            }
        }
    }

    /// Execute a single command. Returns `false` on quit.
    fn execute(&mut self, command: u8, responses: &mut Vec<u8>) -> Result<bool, DebugProbeError> {
        match command {
            b'0'..=b'7' => {
                let bits = command - b'0';
                self.target
                    .set_pins(bits & 0b100 != 0, bits & 0b010 != 0, bits & 0b001 != 0)?;
            }
            b'R' => responses.push(if self.target.get_tdo()? { b'1' } else { b'0' }),
            b'r' | b's' | b't' | b'u' => {
                let trst = matches!(command, b't' | b'u');
                let srst = matches!(command, b's' | b'u');
                self.target.reset_tap(trst, srst)?;
            }
            // LED control
            b'B' | b'b' => {}
            b'Q' => return Ok(false),
            b'\r' | b'\n' => {}
            other => tracing::warn!("Ignoring unknown remote bitbang command {:#04x}", other),
        }

        Ok(true)
    }

    /// The pins commands are applied to.
    pub fn target(&self) -> &P {
        &self.target
    }

    /// Mutable access to the pins commands are applied to.
    pub fn target_mut(&mut self) -> &mut P {
        &mut self.target
    }

    /// Give back the target after the last connection.
    pub fn into_inner(self) -> P {
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::bitbang::tests::MockStream;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default)]
    struct Pins {
        tdo: bool,
        writes: Vec<(bool, bool, bool)>,
        resets: Vec<(bool, bool)>,
    }

    impl JtagPins for Pins {
        fn reset_tap(&mut self, trst: bool, srst: bool) -> Result<(), DebugProbeError> {
            self.resets.push((trst, srst));
            Ok(())
        }

        fn set_pins(&mut self, tck: bool, tms: bool, tdi: bool) -> Result<(), DebugProbeError> {
            self.writes.push((tck, tms, tdi));
            // Loop TDI back to TDO.
            self.tdo = tdi;
            Ok(())
        }

        fn get_tdo(&mut self) -> Result<bool, DebugProbeError> {
            Ok(self.tdo)
        }
    }

    #[test]
    fn executes_commands_until_quit() {
        let mut server = RemoteBitBangServer::new(Pins::default());
        let mut stream = MockStream::new(b"1R6RtBbx\nQ7");

        server.serve(&mut stream).unwrap();

        assert_eq!(stream.output, b"10");
        let pins = server.into_inner();
        assert_eq!(pins.writes, vec![(false, false, true), (true, true, false)]);
        assert_eq!(pins.resets, vec![(true, false)]);
    }

    #[test]
    fn end_of_stream_ends_the_session() {
        let mut server = RemoteBitBangServer::new(Pins::default());
        let mut stream = MockStream::new(b"su5R");

        server.serve(&mut stream).unwrap();

        assert_eq!(stream.output, b"1");
        assert_eq!(server.target().resets, vec![(false, true), (true, true)]);
    }
}
