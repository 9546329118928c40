//! A blocking DMI channel between threads.
//!
//! The [`DmiClient`] end implements [`DmiTransactionInterface`] and blocks the
//! calling thread until the [`DmiServer`] end has executed the transaction on
//! the Debug Module. The server is driven by the clock loop of the simulated
//! target, possibly on another thread. Only one transaction is in flight at
//! any time.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::target::debug_module::DebugModule;
use crate::target::dmi::{DmiStatus, DmiTransactionInterface};
use crate::target::hart::HartControlPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transaction {
    Read(u32),
    Write(u32, u32),
    HardReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Empty,
    Request(Transaction),
    Response(u32, DmiStatus),
}

#[derive(Debug)]
struct Channel {
    slot: Slot,
    client_connected: bool,
    server_connected: bool,
}

#[derive(Debug)]
struct Shared {
    channel: Mutex<Channel>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Channel> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Channel>) -> MutexGuard<'a, Channel> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a connected pair of channel ends.
pub fn dmi_channel() -> (DmiClient, DmiServer) {
    let shared = Arc::new(Shared {
        channel: Mutex::new(Channel {
            slot: Slot::Empty,
            client_connected: true,
            server_connected: true,
        }),
        changed: Condvar::new(),
    });

    (
        DmiClient {
            shared: shared.clone(),
        },
        DmiServer { shared },
    )
}

/// The blocking end of a [`dmi_channel`].
///
/// Once the server end is dropped, every transaction fails with
/// [`DmiStatus::Failed`].
#[derive(Debug)]
pub struct DmiClient {
    shared: Arc<Shared>,
}

impl DmiClient {
    fn transact(&mut self, transaction: Transaction) -> Option<(u32, DmiStatus)> {
        let mut channel = self.shared.lock();
        if !channel.server_connected {
            return None;
        }

        channel.slot = Slot::Request(transaction);
        self.shared.changed.notify_all();

        loop {
            if let Slot::Response(data, status) = channel.slot {
                channel.slot = Slot::Empty;
                return Some((data, status));
            }

            if !channel.server_connected {
                tracing::warn!("DMI server went away during {:?}", transaction);
                channel.slot = Slot::Empty;
                return None;
            }

            channel = self.shared.wait(channel);
        }
    }

    /// Whether the server end still exists.
    pub fn is_connected(&self) -> bool {
        self.shared.lock().server_connected
    }
}

impl DmiTransactionInterface for DmiClient {
    fn read(&mut self, address: u32) -> (u32, DmiStatus) {
        self.transact(Transaction::Read(address))
            .unwrap_or((0, DmiStatus::Failed))
    }

    fn write(&mut self, address: u32, data: u32) -> DmiStatus {
        self.transact(Transaction::Write(address, data))
            .map_or(DmiStatus::Failed, |(_, status)| status)
    }

    fn hard_reset(&mut self) {
        self.transact(Transaction::HardReset);
    }
}

impl Drop for DmiClient {
    fn drop(&mut self) {
        self.shared.lock().client_connected = false;
        self.shared.changed.notify_all();
    }
}

/// The clock driven end of a [`dmi_channel`].
#[derive(Debug)]
pub struct DmiServer {
    shared: Arc<Shared>,
}

impl DmiServer {
    /// Execute a pending transaction on `target`, without waiting for one.
    ///
    /// Returns `true` if a transaction was executed.
    pub fn serve(&self, target: &mut impl DmiTransactionInterface) -> bool {
        let transaction = match self.shared.lock().slot {
            Slot::Request(transaction) => transaction,
            Slot::Empty | Slot::Response(..) => return false,
        };

        // The client stays blocked until the response is stored, so the lock
        // is not needed while the target executes.
        let (data, status) = match transaction {
            Transaction::Read(address) => target.read(address),
            Transaction::Write(address, data) => (0, target.write(address, data)),
            Transaction::HardReset => {
                target.hard_reset();
                (0, DmiStatus::Success)
            }
        };

        self.shared.lock().slot = Slot::Response(data, status);
        self.shared.changed.notify_all();
        true
    }

    /// One clock of the Debug Module: a pending transaction if there is one,
    /// an idle step otherwise.
    pub fn step<H: HartControlPort>(&self, debug_module: &mut DebugModule<H>) {
        if !self.serve(debug_module) {
            debug_module.step();
        }
    }

    /// Block until a transaction is pending, the client disconnects or the
    /// timeout expires. Returns `true` if a transaction is pending.
    pub fn wait_for_request(&self, timeout: Duration) -> bool {
        let channel = self.shared.lock();
        let (channel, _) = self
            .shared
            .changed
            .wait_timeout_while(channel, timeout, |channel| {
                channel.client_connected && !matches!(channel.slot, Slot::Request(_))
            })
            .unwrap_or_else(PoisonError::into_inner);

        matches!(channel.slot, Slot::Request(_))
    }

    /// Whether the client end still exists.
    pub fn is_connected(&self) -> bool {
        self.shared.lock().client_connected
    }
}

impl Drop for DmiServer {
    fn drop(&mut self) {
        self.shared.lock().server_connected = false;
        self.shared.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DebugModuleConfig;
    use crate::target::fake_hart::FakeHart;
    use pretty_assertions::assert_eq;
    use std::thread;

    #[test]
    fn transactions_are_served_by_another_thread() {
        let (mut client, server) = dmi_channel();
        let hart = FakeHart::new();
        let harts = vec![hart.clone()];

        let clock = thread::spawn(move || {
            let mut dm = DebugModule::new(DebugModuleConfig::default(), harts);
            while server.is_connected() {
                server.step(&mut dm);
                thread::yield_now();
            }
            dm.command()
        });

        assert_eq!(client.write(0x04, 0x1234_5678), DmiStatus::Success);
        assert_eq!(client.read(0x04), (0x1234_5678, DmiStatus::Success));

        // dmcontrol.haltreq
        assert_eq!(client.write(0x10, 0x8000_0001), DmiStatus::Success);
        assert!(hart.is_halted());

        // An unsupported command type, executed by the idle clock.
        assert_eq!(client.write(0x17, 0x0300_0000), DmiStatus::Success);
        let abstractcs = loop {
            let (abstractcs, _) = client.read(0x16);
            if abstractcs & (1 << 12) == 0 {
                break abstractcs;
            }
        };
        assert_eq!((abstractcs >> 8) & 0x7, 2);

        drop(client);
        assert_eq!(clock.join().unwrap(), 0x0300_0000);
    }

    #[test]
    fn disconnected_server_fails_transactions() {
        let (mut client, server) = dmi_channel();
        drop(server);

        assert!(!client.is_connected());
        assert_eq!(client.read(0x11), (0, DmiStatus::Failed));
        assert_eq!(client.write(0x10, 1), DmiStatus::Failed);
    }

    #[test]
    fn serve_without_request_does_nothing() {
        let (_client, server) = dmi_channel();
        let mut dm = DebugModule::new(DebugModuleConfig::default(), vec![FakeHart::new()]);

        assert!(!server.serve(&mut dm));
        assert!(!server.wait_for_request(Duration::from_millis(1)));
        assert!(server.is_connected());
    }

    #[test]
    fn hard_reset_is_forwarded() {
        let (mut client, server) = dmi_channel();

        let clock = thread::spawn(move || {
            let mut dm = DebugModule::new(DebugModuleConfig::default(), vec![FakeHart::new()]);
            dm.write(0x04, 0x55);
            while server.is_connected() {
                if server.wait_for_request(Duration::from_millis(10)) {
                    server.serve(&mut dm);
                }
            }
        });

        assert_eq!(client.read(0x04), (0x55, DmiStatus::Success));
        client.hard_reset();
        assert_eq!(client.read(0x04), (0, DmiStatus::Success));

        drop(client);
        clock.join().unwrap();
    }
}
