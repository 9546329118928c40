use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use riscv_dm::{
    BitBangAdapter, DebugModule, DebugModuleConfig, DtmAccess, FakeHart, HartControlPort,
    JtagDebugPort, JtagDtm, RemoteBitBangServer, RiscvCommunicationInterface, ScanChainDriver,
    TapState,
};

#[test]
fn debug_over_remote_bitbang() {
    let hart = FakeHart::new();
    hart.set_pc(0x4000_0000);
    let harts = vec![hart.clone()];

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let address = listener.local_addr().expect("No local address");

    let target = thread::spawn(move || {
        let config = DebugModuleConfig::default();
        let port = JtagDebugPort::new(&config, DebugModule::new(config.clone(), harts));
        let mut server = RemoteBitBangServer::new(port);

        server.accept(&listener).expect("Serving the client failed");
        server.into_inner()
    });

    let adapter = BitBangAdapter::connect(address).expect("Failed to connect");
    let mut dtm = JtagDtm::new(ScanChainDriver::new(adapter));
    assert_eq!(
        dtm.read_idcode().expect("Failed to read IDCODE"),
        Some(0x10e3_1913)
    );

    let mut interface = RiscvCommunicationInterface::new(Box::new(dtm));
    interface
        .enable_debug_module()
        .expect("Failed to enable the debug module");
    interface
        .halt(Duration::from_millis(500))
        .expect("Failed to halt");
    assert_eq!(interface.read_pc().expect("Failed to read the PC"), 0x4000_0000);

    // Dropping the adapter sends the quit command.
    drop(interface);
    let port = target.join().expect("Target thread panicked");

    assert!(hart.is_halted());
    assert_eq!(port.tap().state(), TapState::RunTestIdle);
}
