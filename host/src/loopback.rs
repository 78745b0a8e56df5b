/// Loopback Wire
/// Two emulated devices whose output feeds the other's input

use std::sync::Arc;

use crate::device::{AciaRegisters, EmulatedAcia, Transmitter};
use crate::irq::IrqEvents;

/// Transmit side of a null-modem cable
pub struct PeerWire(Arc<AciaRegisters>);

impl Transmitter for PeerWire {
    fn transmit(&self, byte: u8) {
        self.0.deliver(&[byte]);
    }
}

pub type LoopbackAcia = EmulatedAcia<PeerWire>;

/// Two devices cross-wired: A's output arrives on B's input and back.
pub fn pair() -> ((LoopbackAcia, IrqEvents), (LoopbackAcia, IrqEvents)) {
    let (regs_a, events_a) = AciaRegisters::new();
    let (regs_b, events_b) = AciaRegisters::new();
    let a = EmulatedAcia::with_registers(Arc::clone(&regs_a), PeerWire(Arc::clone(&regs_b)));
    let b = EmulatedAcia::with_registers(regs_b, PeerWire(regs_a));
    ((a, events_a), (b, events_b))
}
