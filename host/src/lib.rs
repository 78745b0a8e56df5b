/// Host-side kernel services for the ACIA driver: a blocking semaphore, an
/// emulated interrupt line, serial-port and loopback device models

pub mod device;
pub mod irq;
pub mod link;
pub mod loopback;
pub mod port;
pub mod semaphore;

pub use device::{AciaRegisters, EmulatedAcia, Transmitter, INPUT_FIFO_SIZE};
pub use irq::{Irq, IrqEvents, InterruptLine};
pub use link::{Attach, HostDriver, Link};
pub use loopback::{LoopbackAcia, PeerWire};
pub use port::{PortAcia, PortWriter};
pub use semaphore::KernelSemaphore;
