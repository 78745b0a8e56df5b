/// Emulated Interrupt Line
/// Device models raise events on a channel; a single dispatcher thread runs
/// the driver's interrupt callbacks one at a time

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures_lite::{future, StreamExt};
use log::debug;

use drv_acia::{Acia, DriverAcia, Interrupt, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Irq {
    /// A character has left the device
    Transmit,
    /// Input is waiting in the device
    Receive,
}

pub type IrqEvents = UnboundedReceiver<Irq>;

#[derive(Clone)]
pub struct InterruptLine {
    tx: UnboundedSender<Irq>,
}

impl InterruptLine {
    pub fn new() -> (InterruptLine, IrqEvents) {
        let (tx, rx) = mpsc::unbounded();
        (InterruptLine { tx }, rx)
    }

    pub fn raise(&self, irq: Irq) {
        // Nobody listening in busy waiting mode.
        let _ = self.tx.unbounded_send(irq);
    }

    /// Stop delivering events. The dispatcher exits once the queue drains.
    pub fn shutdown(&self) {
        self.tx.close_channel();
    }
}

/// Run `driver`'s interrupt callbacks for every event on `events`.
///
/// Receive events are doorbells: the dispatcher keeps calling
/// `interrupt_receive` while receive interrupts are enabled and input is
/// pending, so duplicate events are harmless.
pub fn spawn_dispatcher<H, S, const N: usize>(
    driver: Arc<DriverAcia<H, S, Interrupt, N>>,
    mut events: IrqEvents,
) -> io::Result<JoinHandle<()>>
where
    H: Acia + Send + Sync + 'static,
    S: Semaphore + Send + Sync + 'static,
{
    thread::Builder::new()
        .name("acia-irq".into())
        .spawn(move || {
            future::block_on(async {
                while let Some(irq) = events.next().await {
                    match irq {
                        Irq::Transmit => driver.interrupt_send(),
                        Irq::Receive => {
                            let hw = driver.hardware();
                            while hw.working_mode().receive_interrupt() && hw.input_full() {
                                driver.interrupt_receive();
                            }
                        }
                    }
                }
            });
            debug!("interrupt line closed");
        })
}
