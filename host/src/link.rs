/// Driver Link
/// Boots a driver on an emulated device and, in interrupt mode, wires the
/// device's interrupt line to the driver's callbacks

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use log::debug;

use drv_acia::{BusyWaiting, Discipline, DriverAcia, DriverStats, Interrupt};

use crate::device::{EmulatedAcia, Transmitter};
use crate::irq::{spawn_dispatcher, IrqEvents};
use crate::semaphore::KernelSemaphore;

pub type HostDriver<H, D> = DriverAcia<H, KernelSemaphore, D>;

/// How a working discipline connects to the interrupt line
pub trait Attach: Discipline + Send + Sync + 'static {
    fn attach<H>(
        driver: &Arc<HostDriver<H, Self>>,
        events: IrqEvents,
    ) -> io::Result<Option<JoinHandle<()>>>
    where
        H: drv_acia::Acia + Send + Sync + 'static;
}

impl Attach for BusyWaiting {
    fn attach<H>(
        _driver: &Arc<HostDriver<H, Self>>,
        _events: IrqEvents,
    ) -> io::Result<Option<JoinHandle<()>>>
    where
        H: drv_acia::Acia + Send + Sync + 'static,
    {
        Ok(None)
    }
}

impl Attach for Interrupt {
    fn attach<H>(
        driver: &Arc<HostDriver<H, Self>>,
        events: IrqEvents,
    ) -> io::Result<Option<JoinHandle<()>>>
    where
        H: drv_acia::Acia + Send + Sync + 'static,
    {
        spawn_dispatcher(Arc::clone(driver), events).map(Some)
    }
}

pub struct Link<T: Transmitter + 'static, D: Attach> {
    driver: Arc<HostDriver<EmulatedAcia<T>, D>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl<T: Transmitter + 'static, D: Attach> Link<T, D> {
    pub fn open((acia, events): (EmulatedAcia<T>, IrqEvents)) -> Result<Self> {
        let driver = DriverAcia::new(acia)
            .map_err(anyhow::Error::msg)
            .context("Failed to initialise ACIA driver")?;
        let driver = Arc::new(driver);
        let dispatcher = D::attach(&driver, events).context("Failed to start interrupt dispatcher")?;
        debug!("link up in {:?} mode", D::MODE);
        Ok(Link { driver, dispatcher })
    }

    pub fn driver(&self) -> &Arc<HostDriver<EmulatedAcia<T>, D>> {
        &self.driver
    }

    pub fn send(&self, message: &[u8]) -> usize {
        self.driver.send(message)
    }

    pub fn receive(&self, dest: &mut [u8]) -> usize {
        self.driver.receive(dest)
    }

    pub fn stats(&self) -> DriverStats {
        self.driver.stats()
    }

    /// Close the interrupt line and wait for pending callbacks to finish.
    pub fn close(mut self) -> DriverStats {
        self.shutdown();
        self.driver.stats()
    }

    fn shutdown(&mut self) {
        self.driver.hardware().registers().interrupt_line().shutdown();
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }
    }
}

impl<T: Transmitter + 'static, D: Attach> Drop for Link<T, D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
