/// Serial Port Device
/// Emulated ACIA backed by a real serial port. Output is written straight to
/// the port; a pump thread feeds the input FIFO from a cloned handle.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, trace};
use serialport::SerialPort;

use crate::device::{AciaRegisters, EmulatedAcia, Transmitter};
use crate::irq::IrqEvents;

const READ_TIMEOUT: Duration = Duration::from_millis(50);

pub struct PortWriter(Mutex<Box<dyn SerialPort>>);

impl Transmitter for PortWriter {
    fn transmit(&self, byte: u8) {
        let mut port = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = port.write_all(&[byte]).and_then(|_| port.flush()) {
            error!("serial write failed: {}", e);
        }
    }
}

pub type PortAcia = EmulatedAcia<PortWriter>;

/// Reader half of an open port. Dropping it stops the pump.
pub struct Pump {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Pump {
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Pump {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Port names reported by the OS
pub fn list_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Open `path` at `baud` and wrap it as an emulated ACIA.
pub fn open_port(path: &str, baud: u32) -> Result<(PortAcia, IrqEvents, Pump)> {
    let port = serialport::new(path, baud)
        .timeout(READ_TIMEOUT)
        .open()
        .with_context(|| format!("Failed to open serial port {}", path))?;
    let reader = port
        .try_clone()
        .with_context(|| format!("Failed to clone serial port {}", path))?;
    info!("opened {} at {} baud", path, baud);

    let (registers, events) = AciaRegisters::new();
    let running = Arc::new(AtomicBool::new(true));
    let handle = thread::Builder::new()
        .name("acia-pump".into())
        .spawn({
            let registers = Arc::clone(&registers);
            let running = Arc::clone(&running);
            move || pump(reader, &registers, &running)
        })
        .context("Failed to start serial reader")?;

    let acia = EmulatedAcia::with_registers(registers, PortWriter(Mutex::new(port)));
    let pump = Pump { running, handle: Some(handle) };
    Ok((acia, events, pump))
}

fn pump(mut reader: Box<dyn SerialPort>, registers: &AciaRegisters, running: &AtomicBool) {
    let mut chunk = [0u8; 64];
    while running.load(Ordering::Acquire) {
        match reader.read(&mut chunk) {
            Ok(0) => continue,
            Ok(n) => {
                trace!("rx {:02x?}", &chunk[..n]);
                registers.deliver(&chunk[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("serial read failed: {}", e);
                break;
            }
        }
    }
    debug!("serial reader stopped");
}
