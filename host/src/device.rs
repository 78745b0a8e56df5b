/// Emulated ACIA
/// Register model shared by the serial-port and loopback devices

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use heapless::Deque;
use log::warn;

use drv_acia::{Acia, AciaError, WorkingMode};

use crate::irq::{Irq, InterruptLine, IrqEvents};

/// Where transmitted characters go
pub trait Transmitter: Send + Sync {
    fn transmit(&self, byte: u8);
}

/// Depth of the receive FIFO in front of the driver
pub const INPUT_FIFO_SIZE: usize = 1024;

/// Mode register, input FIFO and interrupt line of one device.
pub struct AciaRegisters {
    mode: AtomicU8,
    input: Mutex<Deque<u8, INPUT_FIFO_SIZE>>,
    overruns: AtomicU32,
    irq: InterruptLine,
}

impl AciaRegisters {
    pub fn new() -> (Arc<AciaRegisters>, IrqEvents) {
        let (irq, events) = InterruptLine::new();
        let registers = AciaRegisters {
            mode: AtomicU8::new(WorkingMode::BUSY_WAITING.bits()),
            input: Mutex::new(Deque::new()),
            overruns: AtomicU32::new(0),
            irq,
        };
        (Arc::new(registers), events)
    }

    fn mode(&self) -> WorkingMode {
        WorkingMode::from_bits(self.mode.load(Ordering::Acquire))
    }

    fn input(&self) -> MutexGuard<'_, Deque<u8, INPUT_FIFO_SIZE>> {
        self.input.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Characters arriving from the line. Characters that find the FIFO full
    /// are lost and counted as overruns.
    pub fn deliver(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut lost = 0;
        {
            let mut input = self.input();
            for &byte in bytes {
                if input.push_back(byte).is_err() {
                    lost += 1;
                }
            }
        }
        if lost > 0 {
            let total = self.overruns.fetch_add(lost, Ordering::Relaxed) + lost;
            warn!("input FIFO full, {} characters lost ({} total)", lost, total);
        }
        self.ring_receive();
    }

    /// Characters dropped because the FIFO was full
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn pending_input(&self) -> usize {
        self.input().len()
    }

    pub fn interrupt_line(&self) -> &InterruptLine {
        &self.irq
    }

    fn ring_receive(&self) {
        if self.mode().receive_interrupt() && self.pending_input() > 0 {
            self.irq.raise(Irq::Receive);
        }
    }
}

/// An ACIA whose registers live in memory.
///
/// Transmission completes as soon as the transmitter has taken the byte, so
/// the output register is always empty when polled.
pub struct EmulatedAcia<T> {
    registers: Arc<AciaRegisters>,
    transmitter: T,
}

impl<T: Transmitter> EmulatedAcia<T> {
    pub fn new(transmitter: T) -> (Self, IrqEvents) {
        let (registers, events) = AciaRegisters::new();
        (EmulatedAcia::with_registers(registers, transmitter), events)
    }

    pub fn with_registers(registers: Arc<AciaRegisters>, transmitter: T) -> Self {
        EmulatedAcia { registers, transmitter }
    }

    pub fn registers(&self) -> &Arc<AciaRegisters> {
        &self.registers
    }

    pub fn transmitter(&self) -> &T {
        &self.transmitter
    }
}

impl<T: Transmitter> Acia for EmulatedAcia<T> {
    fn put_char(&self, byte: u8) {
        self.transmitter.transmit(byte);
        if self.registers.mode().send_interrupt() {
            self.registers.irq.raise(Irq::Transmit);
        }
    }

    fn get_char(&self) -> u8 {
        self.registers.input().pop_front().unwrap_or(0)
    }

    fn output_empty(&self) -> bool {
        true
    }

    fn input_full(&self) -> bool {
        let full = self.registers.pending_input() > 0;
        if !full {
            thread::yield_now();
        }
        full
    }

    fn set_working_mode(&self, mode: WorkingMode) -> Result<(), AciaError> {
        self.registers.mode.store(mode.bits(), Ordering::Release);
        self.registers.ring_receive();
        Ok(())
    }

    fn working_mode(&self) -> WorkingMode {
        self.registers.mode()
    }

    fn enable_interrupts(&self, mask: WorkingMode) {
        self.registers.mode.fetch_or(mask.bits(), Ordering::AcqRel);
        self.registers.ring_receive();
    }

    fn disable_interrupts(&self, mask: WorkingMode) {
        self.registers.mode.fetch_and(!mask.bits(), Ordering::AcqRel);
    }
}
