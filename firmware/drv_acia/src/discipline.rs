/// Wait Disciplines
/// How a driver waits for a character to leave or arrive: by polling the
/// device state registers, or by letting the interrupt callbacks drive it

use core::hint::spin_loop;

use crate::acia::{Acia, WorkingMode};
use crate::driver::{DriverAcia, ReceiveProgress, SendProgress};
use crate::sync::Semaphore;

mod sealed {
    pub trait Sealed {}
}

pub trait Discipline: sealed::Sealed + Sized {
    /// Working mode programmed at construction
    const MODE: WorkingMode;

    /// Runs after the first character of a message has been primed.
    fn transmit<H: Acia, S: Semaphore, const N: usize>(driver: &DriverAcia<H, S, Self, N>);

    /// Runs before a receiver waits for a complete line.
    fn collect<H: Acia, S: Semaphore, const N: usize>(driver: &DriverAcia<H, S, Self, N>);

    fn send_started<H: Acia>(_hw: &H) {}

    fn send_finished<H: Acia>(_hw: &H) {}

    fn line_latched<H: Acia>(_hw: &H) {}

    fn line_consumed<H: Acia>(_hw: &H) {}
}

/// Synchronous IO: the calling thread polls the device until the transfer ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusyWaiting;

/// Asynchronous IO: transmit and receive interrupts move the cursors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interrupt;

impl sealed::Sealed for BusyWaiting {}
impl sealed::Sealed for Interrupt {}

impl Discipline for BusyWaiting {
    const MODE: WorkingMode = WorkingMode::BUSY_WAITING;

    fn transmit<H: Acia, S: Semaphore, const N: usize>(driver: &DriverAcia<H, S, Self, N>) {
        loop {
            while !driver.hardware().output_empty() {
                spin_loop();
            }
            if driver.advance_send() != SendProgress::Sending {
                break;
            }
        }
    }

    fn collect<H: Acia, S: Semaphore, const N: usize>(driver: &DriverAcia<H, S, Self, N>) {
        loop {
            while !driver.hardware().input_full() {
                spin_loop();
            }
            if driver.accept_char() == ReceiveProgress::LineComplete {
                break;
            }
        }
    }
}

impl Discipline for Interrupt {
    const MODE: WorkingMode = WorkingMode::RECEIVE_INTERRUPT;

    fn transmit<H: Acia, S: Semaphore, const N: usize>(_driver: &DriverAcia<H, S, Self, N>) {}

    fn collect<H: Acia, S: Semaphore, const N: usize>(_driver: &DriverAcia<H, S, Self, N>) {}

    fn send_started<H: Acia>(hw: &H) {
        hw.enable_interrupts(WorkingMode::SEND_INTERRUPT);
    }

    fn send_finished<H: Acia>(hw: &H) {
        hw.disable_interrupts(WorkingMode::SEND_INTERRUPT);
    }

    // Hold further input in the device until the latched line is copied out.
    fn line_latched<H: Acia>(hw: &H) {
        hw.disable_interrupts(WorkingMode::RECEIVE_INTERRUPT);
    }

    fn line_consumed<H: Acia>(hw: &H) {
        hw.enable_interrupts(WorkingMode::RECEIVE_INTERRUPT);
    }
}
