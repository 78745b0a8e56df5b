/// embedded-hal Serial Adapter
/// Presents any blocking-capable embedded-hal UART as a busy waiting ACIA

use core::cell::{Cell, RefCell};

use embedded_hal::serial::{Read, Write};

use crate::acia::{Acia, WorkingMode};
use crate::error::AciaError;

/// ACIA on top of an embedded-hal 0.2 serial peripheral.
///
/// Only busy waiting is supported: the peripheral exposes no interrupt
/// callbacks through the embedded-hal traits.
pub struct HalAcia<U> {
    uart: RefCell<U>,
    lookahead: Cell<Option<u8>>,
    line_errors: Cell<u32>,
}

impl<U> HalAcia<U>
where
    U: Read<u8> + Write<u8>,
{
    pub fn new(uart: U) -> Self {
        HalAcia {
            uart: RefCell::new(uart),
            lookahead: Cell::new(None),
            line_errors: Cell::new(0),
        }
    }

    /// Framing/overrun errors reported by the peripheral so far
    pub fn line_errors(&self) -> u32 {
        self.line_errors.get()
    }

    pub fn release(self) -> U {
        self.uart.into_inner()
    }
}

impl<U> Acia for HalAcia<U>
where
    U: Read<u8> + Write<u8>,
{
    fn put_char(&self, byte: u8) {
        let mut uart = self.uart.borrow_mut();
        loop {
            match uart.write(byte) {
                Ok(()) => break,
                Err(nb::Error::WouldBlock) => continue,
                Err(nb::Error::Other(_)) => {
                    self.line_errors.set(self.line_errors.get() + 1);
                    break;
                }
            }
        }
    }

    fn get_char(&self) -> u8 {
        if let Some(byte) = self.lookahead.take() {
            return byte;
        }
        let mut uart = self.uart.borrow_mut();
        loop {
            match uart.read() {
                Ok(byte) => return byte,
                Err(nb::Error::WouldBlock) => continue,
                Err(nb::Error::Other(_)) => {
                    self.line_errors.set(self.line_errors.get() + 1);
                }
            }
        }
    }

    fn output_empty(&self) -> bool {
        !matches!(self.uart.borrow_mut().flush(), Err(nb::Error::WouldBlock))
    }

    fn input_full(&self) -> bool {
        if self.lookahead.get().is_some() {
            return true;
        }
        match self.uart.borrow_mut().read() {
            Ok(byte) => {
                self.lookahead.set(Some(byte));
                true
            }
            Err(nb::Error::WouldBlock) => false,
            Err(nb::Error::Other(_)) => {
                self.line_errors.set(self.line_errors.get() + 1);
                false
            }
        }
    }

    fn set_working_mode(&self, mode: WorkingMode) -> Result<(), AciaError> {
        if mode.is_busy_waiting() {
            Ok(())
        } else {
            Err(AciaError::UnsupportedMode(mode))
        }
    }

    fn working_mode(&self) -> WorkingMode {
        WorkingMode::BUSY_WAITING
    }

    fn enable_interrupts(&self, _mask: WorkingMode) {}

    fn disable_interrupts(&self, _mask: WorkingMode) {}
}
