/// ACIA Hardware Interface
/// Register-level view of the serial device the driver sits on

use bitfield::bitfield;

use crate::error::AciaError;

/// End of message inside the driver buffers
pub const TERMINATOR: u8 = 0;

/// Line delimiter on the wire
pub const LINE_FEED: u8 = b'\n';

bitfield! {
    /// Working mode register. All bits clear means busy waiting.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct WorkingMode(u8);
    impl Debug;
    pub send_interrupt, set_send_interrupt: 0;
    pub receive_interrupt, set_receive_interrupt: 1;
}

impl WorkingMode {
    pub const BUSY_WAITING: WorkingMode = WorkingMode(0);
    pub const SEND_INTERRUPT: WorkingMode = WorkingMode(1 << 0);
    pub const RECEIVE_INTERRUPT: WorkingMode = WorkingMode(1 << 1);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        WorkingMode(bits & 0b11)
    }

    pub const fn union(self, other: WorkingMode) -> Self {
        WorkingMode(self.0 | other.0)
    }

    pub const fn difference(self, other: WorkingMode) -> Self {
        WorkingMode(self.0 & !other.0)
    }

    pub const fn contains(self, other: WorkingMode) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_busy_waiting(self) -> bool {
        self.0 == 0
    }
}

/// Device operations the driver needs from the hardware layer.
///
/// In interrupt mode the hardware layer calls back into the driver:
/// once per `put_char` while send interrupts are enabled, and once per
/// arrived character while receive interrupts are enabled.
pub trait Acia {
    /// Start transmitting one character
    fn put_char(&self, byte: u8);

    /// Last received character
    fn get_char(&self) -> u8;

    /// Output state register: previous character has left the device
    fn output_empty(&self) -> bool;

    /// Input state register: a character is waiting in `get_char`
    fn input_full(&self) -> bool;

    fn set_working_mode(&self, mode: WorkingMode) -> Result<(), AciaError>;

    fn working_mode(&self) -> WorkingMode;

    /// Set interrupt enable bits. Must not race with the interrupt handler.
    fn enable_interrupts(&self, mask: WorkingMode);

    /// Clear interrupt enable bits. Must not race with the interrupt handler.
    fn disable_interrupts(&self, mask: WorkingMode);
}

impl<T: Acia + ?Sized> Acia for &T {
    fn put_char(&self, byte: u8) {
        (**self).put_char(byte)
    }

    fn get_char(&self) -> u8 {
        (**self).get_char()
    }

    fn output_empty(&self) -> bool {
        (**self).output_empty()
    }

    fn input_full(&self) -> bool {
        (**self).input_full()
    }

    fn set_working_mode(&self, mode: WorkingMode) -> Result<(), AciaError> {
        (**self).set_working_mode(mode)
    }

    fn working_mode(&self) -> WorkingMode {
        (**self).working_mode()
    }

    fn enable_interrupts(&self, mask: WorkingMode) {
        (**self).enable_interrupts(mask)
    }

    fn disable_interrupts(&self, mask: WorkingMode) {
        (**self).disable_interrupts(mask)
    }
}
