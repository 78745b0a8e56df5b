/// Driver Errors

use core::fmt;

use crate::acia::WorkingMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AciaError {
    /// The device cannot be placed in the requested working mode
    UnsupportedMode(WorkingMode),
    /// Message does not fit the send buffer (`try_send` only)
    MessageTooLong { len: usize, capacity: usize },
    /// Message carries a terminator or line feed before its end (`try_send` only)
    EmbeddedDelimiter { at: usize },
}

impl fmt::Display for AciaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AciaError::UnsupportedMode(mode) => {
                write!(f, "device does not support working mode {:#04b}", mode.bits())
            }
            AciaError::MessageTooLong { len, capacity } => {
                write!(f, "message of {} bytes exceeds send capacity of {}", len, capacity)
            }
            AciaError::EmbeddedDelimiter { at } => {
                write!(f, "message contains a line delimiter at byte {}", at)
            }
        }
    }
}
