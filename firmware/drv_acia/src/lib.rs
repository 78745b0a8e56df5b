#![cfg_attr(not(test), no_std)]

pub mod acia;
pub mod discipline;
pub mod driver;
pub mod error;
pub mod serial;
pub mod sync;

#[cfg(test)]
mod testing;

pub use acia::{Acia, WorkingMode, LINE_FEED, TERMINATOR};
pub use discipline::{BusyWaiting, Discipline, Interrupt};
pub use driver::{DriverAcia, DriverStats, BUFFER_SIZE};
pub use error::AciaError;
pub use serial::HalAcia;
pub use sync::Semaphore;
