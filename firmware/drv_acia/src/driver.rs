/// ACIA Driver
/// Blocking send/receive of null-terminated messages on top of an ACIA,
/// in busy waiting or interrupt mode

use core::marker::PhantomData;
use core::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};

use log::{debug, trace, warn};
use static_assertions::const_assert;

use crate::acia::{Acia, LINE_FEED, TERMINATOR};
use crate::discipline::{Discipline, Interrupt};
use crate::error::AciaError;
use crate::sync::Semaphore;

/// Default capacity of each driver buffer, terminator included
pub const BUFFER_SIZE: usize = 256;

const_assert!(BUFFER_SIZE >= 2);

const IDLE: u8 = 0;
const SENDING: u8 = 1;
const CLOSING: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendProgress {
    /// No message in flight, spurious transmit event
    Idle,
    Sending,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReceiveProgress {
    Stored,
    Dropped,
    LineComplete,
}

/// Snapshot of the driver counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub messages_sent: u32,
    pub truncated_sends: u32,
    pub lines_received: u32,
    pub dropped_chars: u32,
}

#[derive(Default)]
struct Counters {
    messages_sent: AtomicU32,
    truncated_sends: AtomicU32,
    lines_received: AtomicU32,
    dropped_chars: AtomicU32,
}

/// Length of the payload in `message`: up to the first terminator or line
/// feed, whichever comes first.
fn payload_len(message: &[u8]) -> usize {
    message
        .iter()
        .position(|&c| c == TERMINATOR || c == LINE_FEED)
        .unwrap_or(message.len())
}

/// ACIA device driver.
///
/// One message may be in flight per direction. `send` and `receive` block
/// the calling thread on the driver semaphores; in interrupt mode the
/// hardware layer moves transfers forward through [`interrupt_send`] and
/// [`interrupt_receive`].
///
/// [`interrupt_send`]: DriverAcia::interrupt_send
/// [`interrupt_receive`]: DriverAcia::interrupt_receive
pub struct DriverAcia<H, S, D, const N: usize = BUFFER_SIZE> {
    hw: H,
    send_buffer: [AtomicU8; N],
    receive_buffer: [AtomicU8; N],
    ind_send: AtomicUsize,
    ind_rec: AtomicUsize,
    send_state: AtomicU8,
    send_sema: S,
    receive_sema: S,
    // characters dropped from the line being accumulated / the latched line
    line_drops: AtomicUsize,
    latched_drops: AtomicUsize,
    counters: Counters,
    _discipline: PhantomData<D>,
}

impl<H: Acia, S: Semaphore, D: Discipline, const N: usize> DriverAcia<H, S, D, N> {
    const CAPACITY_CHECK: () = assert!(N >= 2, "ACIA buffers need room for one character and a terminator");

    /// Longest payload a single `send` can carry
    pub const MAX_MESSAGE_LEN: usize = N - 1;

    /// Configure the device for discipline `D` and build the driver.
    ///
    /// Fails if the device cannot be placed in the requested mode. The
    /// kernel cannot run without its device, callers treat this as fatal.
    pub fn new(hw: H) -> Result<Self, AciaError> {
        let () = Self::CAPACITY_CHECK;

        let driver = DriverAcia {
            hw,
            send_buffer: core::array::from_fn(|_| AtomicU8::new(TERMINATOR)),
            receive_buffer: core::array::from_fn(|_| AtomicU8::new(TERMINATOR)),
            ind_send: AtomicUsize::new(0),
            ind_rec: AtomicUsize::new(0),
            send_state: AtomicU8::new(IDLE),
            send_sema: S::new(0),
            receive_sema: S::new(0),
            line_drops: AtomicUsize::new(0),
            latched_drops: AtomicUsize::new(0),
            counters: Counters::default(),
            _discipline: PhantomData,
        };

        driver.hw.set_working_mode(D::MODE)?;
        debug!("ACIA driver ready: mode={:?}, buffer={}", D::MODE, N);

        Ok(driver)
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn stats(&self) -> DriverStats {
        DriverStats {
            messages_sent: self.counters.messages_sent.load(Ordering::Relaxed),
            truncated_sends: self.counters.truncated_sends.load(Ordering::Relaxed),
            lines_received: self.counters.lines_received.load(Ordering::Relaxed),
            dropped_chars: self.counters.dropped_chars.load(Ordering::Relaxed),
        }
    }

    /// Send a message and block until every character has left the device.
    ///
    /// The payload ends at the first terminator or line feed in `message`.
    /// Payloads longer than `N - 1` are truncated without error. Returns the
    /// number of payload characters sent.
    pub fn send(&self, message: &[u8]) -> usize {
        let len = self.start_send(message);
        D::transmit(self);
        self.send_sema.p();

        self.counters.messages_sent.fetch_add(1, Ordering::Relaxed);
        trace!("sent {} characters", len);
        len
    }

    /// Like [`send`](Self::send), but refuses messages that would be truncated,
    /// either by the buffer capacity or by an embedded terminator or line feed.
    pub fn try_send(&self, message: &[u8]) -> Result<usize, AciaError> {
        let len = payload_len(message);
        if len < message.len() {
            return Err(AciaError::EmbeddedDelimiter { at: len });
        }
        if len > Self::MAX_MESSAGE_LEN {
            return Err(AciaError::MessageTooLong { len, capacity: Self::MAX_MESSAGE_LEN });
        }
        Ok(self.send(message))
    }

    /// Block until a complete line has arrived, then copy it into `dest`.
    ///
    /// At most `min(dest.len() - 1, N - 1)` characters are copied and `dest`
    /// is always null-terminated when it is not empty. Returns the number of
    /// characters copied, terminator excluded.
    pub fn receive(&self, dest: &mut [u8]) -> usize {
        D::collect(self);
        self.receive_sema.p();

        let limit = dest.len().saturating_sub(1).min(N - 1);
        let mut count = 0;
        while count < limit {
            let c = self.receive_buffer[count].load(Ordering::Relaxed);
            if c == TERMINATOR {
                break;
            }
            dest[count] = c;
            count += 1;
        }
        if let Some(slot) = dest.get_mut(count) {
            *slot = TERMINATOR;
        }

        let dropped = self.latched_drops.swap(0, Ordering::AcqRel);
        self.counters.lines_received.fetch_add(1, Ordering::Relaxed);
        D::line_consumed(&self.hw);

        if dropped > 0 {
            warn!("received line overflowed the buffer, {} characters dropped", dropped);
        }
        trace!("received {} characters", count);
        count
    }

    /// [`receive`](Self::receive) into an owned fixed-capacity vector.
    pub fn receive_line<const M: usize>(&self) -> heapless::Vec<u8, M> {
        let mut raw = [TERMINATOR; N];
        let count = self.receive(&mut raw);

        let mut line = heapless::Vec::new();
        // fits: at most M characters
        let pushed = line.extend_from_slice(&raw[..count.min(M)]);
        debug_assert!(pushed.is_ok());
        line
    }

    /// Fill the send buffer, reset the cursor and write the first character.
    pub(crate) fn start_send(&self, message: &[u8]) -> usize {
        let payload = payload_len(message);
        let len = payload.min(Self::MAX_MESSAGE_LEN);
        if len < payload {
            self.counters.truncated_sends.fetch_add(1, Ordering::Relaxed);
            warn!("message of {} characters truncated to {}", payload, len);
        }

        for (slot, &c) in self.send_buffer.iter().zip(&message[..len]) {
            slot.store(c, Ordering::Relaxed);
        }
        self.send_buffer[len].store(TERMINATOR, Ordering::Relaxed);
        self.ind_send.store(0, Ordering::Release);

        let first = self.send_buffer[0].load(Ordering::Relaxed);
        if first == TERMINATOR {
            self.send_state.store(CLOSING, Ordering::Release);
        } else {
            self.send_state.store(SENDING, Ordering::Release);
        }

        D::send_started(&self.hw);
        self.hw.put_char(if first == TERMINATOR { LINE_FEED } else { first });
        len
    }

    /// One transmit-complete event: write the next character, the closing
    /// line feed, or release the sender.
    pub(crate) fn advance_send(&self) -> SendProgress {
        match self.send_state.load(Ordering::Acquire) {
            SENDING => {
                // The cursor never passes the terminator, which sits at most at N - 1.
                let next = self.ind_send.load(Ordering::Acquire) + 1;
                self.ind_send.store(next, Ordering::Release);

                let c = self.send_buffer[next].load(Ordering::Relaxed);
                if c == TERMINATOR {
                    self.send_state.store(CLOSING, Ordering::Release);
                    self.hw.put_char(LINE_FEED);
                } else {
                    self.hw.put_char(c);
                }
                SendProgress::Sending
            }
            CLOSING => {
                self.send_state.store(IDLE, Ordering::Release);
                D::send_finished(&self.hw);
                self.send_sema.v();
                SendProgress::Done
            }
            _ => SendProgress::Idle,
        }
    }

    /// One character-arrived event.
    pub(crate) fn accept_char(&self) -> ReceiveProgress {
        let c = self.hw.get_char();
        let index = self.ind_rec.load(Ordering::Acquire);

        if c == LINE_FEED {
            // index <= N - 1
            self.receive_buffer[index].store(TERMINATOR, Ordering::Relaxed);
            self.ind_rec.store(0, Ordering::Release);
            let dropped = self.line_drops.swap(0, Ordering::AcqRel);
            self.latched_drops.store(dropped, Ordering::Release);

            D::line_latched(&self.hw);
            self.receive_sema.v();
            return ReceiveProgress::LineComplete;
        }

        if index < N - 1 {
            self.receive_buffer[index].store(c, Ordering::Relaxed);
            self.ind_rec.store(index + 1, Ordering::Release);
            ReceiveProgress::Stored
        } else {
            self.line_drops.fetch_add(1, Ordering::Relaxed);
            self.counters.dropped_chars.fetch_add(1, Ordering::Relaxed);
            ReceiveProgress::Dropped
        }
    }
}

impl<H: Acia, S: Semaphore, const N: usize> DriverAcia<H, S, Interrupt, N> {
    /// Transmit interrupt handler. Never blocks.
    pub fn interrupt_send(&self) {
        self.advance_send();
    }

    /// Receive interrupt handler. Never blocks.
    pub fn interrupt_receive(&self) {
        self.accept_char();
    }
}

#[cfg(test)]
impl<H: Acia, S: Semaphore, D: Discipline, const N: usize> DriverAcia<H, S, D, N> {
    pub(crate) fn receive_buffer_snapshot(&self) -> [u8; N] {
        core::array::from_fn(|i| self.receive_buffer[i].load(Ordering::Relaxed))
    }

    pub(crate) fn send_buffer_snapshot(&self) -> [u8; N] {
        core::array::from_fn(|i| self.send_buffer[i].load(Ordering::Relaxed))
    }

    pub(crate) fn receive_index(&self) -> usize {
        self.ind_rec.load(Ordering::Acquire)
    }

    pub(crate) fn send_index(&self) -> usize {
        self.ind_send.load(Ordering::Acquire)
    }

    pub(crate) fn send_sema(&self) -> &S {
        &self.send_sema
    }

    pub(crate) fn receive_sema(&self) -> &S {
        &self.receive_sema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acia::WorkingMode;
    use crate::discipline::BusyWaiting;
    use crate::testing::{wait_until, MockAcia, TestSemaphore};

    type IrqDriver<const N: usize> = DriverAcia<MockAcia, TestSemaphore, Interrupt, N>;
    type BusyDriver<const N: usize> = DriverAcia<MockAcia, TestSemaphore, BusyWaiting, N>;

    #[test]
    fn test_new_interrupt_mode_enables_receive() {
        let driver = IrqDriver::<8>::new(MockAcia::new()).unwrap();
        assert_eq!(driver.hardware().working_mode(), WorkingMode::RECEIVE_INTERRUPT);
        assert_eq!(driver.send_index(), 0);
        assert_eq!(driver.receive_index(), 0);
        assert_eq!(driver.send_sema().signals(), 0);
        assert_eq!(driver.receive_sema().signals(), 0);
    }

    #[test]
    fn test_new_busy_waiting_mode() {
        let driver = BusyDriver::<8>::new(MockAcia::new()).unwrap();
        assert!(driver.hardware().working_mode().is_busy_waiting());
    }

    #[test]
    fn test_new_fails_when_mode_unsupported() {
        let result = IrqDriver::<8>::new(MockAcia::busy_waiting_only());
        assert_eq!(
            result.err(),
            Some(AciaError::UnsupportedMode(WorkingMode::RECEIVE_INTERRUPT))
        );
    }

    #[test]
    fn test_interrupt_send_writes_in_order_and_signals_once() {
        let driver = IrqDriver::<BUFFER_SIZE>::new(MockAcia::new()).unwrap();

        assert_eq!(driver.start_send(b"AB"), 2);
        assert_eq!(driver.hardware().output(), b"A");
        assert!(driver.hardware().working_mode().send_interrupt());

        driver.interrupt_send();
        assert_eq!(driver.hardware().output(), b"AB");
        assert_eq!(driver.send_sema().signals(), 0);

        // terminator position reached: the line feed goes out
        driver.interrupt_send();
        assert_eq!(driver.hardware().output(), b"AB\n");
        assert_eq!(driver.send_index(), 2);
        assert_eq!(driver.send_sema().signals(), 0);

        driver.interrupt_send();
        assert_eq!(driver.send_sema().signals(), 1);
        assert!(!driver.hardware().working_mode().send_interrupt());

        // spurious transmit interrupt once idle
        driver.interrupt_send();
        assert_eq!(driver.send_sema().signals(), 1);
        assert_eq!(driver.hardware().output(), b"AB\n");
    }

    #[test]
    fn test_send_buffer_is_terminated() {
        let driver = IrqDriver::<8>::new(MockAcia::new()).unwrap();
        driver.start_send(b"xyz");
        assert_eq!(&driver.send_buffer_snapshot()[..4], b"xyz\0");
    }

    #[test]
    fn test_empty_message_sends_line_feed_first() {
        let driver = IrqDriver::<BUFFER_SIZE>::new(MockAcia::new()).unwrap();
        assert_eq!(driver.start_send(b""), 0);
        assert_eq!(driver.hardware().output(), b"\n");

        driver.interrupt_send();
        assert_eq!(driver.send_sema().signals(), 1);
    }

    #[test]
    fn test_send_stops_at_embedded_terminator() {
        let driver = IrqDriver::<BUFFER_SIZE>::new(MockAcia::new()).unwrap();
        assert_eq!(driver.start_send(b"ab\0cd"), 2);
        assert_eq!(driver.start_send(b"ab\ncd"), 2);
    }

    #[test]
    fn test_send_truncates_long_message() {
        let driver = BusyDriver::<4>::new(MockAcia::new()).unwrap();
        assert_eq!(driver.send(b"abcdefg"), 3);
        assert_eq!(driver.hardware().output(), b"abc\n");
        assert_eq!(driver.stats().truncated_sends, 1);
        assert_eq!(driver.stats().messages_sent, 1);
    }

    #[test]
    fn test_try_send_rejects_long_message() {
        let driver = BusyDriver::<4>::new(MockAcia::new()).unwrap();
        assert_eq!(
            driver.try_send(b"abcd"),
            Err(AciaError::MessageTooLong { len: 4, capacity: 3 })
        );
        assert!(driver.hardware().output().is_empty());
        assert_eq!(driver.try_send(b"abc"), Ok(3));
        assert_eq!(driver.hardware().output(), b"abc\n");
    }

    #[test]
    fn test_try_send_rejects_embedded_delimiters() {
        let driver = BusyDriver::<BUFFER_SIZE>::new(MockAcia::new()).unwrap();
        assert_eq!(driver.try_send(b"ab\ncd"), Err(AciaError::EmbeddedDelimiter { at: 2 }));
        assert_eq!(driver.try_send(b"ab\0cd"), Err(AciaError::EmbeddedDelimiter { at: 2 }));
        assert_eq!(driver.try_send(b"\n"), Err(AciaError::EmbeddedDelimiter { at: 0 }));
        assert!(driver.hardware().output().is_empty());
        assert_eq!(driver.stats().messages_sent, 0);

        assert_eq!(driver.try_send(b""), Ok(0));
        assert_eq!(driver.hardware().output(), b"\n");
    }

    #[test]
    fn test_busy_waiting_send_polls_device() {
        let hw = MockAcia::new();
        hw.set_output_delay(3);
        let driver = BusyDriver::<BUFFER_SIZE>::new(hw).unwrap();

        assert_eq!(driver.send(b"PING"), 4);
        assert_eq!(driver.hardware().output(), b"PING\n");
        assert_eq!(driver.send_sema().signals(), 1);
    }

    #[test]
    fn test_interrupt_receive_signals_on_line_feed_only() {
        let driver = IrqDriver::<BUFFER_SIZE>::new(MockAcia::new()).unwrap();
        driver.hardware().push_input(b"Hi\n");

        driver.interrupt_receive();
        assert_eq!(driver.receive_sema().signals(), 0);
        driver.interrupt_receive();
        assert_eq!(driver.receive_sema().signals(), 0);
        assert_eq!(driver.receive_index(), 2);

        driver.interrupt_receive();
        assert_eq!(driver.receive_sema().signals(), 1);
        assert_eq!(driver.receive_index(), 0);
        assert_eq!(&driver.receive_buffer_snapshot()[..3], b"Hi\0");
        // further input held in the device until the line is consumed
        assert!(!driver.hardware().working_mode().receive_interrupt());
    }

    #[test]
    fn test_receive_copies_latched_line() {
        let driver = IrqDriver::<BUFFER_SIZE>::new(MockAcia::new()).unwrap();
        driver.hardware().push_input(b"OK\n");
        for _ in 0..3 {
            driver.interrupt_receive();
        }

        let mut dest = [0xAAu8; 32];
        assert_eq!(driver.receive(&mut dest), 2);
        assert_eq!(&dest[..3], b"OK\0");
        assert!(driver.hardware().working_mode().receive_interrupt());
        assert_eq!(driver.stats().lines_received, 1);
    }

    #[test]
    fn test_receive_respects_destination_length() {
        let driver = IrqDriver::<BUFFER_SIZE>::new(MockAcia::new()).unwrap();
        driver.hardware().push_input(b"hello\n");
        for _ in 0..6 {
            driver.interrupt_receive();
        }

        let mut dest = [0xAAu8; 3];
        assert_eq!(driver.receive(&mut dest), 2);
        assert_eq!(&dest, b"he\0");
    }

    #[test]
    fn test_receive_into_empty_destination() {
        let driver = IrqDriver::<BUFFER_SIZE>::new(MockAcia::new()).unwrap();
        driver.hardware().push_input(b"x\n");
        driver.interrupt_receive();
        driver.interrupt_receive();

        let mut dest = [0u8; 0];
        assert_eq!(driver.receive(&mut dest), 0);
    }

    #[test]
    fn test_receive_drops_overflow_until_line_feed() {
        let driver = IrqDriver::<4>::new(MockAcia::new()).unwrap();
        driver.hardware().push_input(b"abcdef\n");
        for _ in 0..7 {
            driver.interrupt_receive();
        }
        assert_eq!(driver.receive_sema().signals(), 1);
        assert_eq!(&driver.receive_buffer_snapshot(), b"abc\0");

        let mut dest = [0u8; 16];
        assert_eq!(driver.receive(&mut dest), 3);
        assert_eq!(&dest[..4], b"abc\0");
        assert_eq!(driver.stats().dropped_chars, 3);
    }

    #[test]
    fn test_empty_line_delivers_zero_length() {
        let driver = IrqDriver::<BUFFER_SIZE>::new(MockAcia::new()).unwrap();
        driver.hardware().push_input(b"\n");
        driver.interrupt_receive();

        let mut dest = [0xAAu8; 8];
        assert_eq!(driver.receive(&mut dest), 0);
        assert_eq!(dest[0], 0);
    }

    #[test]
    fn test_busy_waiting_receive_polls_device() {
        let driver = BusyDriver::<BUFFER_SIZE>::new(MockAcia::new()).unwrap();
        driver.hardware().push_input(b"OK\nNEXT\n");

        let mut dest = [0u8; 32];
        assert_eq!(driver.receive(&mut dest), 2);
        assert_eq!(&dest[..3], b"OK\0");
        // the second line is still in the device
        assert_eq!(driver.hardware().pending_input(), 5);

        assert_eq!(driver.receive_line::<32>().as_slice(), b"NEXT");
    }

    #[test]
    fn test_receive_line_clips_to_vector_capacity() {
        let driver = BusyDriver::<BUFFER_SIZE>::new(MockAcia::new()).unwrap();
        driver.hardware().push_input(b"abcdef\n");
        assert_eq!(driver.receive_line::<4>().as_slice(), b"abcd");
        assert_eq!(driver.stats().lines_received, 1);
    }

    #[test]
    fn test_two_lines_delivered_in_order() {
        let driver = IrqDriver::<BUFFER_SIZE>::new(MockAcia::new()).unwrap();
        driver.hardware().push_input(b"one\ntwo\n");
        driver.hardware().drain_interrupts(|| driver.interrupt_receive());

        assert_eq!(driver.receive_line::<16>().as_slice(), b"one");
        driver.hardware().drain_interrupts(|| driver.interrupt_receive());
        assert_eq!(driver.receive_line::<16>().as_slice(), b"two");
        assert_eq!(driver.receive_sema().signals(), 2);
        assert_eq!(driver.hardware().pending_input(), 0);
    }

    #[test]
    fn test_send_blocks_until_interrupts_complete() {
        let driver = IrqDriver::<BUFFER_SIZE>::new(MockAcia::new()).unwrap();

        std::thread::scope(|s| {
            let sender = s.spawn(|| driver.send(b"AB"));

            wait_until(|| driver.hardware().output() == b"A");
            driver.interrupt_send();
            wait_until(|| driver.hardware().output() == b"AB");
            driver.interrupt_send();
            assert!(!sender.is_finished());
            driver.interrupt_send();

            assert_eq!(sender.join().unwrap(), 2);
        });
        assert_eq!(driver.hardware().output(), b"AB\n");
        assert_eq!(driver.send_sema().signals(), 1);
    }

    #[test]
    fn test_receive_blocks_until_line_feed() {
        let driver = IrqDriver::<BUFFER_SIZE>::new(MockAcia::new()).unwrap();

        std::thread::scope(|s| {
            let receiver = s.spawn(|| {
                let mut dest = [0u8; 32];
                let count = driver.receive(&mut dest);
                (dest, count)
            });

            driver.hardware().push_input(b"PING");
            driver.hardware().drain_interrupts(|| driver.interrupt_receive());
            std::thread::sleep(std::time::Duration::from_millis(20));
            assert!(!receiver.is_finished());

            driver.hardware().push_input(b"\n");
            driver.hardware().drain_interrupts(|| driver.interrupt_receive());

            let (dest, count) = receiver.join().unwrap();
            assert_eq!(count, 4);
            assert_eq!(&dest[..5], b"PING\0");
        });
    }
}
