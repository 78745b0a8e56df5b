/// Test doubles: an in-memory ACIA and a blocking semaphore

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::acia::{Acia, WorkingMode};
use crate::error::AciaError;
use crate::sync::Semaphore;

pub struct MockAcia {
    output: Mutex<Vec<u8>>,
    input: Mutex<VecDeque<u8>>,
    mode: AtomicU8,
    interrupts_supported: bool,
    output_delay: AtomicUsize,
    busy_polls: AtomicUsize,
}

impl MockAcia {
    pub fn new() -> Self {
        MockAcia {
            output: Mutex::new(Vec::new()),
            input: Mutex::new(VecDeque::new()),
            mode: AtomicU8::new(0),
            interrupts_supported: true,
            output_delay: AtomicUsize::new(0),
            busy_polls: AtomicUsize::new(0),
        }
    }

    pub fn busy_waiting_only() -> Self {
        MockAcia { interrupts_supported: false, ..MockAcia::new() }
    }

    /// Number of `output_empty` polls answered "busy" after each `put_char`
    pub fn set_output_delay(&self, polls: usize) {
        self.output_delay.store(polls, Ordering::SeqCst);
    }

    pub fn output(&self) -> Vec<u8> {
        self.output.lock().unwrap().clone()
    }

    pub fn push_input(&self, bytes: &[u8]) {
        self.input.lock().unwrap().extend(bytes.iter().copied());
    }

    pub fn pending_input(&self) -> usize {
        self.input.lock().unwrap().len()
    }

    /// Raise receive interrupts while they are enabled and input is pending.
    pub fn drain_interrupts(&self, mut handler: impl FnMut()) {
        while self.working_mode().receive_interrupt() && self.pending_input() > 0 {
            handler();
        }
    }
}

impl Acia for MockAcia {
    fn put_char(&self, byte: u8) {
        self.output.lock().unwrap().push(byte);
        self.busy_polls.store(self.output_delay.load(Ordering::SeqCst), Ordering::SeqCst);
    }

    fn get_char(&self) -> u8 {
        self.input.lock().unwrap().pop_front().unwrap_or(0)
    }

    fn output_empty(&self) -> bool {
        self.busy_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }

    fn input_full(&self) -> bool {
        self.pending_input() > 0
    }

    fn set_working_mode(&self, mode: WorkingMode) -> Result<(), AciaError> {
        if !mode.is_busy_waiting() && !self.interrupts_supported {
            return Err(AciaError::UnsupportedMode(mode));
        }
        self.mode.store(mode.bits(), Ordering::SeqCst);
        Ok(())
    }

    fn working_mode(&self) -> WorkingMode {
        WorkingMode::from_bits(self.mode.load(Ordering::SeqCst))
    }

    fn enable_interrupts(&self, mask: WorkingMode) {
        self.mode.fetch_or(mask.bits(), Ordering::SeqCst);
    }

    fn disable_interrupts(&self, mask: WorkingMode) {
        self.mode.fetch_and(!mask.bits(), Ordering::SeqCst);
    }
}

/// Counting semaphore on std primitives. Also counts `v` calls.
pub struct TestSemaphore {
    count: Mutex<usize>,
    wakeup: Condvar,
    signals: AtomicUsize,
}

impl TestSemaphore {
    pub fn signals(&self) -> usize {
        self.signals.load(Ordering::SeqCst)
    }
}

impl Semaphore for TestSemaphore {
    fn new(initial: usize) -> Self {
        TestSemaphore {
            count: Mutex::new(initial),
            wakeup: Condvar::new(),
            signals: AtomicUsize::new(0),
        }
    }

    fn p(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.wakeup.wait(count).unwrap();
        }
        *count -= 1;
    }

    fn v(&self) {
        self.signals.fetch_add(1, Ordering::SeqCst);
        *self.count.lock().unwrap() += 1;
        self.wakeup.notify_one();
    }
}

pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}
