/// Blocking Kernel Semaphore
/// Counting semaphore on std primitives, standing in for the kernel's P/V

use std::sync::{Condvar, Mutex};

use drv_acia::Semaphore;

pub struct KernelSemaphore {
    count: Mutex<usize>,
    wakeup: Condvar,
}

impl Semaphore for KernelSemaphore {
    fn new(initial: usize) -> Self {
        KernelSemaphore {
            count: Mutex::new(initial),
            wakeup: Condvar::new(),
        }
    }

    fn p(&self) {
        let mut count = self.count.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while *count == 0 {
            count = self
                .wakeup
                .wait(count)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        *count -= 1;
    }

    fn v(&self) {
        let mut count = self.count.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *count += 1;
        drop(count);
        self.wakeup.notify_one();
    }
}
