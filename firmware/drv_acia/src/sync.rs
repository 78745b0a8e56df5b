/// Kernel Synchronization Primitive
/// The only hand-off between interrupt context and blocked threads

/// Counting semaphore provided by the kernel.
///
/// `p` blocks the calling thread until the count is positive, then
/// decrements it. `v` increments the count and wakes one waiter; it never
/// blocks and may be called from an interrupt handler.
pub trait Semaphore {
    fn new(initial: usize) -> Self;

    fn p(&self);

    fn v(&self);
}
