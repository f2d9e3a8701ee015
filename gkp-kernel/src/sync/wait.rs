//! Wait entries and address-keyed wait queues
//!
//! A [`WaitStatus`] is the hand-off between one blocked host thread and the
//! thread that eventually wakes it. The waker sets the flag and then unparks
//! the waiter; because a pending unpark makes the next park return at once,
//! a wake that lands before the waiter parks is not lost.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, Thread};
use std::time::Instant;

use gkp_api::{GuestThread, Handle, Priority, Tid, VirtAddr};
use hashbrown::HashMap;
use log::trace;

/// A single thread waiting on a mutex or condition variable
#[derive(Debug)]
pub struct WaitStatus {
    /// Set once the waiter has been chosen by an unlock or signal
    flag: AtomicBool,
    /// Priority of the waiting thread
    priority: Priority,
    /// Host thread id of the waiting thread
    tid: Tid,
    /// Handle of the waiting thread
    handle: Handle,
    /// Host thread parked on this entry
    waiter: Thread,
}

impl WaitStatus {
    /// Creates an entry for `thread`, parked on the calling host thread
    pub fn new(thread: &dyn GuestThread) -> Self {
        Self {
            flag: AtomicBool::new(false),
            priority: thread.priority(),
            tid: thread.tid(),
            handle: thread.handle(),
            waiter: thread::current(),
        }
    }

    /// Priority of the waiting thread
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Host thread id of the waiting thread
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// Handle of the waiting thread
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Whether the entry has been woken
    pub fn is_woken(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Marks the entry woken and unparks its thread
    pub(crate) fn wake(&self) {
        self.flag.store(true, Ordering::Release);
        self.waiter.unpark();
    }

    /// Blocks until the entry is woken
    ///
    /// Must be called from the host thread that created the entry.
    pub fn wait(&self) {
        while !self.is_woken() {
            thread::park();
        }
    }

    /// Blocks until the entry is woken or `deadline` passes
    ///
    /// `None` waits without a deadline. Returns whether the entry was woken.
    pub fn wait_until(&self, deadline: Option<Instant>) -> bool {
        loop {
            if self.is_woken() {
                return true;
            }
            match deadline {
                None => thread::park(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return self.is_woken();
                    }
                    thread::park_timeout(deadline - now);
                }
            }
        }
    }
}

/// Wait entries keyed by the guest address of the primitive they wait on
///
/// Each queue keeps arrival order; selection picks the highest priority and
/// falls back to arrival order among equal priorities. Empty queues are
/// pruned.
#[derive(Debug, Default)]
pub struct WaitQueueMap {
    queues: HashMap<VirtAddr, Vec<Arc<WaitStatus>>>,
}

impl WaitQueueMap {
    /// Creates an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `status` to the queue of `address`
    pub fn push(&mut self, address: VirtAddr, status: Arc<WaitStatus>) {
        trace!(
            "Thread {} (handle 0x{:X}, priority {}) waiting on 0x{:X}",
            status.tid(),
            status.handle(),
            status.priority(),
            address
        );
        self.queues.entry(address).or_default().push(status);
    }

    /// The entry the next wake on `address` would choose
    pub fn peek_next(&self, address: VirtAddr) -> Option<Arc<WaitStatus>> {
        let queue = self.queues.get(&address)?;
        Self::select(queue).map(|index| queue[index].clone())
    }

    /// Removes and returns the entry the next wake on `address` chooses
    pub fn pop_next(&mut self, address: VirtAddr) -> Option<Arc<WaitStatus>> {
        let queue = self.queues.get_mut(&address)?;
        let index = Self::select(queue)?;
        let status = queue.remove(index);
        if queue.is_empty() {
            self.queues.remove(&address);
        }
        Some(status)
    }

    /// Removes `status` from the queue of `address`
    pub fn remove(&mut self, address: VirtAddr, status: &Arc<WaitStatus>) -> bool {
        let Some(queue) = self.queues.get_mut(&address) else {
            return false;
        };
        let Some(index) = queue.iter().position(|entry| Arc::ptr_eq(entry, status)) else {
            return false;
        };
        queue.remove(index);
        if queue.is_empty() {
            self.queues.remove(&address);
        }
        true
    }

    /// Number of entries waiting on `address`
    pub fn waiters(&self, address: VirtAddr) -> usize {
        self.queues.get(&address).map_or(0, Vec::len)
    }

    #[cfg(test)]
    fn addresses(&self) -> usize {
        self.queues.len()
    }

    fn select(queue: &[Arc<WaitStatus>]) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (index, entry) in queue.iter().enumerate() {
            match best {
                Some(current) if queue[current].priority() >= entry.priority() => {}
                _ => best = Some(index),
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gkp_api::{KType, KernelObject};
    use std::time::Duration;

    struct Waiter {
        handle: Handle,
        priority: Priority,
    }

    impl KernelObject for Waiter {
        fn object_type(&self) -> KType {
            KType::Thread
        }
    }

    impl GuestThread for Waiter {
        fn handle(&self) -> Handle {
            self.handle
        }

        fn priority(&self) -> Priority {
            self.priority
        }

        fn tid(&self) -> Tid {
            self.handle
        }
    }

    fn status(handle: Handle, priority: Priority) -> Arc<WaitStatus> {
        Arc::new(WaitStatus::new(&Waiter { handle, priority }))
    }

    #[test]
    fn test_priority_then_arrival() {
        let mut map = WaitQueueMap::new();
        map.push(0x100, status(1, 1));
        map.push(0x100, status(2, 5));
        map.push(0x100, status(3, 3));
        map.push(0x100, status(4, 5));

        let order: Vec<Handle> = std::iter::from_fn(|| map.pop_next(0x100))
            .map(|entry| entry.handle())
            .collect();
        assert_eq!(order, vec![2, 4, 3, 1]);
        assert_eq!(map.addresses(), 0);
    }

    #[test]
    fn test_remove_prunes_queue() {
        let mut map = WaitQueueMap::new();
        let entry = status(1, 1);
        map.push(0x200, entry.clone());
        assert_eq!(map.waiters(0x200), 1);
        assert!(map.remove(0x200, &entry));
        assert!(!map.remove(0x200, &entry));
        assert_eq!(map.waiters(0x200), 0);
        assert_eq!(map.addresses(), 0);
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut map = WaitQueueMap::new();
        map.push(0x300, status(7, 2));
        assert_eq!(map.peek_next(0x300).map(|entry| entry.handle()), Some(7));
        assert_eq!(map.waiters(0x300), 1);
        assert!(map.peek_next(0x301).is_none());
    }

    #[test]
    fn test_wake_before_wait_is_kept() {
        let entry = status(1, 1);
        entry.wake();
        entry.wait();
        assert!(entry.is_woken());
    }

    #[test]
    fn test_wait_until_times_out() {
        let entry = status(1, 1);
        let deadline = Instant::now() + Duration::from_millis(20);
        assert!(!entry.wait_until(Some(deadline)));
        assert!(Instant::now() >= deadline);
    }
}
