//! Guest condition variable emulation

use std::sync::Arc;
use std::time::{Duration, Instant};

use gkp_api::{GuestThread, VirtAddr};
use log::trace;

use super::wait::WaitStatus;
use crate::process::Process;

/// Signal amount that wakes every waiter
pub const CONDVAR_SIGNAL_ALL: u64 = u64::MAX;

impl Process {
    /// Waits on the condition variable at `address` for at most `timeout`
    ///
    /// Returns `true` when signalled and `false` on timeout. A timed-out
    /// waiter removes its own entry; if a signal picked the entry before
    /// that happened the signal wins and `true` is returned.
    ///
    /// `current` must be the guest thread running on the calling host
    /// thread.
    pub fn condvar_wait(&self, address: VirtAddr, timeout: Duration, current: &dyn GuestThread) -> bool {
        let status = Arc::new(WaitStatus::new(current));
        self.conditionals.lock().push(address, status.clone());

        let deadline = Instant::now().checked_add(timeout);
        if status.wait_until(deadline) {
            return true;
        }

        let mut queues = self.conditionals.lock();
        if status.is_woken() {
            return true;
        }
        queues.remove(address, &status);
        trace!("Condition variable 0x{:X} wait timed out for thread {}", address, current.tid());
        false
    }

    /// Wakes up to `amount` waiters of the condition variable at `address`
    ///
    /// Waiters are picked by priority, then arrival. Returns the number of
    /// threads woken.
    pub fn condvar_signal(&self, address: VirtAddr, amount: u64) -> usize {
        let mut queues = self.conditionals.lock();
        let mut woken = 0usize;
        while (woken as u64) < amount {
            let Some(status) = queues.pop_next(address) else {
                break;
            };
            status.wake();
            woken += 1;
        }
        trace!("Condition variable 0x{:X} signalled, woke {}", address, woken);
        woken
    }

    /// Number of threads waiting on the condition variable at `address`
    pub fn condvar_waiters(&self, address: VirtAddr) -> usize {
        self.conditionals.lock().waiters(address)
    }
}
