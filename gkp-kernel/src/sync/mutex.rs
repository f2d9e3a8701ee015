//! Guest user-mode mutex emulation
//!
//! A guest mutex is a 32-bit tag in guest memory. The owner field holds the
//! handle of the owning thread (0 when unlocked) and [`MUTEX_WAITERS_BIT`]
//! is set while other threads are queued on it. The guest takes and drops
//! uncontended mutexes itself; the process only sees the contended cases.

use std::sync::Arc;

use gkp_api::{GuestThread, Handle, Result, VirtAddr};
use log::{trace, warn};

use super::wait::WaitStatus;
use crate::process::Process;

/// Tag bit set while threads are waiting on the mutex
pub const MUTEX_WAITERS_BIT: u32 = 0x4000_0000;

/// Tag bits holding the owner handle
pub const MUTEX_OWNER_MASK: u32 = !MUTEX_WAITERS_BIT;

impl Process {
    /// Locks the mutex at `address` on behalf of `current`
    ///
    /// Unless `always_lock` is set, the call returns at once when the
    /// owner field of the tag is no longer `owner`: the guest's own fast
    /// path already resolved the contention. An unlocked tag is taken
    /// immediately. Otherwise `current` is queued and the calling host
    /// thread blocks until a [`Process::mutex_unlock`] hands it ownership.
    ///
    /// `current` must be the guest thread running on the calling host
    /// thread.
    pub fn mutex_lock(
        &self,
        address: VirtAddr,
        owner: Handle,
        always_lock: bool,
        current: &dyn GuestThread,
    ) -> Result<()> {
        let status = {
            // Tag check and enqueue are one step with respect to unlock.
            let mut queues = self.mutexes.lock();
            let tag: u32 = self.read_value(address)?;

            if !always_lock && (tag & MUTEX_OWNER_MASK) != owner {
                trace!(
                    "Mutex 0x{:X} owner changed (tag 0x{:X}, expected 0x{:X})",
                    address,
                    tag,
                    owner
                );
                return Ok(());
            }

            if tag == 0 {
                let mut value = current.handle() & MUTEX_OWNER_MASK;
                if queues.waiters(address) > 0 {
                    value |= MUTEX_WAITERS_BIT;
                }
                self.write_value(&value, address)?;
                trace!("Mutex 0x{:X} was unlocked, taken by 0x{:X}", address, current.handle());
                return Ok(());
            }

            if tag & MUTEX_WAITERS_BIT == 0 {
                self.write_value(&(tag | MUTEX_WAITERS_BIT), address)?;
            }
            let status = Arc::new(WaitStatus::new(current));
            queues.push(address, status.clone());
            status
        };

        status.wait();
        trace!("Mutex 0x{:X} handed to 0x{:X}", address, current.handle());
        Ok(())
    }

    /// Unlocks the mutex at `address`
    ///
    /// Hands ownership to the highest-priority waiter (earliest arrival
    /// among equals), writing its handle into the tag and waking it, and
    /// returns `true`. With nobody waiting the tag is cleared and `false`
    /// is returned.
    pub fn mutex_unlock(&self, address: VirtAddr) -> Result<bool> {
        let mut queues = self.mutexes.lock();

        let Some(next) = queues.peek_next(address) else {
            let tag: u32 = self.read_value(address)?;
            if tag == 0 {
                warn!("Unlocking mutex 0x{:X} which is already unlocked", address);
            }
            self.write_value(&0u32, address)?;
            return Ok(false);
        };

        let mut tag = next.handle() & MUTEX_OWNER_MASK;
        if queues.waiters(address) > 1 {
            tag |= MUTEX_WAITERS_BIT;
        }
        self.write_value(&tag, address)?;

        queues.remove(address, &next);
        next.wake();
        trace!("Mutex 0x{:X} unlocked, woke thread {}", address, next.tid());
        Ok(true)
    }

    /// Number of threads blocked on the mutex at `address`
    pub fn mutex_waiters(&self, address: VirtAddr) -> usize {
        self.mutexes.lock().waiters(address)
    }
}
