//! Guest synchronization emulation
//!
//! User-mode mutexes and condition variables of the guest are identified
//! by their guest address. Threads that have to block are queued per
//! address in a [`WaitQueueMap`] and parked on their host thread until an
//! unlock or signal picks them.

pub mod condvar;
pub mod mutex;
pub mod wait;

pub use condvar::CONDVAR_SIGNAL_ALL;
pub use mutex::{MUTEX_OWNER_MASK, MUTEX_WAITERS_BIT};
pub use wait::{WaitQueueMap, WaitStatus};

/// Lock guarding a wait-queue map
///
/// The mutex paths read and write the guest tag through the memory channel
/// while holding it, so a contender may wait for a whole host syscall.
/// Contenders yield their host thread between attempts instead of spinning.
pub(crate) type WaitLock<T> = spin::mutex::Mutex<T, spin::Yield>;
