//! Guest address space layout definitions
//!
//! Centralizes the page geometry of the guest and the placement of the
//! regions a process creates for itself during setup: the heap and the
//! TLS/IO region that thread-local storage pages are carved from.

use gkp_api::{Size, VirtAddr};
use static_assertions::const_assert_eq;

/// Guest page size in bytes
pub const PAGE_SIZE: Size = 0x1000;

/// Size of one thread-local storage slot in bytes
pub const TLS_SLOT_SIZE: Size = 0x200;

/// Number of TLS slots carved out of one page
pub const TLS_SLOTS: u8 = (PAGE_SIZE / TLS_SLOT_SIZE) as u8;

const_assert_eq!(TLS_SLOTS as usize * TLS_SLOT_SIZE, PAGE_SIZE);
const_assert_eq!(TLS_SLOTS, 8);

/// Placement of the regions a process maps during setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestLayout {
    /// Base address of the process heap
    pub heap_base: VirtAddr,

    /// Base address of the TLS/IO region; TLS pages grow upwards from here
    pub tls_io_base: VirtAddr,

    /// Size of the TLS/IO region (bytes)
    pub tls_io_size: Size,
}

impl Default for GuestLayout {
    fn default() -> Self {
        Self {
            heap_base: 0x0800_0000,
            tls_io_base: 0x0600_0000,
            tls_io_size: 0x0200_0000,
        }
    }
}

impl GuestLayout {
    /// Exclusive end of the TLS/IO region
    pub const fn tls_io_end(&self) -> VirtAddr {
        self.tls_io_base + self.tls_io_size as u64
    }

    /// Whether `address` lies inside the TLS/IO region
    pub const fn is_tls_address(&self, address: VirtAddr) -> bool {
        address >= self.tls_io_base && address < self.tls_io_end()
    }
}
