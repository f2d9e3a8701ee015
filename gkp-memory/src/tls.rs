//! Thread-local storage pages
//!
//! A TLS page is one guest page split into [`TLS_SLOTS`] slots of
//! [`TLS_SLOT_SIZE`] bytes. Slots are handed out sequentially and are never
//! returned. Slot 0 of the first page a process allocates is reserved for
//! user-mode exception handling and is never handed out.

use gkp_api::error::unresolved_tls;
use gkp_api::{KernelError, Result, VirtAddr};
use log::debug;

use crate::layout::{PAGE_SIZE, TLS_SLOTS, TLS_SLOT_SIZE};

/// Status of a single TLS page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPage {
    /// Address of the page
    address: VirtAddr,
    /// Index of the next slot to reserve
    index: u8,
    /// Which slots are reserved
    slots: [bool; TLS_SLOTS as usize],
}

impl TlsPage {
    /// Creates a page with every slot free
    pub const fn new(address: VirtAddr) -> Self {
        Self {
            address,
            index: 0,
            slots: [false; TLS_SLOTS as usize],
        }
    }

    /// Address of the page
    pub const fn address(&self) -> VirtAddr {
        self.address
    }

    /// Reserves the next free slot and returns its address
    pub fn reserve_slot(&mut self) -> Result<VirtAddr> {
        let slot = self.index;
        let address = self.get(slot)?;
        self.slots[slot as usize] = true;
        self.index += 1;
        Ok(address)
    }

    /// Address of slot `slot`
    pub fn get(&self, slot: u8) -> Result<VirtAddr> {
        if slot >= TLS_SLOTS {
            return Err(KernelError::SlotOutOfRange(slot));
        }
        Ok(self.address + (TLS_SLOT_SIZE as u64) * slot as u64)
    }

    /// Whether slot `slot` has been reserved
    pub fn is_reserved(&self, slot: u8) -> bool {
        self.slots.get(slot as usize).copied().unwrap_or(false)
    }

    /// Number of slots still free
    pub fn free_slots(&self) -> u8 {
        self.slots.iter().filter(|reserved| !**reserved).count() as u8
    }

    /// Whether every slot of the page is reserved
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|reserved| *reserved)
    }
}

/// All TLS pages of a process, in allocation order
#[derive(Debug)]
pub struct TlsPageList {
    base: VirtAddr,
    pages: Vec<TlsPage>,
}

impl TlsPageList {
    /// Creates an empty list whose first page will be placed at `base`
    pub const fn new(base: VirtAddr) -> Self {
        Self {
            base,
            pages: Vec::new(),
        }
    }

    /// Reserves a slot from the first page with room, growing the list if needed
    ///
    /// `allocate` maps the backing memory of a new page. It receives the
    /// address the page should be placed at and returns the address it was
    /// actually mapped at.
    pub fn get_slot<F>(&mut self, allocate: F) -> Result<VirtAddr>
    where
        F: FnOnce(VirtAddr) -> Result<VirtAddr>,
    {
        if let Some(page) = self.pages.iter_mut().find(|page| !page.is_full()) {
            return page.reserve_slot();
        }
        self.grow(allocate)?.reserve_slot()
    }

    /// Maps and appends a new page
    ///
    /// The first page ever added has its exception-handling slot reserved
    /// before it is returned.
    pub fn grow<F>(&mut self, allocate: F) -> Result<&mut TlsPage>
    where
        F: FnOnce(VirtAddr) -> Result<VirtAddr>,
    {
        let requested = self.next_page_address();
        let address = allocate(requested).map_err(|err| match err {
            KernelError::UnresolvedTlsAllocation { .. } => err,
            other => unresolved_tls(requested, &other),
        })?;

        let mut page = TlsPage::new(address);
        if self.pages.is_empty() {
            page.reserve_slot()?;
        }
        debug!("Allocated TLS page #{} at 0x{:X}", self.pages.len(), address);

        self.pages.push(page);
        let index = self.pages.len() - 1;
        Ok(&mut self.pages[index])
    }

    /// Address the next page will be requested at
    pub fn next_page_address(&self) -> VirtAddr {
        self.pages
            .last()
            .map_or(self.base, |page| page.address() + PAGE_SIZE as u64)
    }

    /// Allocated pages in allocation order
    pub fn pages(&self) -> &[TlsPage] {
        &self.pages
    }

    /// Number of allocated pages
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether no page has been allocated yet
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_reserves_sequentially() {
        let mut page = TlsPage::new(0x4000);
        assert_eq!(page.reserve_slot().unwrap(), 0x4000);
        assert_eq!(page.reserve_slot().unwrap(), 0x4200);
        assert!(page.is_reserved(0));
        assert!(page.is_reserved(1));
        assert!(!page.is_reserved(2));
        assert_eq!(page.free_slots(), 6);
    }

    #[test]
    fn test_full_page_rejects_reservation() {
        let mut page = TlsPage::new(0);
        for _ in 0..TLS_SLOTS {
            page.reserve_slot().unwrap();
        }
        assert!(page.is_full());
        assert_eq!(page.reserve_slot(), Err(KernelError::SlotOutOfRange(TLS_SLOTS)));
    }

    #[test]
    fn test_get_out_of_range() {
        let page = TlsPage::new(0x1000);
        assert_eq!(page.get(7).unwrap(), 0x1000 + 7 * 0x200);
        assert_eq!(page.get(8), Err(KernelError::SlotOutOfRange(8)));
    }

    #[test]
    fn test_first_page_skips_exception_slot() {
        let mut list = TlsPageList::new(0x6000);
        let slot = list.get_slot(Ok).unwrap();
        assert_eq!(slot, 0x6200);
        assert!(list.pages()[0].is_reserved(0));
    }

    #[test]
    fn test_failed_growth_leaves_list_untouched() {
        let mut list = TlsPageList::new(0x6000);
        let err = list
            .get_slot(|_| Err(KernelError::RegionAllocation {
                address: 0x6000,
                size: PAGE_SIZE,
                reason: "no backing".to_string(),
            }))
            .unwrap_err();
        assert!(matches!(err, KernelError::UnresolvedTlsAllocation { address: 0x6000, .. }));
        assert!(list.is_empty());
        assert_eq!(list.next_page_address(), 0x6000);
    }
}
