//! Process configuration

use gkp_api::{BASE_HANDLE_INDEX, DEFAULT_PRIORITY, Handle, Priority, Size};
use gkp_memory::GuestLayout;

/// Process configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessConfig {
    /// First handle value handed out by the handle table
    pub base_handle_index: Handle,
    /// Priority of the main thread
    pub default_priority: Priority,
    /// Size of the heap mapped by `initialize_memory` (bytes)
    pub heap_size: Size,
    /// Placement of the heap and TLS/IO regions
    pub layout: GuestLayout,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            base_handle_index: BASE_HANDLE_INDEX,
            default_priority: DEFAULT_PRIORITY,
            heap_size: 0x0200_0000,
            layout: GuestLayout::default(),
        }
    }
}

impl ProcessConfig {
    /// Returns a copy with a different heap size
    pub fn with_heap_size(mut self, heap_size: Size) -> Self {
        self.heap_size = heap_size;
        self
    }

    /// Returns a copy with a different layout
    pub fn with_layout(mut self, layout: GuestLayout) -> Self {
        self.layout = layout;
        self
    }
}
