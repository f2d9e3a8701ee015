//! Kernel object capabilities
//!
//! Every object a process can hand out a handle for implements
//! [`KernelObject`]. Objects are stored as `Arc<dyn KernelObject>` and carry
//! a runtime [`KType`] tag; retrieval by concrete type goes through
//! [`TypedObject`], which ties a Rust type to the tag it must be stored under.
//!
//! Two narrower views exist for the capabilities a process needs from its
//! objects: [`GuestThread`] for the waiting thread's identity and priority,
//! and [`GuestMemory`] for address-range ownership queries.

use std::any::Any;
use std::sync::Arc;

use crate::core::types::{Handle, KType, Priority, Size, Tid, VirtAddr};

/// Conversion of a shared object into a downcastable `Any`
pub trait AsAny: Any + Send + Sync {
    /// Converts the shared pointer into an `Arc<dyn Any>`
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A reference-counted object reachable through a process handle
pub trait KernelObject: AsAny {
    /// Runtime type tag of this object
    fn object_type(&self) -> KType;

    /// Memory view of this object, for objects that own guest memory
    ///
    /// Handle tables rely on this view to answer ownership queries for
    /// objects bound without an explicit memory view.
    fn into_memory(self: Arc<Self>) -> Option<Arc<dyn GuestMemory>> {
        None
    }

    /// Thread view of this object
    fn into_thread(self: Arc<Self>) -> Option<Arc<dyn GuestThread>> {
        None
    }
}

/// A concrete kernel object type bound to a fixed type tag
///
/// `GetHandle`-style lookups compare the stored object's tag against
/// [`TypedObject::TYPE`] before downcasting.
pub trait TypedObject: KernelObject + Sized {
    /// Tag every instance of this type is stored under
    const TYPE: KType;
}

/// Thread capability consumed by the process
pub trait GuestThread: KernelObject {
    /// Handle of the thread in its owning process
    fn handle(&self) -> Handle;

    /// Scheduling priority used for wait-queue ordering
    fn priority(&self) -> Priority;

    /// Host thread identifier
    fn tid(&self) -> Tid;
}

/// Memory region capability consumed by the process
pub trait GuestMemory: KernelObject {
    /// Base guest address of the region
    fn address(&self) -> VirtAddr;

    /// Size of the region in bytes
    fn size(&self) -> Size;

    /// Whether `address` falls inside this region
    fn is_inside(&self, address: VirtAddr) -> bool {
        let base = self.address();
        address >= base && address - base < self.size() as u64
    }
}

/// Output of functions that create or find kernel objects
#[derive(Debug)]
pub struct HandleOut<T: ?Sized> {
    /// Shared pointer to the object
    pub item: Arc<T>,
    /// Handle of the object in the process
    pub handle: Handle,
}

impl<T: ?Sized> Clone for HandleOut<T> {
    fn clone(&self) -> Self {
        Self {
            item: Arc::clone(&self.item),
            handle: self.handle,
        }
    }
}
