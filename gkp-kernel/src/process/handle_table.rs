//! Process handle table
//!
//! Maps guest handles to reference-counted kernel objects. Handle values
//! come from a monotonically increasing counter and are never reused, even
//! after the handle is deleted. The table has its own critical section so
//! guest threads may create, look up and close handles concurrently.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use gkp_api::{GuestMemory, Handle, HandleOut, KernelError, KernelObject, Result, TypedObject, VirtAddr};
use hashbrown::HashMap;
use log::{debug, warn};
use spin::Mutex;

/// A bound object and, for objects that own guest memory, its memory view
#[derive(Clone)]
struct Entry {
    object: Arc<dyn KernelObject>,
    memory: Option<Arc<dyn GuestMemory>>,
}

/// Handle table of a single process
pub struct HandleTable {
    /// Next handle value to hand out
    next: AtomicU32,
    /// Live handles
    entries: Mutex<HashMap<Handle, Entry>>,
}

impl HandleTable {
    /// Creates an empty table whose first handle is `base`
    pub fn new(base: Handle) -> Self {
        Self {
            next: AtomicU32::new(base),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Takes the next handle value without binding it
    ///
    /// Fails once the counter would wrap, so a value is never handed out twice.
    pub(crate) fn reserve(&self) -> Result<Handle> {
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| next.checked_add(1))
            .map_err(|_| KernelError::HandlesExhausted)
    }

    /// Binds an object to a previously reserved handle
    pub(crate) fn insert_at(&self, handle: Handle, item: Arc<dyn KernelObject>) {
        let memory = item.clone().into_memory();
        self.bind(handle, Entry { object: item, memory });
    }

    fn bind(&self, handle: Handle, entry: Entry) {
        debug!("Inserted {} at handle 0x{:X}", entry.object.object_type(), handle);
        let previous = self.entries.lock().insert(handle, entry);
        debug_assert!(previous.is_none(), "handle 0x{:X} bound twice", handle);
    }

    /// Constructs a new object and binds it to the next handle
    ///
    /// `build` receives the handle the object will be stored under, so
    /// objects that need to refer to their own handle (threads) can keep it.
    /// If `build` fails nothing is inserted; the handle value stays consumed.
    pub fn new_handle<T, F>(&self, build: F) -> Result<HandleOut<T>>
    where
        T: TypedObject,
        F: FnOnce(Handle) -> Result<T>,
    {
        let handle = self.reserve()?;
        let item = Arc::new(build(handle)?);
        self.insert_at(handle, item.clone());
        Ok(HandleOut { item, handle })
    }

    /// Binds an already constructed object to the next handle
    pub fn insert_item(&self, item: Arc<dyn KernelObject>) -> Result<Handle> {
        let handle = self.reserve()?;
        self.insert_at(handle, item);
        Ok(handle)
    }

    /// Binds a memory object to the next handle
    ///
    /// The memory view is kept alongside the object, so ownership queries
    /// find the region whether or not its type overrides
    /// [`KernelObject::into_memory`].
    pub fn insert_memory(&self, item: Arc<dyn GuestMemory>) -> Result<Handle> {
        let handle = self.reserve()?;
        self.bind(handle, Entry { object: item.clone(), memory: Some(item) });
        Ok(handle)
    }

    /// Looks up a handle without checking its type
    pub fn get_object(&self, handle: Handle) -> Result<Arc<dyn KernelObject>> {
        self.entries
            .lock()
            .get(&handle)
            .map(|entry| entry.object.clone())
            .ok_or(KernelError::InvalidHandle(handle))
    }

    /// Looks up a handle and checks that it holds a `T`
    pub fn get_handle<T: TypedObject>(&self, handle: Handle) -> Result<Arc<T>> {
        let item = self.get_object(handle)?;
        let actual = item.object_type();
        let mismatch = KernelError::TypeMismatch {
            handle,
            expected: T::TYPE,
            actual,
        };
        if actual != T::TYPE {
            return Err(mismatch);
        }
        item.into_any().downcast::<T>().map_err(|_| mismatch)
    }

    /// Binds the object behind `handle` to a second handle
    pub fn duplicate_handle(&self, handle: Handle) -> Result<Handle> {
        let entry = self
            .entries
            .lock()
            .get(&handle)
            .cloned()
            .ok_or(KernelError::InvalidHandle(handle))?;
        let copy = self.reserve()?;
        self.bind(copy, entry);
        Ok(copy)
    }

    /// Removes a handle, returning the object it was bound to
    ///
    /// The object itself lives on while other holders keep a reference.
    pub fn delete_handle(&self, handle: Handle) -> Option<Arc<dyn KernelObject>> {
        let removed = self.entries.lock().remove(&handle).map(|entry| entry.object);
        match &removed {
            Some(item) => debug!("Deleted handle 0x{:X} ({})", handle, item.object_type()),
            None => warn!("Tried to delete absent handle 0x{:X}", handle),
        }
        removed
    }

    /// Finds the memory object whose range contains `address`
    ///
    /// When several regions overlap the one with the lowest handle wins.
    pub fn memory_object(&self, address: VirtAddr) -> Option<HandleOut<dyn GuestMemory>> {
        let entries = self.entries.lock();
        entries
            .iter()
            .filter_map(|(handle, entry)| {
                let memory = entry.memory.as_ref()?;
                memory.is_inside(address).then(|| HandleOut {
                    item: memory.clone(),
                    handle: *handle,
                })
            })
            .min_by_key(|out| out.handle)
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the table holds no handles
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
