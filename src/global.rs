use core::alloc::{GlobalAlloc, Layout};
use core::ptr;
use std::sync::{Mutex, MutexGuard};

use lazy_static::lazy_static;
use log::{error, trace};

use crate::block::{ALIGNMENT, Handle};
use crate::config::HeapConfig;
use crate::error::{AllocError, Result};
use crate::free_list_allocator::FreeListAllocator;

/// A heap behind a single mutex, shareable between threads
pub struct LockedAllocator {
    inner: Mutex<FreeListAllocator>,
}

impl LockedAllocator {
    pub fn new(config: HeapConfig) -> Result<Self> {
        Ok(LockedAllocator {
            inner: Mutex::new(FreeListAllocator::new(config)?),
        })
    }

    /// A heap operation only panics on a header pointing outside the arena,
    /// so once the lock is poisoned the heap stays refused
    pub fn lock(&self) -> Result<MutexGuard<'_, FreeListAllocator>> {
        self.inner.lock().map_err(|_| {
            error!("heap lock is poisoned, refusing to touch the heap");
            AllocError::Poisoned
        })
    }

    fn alloc_block(&self, layout: Layout, zeroed: bool) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        let Ok(mut heap) = self.lock() else {
            return ptr::null_mut();
        };
        let Ok(handle) = heap.allocate(layout.size()) else {
            return ptr::null_mut();
        };
        // the arena is mapped zeroed, but reused blocks keep their old bytes
        if zeroed {
            heap.arena.slice_mut(handle.offset(), layout.size()).fill(0);
        }
        heap.payload_ptr(handle)
    }
}

// Layouts aligned past a word are refused with a null pointer
unsafe impl GlobalAlloc for LockedAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.alloc_block(layout, false)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.alloc_block(layout, true)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let Ok(mut heap) = self.lock() else {
            return;
        };
        let Some(offset) = heap.arena.offset_of(ptr) else {
            error!("dealloc of {ptr:p}, which does not belong to this heap");
            return;
        };

        if let Err(err) = heap.deallocate(Handle::from_offset(offset)) {
            error!("dealloc of {ptr:p} failed: {err}");
        }
    }
}

lazy_static! {
    static ref HEAP: Option<LockedAllocator> = {
        let config = HeapConfig::from_env();
        trace!("setting up the process heap with {config:?}");
        match LockedAllocator::new(config) {
            Ok(heap) => Some(heap),
            Err(err) => {
                error!("failed to set up the process heap: {err}");
                None
            }
        }
    };
}

fn heap() -> Result<&'static LockedAllocator> {
    (*HEAP).as_ref().ok_or(AllocError::Unavailable)
}

/// Sets up the process heap if that has not happened yet
/// The other functions of this module do the same on first use
pub fn init() -> Result<()> {
    heap().map(|_| ())
}

/// [`FreeListAllocator::allocate`] on the process heap
pub fn allocate(requested: usize) -> Result<Handle> {
    heap()?.lock()?.allocate(requested)
}

/// [`FreeListAllocator::deallocate`] on the process heap
pub fn deallocate(handle: Handle) -> Result<()> {
    heap()?.lock()?.deallocate(handle)
}

/// Runs `f` with the process heap locked, for payload access and diagnostics
pub fn with_heap<R>(f: impl FnOnce(&mut FreeListAllocator) -> R) -> Result<R> {
    Ok(f(&mut *heap()?.lock()?))
}
