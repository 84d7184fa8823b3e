/*!
 * System Allocator
 * Platform aligned allocator as the last link of the dispatch chain
 */

use super::align::{address_of, pointer_at, validate_request};
use super::tracker::MemoryTracker;
use super::traits::Allocator;
use super::types::{MemoryError, MemoryResult, MemoryStats};
use crate::core::limits::SYSTEM_ALLOCATOR_NAME;
use crate::core::types::{Address, Size};
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, warn};
use parking_lot::Mutex;
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

/// `std::alloc` with per-allocation layout bookkeeping
///
/// Remembering each layout lets frees pass the right size and alignment back
/// to the platform, and lets foreign pointers be told apart and refused.
/// Platform calls that release memory run under the stats lock together
/// with their tracker update.
#[derive(Debug)]
pub struct SystemAllocator {
    layouts: DashMap<Address, Layout, RandomState>,
    stats: Mutex<MemoryStats>,
    tracker: Option<Arc<MemoryTracker>>,
}

impl Default for SystemAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemAllocator {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create an allocator that reports its traffic to `tracker`
    pub fn with_tracker(tracker: Arc<MemoryTracker>) -> Self {
        Self::build(Some(tracker))
    }

    fn build(tracker: Option<Arc<MemoryTracker>>) -> Self {
        Self {
            layouts: DashMap::with_hasher(RandomState::new()),
            stats: Mutex::new(MemoryStats::default()),
            tracker,
        }
    }

    /// Number of outstanding platform allocations
    pub fn live_count(&self) -> usize {
        self.layouts.len()
    }

    fn release_all(&self) -> usize {
        let _stats = self.stats.lock();
        let addresses: Vec<Address> = self.layouts.iter().map(|entry| *entry.key()).collect();
        let mut released = 0;
        for address in addresses {
            if let Some((address, layout)) = self.layouts.remove(&address) {
                if let Some(tracker) = &self.tracker {
                    tracker.track_deallocation(address);
                }
                // SAFETY: address/layout pair was recorded by `allocate`/`reallocate`
                unsafe { alloc::dealloc(address as *mut u8, layout) };
                released += 1;
            }
        }
        released
    }
}

impl Allocator for SystemAllocator {
    fn allocate(&self, size: Size, alignment: Size) -> MemoryResult<NonNull<u8>> {
        validate_request(size, alignment)?;
        let refused = MemoryError::SystemOutOfMemory { size, alignment };
        let layout = Layout::from_size_align(size, alignment).map_err(|_| refused.clone())?;

        // SAFETY: layout has a non-zero size
        let ptr = NonNull::new(unsafe { alloc::alloc(layout) }).ok_or(refused)?;
        let mut stats = self.stats.lock();
        self.layouts.insert(address_of(ptr), layout);
        stats.record_allocation(size);
        if let Some(tracker) = &self.tracker {
            tracker.track_allocation(address_of(ptr), size, alignment, "", None);
        }
        drop(stats);

        debug!("System allocated {} bytes at {:p}", size, ptr.as_ptr());
        Ok(ptr)
    }

    fn deallocate(&self, ptr: NonNull<u8>) {
        let address = address_of(ptr);
        let mut stats = self.stats.lock();
        match self.layouts.remove(&address) {
            Some((_, layout)) => {
                if let Some(tracker) = &self.tracker {
                    tracker.track_deallocation(address);
                }
                // SAFETY: the layout is the one the pointer was allocated with
                unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
                stats.record_deallocation(layout.size());
            }
            None => warn!(
                "Ignoring free of 0x{:x}: not a live system allocation",
                address
            ),
        }
    }

    fn reallocate(&self, ptr: NonNull<u8>, new_size: Size) -> MemoryResult<NonNull<u8>> {
        let address = address_of(ptr);
        if new_size == 0 {
            self.deallocate(ptr);
            return Err(MemoryError::ZeroSize);
        }

        let mut stats = self.stats.lock();
        let (_, layout) = self
            .layouts
            .remove(&address)
            .ok_or(MemoryError::ForeignPointer(address))?;
        let refused = MemoryError::SystemOutOfMemory {
            size: new_size,
            alignment: layout.align(),
        };

        let new_layout = match Layout::from_size_align(new_size, layout.align()) {
            Ok(new_layout) => new_layout,
            Err(_) => {
                self.layouts.insert(address, layout);
                return Err(refused);
            }
        };

        // SAFETY: ptr was allocated with `layout`; new_size is non-zero and
        // forms a valid layout with the same alignment
        let moved = unsafe { alloc::realloc(ptr.as_ptr(), layout, new_size) };
        let Some(moved) = NonNull::new(moved) else {
            self.layouts.insert(address, layout);
            return Err(refused);
        };

        self.layouts.insert(address_of(moved), new_layout);
        stats.record_resize(layout.size(), new_size);
        if let Some(tracker) = &self.tracker {
            tracker.track_reallocation(address, address_of(moved), new_size);
        }
        drop(stats);
        pointer_at(address_of(moved))
    }

    fn block_size(&self, ptr: NonNull<u8>) -> Option<Size> {
        self.layouts
            .get(&address_of(ptr))
            .map(|layout| layout.size())
    }

    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.layouts.contains_key(&address_of(ptr))
    }

    fn stats(&self) -> MemoryStats {
        *self.stats.lock()
    }

    fn reset(&self) {
        let released = self.release_all();
        if released > 0 {
            warn!("System allocator reset released {} live allocations", released);
        }
        self.stats.lock().reset();
    }

    fn name(&self) -> &str {
        SYSTEM_ALLOCATOR_NAME
    }

    fn is_tracked(&self) -> bool {
        self.tracker.is_some()
    }
}

impl Drop for SystemAllocator {
    fn drop(&mut self) {
        let released = self.release_all();
        if released > 0 {
            debug!("System allocator dropped {} live allocations", released);
        }
    }
}
