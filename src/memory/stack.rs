/*!
 * Stack Allocator
 * Bump-pointer allocation over one fixed arena with marker rewind
 *
 * Memory is only released in LIFO bulk: rewind to a marker or reset to zero.
 * Individual frees are ignored and reallocation is refused.
 */

use super::align::{address_of, align_up, pointer_at, validate_request};
use super::arena::Arena;
use super::traits::Allocator;
use super::types::{MemoryError, MemoryResult, MemoryStats};
use crate::core::limits::STACK_ALLOCATOR_NAME;
use crate::core::types::{Address, Size};
use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ptr::NonNull;

/// Opaque bump-pointer position of one stack allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackMarker {
    base: Address,
    offset: Size,
}

impl StackMarker {
    pub fn offset(&self) -> Size {
        self.offset
    }
}

#[derive(Debug, Clone, Copy)]
struct StackEntry {
    address: Address,
    size: Size,
}

#[derive(Debug, Default)]
struct StackState {
    offset: Size,
    /// Live allocations, ascending by address
    entries: Vec<StackEntry>,
    stats: MemoryStats,
}

#[derive(Debug)]
pub struct StackAllocator {
    arena: Arena,
    state: Mutex<StackState>,
}

impl StackAllocator {
    /// Reserve the whole arena up front; fails if it cannot be mapped
    pub fn new(capacity: Size) -> MemoryResult<Self> {
        let arena = Arena::map(capacity)?;
        info!(
            "Created stack allocator: {} bytes at 0x{:x}",
            capacity,
            arena.base()
        );
        Ok(Self {
            arena,
            state: Mutex::new(StackState::default()),
        })
    }

    pub fn marker(&self) -> StackMarker {
        StackMarker {
            base: self.arena.base(),
            offset: self.state.lock().offset,
        }
    }

    /// Rewind to `marker`, releasing everything allocated after it
    ///
    /// Markers from another allocator, or at or ahead of the current offset,
    /// are ignored.
    pub fn free_to_marker(&self, marker: StackMarker) {
        if marker.base != self.arena.base() {
            debug!("Ignoring marker from a different stack allocator");
            return;
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if marker.offset >= state.offset {
            return;
        }

        let base = self.arena.base();
        while let Some(entry) = state.entries.last().copied() {
            if entry.address - base + entry.size <= marker.offset {
                break;
            }
            state.entries.pop();
            state.stats.record_deallocation(entry.size);
        }
        debug!(
            "Stack rewound from {} to {} bytes",
            state.offset, marker.offset
        );
        state.offset = marker.offset;
    }

    pub fn current_offset(&self) -> Size {
        self.state.lock().offset
    }

    pub fn capacity(&self) -> Size {
        self.arena.len()
    }

    pub fn remaining(&self) -> Size {
        self.capacity() - self.current_offset()
    }
}

impl Allocator for StackAllocator {
    fn allocate(&self, size: Size, alignment: Size) -> MemoryResult<NonNull<u8>> {
        validate_request(size, alignment)?;

        let mut state = self.state.lock();
        let capacity = self.arena.len();
        let cursor = self.arena.base() + state.offset;
        let aligned = align_up(cursor, alignment);
        let padding = aligned.map_or(0, |aligned| aligned - cursor);

        let new_offset = aligned.and_then(|_| state.offset.checked_add(padding)?.checked_add(size));
        let (aligned, new_offset) = match (aligned, new_offset) {
            (Some(aligned), Some(end)) if end <= capacity => (aligned, end),
            _ => {
                return Err(MemoryError::StackExhausted {
                    requested: size,
                    padding,
                    used: state.offset,
                    capacity,
                })
            }
        };

        state.offset = new_offset;
        state.entries.push(StackEntry {
            address: aligned,
            size,
        });
        state.stats.record_allocation(size);
        pointer_at(aligned)
    }

    fn deallocate(&self, ptr: NonNull<u8>) {
        debug!(
            "Stack allocator ignores individual free at {:p}",
            ptr.as_ptr()
        );
    }

    fn reallocate(&self, _ptr: NonNull<u8>, _new_size: Size) -> MemoryResult<NonNull<u8>> {
        Err(MemoryError::Unsupported("stack allocators cannot reallocate"))
    }

    fn block_size(&self, ptr: NonNull<u8>) -> Option<Size> {
        let address = address_of(ptr);
        let state = self.state.lock();
        let index = state
            .entries
            .partition_point(|entry| entry.address <= address);
        let entry = state.entries.get(index.checked_sub(1)?)?;
        (address < entry.address + entry.size).then_some(entry.size)
    }

    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.arena.contains(address_of(ptr))
    }

    fn stats(&self) -> MemoryStats {
        self.state.lock().stats
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        state.offset = 0;
        state.entries.clear();
        state.stats.reset();
    }

    fn name(&self) -> &str {
        STACK_ALLOCATOR_NAME
    }

    fn releases_individually(&self) -> bool {
        false
    }
}
