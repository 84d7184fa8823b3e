/*!
 * Memory Pool
 * Growable first-fit free-list allocator over OS-mapped arenas
 *
 * Each arena is tiled by blocks with no gaps or overlaps. Allocation takes
 * the first free block that fits once alignment padding is applied, splitting
 * off the tail when it is at least `block_size` bytes. Frees coalesce eagerly
 * with both neighbours. Stats count requested bytes, not block sizes.
 *
 * A tracked pool reports frees and reallocations to the tracker while still
 * holding its lock, so an address is never reissued before its old record is
 * gone. Lock order is always pool then tracker.
 */

mod blocks;

use self::blocks::{Block, BlockTable};
use super::align::{address_of, align_up, pointer_at, validate_request};
use super::arena::Arena;
use super::tracker::MemoryTracker;
use super::traits::Allocator;
use super::types::{BlockInfo, MemoryError, MemoryResult, MemoryStats, PoolConfig};
use crate::core::limits::FALLBACK_PAGE_SIZE;
use crate::core::types::{Address, Size};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::ptr::{self, NonNull};
use std::sync::Arc;

#[derive(Debug, Default)]
struct PoolState {
    /// In acquisition order; the first one survives `reset`
    arenas: Vec<Arena>,
    blocks: BlockTable,
    stats: MemoryStats,
}

impl PoolState {
    fn capacity(&self) -> Size {
        self.arenas.iter().map(Arena::len).sum()
    }

    fn map_arena(&mut self, len: Size) -> MemoryResult<()> {
        let arena = Arena::map(len)?;
        let base = arena.base();
        self.blocks.insert(Block::spanning(base, base, arena.len()));
        self.arenas.push(arena);
        Ok(())
    }
}

/// Free-list memory pool
#[derive(Debug)]
pub struct MemoryPool {
    config: PoolConfig,
    state: Mutex<PoolState>,
    tracker: Option<Arc<MemoryTracker>>,
}

impl MemoryPool {
    /// Create an untracked pool, mapping `initial_size` bytes up front
    pub fn new(config: PoolConfig) -> MemoryResult<Self> {
        Self::build(config, None)
    }

    /// Create a pool that reports its allocations to `tracker`
    pub fn with_tracker(config: PoolConfig, tracker: Arc<MemoryTracker>) -> MemoryResult<Self> {
        Self::build(config, Some(tracker))
    }

    fn build(config: PoolConfig, tracker: Option<Arc<MemoryTracker>>) -> MemoryResult<Self> {
        config.validate()?;

        let mut state = PoolState::default();
        if config.initial_size > 0 {
            state.map_arena(config.initial_size)?;
        }

        info!(
            "Created pool '{}' ({} bytes initial, {} bytes max, {} byte blocks, {} byte alignment)",
            config.name, config.initial_size, config.max_size, config.block_size, config.alignment
        );

        Ok(Self {
            config,
            state: Mutex::new(state),
            tracker,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn tracker(&self) -> Option<&MemoryTracker> {
        self.tracker
            .as_deref()
            .filter(|_| self.config.tracking_enabled)
    }

    /// Map another arena of `additional` bytes; false when the ceiling or the OS refuses
    pub fn expand(&self, additional: Size) -> bool {
        let mut state = self.state.lock();
        self.expand_locked(&mut state, additional).is_ok()
    }

    fn expand_locked(&self, state: &mut PoolState, additional: Size) -> MemoryResult<()> {
        if additional == 0 {
            return Err(MemoryError::ZeroSize);
        }

        let capacity = state.capacity();
        let within_ceiling = capacity
            .checked_add(additional)
            .map_or(false, |total| total <= self.config.max_size);
        if !within_ceiling {
            warn!(
                "Pool '{}' refused to grow by {} bytes ({} mapped, ceiling {})",
                self.config.name, additional, capacity, self.config.max_size
            );
            return Err(MemoryError::PoolExhausted {
                pool: self.config.name.clone(),
                requested: additional,
                capacity,
                max: self.config.max_size,
            });
        }

        state.map_arena(additional)?;
        info!(
            "Pool '{}' grew by {} bytes ({} arenas, {} bytes mapped)",
            self.config.name,
            additional,
            state.arenas.len(),
            capacity + additional
        );
        Ok(())
    }

    /// Arena size needed to guarantee `size` bytes at `alignment` fit
    fn growth_for(&self, size: Size, alignment: Size) -> Size {
        let needed = if alignment > FALLBACK_PAGE_SIZE {
            size.saturating_add(alignment)
        } else {
            size
        };
        needed.max(self.config.block_size)
    }

    fn allocate_locked(
        &self,
        state: &mut PoolState,
        size: Size,
        alignment: Size,
    ) -> MemoryResult<Address> {
        let (id, user) = match state.blocks.first_fit(size, alignment) {
            Some(found) => found,
            None => {
                self.expand_locked(state, self.growth_for(size, alignment))?;
                state
                    .blocks
                    .first_fit(size, alignment)
                    .ok_or(MemoryError::AlignmentError { size, alignment })?
            }
        };

        let (start, block_size) = match state.blocks.get(id) {
            Some(block) => (block.start, block.size),
            None => return Err(MemoryError::AlignmentError { size, alignment }),
        };

        // keep block starts on the pool alignment so later fits need no padding
        let used = user - start + size;
        let keep = align_up(used, self.config.alignment)
            .map_or(block_size, |rounded| rounded.min(block_size));
        if block_size - keep >= self.config.block_size {
            state.blocks.split(id, keep);
        }

        if let Some(block) = state.blocks.get_mut(id) {
            block.used = true;
            block.user = user;
            block.requested = size;
            block.alignment = alignment;
        }
        state.stats.record_allocation(size);

        debug!(
            "Pool '{}' allocated {} bytes at 0x{:x} (align {})",
            self.config.name, size, user, alignment
        );
        Ok(user)
    }

    /// Free the used block containing `address`; returns its user address
    fn release_locked(&self, state: &mut PoolState, address: Address) -> Option<Address> {
        let id = state.blocks.find_containing(address)?;
        let block = state.blocks.get_mut(id)?;
        if !block.used {
            debug!(
                "Pool '{}' ignored double free at 0x{:x}",
                self.config.name, address
            );
            return None;
        }

        let user = block.user;
        let requested = block.requested;
        block.used = false;
        block.user = block.start;
        block.requested = 0;
        block.alignment = 1;

        state.stats.record_deallocation(requested);
        state.blocks.coalesce(id);

        debug!(
            "Pool '{}' freed {} bytes at 0x{:x}",
            self.config.name, requested, user
        );
        Some(user)
    }

    /// Merge every run of adjacent free blocks; returns the number of merges
    pub fn defragment(&self) -> usize {
        let merges = self.state.lock().blocks.merge_free_runs();
        if merges > 0 {
            info!("Pool '{}' defragmented: {} merges", self.config.name, merges);
        }
        merges
    }

    /// External fragmentation as a percentage of free bytes
    pub fn fragmentation(&self) -> usize {
        self.state.lock().blocks.fragmentation()
    }

    pub fn arena_count(&self) -> usize {
        self.state.lock().arenas.len()
    }

    /// Bytes mapped across all arenas
    pub fn capacity(&self) -> Size {
        self.state.lock().capacity()
    }

    pub fn free_bytes(&self) -> Size {
        self.state.lock().blocks.free_bytes()
    }

    pub fn largest_free_block(&self) -> Size {
        self.state.lock().blocks.largest_free()
    }

    pub fn block_count(&self) -> usize {
        self.state.lock().blocks.len()
    }

    /// Every block in address order
    pub fn blocks(&self) -> Vec<BlockInfo> {
        self.state.lock().blocks.iter().map(Block::info).collect()
    }
}

impl Allocator for MemoryPool {
    fn allocate(&self, size: Size, alignment: Size) -> MemoryResult<NonNull<u8>> {
        validate_request(size, alignment)?;
        let alignment = alignment.max(self.config.alignment);

        let user = {
            let mut state = self.state.lock();
            self.allocate_locked(&mut state, size, alignment)?
        };

        if let Some(tracker) = self.tracker() {
            tracker.track_allocation(user, size, alignment, &self.config.name, None);
        }
        pointer_at(user)
    }

    fn deallocate(&self, ptr: NonNull<u8>) {
        let mut state = self.state.lock();
        if let Some(user) = self.release_locked(&mut state, address_of(ptr)) {
            // untrack before the block can be handed out again
            if let Some(tracker) = self.tracker() {
                tracker.track_deallocation(user);
            }
        }
    }

    fn reallocate(&self, ptr: NonNull<u8>, new_size: Size) -> MemoryResult<NonNull<u8>> {
        let address = address_of(ptr);
        if new_size == 0 {
            self.deallocate(ptr);
            return Err(MemoryError::ZeroSize);
        }

        let mut state = self.state.lock();
        let id = state
            .blocks
            .find_containing(address)
            .ok_or(MemoryError::ForeignPointer(address))?;
        let (user, requested, alignment, end) = match state.blocks.get(id) {
            Some(block) if block.used => (block.user, block.requested, block.alignment, block.end()),
            _ => return Err(MemoryError::ForeignPointer(address)),
        };

        let fits_in_place = user
            .checked_add(new_size)
            .map_or(false, |new_end| new_end <= end);
        let new_user = if fits_in_place {
            if let Some(block) = state.blocks.get_mut(id) {
                block.requested = new_size;
            }
            state.stats.record_resize(requested, new_size);
            user
        } else {
            let moved = self.allocate_locked(&mut state, new_size, alignment)?;
            // SAFETY: both ranges lie in live, distinct used blocks of this pool
            unsafe {
                ptr::copy_nonoverlapping(user as *const u8, moved as *mut u8, requested.min(new_size));
            }
            self.release_locked(&mut state, user);
            moved
        };

        if let Some(tracker) = self.tracker() {
            tracker.track_reallocation(user, new_user, new_size);
        }
        drop(state);
        pointer_at(new_user)
    }

    fn block_size(&self, ptr: NonNull<u8>) -> Option<Size> {
        let state = self.state.lock();
        let id = state.blocks.find_containing(address_of(ptr))?;
        state
            .blocks
            .get(id)
            .filter(|block| block.used)
            .map(|block| block.size)
    }

    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.state
            .lock()
            .blocks
            .find_containing(address_of(ptr))
            .is_some()
    }

    fn stats(&self) -> MemoryStats {
        let state = self.state.lock();
        let mut stats = state.stats;
        stats.fragmentation = state.blocks.fragmentation();
        stats
    }

    /// Release every arena but the first and rebuild it as one free block
    fn reset(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let live: Vec<Address> = state
            .blocks
            .iter()
            .filter(|block| block.used)
            .map(|block| block.user)
            .collect();
        if let Some(tracker) = self.tracker() {
            for user in &live {
                tracker.track_deallocation(*user);
            }
        }

        state.arenas.truncate(1);
        state.blocks.clear();
        if let Some(arena) = state.arenas.first() {
            let base = arena.base();
            state.blocks.insert(Block::spanning(base, base, arena.len()));
        }
        state.stats.reset();

        info!(
            "Pool '{}' reset ({} live allocations dropped)",
            self.config.name,
            live.len()
        );
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_tracked(&self) -> bool {
        self.tracker().is_some()
    }
}

impl Drop for MemoryPool {
    /// Untrack live blocks before their arenas are unmapped and the range can be remapped
    fn drop(&mut self) {
        let Some(tracker) = self.tracker() else {
            return;
        };
        let state = self.state.lock();
        let mut dropped = 0;
        for block in state.blocks.iter().filter(|block| block.used) {
            tracker.track_deallocation(block.user);
            dropped += 1;
        }
        if dropped > 0 {
            debug!(
                "Pool '{}' dropped with {} live allocations",
                self.config.name, dropped
            );
        }
    }
}
