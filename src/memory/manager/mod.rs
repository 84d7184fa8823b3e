/*!
 * Memory Manager
 *
 * Facade routing engine allocations across pools, stack allocators and the
 * platform allocator.
 *
 * ## Dispatch
 *
 * - **Allocate**: default pool first; the system allocator takes over when
 *   the manager is not initialized or the pool is out of room
 * - **Deallocate / reallocate**: the first allocator in
 *   `default pool -> auxiliary pools -> stacks -> system` that owns the
 *   address handles the call
 *
 * ## Locking
 *
 * The allocator collections are published as an immutable snapshot through
 * `ArcSwap`. Only create/destroy serialize on the registry lock; allocation
 * traffic loads the snapshot and contends only on the allocator it lands in.
 *
 * ## Tracking
 *
 * Pools and the system allocator keep the shared tracker current under
 * their own locks. After a successful allocation the facade adds the
 * caller's tag and source location to the record; frees and reallocations
 * need nothing further. A pool built with tracking off stays invisible to
 * the tracker.
 */

mod dispatch;

use self::dispatch::AllocatorSet;
use super::align::{self, address_of, validate_request};
use super::pool::MemoryPool;
use super::stack::StackAllocator;
use super::system::SystemAllocator;
use super::tracker::MemoryTracker;
use super::traits::Allocator;
use super::types::{MemoryError, MemoryResult, MemoryStats, PoolConfig};
use crate::core::types::{Size, SourceLocation};
use arc_swap::ArcSwap;
use log::{debug, warn};
use parking_lot::Mutex;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::info;

/// Memory subsystem context
///
/// One instance is built at startup and shared by reference (or `Arc`) with
/// every subsystem that allocates.
pub struct MemoryManager {
    tracker: Arc<MemoryTracker>,
    system: Arc<SystemAllocator>,
    allocators: ArcSwap<AllocatorSet>,
    /// Serializes create/destroy of allocators
    registry: Mutex<()>,
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::with_tracker(Arc::new(MemoryTracker::new()))
    }

    /// Build a manager reporting into an existing tracker
    pub fn with_tracker(tracker: Arc<MemoryTracker>) -> Self {
        let system = Arc::new(SystemAllocator::with_tracker(Arc::clone(&tracker)));
        Self {
            tracker,
            allocators: ArcSwap::from_pointee(AllocatorSet::new(Arc::clone(&system))),
            system,
            registry: Mutex::new(()),
        }
    }

    /// Create the default pool; a second call is a no-op
    pub fn initialize(&self, config: PoolConfig) -> MemoryResult<()> {
        let _registry = self.registry.lock();
        let current = self.allocators.load_full();
        if current.default_pool.is_some() {
            debug!("Memory manager already initialized");
            return Ok(());
        }

        let pool = Arc::new(MemoryPool::with_tracker(config, Arc::clone(&self.tracker))?);
        info!(
            pool = %pool.name(),
            initial_size = pool.config().initial_size,
            max_size = pool.config().max_size,
            "Memory manager initialized"
        );
        self.allocators
            .store(Arc::new(current.with_default_pool(Some(pool))));
        Ok(())
    }

    /// Print the final reports and drop every pool and stack allocator
    pub fn shutdown(&self) {
        let _registry = self.registry.lock();
        let current = self.allocators.load_full();
        if current.default_pool.is_none() {
            return;
        }

        self.tracker.dump_stats();
        self.tracker.dump_leaks();

        let leaks = self.tracker.active_count();
        if leaks > 0 {
            warn!("Shutting down with {} live tracked allocations", leaks);
        }
        info!(
            pools = current.pools.len(),
            stacks = current.stacks.len(),
            leaks,
            "Memory manager shut down"
        );
        self.allocators
            .store(Arc::new(AllocatorSet::new(Arc::clone(&self.system))));
    }

    pub fn is_initialized(&self) -> bool {
        self.allocators.load().default_pool.is_some()
    }

    /// Allocate with the caller's file and line attached to the tracker record
    #[track_caller]
    pub fn allocate(&self, size: Size, alignment: Size, tag: &str) -> MemoryResult<NonNull<u8>> {
        self.allocate_at(size, alignment, tag, Some(SourceLocation::caller()))
    }

    pub fn allocate_at(
        &self,
        size: Size,
        alignment: Size,
        tag: &str,
        location: Option<SourceLocation>,
    ) -> MemoryResult<NonNull<u8>> {
        validate_request(size, alignment)?;

        let set = self.allocators.load();
        let (ptr, tracked) = match &set.default_pool {
            Some(pool) => match pool.allocate(size, alignment) {
                Ok(ptr) => (ptr, pool.is_tracked()),
                Err(err) if err.is_capacity() => {
                    debug!(
                        "Default pool refused {} bytes ({}), using system allocator",
                        size, err
                    );
                    (self.system.allocate(size, alignment)?, self.system.is_tracked())
                }
                Err(err) => return Err(err),
            },
            None => (self.system.allocate(size, alignment)?, self.system.is_tracked()),
        };

        if tracked {
            self.tracker
                .track_allocation(address_of(ptr), size, alignment, tag, location);
        }
        Ok(ptr)
    }

    /// Release `ptr` through whichever allocator owns it
    ///
    /// Pointers owned by a stack allocator are left for marker rewind;
    /// pointers nobody owns are logged and ignored.
    pub fn deallocate(&self, ptr: NonNull<u8>) {
        let set = self.allocators.load();
        match set.owner_of(ptr) {
            Some(owner) if owner.releases_individually() => owner.deallocate(ptr),
            Some(owner) => debug!(
                "{} does not release individually, ignoring free of {:p}",
                owner.name(),
                ptr.as_ptr()
            ),
            None => warn!(
                "Ignoring free of {:p}: not owned by any allocator",
                ptr.as_ptr()
            ),
        }
    }

    /// Resize `ptr` within its owning allocator
    ///
    /// A `new_size` of zero releases the allocation and reports `ZeroSize`.
    pub fn reallocate(&self, ptr: NonNull<u8>, new_size: Size) -> MemoryResult<NonNull<u8>> {
        let set = self.allocators.load();
        let owner = set
            .owner_of(ptr)
            .ok_or(MemoryError::ForeignPointer(address_of(ptr)))?;
        owner.reallocate(ptr, new_size)
    }

    /// Create an auxiliary pool reporting into this manager's tracker
    pub fn create_pool(&self, config: PoolConfig) -> MemoryResult<Arc<MemoryPool>> {
        let pool = Arc::new(MemoryPool::with_tracker(config, Arc::clone(&self.tracker))?);

        let _registry = self.registry.lock();
        let current = self.allocators.load_full();
        let mut pools = current.pools.clone();
        pools.push(Arc::clone(&pool));
        self.allocators.store(Arc::new(current.with_pools(pools)));

        info!(pool = %pool.name(), total = current.pools.len() + 1, "Created memory pool");
        Ok(pool)
    }

    /// Remove an auxiliary pool from dispatch; false if it is not registered
    pub fn destroy_pool(&self, pool: &Arc<MemoryPool>) -> bool {
        let _registry = self.registry.lock();
        let current = self.allocators.load_full();
        let Some(index) = current
            .pools
            .iter()
            .position(|candidate| Arc::ptr_eq(candidate, pool))
        else {
            return false;
        };

        let mut pools = current.pools.clone();
        pools.remove(index);
        self.allocators.store(Arc::new(current.with_pools(pools)));

        info!(pool = %pool.name(), "Destroyed memory pool");
        true
    }

    pub fn create_stack_allocator(&self, capacity: Size) -> MemoryResult<Arc<StackAllocator>> {
        let stack = Arc::new(StackAllocator::new(capacity)?);

        let _registry = self.registry.lock();
        let current = self.allocators.load_full();
        let mut stacks = current.stacks.clone();
        stacks.push(Arc::clone(&stack));
        self.allocators.store(Arc::new(current.with_stacks(stacks)));

        info!(capacity, "Created stack allocator");
        Ok(stack)
    }

    pub fn destroy_stack_allocator(&self, stack: &Arc<StackAllocator>) -> bool {
        let _registry = self.registry.lock();
        let current = self.allocators.load_full();
        let Some(index) = current
            .stacks
            .iter()
            .position(|candidate| Arc::ptr_eq(candidate, stack))
        else {
            return false;
        };

        let mut stacks = current.stacks.clone();
        stacks.remove(index);
        self.allocators.store(Arc::new(current.with_stacks(stacks)));

        info!(capacity = stack.capacity(), "Destroyed stack allocator");
        true
    }

    /// Aggregate counters across every tracked allocation
    pub fn global_stats(&self) -> MemoryStats {
        self.tracker.global_stats()
    }

    pub fn tracker(&self) -> &Arc<MemoryTracker> {
        &self.tracker
    }

    pub fn default_pool(&self) -> Option<Arc<MemoryPool>> {
        self.allocators.load().default_pool.clone()
    }

    pub fn pools(&self) -> Vec<Arc<MemoryPool>> {
        self.allocators.load().pools.clone()
    }

    pub fn stack_allocators(&self) -> Vec<Arc<StackAllocator>> {
        self.allocators.load().stacks.clone()
    }

    /// Counters of the platform fallback allocator
    pub fn system_stats(&self) -> MemoryStats {
        self.system.stats()
    }

    pub fn alignment_padding(size: Size, alignment: Size) -> Size {
        align::alignment_padding(size, alignment)
    }

    pub fn is_power_of_two(value: Size) -> bool {
        align::is_power_of_two(value)
    }

    pub fn next_power_of_two(value: Size) -> Size {
        align::next_power_of_two(value)
    }
}
