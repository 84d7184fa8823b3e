/*!
 * VaporFrame Memory Demo - Main Entry Point
 *
 * Drives the memory subsystem through its main scenarios:
 * - Tagged allocation through the facade
 * - Auxiliary pools
 * - Stack allocators with marker rewind
 * - Reallocation
 * - Pool vs system allocation throughput
 */

use anyhow::{Context, Result};
use std::ptr::NonNull;
use std::time::Instant;
use tracing::info;

use vaporframe_memory::monitoring::init_tracing;
use vaporframe_memory::{
    tracked_allocate, tracked_deallocate, tracked_reallocate, Allocator, MemoryManager,
    PoolConfig, SystemAllocator,
};

const PERF_ALLOCATIONS: usize = 10_000;

fn main() -> Result<()> {
    init_tracing();

    info!("VaporFrame memory demo starting...");
    info!("================================================");

    let manager = MemoryManager::new();
    manager
        .initialize(PoolConfig::from_env())
        .context("failed to initialize the default pool")?;

    basic_allocation(&manager)?;
    memory_pool(&manager)?;
    stack_allocator(&manager)?;
    reallocation(&manager)?;
    performance(&manager)?;

    info!("================================================");
    manager.shutdown();
    Ok(())
}

fn basic_allocation(manager: &MemoryManager) -> Result<()> {
    info!("=== Basic Allocation ===");

    let ptr1 = tracked_allocate!(manager, 1024, 16, "test1")?;
    let ptr2 = tracked_allocate!(manager, 2048, 32, "test2")?;
    let ptr3 = tracked_allocate!(manager, 512, 8, "test3")?;
    info!("Allocated: {:p}, {:p}, {:p}", ptr1, ptr2, ptr3);

    for ptr in [ptr1, ptr2, ptr3] {
        tracked_deallocate!(manager, ptr);
    }
    info!("Deallocated all pointers");

    manager.tracker().dump_stats();
    Ok(())
}

fn memory_pool(manager: &MemoryManager) -> Result<()> {
    info!("=== Memory Pool ===");

    let config = PoolConfig::new(1024 * 1024, 10 * 1024 * 1024, 4096, 16, true, "TestPool");
    let pool = manager.create_pool(config)?;

    let ptrs = [
        pool.allocate(1024, 16)?,
        pool.allocate(2048, 32)?,
        pool.allocate(512, 8)?,
    ];
    for ptr in &ptrs {
        info!("Pool owns {:p}: {}", *ptr, pool.owns(*ptr));
    }

    let stats = pool.stats();
    info!(
        "Pool '{}': {} bytes in use, {} allocations, {}% fragmented",
        pool.name(),
        stats.current_usage,
        stats.allocation_count,
        pool.fragmentation()
    );

    for ptr in ptrs {
        pool.deallocate(ptr);
    }
    manager.destroy_pool(&pool);
    Ok(())
}

fn stack_allocator(manager: &MemoryManager) -> Result<()> {
    info!("=== Stack Allocator ===");

    let stack = manager.create_stack_allocator(1024 * 1024)?;
    let frame = stack.marker();

    let ptr1 = stack.allocate(1024, 16)?;
    let ptr2 = stack.allocate(2048, 32)?;
    let ptr3 = stack.allocate(512, 8)?;
    info!("Stack allocated: {:p}, {:p}, {:p}", ptr1, ptr2, ptr3);
    info!("Current offset: {}", stack.current_offset());

    stack.free_to_marker(frame);
    info!("Offset after rewind: {}", stack.current_offset());

    manager.destroy_stack_allocator(&stack);
    Ok(())
}

fn reallocation(manager: &MemoryManager) -> Result<()> {
    info!("=== Reallocation ===");

    let ptr = tracked_allocate!(manager, 1024, 16, "realloc_test")?;
    info!("Initial allocation: {:p}", ptr);

    let grown = tracked_reallocate!(manager, ptr, 8192)?;
    info!("After reallocation: {:p}", grown);

    tracked_deallocate!(manager, grown);
    Ok(())
}

fn performance(manager: &MemoryManager) -> Result<()> {
    info!("=== Performance ({} allocations) ===", PERF_ALLOCATIONS);

    let sizes: Vec<usize> = (0..PERF_ALLOCATIONS).map(|i| (i * 37) % 1024 + 1).collect();
    let mut ptrs: Vec<NonNull<u8>> = Vec::with_capacity(PERF_ALLOCATIONS);

    let start = Instant::now();
    for &size in &sizes {
        ptrs.push(manager.allocate_at(size, 8, "perf", None)?);
    }
    for ptr in ptrs.drain(..) {
        manager.deallocate(ptr);
    }
    let pooled = start.elapsed();

    let system = SystemAllocator::new();
    let start = Instant::now();
    for &size in &sizes {
        ptrs.push(system.allocate(size, 8)?);
    }
    for ptr in ptrs.drain(..) {
        system.deallocate(ptr);
    }
    let platform = start.elapsed();

    info!(
        "Pool: {} us, system: {} us",
        pooled.as_micros(),
        platform.as_micros()
    );
    Ok(())
}
