/*!
 * Memory Manager Tests
 * Facade dispatch across pools, stacks and the system allocator
 */

use pretty_assertions::assert_eq;
use std::ptr::NonNull;
use vaporframe_memory::memory::{Allocator, MemoryError, MemoryManager, PoolConfig};
use vaporframe_memory::{tracked_allocate, tracked_deallocate, tracked_reallocate};

fn initialized_manager() -> MemoryManager {
    let manager = MemoryManager::new();
    manager.initialize(PoolConfig::default()).unwrap();
    manager
}

#[test]
fn test_facade_allocates_from_default_pool() {
    let manager = initialized_manager();
    let pool = manager.default_pool().unwrap();

    let ptr = tracked_allocate!(manager, 1024, 16, "test1").unwrap();
    assert!(pool.owns(ptr));
    assert_eq!(ptr.as_ptr() as usize % 16, 0);
    assert_eq!(manager.system_stats().allocation_count, 0);

    tracked_deallocate!(manager, ptr);
    assert_eq!(pool.stats().current_usage, 0);
}

#[test]
fn test_deallocate_dispatches_to_auxiliary_pool() {
    let manager = initialized_manager();
    let aux = manager
        .create_pool(PoolConfig::default().with_name("Aux").with_initial_size(64 * 1024))
        .unwrap();

    let ptr = aux.allocate(512, 16).unwrap();
    assert_eq!(aux.stats().current_usage, 512);

    manager.deallocate(ptr);
    assert_eq!(aux.stats().current_usage, 0);
    assert_eq!(aux.stats().deallocation_count, 1);
}

#[test]
fn test_stack_pointers_are_not_freed_individually() {
    let manager = initialized_manager();
    let stack = manager.create_stack_allocator(4096).unwrap();

    let ptr = stack.allocate(256, 16).unwrap();
    manager.deallocate(ptr);
    assert_eq!(stack.current_offset(), 256);
    assert_eq!(stack.stats().deallocation_count, 0);

    assert!(matches!(
        manager.reallocate(ptr, 512),
        Err(MemoryError::Unsupported(_))
    ));
}

#[test]
fn test_destroyed_allocators_leave_dispatch() {
    let manager = initialized_manager();
    let aux = manager.create_pool(PoolConfig::default().with_name("Aux")).unwrap();
    let stack = manager.create_stack_allocator(4096).unwrap();
    assert_eq!(manager.pools().len(), 1);
    assert_eq!(manager.stack_allocators().len(), 1);

    assert!(manager.destroy_pool(&aux));
    assert!(!manager.destroy_pool(&aux));
    assert!(manager.destroy_stack_allocator(&stack));
    assert!(!manager.destroy_stack_allocator(&stack));
    assert!(manager.pools().is_empty());
    assert!(manager.stack_allocators().is_empty());

    // handles stay usable after removal
    let ptr = aux.allocate(64, 8).unwrap();
    assert!(aux.owns(ptr));
    aux.deallocate(ptr);
}

#[test]
fn test_default_pool_cannot_be_destroyed_as_auxiliary() {
    let manager = initialized_manager();
    let default_pool = manager.default_pool().unwrap();
    assert!(!manager.destroy_pool(&default_pool));
    assert!(manager.is_initialized());
}

#[test]
fn test_foreign_pointer_is_absorbed() {
    let manager = initialized_manager();
    let mut local = [0u64; 4];
    let foreign = NonNull::new(local.as_mut_ptr().cast::<u8>()).unwrap();

    manager.deallocate(foreign);
    assert!(matches!(
        manager.reallocate(foreign, 64),
        Err(MemoryError::ForeignPointer(_))
    ));
    assert_eq!(manager.global_stats().deallocation_count, 0);
}

#[test]
fn test_reallocate_preserves_contents() {
    let manager = initialized_manager();
    let ptr = tracked_allocate!(manager, 1024, 16, "realloc_test").unwrap();
    unsafe {
        for i in 0..1024 {
            *ptr.as_ptr().add(i) = (i % 251) as u8;
        }
    }

    let grown = tracked_reallocate!(manager, ptr, 8192).unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(grown.as_ptr(), 1024) };
    for (i, byte) in bytes.iter().enumerate() {
        assert_eq!(*byte, (i % 251) as u8);
    }

    tracked_deallocate!(manager, grown);
    assert_eq!(manager.tracker().active_count(), 0);
    assert_eq!(manager.default_pool().unwrap().stats().current_usage, 0);
}

#[test]
fn test_reallocate_to_zero_releases() {
    let manager = initialized_manager();
    let ptr = manager.allocate(128, 16, "short-lived").unwrap();

    assert_eq!(manager.reallocate(ptr, 0), Err(MemoryError::ZeroSize));
    assert_eq!(manager.tracker().active_count(), 0);
    assert_eq!(manager.default_pool().unwrap().stats().current_usage, 0);
}

#[test]
fn test_system_fallback_round_trip() {
    let manager = MemoryManager::new();
    manager
        .initialize(PoolConfig::new(4096, 4096, 4096, 16, true, "Tiny"))
        .unwrap();

    let big = manager.allocate(1 << 20, 64, "overflow").unwrap();
    assert_eq!(big.as_ptr() as usize % 64, 0);
    assert_eq!(manager.system_stats().current_usage, 1 << 20);

    let bigger = manager.reallocate(big, 2 << 20).unwrap();
    assert_eq!(manager.system_stats().current_usage, 2 << 20);
    assert_eq!(manager.tracker().active_allocations()[0].tag, "overflow");

    manager.deallocate(bigger);
    assert_eq!(manager.system_stats().current_usage, 0);
    assert_eq!(manager.tracker().active_count(), 0);
}

#[test]
fn test_zero_size_request_is_rejected() {
    let manager = initialized_manager();
    assert_eq!(manager.allocate(0, 8, ""), Err(MemoryError::ZeroSize));
    assert_eq!(manager.global_stats().allocation_count, 0);
}

#[test]
fn test_shutdown_then_reinitialize() {
    let manager = initialized_manager();
    let ptr = manager.allocate(64, 8, "survivor").unwrap();
    manager.shutdown();
    assert!(!manager.is_initialized());

    // the old pool is gone; its pointer is no longer owned by anything
    manager.deallocate(ptr);

    manager.initialize(PoolConfig::default()).unwrap();
    assert!(manager.is_initialized());
    let fresh = manager.allocate(64, 8, "fresh").unwrap();
    manager.deallocate(fresh);
}

#[test]
fn test_destroyed_pool_leaves_no_stale_records() {
    let manager = initialized_manager();
    let config = PoolConfig::default()
        .with_name("Transient")
        .with_initial_size(64 * 1024);

    let first = manager.create_pool(config.clone()).unwrap();
    let _leaked = first.allocate(64, 16).unwrap();
    assert!(manager.destroy_pool(&first));
    drop(first);
    assert_eq!(manager.tracker().active_count(), 0);

    // the remapped arena may land on the same range as the dropped one
    let second = manager.create_pool(config).unwrap();
    let ptr = second.allocate(128, 16).unwrap();

    let stats = manager.global_stats();
    assert_eq!(stats.allocation_count, 2);
    assert_eq!(stats.deallocation_count, 1);
    assert_eq!(stats.current_usage, 128);
    let active = manager.tracker().active_allocations();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].size, 128);

    second.deallocate(ptr);
    assert_eq!(manager.global_stats().deallocation_count, 2);
    assert_eq!(manager.tracker().active_count(), 0);
}
