/*!
 * Memory Pool Tests
 * Allocation, coalescing and accounting of the free-list pool
 */

use pretty_assertions::assert_eq;
use std::ptr::NonNull;
use vaporframe_memory::memory::{Allocator, MemoryError, MemoryPool, PoolConfig};

fn test_pool() -> MemoryPool {
    MemoryPool::new(PoolConfig::new(
        1_048_576,
        10_485_760,
        4096,
        16,
        true,
        "TestPool",
    ))
    .unwrap()
}

fn addr(ptr: NonNull<u8>) -> usize {
    ptr.as_ptr() as usize
}

#[test]
fn test_three_allocations_round_trip() {
    let pool = test_pool();

    let requests = [(1024usize, 16usize), (2048, 32), (512, 8)];
    let ptrs: Vec<NonNull<u8>> = requests
        .iter()
        .map(|&(size, alignment)| pool.allocate(size, alignment).unwrap())
        .collect();

    for (ptr, &(size, alignment)) in ptrs.iter().zip(&requests) {
        assert_eq!(addr(*ptr) % alignment, 0);
        assert!(pool.owns(*ptr));
        assert!(pool.block_size(*ptr).unwrap() >= size);
    }

    // pairwise disjoint
    for (i, (a, &(a_size, _))) in ptrs.iter().zip(&requests).enumerate() {
        for (b, &(b_size, _)) in ptrs.iter().zip(&requests).skip(i + 1) {
            let (a, b) = (addr(*a), addr(*b));
            assert!(a + a_size <= b || b + b_size <= a, "allocations overlap");
        }
    }

    let stats = pool.stats();
    assert_eq!(stats.allocation_count, 3);
    assert_eq!(stats.current_usage, 1024 + 2048 + 512);

    for ptr in ptrs {
        pool.deallocate(ptr);
    }
    let stats = pool.stats();
    assert_eq!(stats.current_usage, 0);
    assert_eq!(stats.deallocation_count, 3);
    assert_eq!(stats.peak_usage, 1024 + 2048 + 512);
}

#[test]
fn test_immediate_reuse_does_not_expand() {
    let pool = test_pool();
    let arenas = pool.arena_count();

    let first = pool.allocate(2048, 16).unwrap();
    pool.deallocate(first);
    let second = pool.allocate(2048, 16).unwrap();

    assert_eq!(pool.arena_count(), arenas);
    assert_eq!(second, first);
}

#[test]
fn test_one_used_one_free_has_no_fragmentation() {
    let pool = test_pool();
    let _ptr = pool.allocate(4096, 16).unwrap();

    let blocks = pool.blocks();
    assert_eq!(blocks.len(), 2);
    assert!(blocks[0].used);
    assert!(!blocks[1].used);
    assert_eq!(pool.fragmentation(), 0);
    assert_eq!(pool.stats().fragmentation, 0);
}

#[test]
fn test_fragmentation_with_split_free_space() {
    let pool = test_pool();
    let a = pool.allocate(8192, 16).unwrap();
    let _b = pool.allocate(8192, 16).unwrap();
    pool.deallocate(a);

    // free: 8 KiB hole + the tail of the arena
    let free = pool.free_bytes();
    let largest = pool.largest_free_block();
    assert_eq!(free, 1_048_576 - 8192);
    assert_eq!(largest, 1_048_576 - 16384);
    assert_eq!(pool.fragmentation(), (free - largest) * 100 / free);
}

#[test]
fn test_freeing_interior_pointer_releases_whole_block() {
    // Frees resolve the block by address range, so a pointer into the
    // middle of an allocation releases it just like the returned pointer.
    let pool = test_pool();
    let ptr = pool.allocate(256, 16).unwrap();
    let interior = NonNull::new(unsafe { ptr.as_ptr().add(8) }).unwrap();

    assert!(pool.owns(interior));
    pool.deallocate(interior);

    assert_eq!(pool.stats().current_usage, 0);
    assert_eq!(pool.block_size(ptr), None);
    assert_eq!(pool.block_count(), 1);
}

#[test]
fn test_growth_beyond_initial_arena() {
    let pool = test_pool();
    let big = pool.allocate(2 * 1_048_576, 16).unwrap();

    assert_eq!(pool.arena_count(), 2);
    assert!(pool.owns(big));
    assert_eq!(pool.capacity(), 3 * 1_048_576);

    pool.deallocate(big);
    assert_eq!(pool.arena_count(), 2, "arenas are kept until reset");
    pool.reset();
    assert_eq!(pool.arena_count(), 1);
}

#[test]
fn test_ceiling_is_a_hard_failure() {
    let pool = test_pool();
    let err = pool.allocate(11 * 1_048_576, 16).unwrap_err();
    match err {
        MemoryError::PoolExhausted { pool: name, max, .. } => {
            assert_eq!(name, "TestPool");
            assert_eq!(max, 10_485_760);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(pool.arena_count(), 1);
}

#[test]
fn test_blocks_tile_each_arena() {
    let pool = test_pool();
    let mut live = Vec::new();
    for i in 0..64 {
        live.push(pool.allocate(100 + i * 97, 1 << (i % 7)).unwrap());
    }
    for ptr in live.iter().step_by(3) {
        pool.deallocate(*ptr);
    }

    let blocks = pool.blocks();
    let mut covered = 0;
    for pair in blocks.windows(2) {
        if pair[0].arena == pair[1].arena {
            assert_eq!(pair[0].end(), pair[1].start);
            assert!(pair[0].used || pair[1].used, "adjacent free blocks after a free");
        }
    }
    for block in &blocks {
        covered += block.size;
    }
    assert_eq!(covered, pool.capacity());
}

#[test]
fn test_defragment_keeps_layout_when_coalesced() {
    let pool = test_pool();
    let a = pool.allocate(512, 16).unwrap();
    let _b = pool.allocate(512, 16).unwrap();
    pool.deallocate(a);

    let before = pool.blocks();
    assert_eq!(pool.defragment(), 0);
    assert_eq!(pool.blocks(), before);
}

#[test]
fn test_block_info_serializes() {
    let pool = test_pool();
    let _ptr = pool.allocate(64, 16).unwrap();
    let json = serde_json::to_string(&pool.blocks()).unwrap();
    assert!(json.contains("\"used\":true"));
    assert!(json.contains("\"used\":false"));
}
