/*!
 * Property Tests
 * Randomized allocation sequences against pool and stack invariants
 */

use proptest::prelude::*;
use std::ptr::NonNull;
use vaporframe_memory::memory::{Allocator, MemoryPool, PoolConfig, StackAllocator};

#[derive(Debug, Clone)]
enum Op {
    Allocate { size: usize, align_shift: u32 },
    Free { pick: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1usize..6000, 0u32..9).prop_map(|(size, align_shift)| Op::Allocate { size, align_shift }),
        2 => any::<usize>().prop_map(|pick| Op::Free { pick }),
    ]
}

fn small_pool() -> MemoryPool {
    MemoryPool::new(PoolConfig::new(64 * 1024, 4 * 1024 * 1024, 4096, 16, false, "PropPool"))
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any allocate/free sequence keeps the arenas tiled and the stats exact.
    #[test]
    fn pool_invariants_hold(ops in prop::collection::vec(op_strategy(), 1..120)) {
        let pool = small_pool();
        let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();

        for op in ops {
            match op {
                Op::Allocate { size, align_shift } => {
                    let alignment = 1usize << align_shift;
                    if let Ok(ptr) = pool.allocate(size, alignment) {
                        prop_assert_eq!(ptr.as_ptr() as usize % alignment, 0);
                        prop_assert!(pool.owns(ptr));
                        live.push((ptr, size));
                    }
                }
                Op::Free { pick } => {
                    if !live.is_empty() {
                        let (ptr, _) = live.swap_remove(pick % live.len());
                        pool.deallocate(ptr);
                    }
                }
            }

            let stats = pool.stats();
            let live_bytes: usize = live.iter().map(|(_, size)| size).sum();
            prop_assert_eq!(stats.current_usage, live_bytes);
            prop_assert_eq!(stats.live_allocations(), live.len());
        }

        // tiling: contiguous within an arena, total equals mapped capacity
        let blocks = pool.blocks();
        for pair in blocks.windows(2) {
            if pair[0].arena == pair[1].arena {
                prop_assert_eq!(pair[0].end(), pair[1].start);
                prop_assert!(pair[0].used || pair[1].used);
            }
        }
        let covered: usize = blocks.iter().map(|block| block.size).sum();
        prop_assert_eq!(covered, pool.capacity());

        // live allocations never overlap
        let mut spans: Vec<(usize, usize)> = live
            .iter()
            .map(|(ptr, size)| (ptr.as_ptr() as usize, *size))
            .collect();
        spans.sort_unstable();
        for pair in spans.windows(2) {
            prop_assert!(pair[0].0 + pair[0].1 <= pair[1].0);
        }

        for (ptr, _) in live {
            pool.deallocate(ptr);
        }
        prop_assert_eq!(pool.stats().current_usage, 0);
        // every arena coalesced back into a single free block
        prop_assert_eq!(pool.block_count(), pool.arena_count());
    }

    /// Rewinding to any earlier marker restores that marker's offset exactly.
    #[test]
    fn stack_rewind_restores_offset(
        sizes in prop::collection::vec((1usize..512, 0u32..7), 1..40),
        cut in any::<usize>(),
    ) {
        let stack = StackAllocator::new(64 * 1024).unwrap();
        let mut markers = vec![stack.marker()];

        for (size, align_shift) in sizes {
            let ptr = stack.allocate(size, 1 << align_shift).unwrap();
            prop_assert_eq!(ptr.as_ptr() as usize % (1 << align_shift), 0);
            markers.push(stack.marker());
        }

        let target = markers[cut % markers.len()];
        stack.free_to_marker(target);
        prop_assert_eq!(stack.current_offset(), target.offset());

        let live = stack.stats().live_allocations();
        prop_assert_eq!(live, cut % markers.len());
    }
}
