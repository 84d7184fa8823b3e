/*!
 * Allocator Dispatch
 * Immutable snapshot of the facade's allocators and their probe order
 */

use super::super::pool::MemoryPool;
use super::super::stack::StackAllocator;
use super::super::system::SystemAllocator;
use super::super::traits::Allocator;
use std::ptr::NonNull;
use std::sync::Arc;

/// One generation of the facade's allocator collections
///
/// Never mutated in place: create/destroy build a new set and publish it,
/// so the hot path reads a consistent chain without locking.
#[derive(Clone)]
pub(super) struct AllocatorSet {
    pub default_pool: Option<Arc<MemoryPool>>,
    pub pools: Vec<Arc<MemoryPool>>,
    pub stacks: Vec<Arc<StackAllocator>>,
    system: Arc<SystemAllocator>,
    /// default pool -> auxiliary pools -> stacks -> system
    chain: Vec<Arc<dyn Allocator>>,
}

impl AllocatorSet {
    pub fn new(system: Arc<SystemAllocator>) -> Self {
        Self::assemble(None, Vec::new(), Vec::new(), system)
    }

    fn assemble(
        default_pool: Option<Arc<MemoryPool>>,
        pools: Vec<Arc<MemoryPool>>,
        stacks: Vec<Arc<StackAllocator>>,
        system: Arc<SystemAllocator>,
    ) -> Self {
        let mut chain: Vec<Arc<dyn Allocator>> = Vec::with_capacity(pools.len() + stacks.len() + 2);
        if let Some(pool) = &default_pool {
            chain.push(Arc::clone(pool) as Arc<dyn Allocator>);
        }
        chain.extend(pools.iter().map(|pool| Arc::clone(pool) as Arc<dyn Allocator>));
        chain.extend(stacks.iter().map(|stack| Arc::clone(stack) as Arc<dyn Allocator>));
        chain.push(Arc::clone(&system) as Arc<dyn Allocator>);

        Self {
            default_pool,
            pools,
            stacks,
            system,
            chain,
        }
    }

    pub fn with_default_pool(&self, default_pool: Option<Arc<MemoryPool>>) -> Self {
        Self::assemble(
            default_pool,
            self.pools.clone(),
            self.stacks.clone(),
            Arc::clone(&self.system),
        )
    }

    pub fn with_pools(&self, pools: Vec<Arc<MemoryPool>>) -> Self {
        Self::assemble(
            self.default_pool.clone(),
            pools,
            self.stacks.clone(),
            Arc::clone(&self.system),
        )
    }

    pub fn with_stacks(&self, stacks: Vec<Arc<StackAllocator>>) -> Self {
        Self::assemble(
            self.default_pool.clone(),
            self.pools.clone(),
            stacks,
            Arc::clone(&self.system),
        )
    }

    /// First allocator in probe order that owns `ptr`
    pub fn owner_of(&self, ptr: NonNull<u8>) -> Option<&dyn Allocator> {
        self.chain
            .iter()
            .map(|allocator| allocator.as_ref())
            .find(|allocator| allocator.owns(ptr))
    }

    #[cfg(test)]
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }
}
