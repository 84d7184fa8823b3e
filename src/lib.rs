/*!
 * VaporFrame Memory Library
 * Engine memory subsystem exposed as a library
 */

pub mod core;
pub mod memory;
pub mod monitoring;

// Re-exports
pub use crate::core::types::{Address, Size, SourceLocation};
pub use memory::{
    Allocator, MemoryError, MemoryManager, MemoryPool, MemoryResult, MemoryStats, MemoryTracker,
    PoolConfig, StackAllocator, StackMarker, SystemAllocator,
};
