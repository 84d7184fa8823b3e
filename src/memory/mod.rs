/*!
 * Memory Module
 * Pooled, stack and tracked allocation for the engine
 */

pub mod align;
pub mod arena;
mod macros;
pub mod manager;
pub mod pool;
pub mod stack;
pub mod system;
pub mod tracker;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use arena::Arena;
pub use manager::MemoryManager;
pub use pool::MemoryPool;
pub use stack::{StackAllocator, StackMarker};
pub use system::SystemAllocator;
pub use tracker::MemoryTracker;
pub use traits::*;
pub use types::*;
