/*!
 * Memory Traits
 * Allocator abstraction shared by pools, stacks and the system fallback
 */

use super::types::{MemoryResult, MemoryStats};
use crate::core::types::Size;
use std::ptr::NonNull;

/// Memory allocator interface
///
/// Every method takes `&self`; implementations guard their own state so a
/// single handle can be shared across threads behind an `Arc`.
pub trait Allocator: Send + Sync {
    /// Allocate `size` bytes aligned to `alignment` (a power of two)
    fn allocate(&self, size: Size, alignment: Size) -> MemoryResult<NonNull<u8>>;

    /// Release memory previously returned by `allocate`
    ///
    /// Unknown pointers and double frees are absorbed.
    fn deallocate(&self, ptr: NonNull<u8>);

    /// Resize an allocation, moving it if needed
    fn reallocate(&self, ptr: NonNull<u8>, new_size: Size) -> MemoryResult<NonNull<u8>>;

    /// Usable size of the allocation containing `ptr`
    fn block_size(&self, ptr: NonNull<u8>) -> Option<Size>;

    /// Whether `ptr` falls inside memory this allocator manages
    fn owns(&self, ptr: NonNull<u8>) -> bool;

    fn stats(&self) -> MemoryStats;

    /// Drop every allocation at once
    fn reset(&self);

    fn name(&self) -> &str;

    /// False for allocators that only release in bulk
    fn releases_individually(&self) -> bool {
        true
    }

    /// Whether this allocator keeps the shared tracker current itself
    fn is_tracked(&self) -> bool {
        false
    }
}
