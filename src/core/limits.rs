/*!
 * System Limits and Constants
 *
 * Centralized location for memory subsystem defaults and thresholds.
 *
 * ## Design Philosophy
 * - Values are grouped by allocator
 * - Performance-critical constants are marked with [PERF]
 * - Environment overrides are listed next to the value they replace
 */

// =============================================================================
// POOL DEFAULTS
// =============================================================================

/// Initial arena mapped for a pool (1MB)
/// Override: VF_POOL_INITIAL_SIZE
pub const DEFAULT_POOL_INITIAL_SIZE: usize = 1024 * 1024;

/// Ceiling on the bytes a pool may map across all its arenas (100MB)
/// Override: VF_POOL_MAX_SIZE
pub const DEFAULT_POOL_MAX_SIZE: usize = 100 * 1024 * 1024;

/// Growth granularity and minimum split remainder (4KB)
/// [PERF] Aligned with common page size
/// Override: VF_POOL_BLOCK_SIZE
pub const DEFAULT_POOL_BLOCK_SIZE: usize = 4 * 1024;

/// Minimum alignment applied to every pool allocation (16 bytes)
/// Override: VF_POOL_ALIGNMENT
pub const DEFAULT_POOL_ALIGNMENT: usize = 16;

/// Name given to pools built from the default configuration
pub const DEFAULT_POOL_NAME: &str = "DefaultPool";

// =============================================================================
// ALLOCATION DEFAULTS
// =============================================================================

/// Alignment used when a caller does not specify one
pub const DEFAULT_ALLOC_ALIGNMENT: usize = 8;

/// Page size assumed when mapping arenas without an OS page allocator
pub const FALLBACK_PAGE_SIZE: usize = 4096;

// =============================================================================
// TRACKING
// =============================================================================

/// Tag given to records created by a reallocation of an untracked pointer
pub const REALLOC_TAG: &str = "realloc";

/// Name reported by stack allocators
pub const STACK_ALLOCATOR_NAME: &str = "StackAllocator";

/// Name reported by the platform fallback allocator
pub const SYSTEM_ALLOCATOR_NAME: &str = "System";
