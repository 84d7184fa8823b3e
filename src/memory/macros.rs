/*!
 * Tracked Allocation Macros
 * Call-site capturing wrappers around the manager facade
 */

/// Allocate through a `MemoryManager`, recording `file!()`/`line!()` with the tag
///
/// Alignment defaults to 8 and the tag to `""`.
#[macro_export]
macro_rules! tracked_allocate {
    ($manager:expr, $size:expr) => {
        $crate::tracked_allocate!(
            $manager,
            $size,
            $crate::core::limits::DEFAULT_ALLOC_ALIGNMENT,
            ""
        )
    };
    ($manager:expr, $size:expr, $alignment:expr) => {
        $crate::tracked_allocate!($manager, $size, $alignment, "")
    };
    ($manager:expr, $size:expr, $alignment:expr, $tag:expr) => {
        $manager.allocate_at(
            $size,
            $alignment,
            $tag,
            ::core::option::Option::Some($crate::core::types::SourceLocation::new(
                file!(),
                line!(),
            )),
        )
    };
}

/// Release a pointer through a `MemoryManager`
#[macro_export]
macro_rules! tracked_deallocate {
    ($manager:expr, $ptr:expr) => {
        $manager.deallocate($ptr)
    };
}

/// Resize a pointer through a `MemoryManager`
#[macro_export]
macro_rules! tracked_reallocate {
    ($manager:expr, $ptr:expr, $new_size:expr) => {
        $manager.reallocate($ptr, $new_size)
    };
}
