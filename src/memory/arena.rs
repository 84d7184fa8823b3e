/*!
 * Arenas
 * Anonymous page mappings backing pools and stack allocators
 *
 * An arena is mapped once, never moves, and is unmapped when dropped. Its
 * owner is the only thing that hands out addresses inside it.
 */

use super::types::{MemoryError, MemoryResult};
use crate::core::types::{Address, Size};
use log::debug;
use std::ptr::NonNull;

/// Contiguous OS-mapped byte range
#[derive(Debug)]
pub struct Arena {
    base: NonNull<u8>,
    len: Size,
}

// SAFETY: the mapping is exclusively owned by this value and only ever
// accessed through addresses its owning allocator hands out under a lock.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Map `len` zeroed, read-write bytes
    pub fn map(len: Size) -> MemoryResult<Self> {
        if len == 0 {
            return Err(MemoryError::ZeroSize);
        }
        let base = platform::map(len)?;
        debug!("Mapped {} byte arena at 0x{:x}", len, base.as_ptr() as Address);
        Ok(Self { base, len })
    }

    #[inline]
    pub fn base(&self) -> Address {
        self.base.as_ptr() as Address
    }

    #[inline]
    pub fn end(&self) -> Address {
        self.base() + self.len
    }

    #[inline]
    pub fn len(&self) -> Size {
        self.len
    }

    #[inline]
    pub fn contains(&self, address: Address) -> bool {
        address >= self.base() && address < self.end()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        debug!("Unmapping {} byte arena at 0x{:x}", self.len, self.base());
        // SAFETY: base/len describe exactly the mapping created in `map`
        unsafe { platform::unmap(self.base, self.len) }
    }
}

#[cfg(unix)]
mod platform {
    use super::super::types::{MemoryError, MemoryResult};
    use crate::core::types::Size;
    use log::error;
    use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
    use std::num::NonZeroUsize;
    use std::ptr::NonNull;

    pub(super) fn map(len: Size) -> MemoryResult<NonNull<u8>> {
        let length = NonZeroUsize::new(len).ok_or(MemoryError::ZeroSize)?;
        // SAFETY: a fresh private anonymous mapping aliases no existing memory
        let mapped = unsafe {
            mmap_anonymous(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_PRIVATE,
            )
        };
        match mapped {
            Ok(ptr) => Ok(ptr.cast::<u8>()),
            Err(errno) => {
                error!("mmap of {} bytes failed: {}", len, errno);
                Err(MemoryError::MapFailed {
                    size: len,
                    reason: errno.to_string(),
                })
            }
        }
    }

    pub(super) unsafe fn unmap(base: NonNull<u8>, len: Size) {
        if let Err(errno) = munmap(base.cast(), len) {
            error!(
                "munmap of {} bytes at {:p} failed: {}",
                len,
                base.as_ptr(),
                errno
            );
        }
    }
}

#[cfg(not(unix))]
mod platform {
    use super::super::types::{MemoryError, MemoryResult};
    use crate::core::limits::FALLBACK_PAGE_SIZE;
    use crate::core::types::Size;
    use std::alloc::{alloc_zeroed, dealloc, Layout};
    use std::ptr::NonNull;

    fn layout(len: Size) -> MemoryResult<Layout> {
        Layout::from_size_align(len, FALLBACK_PAGE_SIZE).map_err(|e| MemoryError::MapFailed {
            size: len,
            reason: e.to_string(),
        })
    }

    pub(super) fn map(len: Size) -> MemoryResult<NonNull<u8>> {
        let layout = layout(len)?;
        // SAFETY: layout has a non-zero size
        let ptr = unsafe { alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or_else(|| MemoryError::MapFailed {
            size: len,
            reason: "page allocation refused".to_string(),
        })
    }

    pub(super) unsafe fn unmap(base: NonNull<u8>, len: Size) {
        if let Ok(layout) = layout(len) {
            dealloc(base.as_ptr(), layout);
        }
    }
}
