/*!
 * Alignment Math
 * Power-of-two helpers shared by every allocator
 */

use super::types::{MemoryError, MemoryResult};
use crate::core::types::{Address, Size};
use std::ptr::NonNull;

/// True for non-zero powers of two
#[inline]
pub fn is_power_of_two(value: Size) -> bool {
    value != 0 && (value & (value - 1)) == 0
}

/// Smallest power of two `>= value`; `1` for zero, `0` when the result would overflow
#[inline]
pub fn next_power_of_two(value: Size) -> Size {
    if value == 0 {
        return 1;
    }
    value.checked_next_power_of_two().unwrap_or(0)
}

/// Bytes needed to round `size` up to a multiple of `alignment`
#[inline]
pub fn alignment_padding(size: Size, alignment: Size) -> Size {
    if alignment == 0 {
        return 0;
    }
    let remainder = size % alignment;
    if remainder == 0 {
        0
    } else {
        alignment - remainder
    }
}

/// Round `address` up to `alignment` (a power of two), `None` on overflow
#[inline]
pub fn align_up(address: Address, alignment: Size) -> Option<Address> {
    let mask = alignment - 1;
    address.checked_add(mask).map(|bumped| bumped & !mask)
}

/// Reject zero sizes and non power-of-two alignments
#[inline]
pub fn validate_request(size: Size, alignment: Size) -> MemoryResult<()> {
    if size == 0 {
        return Err(MemoryError::ZeroSize);
    }
    if !is_power_of_two(alignment) {
        return Err(MemoryError::InvalidAlignment(alignment));
    }
    Ok(())
}

#[inline]
pub(crate) fn address_of(ptr: NonNull<u8>) -> Address {
    ptr.as_ptr() as Address
}

/// Turn an address handed out by an allocator back into a pointer
#[inline]
pub(crate) fn pointer_at(address: Address) -> MemoryResult<NonNull<u8>> {
    NonNull::new(address as *mut u8).ok_or(MemoryError::ForeignPointer(address))
}
