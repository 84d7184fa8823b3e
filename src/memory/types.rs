/*!
 * Memory Types
 * Common types for memory management
 */

use crate::core::limits::{
    DEFAULT_POOL_ALIGNMENT, DEFAULT_POOL_BLOCK_SIZE, DEFAULT_POOL_INITIAL_SIZE,
    DEFAULT_POOL_MAX_SIZE, DEFAULT_POOL_NAME,
};
use crate::core::types::{Address, Size, SourceLocation};
use log::warn;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::SystemTime;
use thiserror::Error;

/// Memory operation result
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Zero-sized allocation requested")]
    ZeroSize,

    #[error("Invalid alignment {0}: must be a non-zero power of two")]
    InvalidAlignment(usize),

    #[error("Pool '{pool}' exhausted: requested {requested} bytes, {capacity} bytes mapped, ceiling {max} bytes")]
    PoolExhausted {
        pool: String,
        requested: usize,
        capacity: usize,
        max: usize,
    },

    #[error("Alignment error: no block holds {size} bytes at alignment {alignment}")]
    AlignmentError { size: usize, alignment: usize },

    #[error("Stack allocator exhausted: requested {requested} bytes (+{padding} padding), {used} of {capacity} bytes used")]
    StackExhausted {
        requested: usize,
        padding: usize,
        used: usize,
        capacity: usize,
    },

    #[error("Failed to map {size} byte arena: {reason}")]
    MapFailed { size: usize, reason: String },

    #[error("System allocator refused {size} bytes at alignment {alignment}")]
    SystemOutOfMemory { size: usize, alignment: usize },

    #[error("Address 0x{0:x} is not owned by any allocator")]
    ForeignPointer(Address),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),
}

impl MemoryError {
    /// Whether the error means "out of room" rather than a malformed request
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            MemoryError::PoolExhausted { .. }
                | MemoryError::AlignmentError { .. }
                | MemoryError::StackExhausted { .. }
                | MemoryError::MapFailed { .. }
                | MemoryError::SystemOutOfMemory { .. }
        )
    }
}

/// Memory statistics
///
/// Counters accumulate until `reset()`; `current_usage` and `peak_usage` are
/// gauges over requested bytes. `fragmentation` is a percentage and is only
/// filled in by pools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_allocated: Size,
    pub total_freed: Size,
    pub peak_usage: Size,
    pub current_usage: Size,
    pub allocation_count: usize,
    pub deallocation_count: usize,
    pub fragmentation: usize,
}

impl MemoryStats {
    pub fn record_allocation(&mut self, size: Size) {
        self.total_allocated += size;
        self.current_usage += size;
        self.allocation_count += 1;
        if self.current_usage > self.peak_usage {
            self.peak_usage = self.current_usage;
        }
    }

    pub fn record_deallocation(&mut self, size: Size) {
        self.total_freed += size;
        self.current_usage = self.current_usage.saturating_sub(size);
        self.deallocation_count += 1;
    }

    /// Account for a live allocation changing size without changing the counts
    pub fn record_resize(&mut self, old_size: Size, new_size: Size) {
        if new_size >= old_size {
            let grown = new_size - old_size;
            self.total_allocated += grown;
            self.current_usage += grown;
            if self.current_usage > self.peak_usage {
                self.peak_usage = self.current_usage;
            }
        } else {
            let shrunk = old_size - new_size;
            self.total_freed += shrunk;
            self.current_usage = self.current_usage.saturating_sub(shrunk);
        }
    }

    /// Allocations issued and not yet released
    pub fn live_allocations(&self) -> usize {
        self.allocation_count.saturating_sub(self.deallocation_count)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One live allocation known to the tracker
#[derive(Debug, Clone, Serialize)]
pub struct AllocationRecord {
    pub address: Address,
    pub size: Size,
    pub alignment: Size,
    pub tag: String,
    pub location: Option<SourceLocation>,
    pub timestamp: SystemTime,
}

impl AllocationRecord {
    pub fn new(
        address: Address,
        size: Size,
        alignment: Size,
        tag: &str,
        location: Option<SourceLocation>,
    ) -> Self {
        Self {
            address,
            size,
            alignment,
            tag: tag.to_string(),
            location,
            timestamp: SystemTime::now(),
        }
    }
}

/// Snapshot of one pool block, for debugging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Base address of the arena holding the block
    pub arena: Address,
    pub start: Address,
    pub size: Size,
    pub used: bool,
}

impl BlockInfo {
    pub fn end(&self) -> Address {
        self.start + self.size
    }
}

/// Memory pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Bytes mapped when the pool is created (0 maps lazily on first use)
    pub initial_size: Size,
    /// Ceiling on bytes mapped across all arenas
    pub max_size: Size,
    /// Growth granularity and minimum remainder worth splitting off
    pub block_size: Size,
    /// Minimum alignment applied to every allocation
    pub alignment: Size,
    /// Register allocations with the tracker
    pub tracking_enabled: bool,
    pub name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: DEFAULT_POOL_INITIAL_SIZE,
            max_size: DEFAULT_POOL_MAX_SIZE,
            block_size: DEFAULT_POOL_BLOCK_SIZE,
            alignment: DEFAULT_POOL_ALIGNMENT,
            tracking_enabled: true,
            name: DEFAULT_POOL_NAME.to_string(),
        }
    }
}

impl PoolConfig {
    pub fn new(
        initial_size: Size,
        max_size: Size,
        block_size: Size,
        alignment: Size,
        tracking_enabled: bool,
        name: impl Into<String>,
    ) -> Self {
        Self {
            initial_size,
            max_size,
            block_size,
            alignment,
            tracking_enabled,
            name: name.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_initial_size(mut self, initial_size: Size) -> Self {
        self.initial_size = initial_size;
        self
    }

    pub fn with_max_size(mut self, max_size: Size) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_block_size(mut self, block_size: Size) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_alignment(mut self, alignment: Size) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_tracking(mut self, enabled: bool) -> Self {
        self.tracking_enabled = enabled;
        self
    }

    /// Default configuration with `VF_POOL_*` environment overrides applied
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        env_override("VF_POOL_INITIAL_SIZE", &mut config.initial_size);
        env_override("VF_POOL_MAX_SIZE", &mut config.max_size);
        env_override("VF_POOL_BLOCK_SIZE", &mut config.block_size);
        env_override("VF_POOL_ALIGNMENT", &mut config.alignment);
        env_override("VF_POOL_TRACKING", &mut config.tracking_enabled);
        config
    }

    pub fn validate(&self) -> MemoryResult<()> {
        if self.block_size == 0 {
            return Err(MemoryError::InvalidConfig(format!(
                "pool '{}' has a zero block size",
                self.name
            )));
        }
        if !super::align::is_power_of_two(self.alignment) {
            return Err(MemoryError::InvalidConfig(format!(
                "pool '{}' alignment {} is not a power of two",
                self.name, self.alignment
            )));
        }
        if self.initial_size > self.max_size {
            return Err(MemoryError::InvalidConfig(format!(
                "pool '{}' initial size {} exceeds ceiling {}",
                self.name, self.initial_size, self.max_size
            )));
        }
        Ok(())
    }
}

fn env_override<T: FromStr>(key: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => warn!("Ignoring {}={:?}: not a valid value", key, raw),
        }
    }
}
