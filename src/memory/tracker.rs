/*!
 * Memory Tracker
 * Allocator-independent table of live allocations
 *
 * Pools and the manager facade report into one shared tracker. Each address
 * maps to exactly one record: a second registration of a live address
 * refreshes the record (size, tag, location) instead of counting twice, and
 * a deallocation of an unknown address is ignored.
 */

use super::types::{AllocationRecord, MemoryStats};
use crate::core::limits::{DEFAULT_ALLOC_ALIGNMENT, REALLOC_TAG};
use crate::core::types::{Address, Size, SourceLocation};
use ahash::AHashMap;
use log::{debug, info};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct TrackerState {
    allocations: AHashMap<Address, AllocationRecord>,
    stats: MemoryStats,
}

/// Live allocation table plus aggregate counters
#[derive(Debug)]
pub struct MemoryTracker {
    enabled: AtomicBool,
    state: Mutex<TrackerState>,
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Toggle tracking at runtime; while disabled every `track_*` call is a no-op
    pub fn set_tracking_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        info!(
            "Memory tracking {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    #[inline]
    pub fn is_tracking_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Register a live allocation, or refresh the record already held for `address`
    ///
    /// An empty `tag` or a missing `location` keeps whatever the existing record had.
    pub fn track_allocation(
        &self,
        address: Address,
        size: Size,
        alignment: Size,
        tag: &str,
        location: Option<SourceLocation>,
    ) {
        if !self.is_tracking_enabled() {
            return;
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        match state.allocations.get_mut(&address) {
            Some(record) => {
                let previous = record.size;
                record.size = size;
                record.alignment = alignment;
                if !tag.is_empty() {
                    record.tag = tag.to_string();
                }
                if location.is_some() {
                    record.location = location;
                }
                state.stats.record_resize(previous, size);
            }
            None => {
                state.allocations.insert(
                    address,
                    AllocationRecord::new(address, size, alignment, tag, location),
                );
                state.stats.record_allocation(size);
                debug!("Tracking {} bytes at 0x{:x} [{}]", size, address, tag);
            }
        }
    }

    pub fn track_deallocation(&self, address: Address) {
        if !self.is_tracking_enabled() {
            return;
        }

        let mut state = self.state.lock();
        if let Some(record) = state.allocations.remove(&address) {
            state.stats.record_deallocation(record.size);
            debug!("Untracked {} bytes at 0x{:x}", record.size, address);
        }
    }

    /// Move a record to its new address, keeping its tag
    ///
    /// Resizes never change the allocation/deallocation counts. A reallocation
    /// of an untracked address starts a fresh record tagged `"realloc"`.
    pub fn track_reallocation(&self, old_address: Address, new_address: Address, new_size: Size) {
        if !self.is_tracking_enabled() {
            return;
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(mut record) = state.allocations.remove(&old_address) {
            let previous = record.size;
            record.address = new_address;
            record.size = new_size;
            if let Some(stale) = state.allocations.insert(new_address, record) {
                state.stats.record_deallocation(stale.size);
            }
            state.stats.record_resize(previous, new_size);
        } else if let Some(record) = state.allocations.get_mut(&new_address) {
            let previous = record.size;
            record.size = new_size;
            state.stats.record_resize(previous, new_size);
        } else {
            state.allocations.insert(
                new_address,
                AllocationRecord::new(
                    new_address,
                    new_size,
                    DEFAULT_ALLOC_ALIGNMENT,
                    REALLOC_TAG,
                    None,
                ),
            );
            state.stats.record_allocation(new_size);
        }
    }

    pub fn global_stats(&self) -> MemoryStats {
        self.state.lock().stats
    }

    /// Snapshot of every live record, in address order
    pub fn active_allocations(&self) -> Vec<AllocationRecord> {
        let state = self.state.lock();
        let mut records: Vec<AllocationRecord> = state.allocations.values().cloned().collect();
        records.sort_by_key(|record| record.address);
        records
    }

    /// Allocations still live at the point of asking
    pub fn leaked_allocations(&self) -> Vec<AllocationRecord> {
        self.active_allocations()
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().allocations.len()
    }

    /// Forget every record and zero the counters
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.allocations.clear();
        state.stats.reset();
    }

    pub fn stats_report(&self) -> String {
        let (stats, active) = {
            let state = self.state.lock();
            (state.stats, state.allocations.len())
        };

        let mut out = String::new();
        let _ = writeln!(out, "=== Memory Statistics ===");
        let _ = writeln!(out, "Total Allocated: {} bytes", stats.total_allocated);
        let _ = writeln!(out, "Total Freed: {} bytes", stats.total_freed);
        let _ = writeln!(out, "Current Usage: {} bytes", stats.current_usage);
        let _ = writeln!(out, "Peak Usage: {} bytes", stats.peak_usage);
        let _ = writeln!(out, "Allocation Count: {}", stats.allocation_count);
        let _ = writeln!(out, "Deallocation Count: {}", stats.deallocation_count);
        let _ = writeln!(out, "Active Allocations: {}", active);
        let _ = writeln!(out, "========================");
        out
    }

    pub fn leak_report(&self) -> String {
        let leaks = self.leaked_allocations();
        if leaks.is_empty() {
            return "No memory leaks detected!\n".to_string();
        }

        let mut out = String::new();
        let _ = writeln!(out, "=== Memory Leaks Detected ===");
        let _ = writeln!(out, "Total leaks: {}", leaks.len());
        for leak in &leaks {
            let _ = write!(out, "Leak: 0x{:x} ({} bytes)", leak.address, leak.size);
            if !leak.tag.is_empty() {
                let _ = write!(out, " - {}", leak.tag);
            }
            if let Some(location) = leak.location {
                let _ = write!(out, " at {}", location);
            }
            out.push('\n');
        }
        let _ = writeln!(out, "============================");
        out
    }

    pub fn dump_stats(&self) {
        println!("\n{}", self.stats_report());
    }

    pub fn dump_leaks(&self) {
        println!("{}", self.leak_report());
    }
}
