//! Memory snapshot reading with last-known-good fallback

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::platform::MemoryControl;

/// Physical (and page file) memory counters at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MemorySnapshot {
    /// Total physical memory in bytes
    pub total_physical: u64,
    /// Available physical memory in bytes
    pub available_physical: u64,
    /// Available share of physical memory (0-100)
    pub free_percentage: f64,
    /// Commit limit in bytes
    pub total_page_file: u64,
    /// Commit still available in bytes
    pub available_page_file: u64,
}

impl MemorySnapshot {
    pub fn new(
        total_physical: u64,
        available_physical: u64,
        total_page_file: u64,
        available_page_file: u64,
    ) -> Self {
        let available_physical = available_physical.min(total_physical);
        let free_percentage = if total_physical > 0 {
            available_physical as f64 / total_physical as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total_physical,
            available_physical,
            free_percentage,
            total_page_file,
            available_page_file,
        }
    }

    pub fn used_physical(&self) -> u64 {
        self.total_physical.saturating_sub(self.available_physical)
    }

    pub fn used_percentage(&self) -> f64 {
        if self.total_physical == 0 {
            0.0
        } else {
            100.0 - self.free_percentage
        }
    }

    pub fn used_page_file(&self) -> u64 {
        self.total_page_file.saturating_sub(self.available_page_file)
    }
}

/// Reads memory status; never fails.
pub struct MemorySnapshotReader<C> {
    control: Arc<C>,
    last_good: Mutex<MemorySnapshot>,
}

impl<C: MemoryControl> MemorySnapshotReader<C> {
    pub fn new(control: Arc<C>) -> Self {
        Self {
            control,
            last_good: Mutex::new(MemorySnapshot::default()),
        }
    }

    /// One memory-status query. On failure the last successful snapshot
    /// is returned (zeroed if there never was one).
    pub fn read(&self) -> MemorySnapshot {
        match self.control.memory_status() {
            Ok(snapshot) => {
                debug!(
                    "Memory: {} of {} bytes available ({:.1}% free)",
                    snapshot.available_physical, snapshot.total_physical, snapshot.free_percentage
                );
                *self.lock() = snapshot;
                snapshot
            }
            Err(code) => {
                warn!("Memory status query failed (error {}), using last snapshot", code);
                *self.lock()
            }
        }
    }

    /// The most recent successful snapshot without querying the OS.
    pub fn last(&self) -> MemorySnapshot {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemorySnapshot> {
        // A poisoned snapshot is still a valid snapshot.
        self.last_good.lock().unwrap_or_else(|e| e.into_inner())
    }
}
