//! memreclaim
//!
//! Reclaims physical memory held by the Windows memory manager through the
//! same privileged calls the kernel exposes to system tools.
//!
//! ## Areas
//!
//! - **Standby List**: cached pages, optionally only the low-priority ones
//! - **Modified Page List**: dirty pages waiting to be written out
//! - **Combined Page List**: identical pages merged across processes
//! - **Processes Working Set**: resident pages of every non-excluded process
//! - **System Working Set**: the system file cache
//!
//! ## Safety
//!
//! - Every area is gated on the detected OS version and bitness
//! - Privileges are enabled per area; a denied privilege only fails its own area
//! - Excluded processes are never touched
//! - Only one optimization runs at a time
//!
//! ```ignore
//! use memreclaim::{MemoryAreaSet, MemoryOptimizer, ProcessExclusionList};
//!
//! let optimizer = MemoryOptimizer::native();
//! let report = optimizer
//!     .optimize(MemoryAreaSet::default(), &ProcessExclusionList::default())
//!     .await?;
//! println!("Freed {} bytes", report.freed_bytes());
//! ```

pub mod core;
pub mod platform;
pub mod security;
#[cfg(windows)]
pub mod windows;

// Re-exports
pub use crate::core::areas::{MemoryArea, MemoryAreaSet};
pub use crate::core::capabilities::{OperatingSystemCapabilities, OsVersion};
pub use crate::core::config::{ConfigError, OptimizerConfig};
pub use crate::core::error::{OptimizeError, ProcessTrimFailure, ReclaimError};
pub use crate::core::exclusions::ProcessExclusionList;
pub use crate::core::optimizer::{MemoryOptimizer, OptimizationOutcome, OptimizationReport};
pub use crate::core::snapshot::{MemorySnapshot, MemorySnapshotReader};
pub use crate::platform::{format_bytes, MemoryControl, NativeControl, TrimError};
pub use crate::security::privileges::{Privilege, PrivilegeElevator};
