//! Native call layer for the reclaim engine
//!
//! The engine never talks to the operating system directly. Every privileged
//! call goes through the [`MemoryControl`] trait, which the platform modules
//! implement:
//!
//! ```text
//! +-------------------+
//! |  MemoryOptimizer  |  <- core (legs, capability filter, snapshots)
//! +-------------------+
//!          |
//!    MemoryControl
//!          |
//!    +-----+------+
//!    |            |
//! +--v--+    +----v-----+
//! | Win |    | Fallback |  <- src/windows/, src/platform/fallback.rs
//! +-----+    +----------+
//! ```
//!
//! Import [`NativeControl`] and it resolves to the implementation for the
//! target platform.

use std::fmt;

use crate::core::capabilities::OsVersion;
use crate::core::control_block::{ControlBlock, SystemInformationClass};
use crate::core::snapshot::MemorySnapshot;

#[cfg(not(windows))]
pub mod fallback;

#[cfg(test)]
pub(crate) mod fake;

/// Win32 `ERROR_ACCESS_DENIED`.
pub const ERROR_ACCESS_DENIED: u32 = 5;

/// Win32 `ERROR_INVALID_PARAMETER`; `OpenProcess` returns it for a pid that
/// no longer exists.
pub const ERROR_INVALID_PARAMETER: u32 = 87;

/// Win32 `ERROR_NOT_SUPPORTED`.
pub const ERROR_NOT_SUPPORTED: u32 = 50;

/// Step of a working-set trim that failed, with its Win32 code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimError {
    /// `OpenProcess`
    Open(u32),
    /// `EmptyWorkingSet`
    Trim(u32),
}

impl TrimError {
    pub fn code(self) -> u32 {
        match self {
            TrimError::Open(code) | TrimError::Trim(code) => code,
        }
    }
}

/// Raw `NTSTATUS` returned by the native API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtStatus(pub i32);

impl NtStatus {
    pub const SUCCESS: NtStatus = NtStatus(0);
    /// `STATUS_PRIVILEGE_NOT_HELD`
    pub const PRIVILEGE_NOT_HELD: NtStatus = NtStatus(0xC000_0061_u32 as i32);
    /// `STATUS_NOT_IMPLEMENTED`
    pub const NOT_IMPLEMENTED: NtStatus = NtStatus(0xC000_0002_u32 as i32);

    /// Success and informational codes are non-negative.
    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// The status bits as an unsigned code.
    pub fn code(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010X}", self.code())
    }
}

/// A live process as seen by the enumeration call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
}

impl ProcessEntry {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self { pid, name: name.into() }
    }
}

/// Privileged memory-management primitives of the host operating system.
///
/// Errors are raw OS codes; translating them into [`crate::ReclaimError`]
/// is the job of the reclaim legs.
pub trait MemoryControl: Send + Sync + 'static {
    /// Raw version of the running operating system.
    fn os_version(&self) -> OsVersion;

    /// Whether the operating system is 64-bit.
    fn is_64bit_os(&self) -> bool;

    /// Whether the current token is elevated (administrator).
    fn is_elevated(&self) -> bool;

    /// Enable `privilege` on the current process token.
    fn enable_privilege(&self, privilege: &str) -> Result<(), u32>;

    /// `NtSetSystemInformation`. The block is read in place for the
    /// duration of the call.
    fn set_system_information(
        &self,
        class: SystemInformationClass,
        block: &ControlBlock,
    ) -> NtStatus;

    /// `SetSystemFileCacheSize(minimum, maximum, 0)`.
    fn set_system_file_cache_size(&self, minimum: usize, maximum: usize) -> Result<(), u32>;

    /// Snapshot of live processes.
    fn processes(&self) -> Vec<ProcessEntry>;

    /// Open `pid`, empty its working set, close the handle.
    fn empty_working_set(&self, pid: u32) -> Result<(), TrimError>;

    /// One memory-status query.
    fn memory_status(&self) -> Result<MemorySnapshot, u32>;
}

#[cfg(windows)]
pub type NativeControl = crate::windows::WindowsMemoryControl;

#[cfg(not(windows))]
pub type NativeControl = fallback::FallbackMemoryControl;

/// Returns the current platform name
pub fn platform_name() -> &'static str {
    if cfg!(windows) {
        "windows"
    } else {
        std::env::consts::OS
    }
}

/// Format bytes into a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}
