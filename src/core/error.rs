//! Error types for the reclaim engine

use std::fmt;
use thiserror::Error;

use super::areas::MemoryArea;

/// Why a single reclaim leg failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReclaimError {
    #[error("{area} is not supported on this operating system")]
    UnsupportedOnThisOs { area: MemoryArea },

    #[error("unable to enable {privilege}")]
    PrivilegeDenied { privilege: &'static str },

    #[error("{call} failed with code {code:#010X}")]
    NativeCallFailed { call: &'static str, code: u32 },

    #[error("unable to empty the working set of: {}", join_failures(.failures))]
    PerProcessTrimFailed { failures: Vec<ProcessTrimFailure> },

    #[error("reclaim task aborted: {reason}")]
    LegAborted { reason: String },
}

/// A process whose working set could not be emptied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTrimFailure {
    pub pid: u32,
    pub name: String,
    pub code: u32,
}

impl fmt::Display for ProcessTrimFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): error {}", self.name, self.pid, self.code)
    }
}

fn join_failures(failures: &[ProcessTrimFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors returned by [`crate::MemoryOptimizer::optimize`] itself.
///
/// Leg failures never surface here; they are reported per area.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("an optimization is already in progress")]
    Busy,
}
