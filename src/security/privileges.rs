//! Privilege management
//!
//! Token privileges are process-global: once enabled they stay enabled until
//! the process exits, so the elevator remembers what it already enabled and
//! never asks the OS twice.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::core::error::ReclaimError;
use crate::platform::MemoryControl;

/// Token privileges the reclaim legs depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    /// Page list purges and page combining
    ProfileSingleProcess,
    /// Opening other processes to empty their working sets
    Debug,
    /// Adjusting the system file cache working set
    IncreaseQuota,
}

impl Privilege {
    /// Name as understood by `LookupPrivilegeValue`.
    pub fn name(&self) -> &'static str {
        match self {
            Privilege::ProfileSingleProcess => "SeProfileSingleProcessPrivilege",
            Privilege::Debug => "SeDebugPrivilege",
            Privilege::IncreaseQuota => "SeIncreaseQuotaPrivilege",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Enables privileges on the current process token.
pub struct PrivilegeElevator<C> {
    control: Arc<C>,
    enabled: Mutex<HashSet<Privilege>>,
    last_error: AtomicU32,
}

impl<C: MemoryControl> PrivilegeElevator<C> {
    pub fn new(control: Arc<C>) -> Self {
        Self {
            control,
            enabled: Mutex::new(HashSet::new()),
            last_error: AtomicU32::new(0),
        }
    }

    /// Enable `privilege`. Returns `false` and records the OS error code
    /// when the lookup or the token adjustment fails.
    pub fn elevate(&self, privilege: Privilege) -> bool {
        let mut enabled = self.enabled.lock().unwrap_or_else(|e| e.into_inner());
        if enabled.contains(&privilege) {
            return true;
        }

        match self.control.enable_privilege(privilege.name()) {
            Ok(()) => {
                info!("Enabled {}", privilege);
                enabled.insert(privilege);
                true
            }
            Err(code) => {
                warn!("Unable to enable {} (error {})", privilege, code);
                self.last_error.store(code, Ordering::Relaxed);
                false
            }
        }
    }

    /// [`PrivilegeElevator::elevate`] as a leg gate.
    pub fn require(&self, privilege: Privilege) -> Result<(), ReclaimError> {
        if self.elevate(privilege) {
            debug!("{} held", privilege);
            Ok(())
        } else {
            Err(ReclaimError::PrivilegeDenied { privilege: privilege.name() })
        }
    }

    pub fn is_enabled(&self, privilege: Privilege) -> bool {
        self.enabled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&privilege)
    }

    /// OS error code of the most recent failed elevation.
    pub fn last_error(&self) -> Option<u32> {
        match self.last_error.load(Ordering::Relaxed) {
            0 => None,
            code => Some(code),
        }
    }
}
