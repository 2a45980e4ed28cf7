//! `MemoryControl` for operating systems without the Windows memory manager
//!
//! Reports no reclaim capabilities, so the optimizer never dispatches a leg;
//! memory and process information still come from `sysinfo`.

use sysinfo::{ProcessesToUpdate, System};

use super::{MemoryControl, NtStatus, ProcessEntry, TrimError, ERROR_NOT_SUPPORTED};
use crate::core::capabilities::OsVersion;
use crate::core::control_block::{ControlBlock, SystemInformationClass};
use crate::core::snapshot::MemorySnapshot;

#[derive(Debug, Default)]
pub struct FallbackMemoryControl;

impl FallbackMemoryControl {
    pub fn new() -> Self {
        Self
    }
}

impl MemoryControl for FallbackMemoryControl {
    fn os_version(&self) -> OsVersion {
        // No Windows generation is met, so every capability stays off.
        OsVersion::default()
    }

    fn is_64bit_os(&self) -> bool {
        cfg!(target_pointer_width = "64")
    }

    fn is_elevated(&self) -> bool {
        false
    }

    fn enable_privilege(&self, _privilege: &str) -> Result<(), u32> {
        Err(ERROR_NOT_SUPPORTED)
    }

    fn set_system_information(
        &self,
        _class: SystemInformationClass,
        _block: &ControlBlock,
    ) -> NtStatus {
        NtStatus::NOT_IMPLEMENTED
    }

    fn set_system_file_cache_size(&self, _minimum: usize, _maximum: usize) -> Result<(), u32> {
        Err(ERROR_NOT_SUPPORTED)
    }

    fn processes(&self) -> Vec<ProcessEntry> {
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        sys.processes()
            .iter()
            .map(|(pid, p)| ProcessEntry::new(pid.as_u32(), p.name().to_string_lossy()))
            .collect()
    }

    fn empty_working_set(&self, _pid: u32) -> Result<(), TrimError> {
        Err(TrimError::Open(ERROR_NOT_SUPPORTED))
    }

    fn memory_status(&self) -> Result<MemorySnapshot, u32> {
        let mut sys = System::new();
        sys.refresh_memory();
        if sys.total_memory() == 0 {
            return Err(ERROR_NOT_SUPPORTED);
        }
        Ok(MemorySnapshot::new(
            sys.total_memory(),
            sys.available_memory(),
            sys.total_swap(),
            sys.free_swap(),
        ))
    }
}
