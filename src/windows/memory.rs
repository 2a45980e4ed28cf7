//! Windows memory management with real Win32 / native APIs

use std::ffi::c_void;
use std::mem::size_of;
use tracing::info;
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::memoryapi::SetSystemFileCacheSize;
use winapi::um::sysinfoapi::{GlobalMemoryStatusEx, MEMORYSTATUSEX};

use super::{process, system, token};
use crate::core::capabilities::OsVersion;
use crate::core::control_block::{ControlBlock, SystemInformationClass};
use crate::core::snapshot::MemorySnapshot;
use crate::platform::{MemoryControl, NtStatus, ProcessEntry, TrimError};

#[link(name = "ntdll")]
extern "system" {
    fn NtSetSystemInformation(
        system_information_class: i32,
        system_information: *mut c_void,
        system_information_length: u32,
    ) -> i32;
}

/// `MemoryControl` backed by the running Windows kernel.
#[derive(Debug)]
pub struct WindowsMemoryControl {
    version: OsVersion,
    is_64bit: bool,
}

impl WindowsMemoryControl {
    pub fn new() -> Self {
        let version = system::os_version();
        let is_64bit = system::is_64bit_os();
        info!("Windows {} ({}-bit)", version, if is_64bit { 64 } else { 32 });
        Self { version, is_64bit }
    }
}

impl Default for WindowsMemoryControl {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryControl for WindowsMemoryControl {
    fn os_version(&self) -> OsVersion {
        self.version
    }

    fn is_64bit_os(&self) -> bool {
        self.is_64bit
    }

    fn is_elevated(&self) -> bool {
        token::is_elevated()
    }

    fn enable_privilege(&self, privilege: &str) -> Result<(), u32> {
        token::enable_privilege(privilege)
    }

    fn set_system_information(
        &self,
        class: SystemInformationClass,
        block: &ControlBlock,
    ) -> NtStatus {
        let bytes = block.as_bytes();
        // The kernel only reads the block; `bytes` stays borrowed until the
        // call returns.
        let status = unsafe {
            NtSetSystemInformation(
                class as i32,
                bytes.as_ptr() as *mut c_void,
                bytes.len() as u32,
            )
        };
        NtStatus(status)
    }

    fn set_system_file_cache_size(&self, minimum: usize, maximum: usize) -> Result<(), u32> {
        unsafe {
            if SetSystemFileCacheSize(minimum, maximum, 0) == 0 {
                Err(GetLastError())
            } else {
                Ok(())
            }
        }
    }

    fn processes(&self) -> Vec<ProcessEntry> {
        process::list_processes()
    }

    fn empty_working_set(&self, pid: u32) -> Result<(), TrimError> {
        process::empty_working_set(pid)
    }

    fn memory_status(&self) -> Result<MemorySnapshot, u32> {
        unsafe {
            let mut status: MEMORYSTATUSEX = std::mem::zeroed();
            status.dwLength = size_of::<MEMORYSTATUSEX>() as u32;

            if GlobalMemoryStatusEx(&mut status) == 0 {
                return Err(GetLastError());
            }

            Ok(MemorySnapshot::new(
                status.ullTotalPhys,
                status.ullAvailPhys,
                status.ullTotalPageFile,
                status.ullAvailPageFile,
            ))
        }
    }
}
