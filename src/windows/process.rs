//! Windows process enumeration and working-set trimming

use sysinfo::{ProcessesToUpdate, System};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::processthreadsapi::OpenProcess;
use winapi::um::psapi::EmptyWorkingSet;
use winapi::um::winnt::{PROCESS_QUERY_INFORMATION, PROCESS_SET_QUOTA};

use super::handle::OwnedHandle;
use crate::platform::{ProcessEntry, TrimError};

/// List all processes with their names
pub fn list_processes() -> Vec<ProcessEntry> {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    sys.processes()
        .iter()
        .map(|(pid, p)| ProcessEntry::new(pid.as_u32(), p.name().to_string_lossy()))
        .collect()
}

/// Remove as many pages as possible from the working set of `pid`.
///
/// The handle is closed before returning, whatever the outcome.
pub fn empty_working_set(pid: u32) -> Result<(), TrimError> {
    unsafe {
        let raw = OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_SET_QUOTA, 0, pid);
        let handle = OwnedHandle::new(raw).ok_or_else(|| TrimError::Open(GetLastError()))?;

        if EmptyWorkingSet(handle.raw()) == 0 {
            return Err(TrimError::Trim(GetLastError()));
        }
        Ok(())
    }
}
