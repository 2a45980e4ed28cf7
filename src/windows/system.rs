//! OS version and bitness

use std::mem::size_of;
use tracing::warn;
use winapi::shared::minwindef::BOOL;
use winapi::um::processthreadsapi::GetCurrentProcess;
use winapi::um::winnt::OSVERSIONINFOW;
use winapi::um::wow64apiset::IsWow64Process;

use crate::core::capabilities::OsVersion;

#[link(name = "ntdll")]
extern "system" {
    fn RtlGetVersion(version_information: *mut OSVERSIONINFOW) -> i32;
}

/// Real kernel version; unlike `GetVersionEx` it ignores compatibility shims.
pub fn os_version() -> OsVersion {
    unsafe {
        let mut info: OSVERSIONINFOW = std::mem::zeroed();
        info.dwOSVersionInfoSize = size_of::<OSVERSIONINFOW>() as u32;

        let status = RtlGetVersion(&mut info);
        if status < 0 {
            warn!("RtlGetVersion failed with status {:#010X}", status as u32);
            return OsVersion::default();
        }

        OsVersion::new(info.dwMajorVersion, info.dwMinorVersion, info.dwBuildNumber)
    }
}

/// A 32-bit process on a 64-bit OS runs under WOW64.
pub fn is_64bit_os() -> bool {
    if cfg!(target_pointer_width = "64") {
        return true;
    }

    let mut wow64: BOOL = 0;
    unsafe { IsWow64Process(GetCurrentProcess(), &mut wow64) != 0 && wow64 != 0 }
}
