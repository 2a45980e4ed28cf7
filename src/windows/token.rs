//! Access token privileges

use std::mem::size_of;
use std::ptr;
use winapi::shared::minwindef::LPVOID;
use winapi::shared::ntdef::LUID;
use winapi::shared::winerror::ERROR_SUCCESS;
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::processthreadsapi::{GetCurrentProcess, OpenProcessToken};
use winapi::um::securitybaseapi::{AdjustTokenPrivileges, GetTokenInformation};
use winapi::um::winbase::LookupPrivilegeValueW;
use winapi::um::winnt::{
    TokenElevation, HANDLE, LUID_AND_ATTRIBUTES, SE_PRIVILEGE_ENABLED, TOKEN_ADJUST_PRIVILEGES,
    TOKEN_ELEVATION, TOKEN_PRIVILEGES, TOKEN_QUERY,
};

use super::handle::OwnedHandle;

/// Enable `name` (e.g. `SeDebugPrivilege`) on the current process token.
///
/// Fails with `ERROR_NOT_ALL_ASSIGNED` when the token does not hold the
/// privilege at all, which is the usual non-admin case.
pub fn enable_privilege(name: &str) -> Result<(), u32> {
    let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();

    unsafe {
        let mut luid = LUID { LowPart: 0, HighPart: 0 };
        if LookupPrivilegeValueW(ptr::null(), wide.as_ptr(), &mut luid) == 0 {
            return Err(GetLastError());
        }

        let token = open_process_token(TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY)?;

        let mut privileges = TOKEN_PRIVILEGES {
            PrivilegeCount: 1,
            Privileges: [LUID_AND_ATTRIBUTES {
                Luid: luid,
                Attributes: SE_PRIVILEGE_ENABLED,
            }],
        };

        if AdjustTokenPrivileges(
            token.raw(),
            0,
            &mut privileges,
            0,
            ptr::null_mut(),
            ptr::null_mut(),
        ) == 0
        {
            return Err(GetLastError());
        }

        // Success with ERROR_NOT_ALL_ASSIGNED means nothing was enabled.
        match GetLastError() {
            ERROR_SUCCESS => Ok(()),
            code => Err(code),
        }
    }
}

/// Whether the process runs with an elevated (administrator) token.
pub fn is_elevated() -> bool {
    let Ok(token) = open_process_token(TOKEN_QUERY) else {
        return false;
    };

    let mut elevation = TOKEN_ELEVATION { TokenIsElevated: 0 };
    let mut returned = 0u32;
    let ok = unsafe {
        GetTokenInformation(
            token.raw(),
            TokenElevation,
            &mut elevation as *mut TOKEN_ELEVATION as LPVOID,
            size_of::<TOKEN_ELEVATION>() as u32,
            &mut returned,
        )
    };
    ok != 0 && elevation.TokenIsElevated != 0
}

fn open_process_token(access: u32) -> Result<OwnedHandle, u32> {
    unsafe {
        let mut raw: HANDLE = ptr::null_mut();
        if OpenProcessToken(GetCurrentProcess(), access, &mut raw) == 0 {
            return Err(GetLastError());
        }
        OwnedHandle::new(raw).ok_or_else(|| GetLastError())
    }
}
