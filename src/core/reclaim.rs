//! The five reclaim procedures
//!
//! Each leg follows the same shape: capability gate, privilege gate, build the
//! control block, one native call, translate a failure status. Legs share only
//! the read-only [`EngineContext`], so they can run concurrently.

use std::sync::Arc;
use tracing::{debug, info};

use super::areas::MemoryArea;
use super::capabilities::OperatingSystemCapabilities;
use super::control_block::{
    ControlBlock, MemoryListCommand, SystemInformationClass, FILE_CACHE_FLUSH_SIZE,
};
use super::error::{ProcessTrimFailure, ReclaimError};
use super::exclusions::ProcessExclusionList;
use crate::platform::{MemoryControl, TrimError, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER};
use crate::security::privileges::{Privilege, PrivilegeElevator};

/// State built once at engine start and handed to every leg.
pub struct EngineContext<C> {
    capabilities: OperatingSystemCapabilities,
    control: Arc<C>,
    elevator: PrivilegeElevator<C>,
}

impl<C: MemoryControl> EngineContext<C> {
    /// Probe the OS through `control` and wrap the result.
    pub fn new(control: Arc<C>) -> Self {
        let capabilities =
            OperatingSystemCapabilities::probe(control.os_version(), control.is_64bit_os());
        Self::with_capabilities(control, capabilities)
    }

    pub fn with_capabilities(control: Arc<C>, capabilities: OperatingSystemCapabilities) -> Self {
        Self {
            capabilities,
            elevator: PrivilegeElevator::new(control.clone()),
            control,
        }
    }

    pub fn capabilities(&self) -> &OperatingSystemCapabilities {
        &self.capabilities
    }

    pub fn control(&self) -> &Arc<C> {
        &self.control
    }

    pub fn elevator(&self) -> &PrivilegeElevator<C> {
        &self.elevator
    }

    fn gate(&self, area: MemoryArea) -> Result<(), ReclaimError> {
        if self.capabilities.supports(area) {
            Ok(())
        } else {
            Err(ReclaimError::UnsupportedOnThisOs { area })
        }
    }

    fn set_system_information(
        &self,
        class: SystemInformationClass,
        block: &ControlBlock,
    ) -> Result<(), ReclaimError> {
        let status = self.control.set_system_information(class, block);
        if status.is_success() {
            Ok(())
        } else {
            Err(ReclaimError::NativeCallFailed {
                call: "NtSetSystemInformation",
                code: status.code(),
            })
        }
    }
}

/// One unit of dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimLeg {
    ProcessesWorkingSet,
    SystemWorkingSet,
    ModifiedPageList,
    StandbyList { low_priority: bool },
    CombinedPageList,
}

impl ReclaimLeg {
    pub fn area(&self) -> MemoryArea {
        match self {
            ReclaimLeg::ProcessesWorkingSet => MemoryArea::ProcessesWorkingSet,
            ReclaimLeg::SystemWorkingSet => MemoryArea::SystemWorkingSet,
            ReclaimLeg::ModifiedPageList => MemoryArea::ModifiedPageList,
            ReclaimLeg::StandbyList { low_priority: false } => MemoryArea::StandbyList,
            ReclaimLeg::StandbyList { low_priority: true } => MemoryArea::StandbyListLowPriority,
            ReclaimLeg::CombinedPageList => MemoryArea::CombinedPageList,
        }
    }

    pub fn run<C: MemoryControl>(
        &self,
        ctx: &EngineContext<C>,
        exclusions: &ProcessExclusionList,
    ) -> Result<(), ReclaimError> {
        match self {
            ReclaimLeg::ProcessesWorkingSet => optimize_processes_working_set(ctx, exclusions),
            ReclaimLeg::SystemWorkingSet => optimize_system_working_set(ctx),
            ReclaimLeg::ModifiedPageList => optimize_modified_page_list(ctx),
            ReclaimLeg::StandbyList { low_priority } => optimize_standby_list(ctx, *low_priority),
            ReclaimLeg::CombinedPageList => optimize_combined_page_list(ctx),
        }
    }
}

/// Merge identical physical pages across the system.
pub fn optimize_combined_page_list<C: MemoryControl>(
    ctx: &EngineContext<C>,
) -> Result<(), ReclaimError> {
    ctx.gate(MemoryArea::CombinedPageList)?;
    ctx.elevator.require(Privilege::ProfileSingleProcess)?;

    let block = ControlBlock::combine_information_ex(ctx.capabilities.is_64bit);
    ctx.set_system_information(SystemInformationClass::CombinePhysicalMemoryInformation, &block)
}

/// Write the modified page list out so its pages become reusable.
pub fn optimize_modified_page_list<C: MemoryControl>(
    ctx: &EngineContext<C>,
) -> Result<(), ReclaimError> {
    ctx.gate(MemoryArea::ModifiedPageList)?;
    ctx.elevator.require(Privilege::ProfileSingleProcess)?;

    let block = ControlBlock::memory_list_command(MemoryListCommand::FlushModifiedList);
    ctx.set_system_information(SystemInformationClass::MemoryListInformation, &block)
}

/// Purge the standby list, or only its low-priority pages.
pub fn optimize_standby_list<C: MemoryControl>(
    ctx: &EngineContext<C>,
    low_priority: bool,
) -> Result<(), ReclaimError> {
    let (area, command) = if low_priority {
        (MemoryArea::StandbyListLowPriority, MemoryListCommand::PurgeLowPriorityStandbyList)
    } else {
        (MemoryArea::StandbyList, MemoryListCommand::PurgeStandbyList)
    };
    ctx.gate(area)?;
    ctx.elevator.require(Privilege::ProfileSingleProcess)?;

    let block = ControlBlock::memory_list_command(command);
    ctx.set_system_information(SystemInformationClass::MemoryListInformation, &block)
}

/// Empty the working set of every live process not on the exclusion list.
///
/// Access denied is expected for protected processes and is not reported,
/// nor is a process that exited before it could be opened.
pub fn optimize_processes_working_set<C: MemoryControl>(
    ctx: &EngineContext<C>,
    exclusions: &ProcessExclusionList,
) -> Result<(), ReclaimError> {
    ctx.gate(MemoryArea::ProcessesWorkingSet)?;
    ctx.elevator.require(Privilege::Debug)?;

    let mut failures = Vec::new();
    let mut trimmed = 0usize;

    for process in ctx.control.processes() {
        if exclusions.is_excluded(&process.name) {
            debug!("Skipping excluded process {} ({})", process.name, process.pid);
            continue;
        }

        match ctx.control.empty_working_set(process.pid) {
            Ok(()) => trimmed += 1,
            Err(TrimError::Open(ERROR_ACCESS_DENIED))
            | Err(TrimError::Trim(ERROR_ACCESS_DENIED)) => {}
            Err(TrimError::Open(ERROR_INVALID_PARAMETER)) => {
                debug!("Process {} ({}) exited", process.name, process.pid);
            }
            Err(error) => failures.push(ProcessTrimFailure {
                pid: process.pid,
                name: process.name,
                code: error.code(),
            }),
        }
    }

    info!("Emptied working sets of {} processes", trimmed);

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ReclaimError::PerProcessTrimFailed { failures })
    }
}

/// Flush the system file cache working set.
pub fn optimize_system_working_set<C: MemoryControl>(
    ctx: &EngineContext<C>,
) -> Result<(), ReclaimError> {
    ctx.gate(MemoryArea::SystemWorkingSet)?;
    ctx.elevator.require(Privilege::IncreaseQuota)?;

    let block = ControlBlock::system_cache_information(ctx.capabilities.is_64bit);
    ctx.set_system_information(SystemInformationClass::FileCacheInformation, &block)?;

    ctx.control
        .set_system_file_cache_size(FILE_CACHE_FLUSH_SIZE, FILE_CACHE_FLUSH_SIZE)
        .map_err(|code| ReclaimError::NativeCallFailed {
            call: "SetSystemFileCacheSize",
            code,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capabilities::OsVersion;
    use crate::core::control_block::cache_offsets;
    use crate::platform::fake::FakeControl;
    use crate::platform::{NtStatus, ProcessEntry};

    fn context(control: FakeControl) -> (Arc<FakeControl>, EngineContext<FakeControl>) {
        let control = Arc::new(control);
        let ctx = EngineContext::new(control.clone());
        (control, ctx)
    }

    #[test]
    fn test_standby_list_sends_purge_command() {
        let (control, ctx) = context(FakeControl::windows10());
        optimize_standby_list(&ctx, false).unwrap();

        let calls = control.system_information_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, SystemInformationClass::MemoryListInformation);
        assert_eq!(calls[0].1, vec![4, 0, 0, 0]);
    }

    #[test]
    fn test_low_priority_standby_command() {
        let (control, ctx) = context(FakeControl::windows10());
        optimize_standby_list(&ctx, true).unwrap();
        assert_eq!(control.system_information_calls()[0].1, vec![5, 0, 0, 0]);
    }

    #[test]
    fn test_low_priority_standby_unsupported_before_windows_8() {
        let (control, ctx) = context(FakeControl::new(OsVersion::new(6, 1, 7601), true));
        let err = optimize_standby_list(&ctx, true).unwrap_err();
        assert_eq!(
            err,
            ReclaimError::UnsupportedOnThisOs { area: MemoryArea::StandbyListLowPriority }
        );
        assert!(control.system_information_calls().is_empty());
    }

    #[test]
    fn test_modified_page_list_command() {
        let (control, ctx) = context(FakeControl::windows10());
        optimize_modified_page_list(&ctx).unwrap();
        assert_eq!(control.system_information_calls()[0].1, vec![3, 0, 0, 0]);
    }

    #[test]
    fn test_combined_page_list_native_failure() {
        let (control, ctx) = context(FakeControl::windows10());
        control.fail_system_information(
            SystemInformationClass::CombinePhysicalMemoryInformation,
            NtStatus::NOT_IMPLEMENTED,
        );
        let err = optimize_combined_page_list(&ctx).unwrap_err();
        assert_eq!(
            err,
            ReclaimError::NativeCallFailed { call: "NtSetSystemInformation", code: 0xC000_0002 }
        );
    }

    #[test]
    fn test_combined_page_list_unsupported_on_windows_7() {
        let (_, ctx) = context(FakeControl::new(OsVersion::new(6, 1, 7601), true));
        assert!(matches!(
            optimize_combined_page_list(&ctx),
            Err(ReclaimError::UnsupportedOnThisOs { area: MemoryArea::CombinedPageList })
        ));
    }

    #[test]
    fn test_per_process_aggregation() {
        let control = FakeControl::windows10().with_processes(vec![
            ProcessEntry::new(100, "alpha.exe"),
            ProcessEntry::new(200, "bravo.exe"),
            ProcessEntry::new(300, "charlie.exe"),
        ]);
        control.fail_working_set(200, ERROR_ACCESS_DENIED);
        control.fail_working_set(300, 87);
        let (control, ctx) = context(control);

        let err = optimize_processes_working_set(&ctx, &ProcessExclusionList::default())
            .unwrap_err();
        match &err {
            ReclaimError::PerProcessTrimFailed { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].name, "charlie.exe");
                assert_eq!(failures[0].code, 87);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let msg = err.to_string();
        assert!(msg.contains("charlie.exe"));
        assert!(!msg.contains("alpha.exe"));
        assert!(!msg.contains("bravo.exe"));

        assert_eq!(control.working_set_requests(), vec![100, 200, 300]);
    }

    #[test]
    fn test_exited_process_is_not_a_failure() {
        let control = FakeControl::windows10().with_processes(vec![
            ProcessEntry::new(100, "alpha.exe"),
            ProcessEntry::new(200, "gone.exe"),
            ProcessEntry::new(300, "charlie.exe"),
        ]);
        control.fail_open_process(200, ERROR_INVALID_PARAMETER);
        control.fail_open_process(300, 6);
        let (_, ctx) = context(control);

        let err = optimize_processes_working_set(&ctx, &ProcessExclusionList::default())
            .unwrap_err();
        assert_eq!(
            err,
            ReclaimError::PerProcessTrimFailed {
                failures: vec![ProcessTrimFailure {
                    pid: 300,
                    name: "charlie.exe".into(),
                    code: 6,
                }],
            }
        );
    }

    #[test]
    fn test_all_processes_gone_or_protected_succeeds() {
        let control = FakeControl::windows10().with_processes(vec![
            ProcessEntry::new(4, "system"),
            ProcessEntry::new(500, "short.exe"),
        ]);
        control.fail_open_process(4, ERROR_ACCESS_DENIED);
        control.fail_open_process(500, ERROR_INVALID_PARAMETER);
        let (_, ctx) = context(control);

        assert!(optimize_processes_working_set(&ctx, &ProcessExclusionList::default()).is_ok());
    }

    #[test]
    fn test_excluded_processes_are_not_touched() {
        let control = FakeControl::windows10().with_processes(vec![
            ProcessEntry::new(1, "game.exe"),
            ProcessEntry::new(2, "notepad.exe"),
        ]);
        let (control, ctx) = context(control);

        optimize_processes_working_set(&ctx, &ProcessExclusionList::new(["Game"])).unwrap();
        assert_eq!(control.working_set_requests(), vec![2]);
    }

    #[test]
    fn test_processes_working_set_needs_debug_privilege() {
        let control = FakeControl::windows10().with_processes(vec![ProcessEntry::new(1, "a.exe")]);
        control.deny_privilege("SeDebugPrivilege", 1300);
        let (control, ctx) = context(control);

        let err = optimize_processes_working_set(&ctx, &ProcessExclusionList::default())
            .unwrap_err();
        assert_eq!(err, ReclaimError::PrivilegeDenied { privilege: "SeDebugPrivilege" });
        assert!(control.working_set_requests().is_empty());
    }

    #[test]
    fn test_system_working_set_64bit_layout() {
        let (control, ctx) = context(FakeControl::windows10());
        optimize_system_working_set(&ctx).unwrap();

        let calls = control.system_information_calls();
        assert_eq!(calls[0].0, SystemInformationClass::FileCacheInformation);
        let block = &calls[0].1;
        assert_eq!(block.len(), 72);
        let min = i64::from_le_bytes(
            block[cache_offsets::MINIMUM_WORKING_SET_64..][..8].try_into().unwrap(),
        );
        let max = i64::from_le_bytes(
            block[cache_offsets::MAXIMUM_WORKING_SET_64..][..8].try_into().unwrap(),
        );
        assert_eq!((min, max), (-1, -1));

        assert_eq!(
            control.file_cache_calls(),
            vec![(FILE_CACHE_FLUSH_SIZE, FILE_CACHE_FLUSH_SIZE)]
        );
    }

    #[test]
    fn test_system_working_set_32bit_layout() {
        let (control, ctx) = context(FakeControl::new(OsVersion::new(10, 0, 19045), false));
        optimize_system_working_set(&ctx).unwrap();

        let block = &control.system_information_calls()[0].1;
        assert_eq!(block.len(), 36);
        let min = u32::from_le_bytes(
            block[cache_offsets::MINIMUM_WORKING_SET_32..][..4].try_into().unwrap(),
        );
        let max = u32::from_le_bytes(
            block[cache_offsets::MAXIMUM_WORKING_SET_32..][..4].try_into().unwrap(),
        );
        assert_eq!((min, max), (u32::MAX, u32::MAX));
    }

    #[test]
    fn test_system_working_set_requires_file_cache_reset() {
        let (control, ctx) = context(FakeControl::windows10());
        control.fail_file_cache(1314);
        let err = optimize_system_working_set(&ctx).unwrap_err();
        assert_eq!(
            err,
            ReclaimError::NativeCallFailed { call: "SetSystemFileCacheSize", code: 1314 }
        );
    }

    #[test]
    fn test_system_working_set_skips_reset_when_first_call_fails() {
        let (control, ctx) = context(FakeControl::windows10());
        control.fail_system_information(
            SystemInformationClass::FileCacheInformation,
            NtStatus::PRIVILEGE_NOT_HELD,
        );
        assert!(optimize_system_working_set(&ctx).is_err());
        assert!(control.file_cache_calls().is_empty());
    }

    #[test]
    fn test_leg_areas() {
        assert_eq!(
            ReclaimLeg::StandbyList { low_priority: true }.area(),
            MemoryArea::StandbyListLowPriority
        );
        assert_eq!(ReclaimLeg::CombinedPageList.area(), MemoryArea::CombinedPageList);
    }
}
