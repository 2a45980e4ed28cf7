//! Operating system capability detection
//!
//! Every reclaim leg is gated on a flag from [`OperatingSystemCapabilities`].
//! The record is derived once from the raw OS version and bitness and is
//! never re-derived per call.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::areas::{MemoryArea, MemoryAreaSet};

/// Raw `major.minor.build` version reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

impl OsVersion {
    pub const WINDOWS_XP: OsVersion = OsVersion::new(5, 1, 0);
    pub const WINDOWS_VISTA: OsVersion = OsVersion::new(6, 0, 0);
    pub const WINDOWS_8: OsVersion = OsVersion::new(6, 2, 0);

    pub const fn new(major: u32, minor: u32, build: u32) -> Self {
        Self { major, minor, build }
    }

    /// Compares major and minor only.
    pub fn is_at_least(&self, other: OsVersion) -> bool {
        (self.major, self.minor) >= (other.major, other.minor)
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Which reclaim regions and control-block layouts the running OS supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperatingSystemCapabilities {
    pub is_64bit: bool,
    pub is_vista_or_above: bool,
    pub is_windows8_or_above: bool,
    pub has_combined_page_list: bool,
    pub has_modified_page_list: bool,
    pub has_processes_working_set: bool,
    pub has_standby_list: bool,
    pub has_system_working_set: bool,
}

impl OperatingSystemCapabilities {
    /// Derive the capability record. Pure; no OS calls.
    pub fn probe(version: OsVersion, is_64bit: bool) -> Self {
        let is_xp_or_above = version.is_at_least(OsVersion::WINDOWS_XP);
        let is_vista_or_above = version.is_at_least(OsVersion::WINDOWS_VISTA);
        let is_windows8_or_above = version.is_at_least(OsVersion::WINDOWS_8);

        Self {
            is_64bit,
            is_vista_or_above,
            is_windows8_or_above,
            has_combined_page_list: is_windows8_or_above,
            has_modified_page_list: is_vista_or_above,
            has_processes_working_set: is_xp_or_above,
            has_standby_list: is_vista_or_above,
            has_system_working_set: is_xp_or_above,
        }
    }

    /// The low-priority purge command only exists from Windows 8 on.
    pub fn has_standby_list_low_priority(&self) -> bool {
        self.has_standby_list && self.is_windows8_or_above
    }

    pub fn supports(&self, area: MemoryArea) -> bool {
        match area {
            MemoryArea::CombinedPageList => self.has_combined_page_list,
            MemoryArea::ModifiedPageList => self.has_modified_page_list,
            MemoryArea::ProcessesWorkingSet => self.has_processes_working_set,
            MemoryArea::StandbyList => self.has_standby_list,
            MemoryArea::StandbyListLowPriority => self.has_standby_list_low_priority(),
            MemoryArea::SystemWorkingSet => self.has_system_working_set,
        }
    }

    /// Every area this OS can reclaim.
    pub fn supported_areas(&self) -> MemoryAreaSet {
        MemoryArea::ALL
            .iter()
            .filter(|area| self.supports(**area))
            .fold(MemoryAreaSet::empty(), |set, area| set | MemoryAreaSet::from(*area))
    }

    /// Requested areas intersected with the supported ones.
    pub fn filter(&self, requested: MemoryAreaSet) -> MemoryAreaSet {
        requested & self.supported_areas()
    }
}
