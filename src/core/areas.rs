//! Memory regions the engine can reclaim

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

bitflags! {
    /// Set of memory areas selected for optimization.
    ///
    /// `STANDBY_LIST` and `STANDBY_LIST_LOW_PRIORITY` are mutually exclusive;
    /// use [`MemoryAreaSet::select`] to keep that invariant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct MemoryAreaSet: u32 {
        const COMBINED_PAGE_LIST = 1 << 0;
        const MODIFIED_PAGE_LIST = 1 << 1;
        const PROCESSES_WORKING_SET = 1 << 2;
        const STANDBY_LIST = 1 << 3;
        const STANDBY_LIST_LOW_PRIORITY = 1 << 4;
        const SYSTEM_WORKING_SET = 1 << 5;
    }
}

impl Default for MemoryAreaSet {
    fn default() -> Self {
        Self::all() - Self::STANDBY_LIST_LOW_PRIORITY
    }
}

impl MemoryAreaSet {
    /// Add `area`, clearing the standby variant it excludes.
    pub fn select(&mut self, area: MemoryArea) {
        match area {
            MemoryArea::StandbyList => self.remove(Self::STANDBY_LIST_LOW_PRIORITY),
            MemoryArea::StandbyListLowPriority => self.remove(Self::STANDBY_LIST),
            _ => {}
        }
        self.insert(area.into());
    }

    pub fn deselect(&mut self, area: MemoryArea) {
        self.remove(area.into());
    }

    /// Builder form of [`MemoryAreaSet::select`].
    pub fn with(mut self, area: MemoryArea) -> Self {
        self.select(area);
        self
    }

    pub fn contains_area(&self, area: MemoryArea) -> bool {
        self.contains(area.into())
    }

    /// Selected areas in declaration order.
    pub fn areas(&self) -> Vec<MemoryArea> {
        MemoryArea::ALL
            .iter()
            .copied()
            .filter(|area| self.contains_area(*area))
            .collect()
    }

    /// Parse a comma separated list such as `standby,modified`.
    ///
    /// Later entries win when both standby variants are listed.
    pub fn parse_list(list: &str) -> Result<Self, String> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .try_fold(Self::empty(), |set, name| Ok(set.with(name.parse()?)))
    }
}

impl From<MemoryArea> for MemoryAreaSet {
    fn from(area: MemoryArea) -> Self {
        match area {
            MemoryArea::CombinedPageList => Self::COMBINED_PAGE_LIST,
            MemoryArea::ModifiedPageList => Self::MODIFIED_PAGE_LIST,
            MemoryArea::ProcessesWorkingSet => Self::PROCESSES_WORKING_SET,
            MemoryArea::StandbyList => Self::STANDBY_LIST,
            MemoryArea::StandbyListLowPriority => Self::STANDBY_LIST_LOW_PRIORITY,
            MemoryArea::SystemWorkingSet => Self::SYSTEM_WORKING_SET,
        }
    }
}

/// A single reclaimable region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryArea {
    CombinedPageList,
    ModifiedPageList,
    ProcessesWorkingSet,
    StandbyList,
    StandbyListLowPriority,
    SystemWorkingSet,
}

impl MemoryArea {
    pub const ALL: [MemoryArea; 6] = [
        MemoryArea::CombinedPageList,
        MemoryArea::ModifiedPageList,
        MemoryArea::ProcessesWorkingSet,
        MemoryArea::StandbyList,
        MemoryArea::StandbyListLowPriority,
        MemoryArea::SystemWorkingSet,
    ];

    /// Short name used on the command line.
    pub fn key(&self) -> &'static str {
        match self {
            MemoryArea::CombinedPageList => "combined",
            MemoryArea::ModifiedPageList => "modified",
            MemoryArea::ProcessesWorkingSet => "processes",
            MemoryArea::StandbyList => "standby",
            MemoryArea::StandbyListLowPriority => "standby-low",
            MemoryArea::SystemWorkingSet => "system",
        }
    }
}

impl fmt::Display for MemoryArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryArea::CombinedPageList => "Combined Page List",
            MemoryArea::ModifiedPageList => "Modified Page List",
            MemoryArea::ProcessesWorkingSet => "Processes Working Set",
            MemoryArea::StandbyList => "Standby List",
            MemoryArea::StandbyListLowPriority => "Standby List (Low Priority)",
            MemoryArea::SystemWorkingSet => "System Working Set",
        };
        f.write_str(name)
    }
}

impl FromStr for MemoryArea {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace('_', "-");
        MemoryArea::ALL
            .iter()
            .copied()
            .find(|area| area.key() == key)
            .ok_or_else(|| {
                let known: Vec<_> = MemoryArea::ALL.iter().map(|a| a.key()).collect();
                format!("unknown memory area '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}
