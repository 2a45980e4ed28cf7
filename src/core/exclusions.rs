//! Processes that are never trimmed

use std::collections::HashSet;

/// Process names excluded from working-set trimming.
///
/// Matching is case-insensitive and ignores a trailing `.exe`, so
/// `Chrome`, `chrome.exe` and `CHROME.EXE` are the same entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessExclusionList {
    names: HashSet<String>,
}

impl ProcessExclusionList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| normalize(name.as_ref()))
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    pub fn is_excluded(&self, process_name: &str) -> bool {
        self.names.contains(&normalize(process_name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn normalize(name: &str) -> String {
    let name = name.trim().to_lowercase();
    match name.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => name,
    }
}
