//! In-memory `MemoryControl` used by the unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use super::{MemoryControl, NtStatus, ProcessEntry, TrimError};
use crate::core::capabilities::OsVersion;
use crate::core::control_block::{ControlBlock, SystemInformationClass};
use crate::core::snapshot::MemorySnapshot;

const GB: u64 = 1024 * 1024 * 1024;

/// Bytes of available memory each successful reclaim call "frees".
const RECLAIM_STEP: u64 = 64 * 1024 * 1024;

#[derive(Default)]
struct State {
    processes: Vec<ProcessEntry>,
    denied_privileges: HashMap<String, u32>,
    privilege_requests: HashMap<String, usize>,
    failing_classes: HashMap<i32, NtStatus>,
    system_information_calls: Vec<(SystemInformationClass, Vec<u8>)>,
    failing_pids: HashMap<u32, TrimError>,
    working_set_requests: Vec<u32>,
    file_cache_error: Option<u32>,
    file_cache_panics: bool,
    file_cache_calls: Vec<(usize, usize)>,
    memory: MemorySnapshot,
    memory_error: Option<u32>,
}

pub struct FakeControl {
    version: OsVersion,
    is_64bit: bool,
    state: Mutex<State>,
    held: Mutex<bool>,
    released: Condvar,
    entered: AtomicBool,
    process_enumerations: AtomicUsize,
}

impl FakeControl {
    pub fn new(version: OsVersion, is_64bit: bool) -> Self {
        Self {
            version,
            is_64bit,
            state: Mutex::new(State {
                memory: MemorySnapshot::new(16 * GB, 4 * GB, 24 * GB, 12 * GB),
                ..Default::default()
            }),
            held: Mutex::new(false),
            released: Condvar::new(),
            entered: AtomicBool::new(false),
            process_enumerations: AtomicUsize::new(0),
        }
    }

    pub fn windows10() -> Self {
        Self::new(OsVersion::new(10, 0, 19045), true)
    }

    pub fn with_processes(self, processes: Vec<ProcessEntry>) -> Self {
        self.state().processes = processes;
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn deny_privilege(&self, name: &str, code: u32) {
        self.state().denied_privileges.insert(name.to_string(), code);
    }

    pub fn privilege_requests(&self, name: &str) -> usize {
        self.state().privilege_requests.get(name).copied().unwrap_or(0)
    }

    pub fn fail_system_information(&self, class: SystemInformationClass, status: NtStatus) {
        self.state().failing_classes.insert(class as i32, status);
    }

    pub fn system_information_calls(&self) -> Vec<(SystemInformationClass, Vec<u8>)> {
        self.state().system_information_calls.clone()
    }

    pub fn fail_working_set(&self, pid: u32, code: u32) {
        self.state().failing_pids.insert(pid, TrimError::Trim(code));
    }

    pub fn fail_open_process(&self, pid: u32, code: u32) {
        self.state().failing_pids.insert(pid, TrimError::Open(code));
    }

    /// Every pid `empty_working_set` was called for, in call order.
    pub fn working_set_requests(&self) -> Vec<u32> {
        self.state().working_set_requests.clone()
    }

    pub fn process_enumerations(&self) -> usize {
        self.process_enumerations.load(Ordering::SeqCst)
    }

    pub fn fail_file_cache(&self, code: u32) {
        self.state().file_cache_error = Some(code);
    }

    /// Make `set_system_file_cache_size` panic, as a crashing driver call would.
    pub fn panic_on_file_cache(&self) {
        self.state().file_cache_panics = true;
    }

    pub fn file_cache_calls(&self) -> Vec<(usize, usize)> {
        self.state().file_cache_calls.clone()
    }

    pub fn set_memory(&self, snapshot: MemorySnapshot) {
        let mut state = self.state();
        state.memory = snapshot;
        state.memory_error = None;
    }

    pub fn fail_memory_status(&self, code: u32) {
        self.state().memory_error = Some(code);
    }

    /// Make every `set_system_information` call block until [`release`].
    ///
    /// [`release`]: FakeControl::release
    pub fn hold(&self) {
        *self.held.lock().unwrap() = true;
    }

    pub fn release(&self) {
        *self.held.lock().unwrap() = false;
        self.released.notify_all();
    }

    /// Whether a held call has started.
    pub fn entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }

    fn wait_if_held(&self) {
        let mut held = self.held.lock().unwrap();
        if *held {
            self.entered.store(true, Ordering::SeqCst);
        }
        while *held {
            held = self
                .released
                .wait_timeout(held, Duration::from_millis(50))
                .unwrap()
                .0;
        }
    }

    fn reclaim(state: &mut State) {
        let memory = state.memory;
        let available = (memory.available_physical + RECLAIM_STEP).min(memory.total_physical);
        state.memory = MemorySnapshot::new(
            memory.total_physical,
            available,
            memory.total_page_file,
            memory.available_page_file,
        );
    }
}

impl MemoryControl for FakeControl {
    fn os_version(&self) -> OsVersion {
        self.version
    }

    fn is_64bit_os(&self) -> bool {
        self.is_64bit
    }

    fn is_elevated(&self) -> bool {
        true
    }

    fn enable_privilege(&self, privilege: &str) -> Result<(), u32> {
        let mut state = self.state();
        *state.privilege_requests.entry(privilege.to_string()).or_default() += 1;
        match state.denied_privileges.get(privilege) {
            Some(code) => Err(*code),
            None => Ok(()),
        }
    }

    fn set_system_information(
        &self,
        class: SystemInformationClass,
        block: &ControlBlock,
    ) -> NtStatus {
        self.wait_if_held();

        let mut state = self.state();
        state
            .system_information_calls
            .push((class, block.as_bytes().to_vec()));
        match state.failing_classes.get(&(class as i32)) {
            Some(status) => *status,
            None => {
                Self::reclaim(&mut state);
                NtStatus::SUCCESS
            }
        }
    }

    fn set_system_file_cache_size(&self, minimum: usize, maximum: usize) -> Result<(), u32> {
        let mut state = self.state();
        state.file_cache_calls.push((minimum, maximum));
        if state.file_cache_panics {
            drop(state);
            panic!("file cache reset crashed");
        }
        match state.file_cache_error {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }

    fn processes(&self) -> Vec<ProcessEntry> {
        self.process_enumerations.fetch_add(1, Ordering::SeqCst);
        self.state().processes.clone()
    }

    fn empty_working_set(&self, pid: u32) -> Result<(), TrimError> {
        let mut state = self.state();
        state.working_set_requests.push(pid);
        match state.failing_pids.get(&pid) {
            Some(error) => Err(*error),
            None => Ok(()),
        }
    }

    fn memory_status(&self) -> Result<MemorySnapshot, u32> {
        let state = self.state();
        match state.memory_error {
            Some(code) => Err(code),
            None => Ok(state.memory),
        }
    }
}
