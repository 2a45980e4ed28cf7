//! Memory optimizer
//!
//! Dispatches one blocking task per requested memory area, waits for all of
//! them, then refreshes the memory snapshot.
//!
//! The busy flag is shared by the call and every task it starts, so it stays
//! set until the last native call has returned even if the caller stops
//! waiting.

use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::areas::{MemoryArea, MemoryAreaSet};
use super::capabilities::OperatingSystemCapabilities;
use super::error::{OptimizeError, ReclaimError};
use super::exclusions::ProcessExclusionList;
use super::reclaim::{EngineContext, ReclaimLeg};
use super::snapshot::{MemorySnapshot, MemorySnapshotReader};
use crate::platform::{MemoryControl, NativeControl};

/// Result of one area's leg.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOutcome {
    pub area: MemoryArea,
    pub error: Option<ReclaimError>,
}

impl OptimizationOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// Everything one `optimize` call produced.
#[derive(Debug, Clone)]
pub struct OptimizationReport {
    /// One entry per dispatched area, in dispatch order
    pub outcomes: Vec<OptimizationOutcome>,
    pub before: MemorySnapshot,
    pub after: MemorySnapshot,
    pub started_at: DateTime<Local>,
    pub duration: Duration,
}

impl OptimizationReport {
    /// Growth of available physical memory, never negative.
    pub fn freed_bytes(&self) -> u64 {
        self.after
            .available_physical
            .saturating_sub(self.before.available_physical)
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(OptimizationOutcome::succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &OptimizationOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    pub fn outcome(&self, area: MemoryArea) -> Option<&OptimizationOutcome> {
        self.outcomes.iter().find(|o| o.area == area)
    }

    pub fn dispatched_areas(&self) -> Vec<MemoryArea> {
        self.outcomes.iter().map(|o| o.area).collect()
    }
}

/// Orchestrates the reclaim legs.
pub struct MemoryOptimizer<C: MemoryControl = NativeControl> {
    context: Arc<EngineContext<C>>,
    snapshots: MemorySnapshotReader<C>,
    busy: Arc<AtomicBool>,
}

impl MemoryOptimizer<NativeControl> {
    /// Optimizer bound to the running operating system.
    pub fn native() -> Self {
        Self::new(Arc::new(NativeControl::new()))
    }
}

impl<C: MemoryControl> MemoryOptimizer<C> {
    pub fn new(control: Arc<C>) -> Self {
        let context = EngineContext::new(control.clone());
        Self::from_context(control, context)
    }

    pub fn with_capabilities(control: Arc<C>, capabilities: OperatingSystemCapabilities) -> Self {
        let context = EngineContext::with_capabilities(control.clone(), capabilities);
        Self::from_context(control, context)
    }

    fn from_context(control: Arc<C>, context: EngineContext<C>) -> Self {
        if control.is_elevated() {
            info!("Running with admin privileges - full optimization available");
        } else {
            warn!("Running without admin - privileged areas will fail");
        }
        info!(
            "OS {} ({}-bit), supported areas: {:?}",
            control.os_version(),
            if context.capabilities().is_64bit { 64 } else { 32 },
            context.capabilities().supported_areas()
        );

        Self {
            context: Arc::new(context),
            snapshots: MemorySnapshotReader::new(control),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn capabilities(&self) -> &OperatingSystemCapabilities {
        self.context.capabilities()
    }

    pub fn supported_areas(&self) -> MemoryAreaSet {
        self.context.capabilities().supported_areas()
    }

    /// Whether an `optimize` call or any of its legs is still running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Current memory counters (last good value if the query fails).
    pub fn read_memory(&self) -> MemorySnapshot {
        self.snapshots.read()
    }

    /// Legs `optimize` would dispatch for `requested`, in dispatch order.
    pub fn plan(&self, requested: MemoryAreaSet) -> Vec<ReclaimLeg> {
        let effective = self.context.capabilities().filter(requested);
        let mut legs = Vec::new();

        if effective.contains(MemoryAreaSet::PROCESSES_WORKING_SET) {
            legs.push(ReclaimLeg::ProcessesWorkingSet);
        }
        if effective.contains(MemoryAreaSet::SYSTEM_WORKING_SET) {
            legs.push(ReclaimLeg::SystemWorkingSet);
        }
        if effective.contains(MemoryAreaSet::MODIFIED_PAGE_LIST) {
            legs.push(ReclaimLeg::ModifiedPageList);
        }
        // The full purge covers the low-priority pages as well.
        if effective.contains(MemoryAreaSet::STANDBY_LIST) {
            legs.push(ReclaimLeg::StandbyList { low_priority: false });
        } else if effective.contains(MemoryAreaSet::STANDBY_LIST_LOW_PRIORITY) {
            legs.push(ReclaimLeg::StandbyList { low_priority: true });
        }
        if effective.contains(MemoryAreaSet::COMBINED_PAGE_LIST) {
            legs.push(ReclaimLeg::CombinedPageList);
        }

        legs
    }

    /// Reclaim every requested area the OS supports.
    ///
    /// Legs run concurrently and a failing leg never stops the others; a leg
    /// whose task panics is reported as [`ReclaimError::LegAborted`].
    /// Returns [`OptimizeError::Busy`] while a previous call, or a leg it
    /// started, is still running.
    pub async fn optimize(
        &self,
        requested: MemoryAreaSet,
        exclusions: &ProcessExclusionList,
    ) -> Result<OptimizationReport, OptimizeError> {
        let busy = Arc::new(BusyGuard::acquire(&self.busy).ok_or(OptimizeError::Busy)?);

        let started_at = Local::now();
        let start = Instant::now();
        let before = self.snapshots.read();

        let unsupported = requested - self.context.capabilities().filter(requested);
        if !unsupported.is_empty() {
            warn!("Not supported on this OS, skipping: {:?}", unsupported);
        }

        let legs = self.plan(requested);
        info!("Starting optimization of {} areas", legs.len());

        let exclusions = Arc::new(exclusions.clone());
        let tasks: Vec<_> = legs
            .into_iter()
            .map(|leg| {
                let context = self.context.clone();
                let exclusions = exclusions.clone();
                let busy = busy.clone();
                let task = tokio::task::spawn_blocking(move || {
                    let _busy = busy;
                    leg.run(&context, &exclusions)
                });
                (leg, task)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (leg, task) in tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!("{}: reclaim task did not complete: {}", leg.area(), e);
                    Err(ReclaimError::LegAborted { reason: e.to_string() })
                }
            };
            match &result {
                Ok(()) => info!("{}: optimized", leg.area()),
                Err(e) => warn!("{}: {}", leg.area(), e),
            }
            outcomes.push(OptimizationOutcome {
                area: leg.area(),
                error: result.err(),
            });
        }

        let after = self.snapshots.read();
        let report = OptimizationReport {
            outcomes,
            before,
            after,
            started_at,
            duration: start.elapsed(),
        };

        info!(
            "Optimization complete: freed {} bytes, {} of {} areas failed, {}ms",
            report.freed_bytes(),
            report.failures().count(),
            report.outcomes.len(),
            report.duration.as_millis()
        );

        Ok(report)
    }
}

/// Clears the busy flag when the last holder is gone.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
