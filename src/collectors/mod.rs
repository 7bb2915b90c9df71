pub mod bandwidth;
pub mod gpu;
pub mod system;

use crate::snapshot::MachineSnapshot;
use std::time::Duration;
use sysinfo::{System, SystemExt};

/// Produces one machine snapshot per tick. The monitor loop is generic
/// over this trait so tests can substitute a scripted source.
pub trait SnapshotSource {
    /// Capture a snapshot. Blocks the tick for `bandwidth_window` while the
    /// bandwidth counters are sampled twice.
    async fn sample(&mut self, bandwidth_window: Duration) -> MachineSnapshot;
}

/// Snapshot source backed by the live system.
pub struct SystemSource {
    system: System,
}

impl SystemSource {
    pub fn new() -> Self {
        Self {
            system: System::new_all(),
        }
    }
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSource for SystemSource {
    async fn sample(&mut self, bandwidth_window: Duration) -> MachineSnapshot {
        let bandwidth = bandwidth::sample_bandwidth(&mut self.system, bandwidth_window).await;
        system::collect_system(&mut self.system, bandwidth)
    }
}
