use std::time::Duration;
use sysinfo::{NetworkExt, NetworksExt, System, SystemExt};

/// Fixed window separating the two counter readings of one tick.
pub const SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// Bytes observed on the wire over one sampling window, summed across
/// interfaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct BandwidthSample {
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Read the cumulative traffic counters, sleep for `window`, read them
/// again and return the per-direction delta.
pub async fn sample_bandwidth(system: &mut System, window: Duration) -> BandwidthSample {
    let (first_in, first_out) = read_totals(system);
    tokio::time::sleep(window).await;
    let (second_in, second_out) = read_totals(system);

    BandwidthSample {
        bytes_in: counter_delta(first_in, second_in),
        bytes_out: counter_delta(first_out, second_out),
    }
}

fn read_totals(system: &mut System) -> (u64, u64) {
    system.refresh_networks_list();
    system.refresh_networks();

    let mut rx = 0_u64;
    let mut tx = 0_u64;
    for (_iface, data) in system.networks().iter() {
        rx = rx.saturating_add(data.total_received());
        tx = tx.saturating_add(data.total_transmitted());
    }
    (rx, tx)
}

/// Cumulative counters can shrink when an interface restarts; that reads
/// as a zero delta for the direction, never a negative value.
pub fn counter_delta(first: u64, second: u64) -> u64 {
    second.saturating_sub(first)
}
