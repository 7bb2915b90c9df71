use crate::collectors::bandwidth::BandwidthSample;
use crate::collectors::gpu;
use crate::snapshot::{DriveUsage, MachineSnapshot, NicInfo, OsInfo};
use std::collections::HashMap;
use std::time::SystemTime;
use sysinfo::{CpuExt, DiskExt, NetworkExt, NetworksExt, System, SystemExt};
use tracing::debug;

/// One collection pass over the live system. Individual disk or interface
/// entries that cannot be read are skipped; the pass itself never fails.
pub fn collect_system(system: &mut System, bandwidth: BandwidthSample) -> MachineSnapshot {
    system.refresh_cpu();
    system.refresh_memory();
    system.refresh_disks_list();
    system.refresh_disks();
    system.refresh_networks_list();
    system.refresh_networks();

    let hostname = system.host_name().unwrap_or_else(|| "unknown".to_string());
    let os = OsInfo {
        name: system
            .name()
            .unwrap_or_else(|| std::env::consts::OS.to_string()),
        version: system.os_version().unwrap_or_default(),
    };
    let uptime = system.uptime();

    let cpu_count = system.cpus().len();
    let cpu_usage = if cpu_count == 0 {
        0.0
    } else {
        let sum: f32 = system.cpus().iter().map(|c| c.cpu_usage()).sum();
        (sum / cpu_count as f32) as f64
    };

    let memory_total = system.total_memory();
    let memory_used = system.used_memory();
    let memory_used_percent = percent_used(memory_used, memory_total);

    let drives = collect_drives(system);
    let root_drive_used_percent = root_percent(&drives);
    let network_cards = collect_nics(system);

    MachineSnapshot {
        hostname,
        machine_id: machine_id(system),
        system: os,
        uptime,
        cpu_count,
        cpu_usage: cpu_usage.clamp(0.0, 100.0),
        memory_total,
        memory_used,
        memory_used_percent,
        drives,
        root_drive_used_percent,
        network_up: bandwidth.bytes_out,
        network_down: bandwidth.bytes_in,
        network_cards,
        gpu_memory_max_used_percent: gpu::max_memory_used_percent(),
        timestamp: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
    }
}

fn collect_drives(system: &System) -> Vec<DriveUsage> {
    let mut drives: Vec<DriveUsage> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for disk in system.disks() {
        let total = disk.total_space();
        if total == 0 {
            // Pseudo filesystems and transient mounts report no capacity.
            debug!(mount = %disk.mount_point().display(), "skipping unreadable disk entry");
            continue;
        }
        let used = total.saturating_sub(disk.available_space());
        let drive = DriveUsage {
            name: disk.name().to_string_lossy().to_string(),
            mount_point: disk.mount_point().to_string_lossy().to_string(),
            fs_type: String::from_utf8_lossy(disk.file_system()).to_string(),
            total_size: total,
            used_size: used,
            percent_used: percent_used(used, total),
        };
        upsert_by_name(&mut drives, &mut index, drive.name.clone(), drive);
    }

    drives
}

fn root_percent(drives: &[DriveUsage]) -> f64 {
    drives
        .iter()
        .find(|d| d.mount_point == "/" || d.mount_point == "C:\\")
        .map(|d| d.percent_used)
        .unwrap_or_default()
}

fn collect_nics(system: &System) -> Vec<NicInfo> {
    let mut nics: Vec<NicInfo> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (iface, data) in system.networks().iter() {
        let nic = entry_for(&mut nics, &mut index, iface);
        nic.mac = data.mac_address().to_string();
    }

    match if_addrs::get_if_addrs() {
        Ok(ifaces) => {
            for ifa in ifaces {
                let nic = entry_for(&mut nics, &mut index, &ifa.name);
                match ifa.addr {
                    if_addrs::IfAddr::V4(v4) => {
                        nic.address = v4.ip.to_string();
                        nic.netmask = v4.netmask.to_string();
                    }
                    if_addrs::IfAddr::V6(v6) => {
                        nic.address6 = v6.ip.to_string();
                    }
                }
            }
        }
        Err(err) => {
            debug!(error = %err, "interface address enumeration failed");
        }
    }

    nics
}

/// Stable machine identifier derived from the lowest non-zero interface
/// MAC, the moral equivalent of a MAC-based node id.
fn machine_id(system: &System) -> u64 {
    let mut macs: Vec<[u8; 6]> = system
        .networks()
        .iter()
        .map(|(_iface, data)| data.mac_address().0)
        .filter(|bytes| bytes.iter().any(|b| *b != 0))
        .collect();
    macs.sort_unstable();
    macs.first().map(|mac| mac_to_u64(*mac)).unwrap_or(0)
}

fn mac_to_u64(bytes: [u8; 6]) -> u64 {
    bytes.iter().fold(0_u64, |acc, b| (acc << 8) | u64::from(*b))
}

fn percent_used(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64) * 100.0
    }
}

/// Key-based construction: a repeated name overwrites the earlier record
/// in place, last wins.
fn upsert_by_name(
    drives: &mut Vec<DriveUsage>,
    index: &mut HashMap<String, usize>,
    name: String,
    drive: DriveUsage,
) {
    if let Some(&i) = index.get(&name) {
        drives[i] = drive;
    } else {
        index.insert(name, drives.len());
        drives.push(drive);
    }
}

fn entry_for<'a>(
    nics: &'a mut Vec<NicInfo>,
    index: &mut HashMap<String, usize>,
    name: &str,
) -> &'a mut NicInfo {
    if let Some(&i) = index.get(name) {
        return &mut nics[i];
    }
    let i = nics.len();
    index.insert(name.to_string(), i);
    nics.push(NicInfo {
        name: name.to_string(),
        mac: String::new(),
        address: String::new(),
        netmask: String::new(),
        address6: String::new(),
    });
    &mut nics[i]
}
