use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Serialize)]
pub struct OsInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriveUsage {
    pub name: String,
    pub mount_point: String,
    pub fs_type: String,
    pub total_size: u64,
    pub used_size: u64,
    pub percent_used: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NicInfo {
    pub name: String,
    pub mac: String,
    pub address: String,
    pub netmask: String,
    pub address6: String,
}

/// One capture of machine resource state. Built fresh each tick by the
/// snapshot source and read-only afterwards.
///
/// `drives` and `network_cards` never contain duplicate names within one
/// collection pass: entries are keyed by name and the last one wins.
#[derive(Debug, Clone, Serialize)]
pub struct MachineSnapshot {
    pub hostname: String,
    pub machine_id: u64,
    pub system: OsInfo,
    pub uptime: u64,
    pub cpu_count: usize,
    pub cpu_usage: f64,
    pub memory_total: u64,
    pub memory_used: u64,
    pub memory_used_percent: f64,
    pub drives: Vec<DriveUsage>,
    pub root_drive_used_percent: f64,
    pub network_up: u64,
    pub network_down: u64,
    pub network_cards: Vec<NicInfo>,
    /// Highest per-device GPU memory usage, percent. Absent when the host
    /// has no GPU capability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_memory_max_used_percent: Option<f64>,
    pub timestamp: String,
}

/// Registry of the flat numeric snapshot fields addressable by thresholds.
///
/// Nested structures (`drives`, `network_cards`) are not evaluable. The
/// declaration order here is the canonical field order; breach sets and
/// alert titles follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Uptime,
    CpuCount,
    CpuUsage,
    MemoryTotal,
    MemoryUsed,
    MemoryUsedPercent,
    RootDriveUsedPercent,
    NetworkUp,
    NetworkDown,
    GpuMemoryMaxUsedPercent,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::Uptime,
        Field::CpuCount,
        Field::CpuUsage,
        Field::MemoryTotal,
        Field::MemoryUsed,
        Field::MemoryUsedPercent,
        Field::RootDriveUsedPercent,
        Field::NetworkUp,
        Field::NetworkDown,
        Field::GpuMemoryMaxUsedPercent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Uptime => "uptime",
            Field::CpuCount => "cpu_count",
            Field::CpuUsage => "cpu_usage",
            Field::MemoryTotal => "memory_total",
            Field::MemoryUsed => "memory_used",
            Field::MemoryUsedPercent => "memory_used_percent",
            Field::RootDriveUsedPercent => "root_drive_used_percent",
            Field::NetworkUp => "network_up",
            Field::NetworkDown => "network_down",
            Field::GpuMemoryMaxUsedPercent => "gpu_memory_max_used_percent",
        }
    }

    pub fn parse(name: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.as_str() == name)
    }

    /// Current numeric value of this field on the snapshot. `None` only for
    /// `gpu_memory_max_used_percent` on hosts without GPU capability, which
    /// evaluates as not-breached.
    pub fn value(&self, snapshot: &MachineSnapshot) -> Option<f64> {
        match self {
            Field::Uptime => Some(snapshot.uptime as f64),
            Field::CpuCount => Some(snapshot.cpu_count as f64),
            Field::CpuUsage => Some(snapshot.cpu_usage),
            Field::MemoryTotal => Some(snapshot.memory_total as f64),
            Field::MemoryUsed => Some(snapshot.memory_used as f64),
            Field::MemoryUsedPercent => Some(snapshot.memory_used_percent),
            Field::RootDriveUsedPercent => Some(snapshot.root_drive_used_percent),
            Field::NetworkUp => Some(snapshot.network_up as f64),
            Field::NetworkDown => Some(snapshot.network_down as f64),
            Field::GpuMemoryMaxUsedPercent => snapshot.gpu_memory_max_used_percent,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MachineSnapshot {
    /// All top-level fields as `(key, rendered value)` pairs in
    /// snapshot-definition order. Nested structures render as compact JSON.
    pub fn render_fields(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![
            ("hostname", self.hostname.clone()),
            ("machine_id", self.machine_id.to_string()),
            ("system", to_json(&self.system)),
            ("uptime", self.uptime.to_string()),
            ("cpu_count", self.cpu_count.to_string()),
            ("cpu_usage", self.cpu_usage.to_string()),
            ("memory_total", self.memory_total.to_string()),
            ("memory_used", self.memory_used.to_string()),
            ("memory_used_percent", self.memory_used_percent.to_string()),
            ("drives", to_json(&self.drives)),
            (
                "root_drive_used_percent",
                self.root_drive_used_percent.to_string(),
            ),
            ("network_up", self.network_up.to_string()),
            ("network_down", self.network_down.to_string()),
            ("network_cards", to_json(&self.network_cards)),
        ];
        if let Some(gpu) = self.gpu_memory_max_used_percent {
            out.push(("gpu_memory_max_used_percent", gpu.to_string()));
        }
        out.push(("timestamp", self.timestamp.clone()));
        out
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_roundtrip() {
        for field in Field::ALL {
            assert_eq!(Field::parse(field.as_str()), Some(field));
        }
        assert_eq!(Field::parse("drives"), None);
        assert_eq!(Field::parse("no_such_field"), None);
    }

    #[test]
    fn field_values_read_the_right_snapshot_fields() {
        let snapshot = testutil::snapshot();
        assert_eq!(Field::CpuUsage.value(&snapshot), Some(95.0));
        assert_eq!(Field::MemoryUsedPercent.value(&snapshot), Some(40.0));
        assert_eq!(Field::CpuCount.value(&snapshot), Some(8.0));
        assert_eq!(Field::NetworkDown.value(&snapshot), Some(2048.0));
    }

    #[test]
    fn gpu_field_is_absent_without_gpu_capability() {
        let mut snapshot = testutil::snapshot();
        assert_eq!(Field::GpuMemoryMaxUsedPercent.value(&snapshot), None);

        snapshot.gpu_memory_max_used_percent = Some(73.5);
        assert_eq!(Field::GpuMemoryMaxUsedPercent.value(&snapshot), Some(73.5));
    }

    #[test]
    fn render_fields_follow_definition_order() {
        let snapshot = testutil::snapshot();
        let keys: Vec<&str> = snapshot.render_fields().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys.first(), Some(&"hostname"));
        assert_eq!(keys.last(), Some(&"timestamp"));
        assert!(!keys.contains(&"gpu_memory_max_used_percent"));

        let mut with_gpu = testutil::snapshot();
        with_gpu.gpu_memory_max_used_percent = Some(12.0);
        let keys: Vec<&str> = with_gpu.render_fields().iter().map(|(k, _)| *k).collect();
        assert!(keys.contains(&"gpu_memory_max_used_percent"));
    }

    #[test]
    fn nested_fields_render_as_json() {
        let snapshot = testutil::snapshot();
        let fields = snapshot.render_fields();
        let drives = &fields.iter().find(|(k, _)| *k == "drives").unwrap().1;
        assert!(drives.starts_with('['));
        assert!(drives.contains("\"mount_point\":\"/\""));
    }
}
