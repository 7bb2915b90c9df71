use crate::snapshot::{Field, MachineSnapshot};
use std::fmt::Write;

/// One alert or status message, handed to the delivery client and then
/// discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertPayload {
    pub title: String,
    pub body: String,
}

/// Key subset rendered in breach alerts; the full snapshot would bury the
/// breached value.
pub const ALERT_KEYS: [&str; 9] = [
    "hostname",
    "system",
    "uptime",
    "cpu_count",
    "cpu_usage",
    "memory_used_percent",
    "root_drive_used_percent",
    "gpu_memory_max_used_percent",
    "timestamp",
];

/// Render the snapshot as sink-agnostic plain text, one `*key* : `value``
/// line per field. With `keys`, exactly those fields render in the given
/// order; keys the snapshot does not carry are skipped. Without `keys`,
/// every top-level field renders in snapshot-definition order.
pub fn format_snapshot(snapshot: &MachineSnapshot, keys: Option<&[&str]>) -> String {
    let fields = snapshot.render_fields();
    let mut text = String::new();
    match keys {
        Some(keys) => {
            for key in keys {
                if let Some((name, value)) = fields.iter().find(|(name, _)| name == key) {
                    push_line(&mut text, name, value);
                }
            }
        }
        None => {
            for (name, value) in &fields {
                push_line(&mut text, name, value);
            }
        }
    }
    text
}

/// Alert for a non-empty breach set, titled with the breached field names
/// and bodied with the alert key subset.
pub fn breach_payload(snapshot: &MachineSnapshot, breaches: &[Field]) -> AlertPayload {
    let names: Vec<&str> = breaches.iter().map(|f| f.as_str()).collect();
    AlertPayload {
        title: format!("Server Monitor LIMIT ({}) REACHED", names.join(", ")),
        body: format_snapshot(snapshot, Some(&ALERT_KEYS)),
    }
}

/// Full status update sent every tick when no thresholds are configured.
pub fn routine_payload(snapshot: &MachineSnapshot) -> AlertPayload {
    AlertPayload {
        title: "Server Monitor Update".to_string(),
        body: format_snapshot(snapshot, None),
    }
}

fn push_line(out: &mut String, key: &str, value: &str) {
    let _ = writeln!(out, "*{key}* : `{value}`");
}
