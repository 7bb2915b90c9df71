use crate::snapshot::{Field, MachineSnapshot};

/// Fields whose current value exceeds the configured limit, in field
/// registry order. Strict comparison: a value equal to its limit is not a
/// breach. A field absent from the snapshot (GPU on a host without GPU
/// capability) is never a breach.
pub fn evaluate(snapshot: &MachineSnapshot, thresholds: &[(Field, f64)]) -> Vec<Field> {
    thresholds
        .iter()
        .filter(|(field, limit)| matches!(field.value(snapshot), Some(value) if value > *limit))
        .map(|(field, _)| *field)
        .collect()
}
