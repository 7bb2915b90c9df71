use std::process::Command;
use tracing::debug;

/// Per-device GPU memory usage as fractions in [0, 1]. Empty when the host
/// has no NVIDIA driver or no GPU; devices with unparsable output are
/// skipped.
pub fn memory_used_fractions() -> Vec<f64> {
    let Some(output) = run_nvidia_smi(&[
        "--query-gpu=memory.used,memory.total",
        "--format=csv,noheader,nounits",
    ]) else {
        return Vec::new();
    };
    if !output.status.success() {
        return Vec::new();
    }

    let Ok(text) = String::from_utf8(output.stdout) else {
        return Vec::new();
    };

    text.lines().filter_map(parse_memory_line).collect()
}

/// Highest per-device memory usage as a percentage with two decimals, or
/// `None` when no GPU capability was detected.
pub fn max_memory_used_percent() -> Option<f64> {
    max_percent(&memory_used_fractions())
}

pub fn max_percent(fractions: &[f64]) -> Option<f64> {
    fractions
        .iter()
        .copied()
        .reduce(f64::max)
        .map(|max| (max * 10_000.0).round() / 100.0)
}

fn parse_memory_line(line: &str) -> Option<f64> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 2 {
        return None;
    }
    let used = parse_f64_loose(parts[0])?;
    let total = parse_f64_loose(parts[1])?;
    if total <= 0.0 {
        debug!(line, "skipping GPU reporting zero total memory");
        return None;
    }
    Some((used / total).clamp(0.0, 1.0))
}

fn run_nvidia_smi(args: &[&str]) -> Option<std::process::Output> {
    if let Ok(output) = Command::new("nvidia-smi").args(args).output() {
        return Some(output);
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(output) = Command::new(r"C:\Windows\System32\nvidia-smi.exe")
            .args(args)
            .output()
        {
            return Some(output);
        }
    }

    None
}

fn parse_f64_loose(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Some(v);
    }
    // Some locales print a decimal comma.
    trimmed.replace(',', ".").parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_line_becomes_a_fraction() {
        assert_eq!(parse_memory_line("2048, 8192"), Some(0.25));
        assert_eq!(parse_memory_line("8192, 8192"), Some(1.0));
    }

    #[test]
    fn bad_memory_lines_are_skipped() {
        assert_eq!(parse_memory_line(""), None);
        assert_eq!(parse_memory_line("2048"), None);
        assert_eq!(parse_memory_line("2048, 0"), None);
        assert_eq!(parse_memory_line("n/a, n/a"), None);
    }

    #[test]
    fn max_percent_rounds_to_two_decimals() {
        assert_eq!(max_percent(&[0.25, 0.731_26]), Some(73.13));
        assert_eq!(max_percent(&[0.5]), Some(50.0));
        assert_eq!(max_percent(&[]), None);
    }
}
