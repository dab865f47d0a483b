//! Human-readable byte sizes (`128m`, `1 GiB`).
//!
//! Single-letter and `*b` suffixes are decimal (`1k` = 1000); `*ib` suffixes
//! are binary (`1kib` = 1024). A bare number is bytes.

use crate::error::ConfigError;

const DECIMAL: [(&str, u64); 4] = [
    ("k", 1_000),
    ("m", 1_000_000),
    ("g", 1_000_000_000),
    ("t", 1_000_000_000_000),
];

const BINARY: [(&str, u64); 4] = [
    ("ki", 1 << 10),
    ("mi", 1 << 20),
    ("gi", 1 << 30),
    ("ti", 1 << 40),
];

/// Parse a size string into bytes.
pub fn parse_size(input: &str) -> Result<u64, ConfigError> {
    let invalid = || ConfigError::InvalidSize(input.to_string());
    let normalized = input.trim().to_ascii_lowercase();
    let split = normalized
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(normalized.len());
    let (number, unit) = normalized.split_at(split);
    let number: f64 = number.parse().map_err(|_| invalid())?;

    let unit = unit.trim();
    let unit = unit.strip_suffix('b').unwrap_or(unit);
    let multiplier = if unit.is_empty() {
        1
    } else if let Some((_, m)) = BINARY.iter().find(|(s, _)| *s == unit) {
        *m
    } else if let Some((_, m)) = DECIMAL.iter().find(|(s, _)| *s == unit) {
        *m
    } else {
        return Err(invalid());
    };

    let bytes = number * multiplier as f64;
    if !bytes.is_finite() || bytes < 0.0 {
        return Err(invalid());
    }
    Ok(bytes.round() as u64)
}

/// Render bytes with a decimal unit, e.g. `1.5 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["bytes", "KB", "MB", "GB", "TB"];
    if bytes < 1000 {
        return format!("{bytes} bytes");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    let rendered = format!("{value:.2}");
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{rendered} {}", UNITS[unit])
}
