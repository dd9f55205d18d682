/// Ratios at or above this are displayed as `INF`
const INFINITE_RATIO_DISPLAY: f64 = 10_000.0;

/// Human-readable byte size with one decimal, e.g. `1.5GB`
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if value.abs() < 1024.0 {
            return format!("{:.1}{}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1}PB", value)
}

pub fn format_ratio(ratio: f64) -> String {
    if ratio.is_infinite() || ratio >= INFINITE_RATIO_DISPLAY {
        "INF".to_string()
    } else {
        format!("{:.1}", ratio)
    }
}

/// Truncate a display name to at most `max_chars` characters
pub fn truncate_name(name: &str, max_chars: usize) -> &str {
    match name.char_indices().nth(max_chars) {
        Some((idx, _)) => &name[..idx],
        None => name,
    }
}
