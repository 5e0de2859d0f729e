/// Output format for the end-of-run report.
///
/// * `Table` - Human-readable summary, leak list and allocation table on stderr (default)
/// * `Json` - Compact JSON payload on stdout (single line)
/// * `JsonPretty` - Pretty-printed JSON payload on stdout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Table,
    Json,
    JsonPretty,
}

/// Formats a byte count with binary units (`B`, `KB`, `MB`, ...).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log(THRESHOLD).floor() as usize).min(UNITS.len() - 1);
    let unit_value = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", unit_value, UNITS[unit_index])
    }
}

/// Keeps the last two path segments of a function name: `app::net::read` becomes
/// `net::read`.
pub fn shorten_function_name(function_name: &str) -> String {
    let parts: Vec<&str> = function_name.split("::").collect();
    if parts.len() > 2 {
        parts[parts.len() - 2..].join("::")
    } else {
        function_name.to_string()
    }
}

/// Formats a block address the way `%p` does, `(nil)` for null.
pub fn format_address(address: usize) -> String {
    if address == 0 {
        "(nil)".to_string()
    } else {
        format!("{:#x}", address)
    }
}
