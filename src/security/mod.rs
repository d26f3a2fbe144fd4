//! Secret handling for logs and status output.

/// Redact sensitive values for safe logging. Shows first 4 chars + "***" suffix.
pub fn redact(value: &str) -> String {
    if value.chars().count() <= 4 {
        "***".to_string()
    } else {
        let prefix: String = value.chars().take(4).collect();
        format!("{prefix}***")
    }
}

/// Redact an optional secret, reporting unset values explicitly.
pub fn redact_opt(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => redact(v),
        _ => "(not set)".to_string(),
    }
}
