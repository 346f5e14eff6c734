//! Parsing of configuration values supplied through environment variables.

/// Interpret a string value such as "1" or "no" as a boolean.
///
/// Returns `None` if the value is not recognized.
pub fn str_as_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Return whether a feature flag controlled by an environment variable is
/// enabled.
///
/// Unset variables and unrecognized values yield `default`. Unrecognized
/// values are also reported as a warning.
pub fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => str_as_bool(&value).unwrap_or_else(|| {
            tracing::warn!(var = name, value = %value, "unrecognized boolean value");
            default
        }),
        Err(_) => default,
    }
}

/// Read a positive integer from an environment variable.
///
/// Returns `None` if the variable is unset, and also (with a warning) if it
/// is not a positive integer.
pub fn env_usize(name: &str) -> Option<usize> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(var = name, value = %value, "expected a positive integer");
            None
        }
    }
}
