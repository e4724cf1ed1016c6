/// Get environment variable with CARDRELAY_ prefix, falling back to unprefixed version
///
/// Checks `CARDRELAY_{key}` first, then `{key}`, so deployments can keep the
/// conventional names (`PORT`, `SQUARE_ACCESS_TOKEN`, ...) or namespace them.
///
/// # Examples
///
/// ```rust,ignore
/// use crate::utils::get_env_with_prefix;
///
/// // Checks CARDRELAY_PORT first, then PORT
/// let port = get_env_with_prefix("PORT");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("CARDRELAY_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// First variable that is set among several aliases.
pub fn get_env_any(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| get_env_with_prefix(key))
}

/// Parse a boolean flag the way shells usually spell them.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
