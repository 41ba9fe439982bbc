use log::warn;

/// Interpret a string value such as "1" or "no" as a boolean.
pub fn str_as_bool(s: &str) -> bool {
    match s {
        "1" | "true" | "t" | "yes" | "y" => true,
        "0" | "false" | "f" | "no" | "n" => false,
        _ => {
            warn!("Unrecognized boolean value \"{}\"", s);
            false
        }
    }
}

/// Return whether a feature flag controlled by an environment variable is
/// enabled.
pub fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .as_ref()
        .map(|s| str_as_bool(s))
        .unwrap_or(default)
}

/// Read an environment variable and parse it with `parse`.
///
/// Returns `default` if the variable is unset or `parse` does not recognize
/// its value.
pub fn env_value<T>(name: &str, default: T, parse: impl Fn(&str) -> Option<T>) -> T {
    match std::env::var(name) {
        Ok(value) => parse(&value).unwrap_or_else(|| {
            warn!("Unrecognized value \"{}\" for {}", value, name);
            default
        }),
        Err(_) => default,
    }
}
