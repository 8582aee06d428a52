/// Load and parse an environment variable.
/// Returns Ok(()) if the variable doesn't exist (keeps default).
pub fn load_env_var<T>(name: &str, target: &mut T) -> Result<(), super::ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(value) = std::env::var(name) {
        *target = value
            .parse()
            .map_err(|e| super::ConfigError::EnvError(format!("Invalid {name}: {e}")))?;
    }
    Ok(())
}

/// Load an optional parsed environment variable.
pub fn load_env_var_opt<T>(name: &str, target: &mut Option<T>) -> Result<(), super::ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(value) = std::env::var(name) {
        let parsed = value
            .parse()
            .map_err(|e| super::ConfigError::EnvError(format!("Invalid {name}: {e}")))?;
        *target = Some(parsed);
    }
    Ok(())
}

/// Load a boolean flag. Accepts `1`/`0` as well as `true`/`false`.
pub fn load_env_bool(name: &str, target: &mut bool) -> Result<(), super::ConfigError> {
    if let Ok(value) = std::env::var(name) {
        *target = match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" | "" => false,
            _ => {
                return Err(super::ConfigError::EnvError(format!(
                    "Invalid {name}: {value}"
                )));
            }
        };
    }
    Ok(())
}

pub fn load_env_string_opt(name: &str, target: &mut Option<String>) {
    if let Ok(value) = std::env::var(name) {
        *target = Some(value);
    }
}

pub fn load_env_string(name: &str, target: &mut String) {
    if let Ok(value) = std::env::var(name) {
        *target = value;
    }
}

/// Load a comma separated list, dropping empty entries.
pub fn load_env_list(name: &str, target: &mut Vec<String>) {
    if let Ok(value) = std::env::var(name) {
        *target = value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(String::from)
            .collect();
    }
}

pub fn load_env_path_opt(name: &str, target: &mut Option<std::path::PathBuf>) {
    if let Ok(value) = std::env::var(name) {
        *target = Some(std::path::PathBuf::from(value));
    }
}
