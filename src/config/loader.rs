//! Top-level config loading pipeline.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::env::apply_runtime_env_overrides;
use super::paths::config_root_dir;
use super::sources::read_config_text_with_sources;
use super::{Config, LoadedConfig};

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path (from --config flag).
pub fn load_config(path_override: Option<&str>) -> Result<Config, ConfigError> {
    Ok(load_config_with_source(path_override)?.config)
}

/// Load configuration and report which file supplied it.
pub fn load_config_with_source(path_override: Option<&str>) -> Result<LoadedConfig, ConfigError> {
    load_config_from_sources(
        path_override,
        |path| std::fs::read_to_string(path),
        |name| std::env::var(name).ok(),
        config_root_dir,
    )
}

pub(super) fn load_config_from_sources<FRead, FEnv, FRoot>(
    path_override: Option<&str>,
    read_file: FRead,
    env_lookup: FEnv,
    config_root: FRoot,
) -> Result<LoadedConfig, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FEnv: Fn(&str) -> Option<String>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let (config_text, source) =
        read_config_text_with_sources(path_override, &read_file, &config_root)?;
    let mut config: Config = toml::from_str(&config_text)?;
    apply_runtime_env_overrides(&mut config, &env_lookup)?;
    normalize_config(&mut config)?;
    Ok(LoadedConfig { config, source })
}

/// Validate and clamp a config after any in-process override, such as a
/// command-line base URL, the same way loaded files are checked.
pub fn normalize_config(config: &mut Config) -> Result<(), ConfigError> {
    config.client.base_url = config.client.base_url.trim().to_string();
    if !config.client.base_url.is_empty()
        && !config.client.base_url.starts_with("http://")
        && !config.client.base_url.starts_with("https://")
    {
        return Err(ConfigError::Invalid(format!(
            "client.base_url `{}` must start with http:// or https://",
            config.client.base_url
        )));
    }
    config.client.timeout_secs = config.client.timeout_secs.max(1);
    config.client.refresh_timeout_secs = config.client.refresh_timeout_secs.max(1);
    if config.client.success_code == config.client.login_code {
        return Err(ConfigError::Invalid(
            "client.success_code and client.login_code must differ".to_string(),
        ));
    }
    if config.auth.header.trim().is_empty() {
        return Err(ConfigError::Invalid("auth.header must not be empty".to_string()));
    }
    Ok(())
}
