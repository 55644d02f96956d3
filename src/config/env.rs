//! Environment overrides.
//!
//! `COURIER_*` variables win over file values so one-off invocations can
//! point at another host or token without editing config.

use crate::error::ConfigError;

use super::Config;

pub(super) const ENV_BASE_URL: &str = "COURIER_BASE_URL";
pub(super) const ENV_TIMEOUT_SECS: &str = "COURIER_TIMEOUT_SECS";
pub(super) const ENV_TOKEN: &str = "COURIER_TOKEN";

pub(super) fn apply_runtime_env_overrides<FEnv>(
    config: &mut Config,
    env_lookup: &FEnv,
) -> Result<(), ConfigError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    if let Some(url) = non_empty(env_lookup(ENV_BASE_URL)) {
        config.client.base_url = url;
    }
    if let Some(timeout) = non_empty(env_lookup(ENV_TIMEOUT_SECS)) {
        let parsed = timeout.parse::<u64>().map_err(|_| {
            ConfigError::Invalid(format!(
                "invalid {ENV_TIMEOUT_SECS} value `{timeout}`: expected positive integer seconds"
            ))
        })?;
        config.client.timeout_secs = parsed.max(1);
    }
    if let Some(token) = non_empty(env_lookup(ENV_TOKEN)) {
        config.auth.token = Some(token);
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
