//! Default configuration constants.

/// Fallback per-request timeout when neither file nor env sets one.
pub(super) const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Upper bound on a single credential refresh.
pub(super) const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 10;
/// Header that carries the configured token.
pub(super) const DEFAULT_AUTH_HEADER: &str = "Authorization";
/// Scheme prefixed to the token value.
pub(super) const DEFAULT_AUTH_SCHEME: &str = "Bearer";
/// Config file name, both in the working directory and under the config root.
pub(super) const CONFIG_FILE_NAME: &str = "courier.toml";
/// Directory under the config root that holds the global config.
pub(super) const CONFIG_DIR_NAME: &str = "courier";
