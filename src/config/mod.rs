//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`COURIER_BASE_URL`, `COURIER_TIMEOUT_SECS`,
//!    `COURIER_TOKEN`)
//! 2. TOML file specified via --config CLI flag
//! 3. ./courier.toml in the current directory
//! 4. $XDG_CONFIG_HOME/courier/courier.toml (or ~/.config/courier/courier.toml)
//! 5. Built-in defaults

mod defaults;
mod env;
mod loader;
mod paths;
mod sources;
mod types;

pub use loader::{load_config, load_config_with_source, normalize_config};
pub use paths::{config_root_dir, default_global_config_path};
pub use sources::ConfigSource;
pub use types::{AuthConfig, ClientConfig, Config, LoadedConfig};
