//! Configuration data model.
//!
//! Struct definitions plus default values. Loading and precedence live in
//! `config::loader` and `config::sources`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::request::{
    ArrayFormat, ClientSettings, RequestOptions, DEFAULT_LOGIN_CODE, DEFAULT_SUCCESS_CODE,
};

use super::defaults::{
    DEFAULT_AUTH_HEADER, DEFAULT_AUTH_SCHEME, DEFAULT_REFRESH_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS,
};
use super::sources::ConfigSource;

/// Top-level runtime configuration (`courier.toml`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub client: ClientConfig,
    pub auth: AuthConfig,
    /// Default options for calls that do not pass their own.
    pub request: RequestOptions,
}

/// `[client]`: where requests go and how responses are judged.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub refresh_timeout_secs: u64,
    /// Array encoding for query strings and form bodies.
    pub params_format: ArrayFormat,
    /// Envelope `code` that marks success.
    pub success_code: i64,
    /// Envelope `code` that marks an expired session.
    pub login_code: i64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
            params_format: ArrayFormat::Repeat,
            success_code: DEFAULT_SUCCESS_CODE,
            login_code: DEFAULT_LOGIN_CODE,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Executor settings derived from this section.
    pub fn settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.base_url.clone(),
            timeout: Some(self.timeout()),
            params_format: self.params_format,
            success_code: self.success_code,
            login_code: self.login_code,
            refresh_timeout: Duration::from_secs(self.refresh_timeout_secs.max(1)),
        }
    }
}

/// `[auth]`: static credential attached to every request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub header: String,
    /// Prefix before the token; empty sends the bare token.
    pub scheme: Option<String>,
    pub token: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            header: DEFAULT_AUTH_HEADER.to_string(),
            scheme: Some(DEFAULT_AUTH_SCHEME.to_string()),
            token: None,
        }
    }
}

/// Loaded config plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub source: ConfigSource,
}

impl LoadedConfig {
    pub fn source_path(&self) -> Option<PathBuf> {
        self.source.path()
    }
}
