//! Per-request execution options.
//!
//! Every recognized field is listed here; unknown fields are rejected when
//! options are deserialized from configuration.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// What `execute` hands back on success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseShape {
    /// Full transport envelope: status, headers, and body. No business-code check.
    Raw,
    /// Response body only; success judged by HTTP status alone.
    Body,
    /// The `data` field of a `{code, data, message}` envelope, after checking `code`.
    #[default]
    Data,
}

impl FromStr for ResponseShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "body" => Ok(Self::Body),
            "data" => Ok(Self::Data),
            other => Err(format!(
                "unknown response shape `{other}`: expected raw, body, or data"
            )),
        }
    }
}

/// Response caching for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheOptions {
    pub enabled: bool,
    /// Freshness window; entries never expire when omitted.
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    /// Custom cache key replacing the derived `METHOD:URL?params` key.
    #[serde(default)]
    pub key: Option<String>,
    /// Allow caching for non-GET methods.
    #[serde(default)]
    pub allow_mutating: bool,
}

impl CacheOptions {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.map(Duration::from_millis)
    }
}

/// Retry behavior for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryOptions {
    /// Retries after the initial attempt.
    pub count: u32,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub exponential_backoff: bool,
    /// Statuses worth retrying; defaults to 408, 429, 500, 502, 503, 504.
    #[serde(default)]
    pub status_codes: Option<Vec<u16>>,
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
    /// Let a `Retry-After` header replace the computed delay.
    #[serde(default)]
    pub respect_retry_after: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            count: 0,
            delay_ms: None,
            exponential_backoff: false,
            status_codes: None,
            max_delay_ms: None,
            respect_retry_after: false,
        }
    }
}

/// Options recognized by `RequestClient::execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestOptions {
    pub cache: Option<CacheOptions>,
    pub retry: Option<RetryOptions>,
    /// Abort an identical in-flight request when this one starts.
    pub cancel_duplicate: bool,
    pub response_shape: ResponseShape,
    /// Wrap the call in `show_loading`/`hide_loading`.
    pub loading: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            cache: None,
            retry: None,
            cancel_duplicate: true,
            response_shape: ResponseShape::Data,
            loading: false,
        }
    }
}

impl RequestOptions {
    pub fn with_cache(mut self, ttl: Option<Duration>) -> Self {
        self.cache = Some(CacheOptions {
            enabled: true,
            ttl_ms: ttl.map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
            key: None,
            allow_mutating: false,
        });
        self
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_shape(mut self, shape: ResponseShape) -> Self {
        self.response_shape = shape;
        self
    }

    pub fn with_cancel_duplicate(mut self, cancel_duplicate: bool) -> Self {
        self.cancel_duplicate = cancel_duplicate;
        self
    }

    pub fn with_loading(mut self, loading: bool) -> Self {
        self.loading = loading;
        self
    }

    /// Cache settings when caching is switched on.
    pub fn active_cache(&self) -> Option<&CacheOptions> {
        self.cache.as_ref().filter(|cache| cache.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cancel_duplicates_and_unwrap_data() {
        let options = RequestOptions::default();
        assert!(options.cancel_duplicate);
        assert_eq!(options.response_shape, ResponseShape::Data);
        assert!(options.active_cache().is_none());
        assert!(options.retry.is_none());
    }

    #[test]
    fn parses_full_option_table() {
        let options: RequestOptions = toml::from_str(
            r#"
            cancel_duplicate = false
            response_shape = "body"
            loading = true

            [cache]
            enabled = true
            ttl_ms = 5000
            key = "profile"

            [retry]
            count = 3
            delay_ms = 100
            exponential_backoff = true
            status_codes = [503]
            "#,
        )
        .expect("options should parse");
        assert!(!options.cancel_duplicate);
        assert_eq!(options.response_shape, ResponseShape::Body);
        let cache = options.active_cache().expect("cache enabled");
        assert_eq!(cache.ttl(), Some(Duration::from_millis(5000)));
        assert_eq!(cache.key.as_deref(), Some("profile"));
        let retry = options.retry.expect("retry");
        assert_eq!(retry.count, 3);
        assert!(!retry.respect_retry_after);
        assert_eq!(retry.status_codes, Some(vec![503]));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = toml::from_str::<RequestOptions>("cancel = true").unwrap_err();
        assert!(err.to_string().contains("unknown field"), "got: {err}");
        let err = toml::from_str::<RequestOptions>("[retry]\ncount = 1\nbackoff = 2").unwrap_err();
        assert!(err.to_string().contains("unknown field"), "got: {err}");
    }

    #[test]
    fn disabled_cache_is_inactive() {
        let options: RequestOptions =
            toml::from_str("[cache]\nenabled = false\nttl_ms = 10").expect("parse");
        assert!(options.active_cache().is_none());
    }

    #[test]
    fn oversized_cache_ttl_saturates() {
        let options = RequestOptions::default().with_cache(Some(Duration::MAX));
        let cache = options.active_cache().expect("cache enabled");
        assert_eq!(cache.ttl_ms, Some(u64::MAX));
    }

    #[test]
    fn response_shape_parses_from_cli_text() {
        assert_eq!("RAW".parse::<ResponseShape>(), Ok(ResponseShape::Raw));
        assert!("envelope".parse::<ResponseShape>().is_err());
    }
}
