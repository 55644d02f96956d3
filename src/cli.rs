//! CLI argument parsing via clap.

use clap::Parser;
use serde_json::{Map, Value};
use std::time::Duration;

use courier::request::{
    Method, RequestDescriptor, RequestOptions, ResponseShape, RetryOptions,
};

/// Send one HTTP request through the courier pipeline and print the result.
#[derive(Debug, Parser)]
#[command(name = "courier", version)]
pub struct Args {
    /// Absolute URL, or a path joined onto the configured base URL.
    pub url: String,

    /// HTTP method.
    #[arg(short = 'X', long = "method", default_value = "GET")]
    pub method: Method,

    /// Query parameter as key=value. Repeat a key to send an array.
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Request body. Parsed as JSON when valid, otherwise sent as text.
    #[arg(short = 'd', long = "data")]
    pub data: Option<String>,

    /// Send the (JSON object) body form-urlencoded.
    #[arg(long = "form", requires = "data")]
    pub form: bool,

    /// Extra header as `Name: value`.
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    pub headers: Vec<String>,

    /// Response shape: raw, body, or data.
    #[arg(long = "shape")]
    pub shape: Option<ResponseShape>,

    /// Retries after the first attempt.
    #[arg(long = "retry", value_name = "COUNT")]
    pub retry: Option<u32>,

    /// Base delay between retries in milliseconds.
    #[arg(long = "retry-delay", value_name = "MS", requires = "retry")]
    pub retry_delay_ms: Option<u64>,

    /// Double the retry delay on every attempt.
    #[arg(long = "backoff", requires = "retry")]
    pub backoff: bool,

    /// Cache the response for this many milliseconds.
    #[arg(long = "cache-ttl", value_name = "MS")]
    pub cache_ttl_ms: Option<u64>,

    /// Path to config file (default: ./courier.toml or ~/.config/courier/courier.toml).
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Override the configured base URL.
    #[arg(long = "base-url")]
    pub base_url: Option<String>,

    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable color output.
    #[arg(long = "no-color")]
    pub no_color: bool,
}

impl Args {
    /// Build the request described by the flags.
    pub fn descriptor(&self) -> Result<RequestDescriptor, String> {
        let mut descriptor = RequestDescriptor::new(self.method, self.url.clone())
            .params(Value::Object(parse_params(&self.params)?));
        for raw in &self.headers {
            let (name, value) = raw
                .split_once(':')
                .ok_or_else(|| format!("invalid header `{raw}`: expected `Name: value`"))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(format!("invalid header `{raw}`: empty name"));
            }
            descriptor = descriptor.header(name, value.trim());
        }
        if let Some(data) = &self.data {
            let parsed = serde_json::from_str::<Value>(data);
            descriptor = match parsed {
                Ok(value) if self.form => descriptor.form(value),
                Ok(value) => descriptor.json(value),
                Err(_) if self.form => {
                    return Err("--form needs a JSON object in --data".to_string())
                }
                Err(_) => descriptor.text(data.clone()),
            };
        }
        Ok(descriptor)
    }

    /// Layer the per-invocation flags over the configured defaults.
    pub fn options(&self, defaults: RequestOptions) -> RequestOptions {
        let mut options = defaults.with_loading(true);
        if let Some(shape) = self.shape {
            options = options.with_shape(shape);
        }
        if let Some(count) = self.retry {
            options = options.with_retry(RetryOptions {
                count,
                delay_ms: self.retry_delay_ms,
                exponential_backoff: self.backoff,
                ..RetryOptions::default()
            });
        }
        if let Some(ttl) = self.cache_ttl_ms {
            options = options.with_cache(Some(Duration::from_millis(ttl)));
        }
        options
    }

    /// `tracing` filter directive implied by `-v`.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "courier=debug",
            _ => "courier=trace",
        }
    }
}

fn parse_params(raw: &[String]) -> Result<Map<String, Value>, String> {
    let mut params = Map::new();
    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("invalid param `{pair}`: expected KEY=VALUE"))?;
        let value = Value::String(value.to_string());
        match params.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                params.insert(key.to_string(), value);
            }
        }
    }
    Ok(params)
}
