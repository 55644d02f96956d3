//! Error taxonomy for request orchestration and configuration.

use std::fmt;

use crate::request::Method;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// RequestError
// ---------------------------------------------------------------------------

/// Connection-level failure classes. All of them are retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    Timeout,
    Connect,
    /// Connection dropped mid-request by the peer or an intermediary.
    Aborted,
    Other,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Aborted => "connection aborted",
            Self::Other => "network",
        };
        f.write_str(label)
    }
}

/// Classified outcome of a failed request attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Superseded by a newer identical request or explicitly aborted.
    Cancelled,
    /// Connection or timeout failure below HTTP.
    Network {
        kind: NetworkErrorKind,
        message: String,
    },
    /// Non-2xx status from the server.
    Status {
        code: u16,
        body: String,
        retry_after_secs: Option<u64>,
    },
    /// 401-equivalent that could not be recovered by a token refresh.
    Authorization(String),
    /// 2xx envelope whose business `code` signals failure.
    Business { code: i64, message: String },
    /// Body could not be decoded into the requested shape.
    InvalidResponse(String),
    /// Descriptor could not be turned into an outbound request.
    InvalidRequest(String),
}

impl RequestError {
    /// Build a status error.
    pub fn status(code: u16, body: impl Into<String>, retry_after_secs: Option<u64>) -> Self {
        Self::Status {
            code,
            body: body.into(),
            retry_after_secs,
        }
    }

    pub fn network(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self::Network {
            kind,
            message: message.into(),
        }
    }

    /// HTTP status code when the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Server-provided `Retry-After` hint in seconds.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Status {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization(_))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "request cancelled"),
            Self::Network { kind, message } => write!(f, "{kind} error: {message}"),
            Self::Status { code, body, .. } => write!(f, "status {code}: {body}"),
            Self::Authorization(msg) => write!(f, "unauthorized: {msg}"),
            Self::Business { code, message } => write!(f, "business code {code}: {message}"),
            Self::InvalidResponse(msg) => write!(f, "invalid response: {msg}"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
        }
    }
}

impl std::error::Error for RequestError {}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::network(NetworkErrorKind::Timeout, e.to_string());
        }
        if e.is_connect() {
            return Self::network(NetworkErrorKind::Connect, e.to_string());
        }
        if e.is_decode() {
            return Self::InvalidResponse(e.to_string());
        }
        if e.is_builder() {
            return Self::InvalidRequest(e.to_string());
        }
        // Body/request errors after connect mean the exchange was cut short.
        if e.is_request() || e.is_body() {
            return Self::network(NetworkErrorKind::Aborted, e.to_string());
        }
        Self::network(NetworkErrorKind::Other, e.to_string())
    }
}

// ---------------------------------------------------------------------------
// RequestFailure — terminal error with request context
// ---------------------------------------------------------------------------

/// Where a failed request was headed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub method: Method,
    pub url: String,
    /// Query parameters, already serialized; empty when none were sent.
    pub params: String,
}

/// Terminal failure returned by `RequestClient::execute`.
#[derive(Debug, Clone)]
pub struct RequestFailure {
    pub context: RequestContext,
    pub error: RequestError,
}

impl RequestFailure {
    pub fn is_cancelled(&self) -> bool {
        self.error.is_cancelled()
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.context.method, self.context.url)?;
        if !self.context.params.is_empty() {
            write!(f, " (params: {})", self.context.params)?;
        }
        write!(f, ": {}", self.error)
    }
}

impl std::error::Error for RequestFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
