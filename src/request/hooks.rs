//! Collaborator hooks injected into the request client.

use async_trait::async_trait;
use std::fmt;

use crate::error::{RequestError, RequestFailure};

use super::transport::{OutboundRequest, TransportResponse};

/// Severity of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Process-wide side effects the client may trigger. All default to no-ops.
pub trait GlobalHandlers: Send + Sync {
    fn show_loading(&self) {}

    fn hide_loading(&self) {}

    fn show_message(&self, _text: &str, _severity: Severity) {}

    /// Clear credentials and return the user to a signed-out state.
    fn logout(&self) {}

    /// Record a terminal, non-cancellation failure.
    fn resolve_error(&self, _failure: &RequestFailure) {}
}

/// Handler set that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandlers;

impl GlobalHandlers for NoopHandlers {}

/// Hooks run around every transport call.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// Adjust the outbound request, e.g. to attach credentials.
    async fn on_request(&self, request: &mut OutboundRequest) -> Result<(), RequestError>;

    /// Inspect or rewrite a successful response before it is shaped and cached.
    async fn on_response(&self, _response: &mut TransportResponse) -> Result<(), RequestError> {
        Ok(())
    }

    /// Observe a terminal failure before the global handlers report it.
    /// Cancellations are not reported.
    async fn on_error(&self, _failure: &RequestFailure) {}
}

/// Renews credentials after an authorization failure.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// `Ok(true)` when new credentials are in place. `Ok(false)` or an error
    /// means the session cannot be recovered.
    async fn refresh_token(&self) -> Result<bool, RequestError>;
}

/// Attaches a static credential header to every request.
#[derive(Debug, Clone)]
pub struct TokenInterceptor {
    header: String,
    scheme: Option<String>,
    token: String,
}

impl TokenInterceptor {
    /// `scheme` is prepended with a space (`Bearer <token>`) when present.
    pub fn new(header: impl Into<String>, scheme: Option<String>, token: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            scheme: scheme.filter(|scheme| !scheme.trim().is_empty()),
            token: token.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::new("Authorization", Some("Bearer".to_string()), token)
    }
}

#[async_trait]
impl RequestInterceptor for TokenInterceptor {
    async fn on_request(&self, request: &mut OutboundRequest) -> Result<(), RequestError> {
        // Empty tokens mean "no auth" (local endpoints), not an empty header.
        let token = self.token.trim();
        if token.is_empty() {
            return Ok(());
        }
        let value = match &self.scheme {
            Some(scheme) => format!("{scheme} {token}"),
            None => token.to_string(),
        };
        request.set_header(&self.header, value);
        Ok(())
    }
}
