//! Request executor.
//!
//! `RequestClient` owns the process-wide coordination state (cache, in-flight
//! map, refresh cycle) and runs every call through the same pipeline:
//! cache lookup, in-flight registration, interceptor, transport, then
//! retry or refresh-and-replay on failure.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{RequestContext, RequestError, RequestFailure};

use super::cache::CacheStore;
use super::descriptor::RequestDescriptor;
use super::hooks::{
    GlobalHandlers, NoopHandlers, RequestInterceptor, Severity, TokenInterceptor, TokenRefresher,
};
use super::inflight::{CancelSignal, InFlightTracker, Registration};
use super::key::{identity_key, stringify_map, ArrayFormat};
use super::options::{CacheOptions, RequestOptions, ResponseShape};
use super::refresh::{RefreshCoordinator, RefreshOutcome};
use super::retry::{parse_retry_after, RetryState};
use super::transport::{join_url, OutboundRequest, ReqwestTransport, Transport, TransportResponse};

/// Envelope `code` meaning success.
pub const DEFAULT_SUCCESS_CODE: i64 = 200;
/// Envelope `code` meaning the session is no longer valid.
pub const DEFAULT_LOGIN_CODE: i64 = 401;
/// Upper bound on one credential refresh.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Client-wide execution settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Prefix for relative descriptor URLs; empty means URLs are used as given.
    pub base_url: String,
    /// Per-request timeout handed to the transport.
    pub timeout: Option<Duration>,
    pub params_format: ArrayFormat,
    pub success_code: i64,
    pub login_code: i64,
    pub refresh_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: None,
            params_format: ArrayFormat::Repeat,
            success_code: DEFAULT_SUCCESS_CODE,
            login_code: DEFAULT_LOGIN_CODE,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }
}

/// Successful result in the shape the caller asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Raw(TransportResponse),
    Body(Value),
    Data(Value),
}

impl Reply {
    /// Flatten into JSON. Raw replies become `{status, headers, body}`.
    pub fn into_value(self) -> Value {
        match self {
            Self::Raw(response) => json!({
                "status": response.status,
                "headers": response.headers,
                "body": response.body,
            }),
            Self::Body(value) | Self::Data(value) => value,
        }
    }
}

/// Builder for [`RequestClient`].
pub struct RequestClientBuilder {
    transport: Arc<dyn Transport>,
    interceptor: Option<Arc<dyn RequestInterceptor>>,
    handlers: Arc<dyn GlobalHandlers>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    settings: ClientSettings,
    defaults: RequestOptions,
}

impl RequestClientBuilder {
    pub fn settings(mut self, settings: ClientSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn handlers(mut self, handlers: Arc<dyn GlobalHandlers>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Options used by the convenience verbs (`get`, `post`, ...).
    pub fn default_options(mut self, options: RequestOptions) -> Self {
        self.defaults = options;
        self
    }

    pub fn build(self) -> RequestClient {
        let refresh = RefreshCoordinator::new(self.settings.refresh_timeout);
        RequestClient {
            transport: self.transport,
            interceptor: self.interceptor,
            handlers: self.handlers,
            refresher: self.refresher,
            settings: self.settings,
            defaults: self.defaults,
            cache: CacheStore::new(),
            inflight: InFlightTracker::new(),
            refresh,
        }
    }
}

/// Deduplicating, caching, retrying, refresh-aware request executor.
pub struct RequestClient {
    transport: Arc<dyn Transport>,
    interceptor: Option<Arc<dyn RequestInterceptor>>,
    handlers: Arc<dyn GlobalHandlers>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    settings: ClientSettings,
    defaults: RequestOptions,
    cache: CacheStore<TransportResponse>,
    inflight: InFlightTracker,
    refresh: RefreshCoordinator,
}

impl RequestClient {
    pub fn builder(transport: Arc<dyn Transport>) -> RequestClientBuilder {
        RequestClientBuilder {
            transport,
            interceptor: None,
            handlers: Arc::new(NoopHandlers),
            refresher: None,
            settings: ClientSettings::default(),
            defaults: RequestOptions::default(),
        }
    }

    /// Build a reqwest-backed client from resolved configuration.
    ///
    /// A configured token is attached by a [`TokenInterceptor`]; callers that
    /// need refresh support add a refresher through [`RequestClient::builder`].
    pub fn from_config(config: &Config, handlers: Arc<dyn GlobalHandlers>) -> Self {
        let settings = config.client.settings();
        let transport = Arc::new(ReqwestTransport::new(config.client.timeout()));
        let mut builder = Self::builder(transport)
            .settings(settings)
            .handlers(handlers)
            .default_options(config.request.clone());
        if let Some(token) = config.auth.token.as_deref().filter(|t| !t.trim().is_empty()) {
            builder = builder.interceptor(Arc::new(TokenInterceptor::new(
                config.auth.header.clone(),
                config.auth.scheme.clone(),
                token,
            )));
        }
        builder.build()
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Default options applied by the convenience verbs.
    pub fn options(&self) -> &RequestOptions {
        &self.defaults
    }

    /// Run one request through cache, dedup, transport, retry and refresh.
    pub async fn execute(
        &self,
        descriptor: &RequestDescriptor,
        options: &RequestOptions,
    ) -> Result<Reply, RequestFailure> {
        let _loading = options
            .loading
            .then(|| LoadingGuard::show(self.handlers.as_ref()));
        let result = self.run(descriptor, options).await;
        if let Err(failure) = &result {
            if failure.is_cancelled() {
                debug!(method = %descriptor.method, url = %descriptor.url, "request cancelled");
            } else {
                if let Some(interceptor) = &self.interceptor {
                    interceptor.on_error(failure).await;
                }
                self.handlers
                    .show_message(&failure.error.to_string(), Severity::Error);
                self.handlers.resolve_error(failure);
            }
        }
        result
    }

    /// Execute and deserialize the reply into `T`.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
        options: &RequestOptions,
    ) -> Result<T, RequestFailure> {
        let value = self.execute(descriptor, options).await?.into_value();
        serde_json::from_value(value).map_err(|err| RequestFailure {
            context: self.context(descriptor),
            error: RequestError::InvalidResponse(err.to_string()),
        })
    }

    pub async fn get(&self, url: &str, params: Value) -> Result<Value, RequestFailure> {
        self.send_default(RequestDescriptor::get(url).params(params))
            .await
    }

    pub async fn post(&self, url: &str, body: Value) -> Result<Value, RequestFailure> {
        self.send_default(RequestDescriptor::post(url).json(body))
            .await
    }

    pub async fn put(&self, url: &str, body: Value) -> Result<Value, RequestFailure> {
        self.send_default(RequestDescriptor::put(url).json(body))
            .await
    }

    pub async fn patch(&self, url: &str, body: Value) -> Result<Value, RequestFailure> {
        self.send_default(RequestDescriptor::patch(url).json(body))
            .await
    }

    pub async fn delete(&self, url: &str, params: Value) -> Result<Value, RequestFailure> {
        self.send_default(RequestDescriptor::delete(url).params(params))
            .await
    }

    /// Abort every in-flight request. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        self.inflight.remove_all_pending()
    }

    /// Abort the in-flight request identical to `descriptor`, if any.
    pub fn remove_pending(&self, descriptor: &RequestDescriptor) -> bool {
        self.inflight.remove_pending(&identity_key(descriptor))
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Drop one cache entry, or all of them when `key` is `None`.
    pub fn clear_cache(&self, key: Option<&str>) {
        match key {
            Some(key) => self.cache.delete(key),
            None => self.cache.clear(),
        }
    }

    pub fn cache_size(&self) -> usize {
        self.cache.size()
    }

    async fn send_default(&self, descriptor: RequestDescriptor) -> Result<Value, RequestFailure> {
        let reply = self.execute(&descriptor, &self.defaults).await?;
        Ok(reply.into_value())
    }

    async fn run(
        &self,
        descriptor: &RequestDescriptor,
        options: &RequestOptions,
    ) -> Result<Reply, RequestFailure> {
        let fail = |error: RequestError| RequestFailure {
            context: self.context(descriptor),
            error,
        };

        let cache_target: Option<(&CacheOptions, String)> = options
            .active_cache()
            .filter(|cache| descriptor.method.is_cacheable() || cache.allow_mutating)
            .map(|cache| {
                let key = CacheStore::<TransportResponse>::generate_key(
                    descriptor,
                    cache.key.as_deref(),
                );
                (cache, key)
            });
        if let Some((cache, key)) = &cache_target {
            if let Some(hit) = self.cache.get(key, cache.ttl()) {
                debug!(key = %key, "serving response from cache");
                return self.shape(&hit, options.response_shape).map_err(fail);
            }
        }

        let identity = identity_key(descriptor);
        let mut retry = RetryState::new(options.retry.as_ref());
        let mut replayed = false;
        loop {
            let generation = self.refresh.generation();
            let mut registration = self.register(&identity, options.cancel_duplicate);
            debug!(
                method = %descriptor.method,
                url = %descriptor.url,
                attempt = retry.attempt_count,
                "dispatching request"
            );
            let outcome = self
                .attempt(descriptor, options.response_shape, &mut registration.signal)
                .await;

            let error = match outcome {
                Ok((response, reply)) => {
                    self.inflight.complete(&registration);
                    if let Some((cache, key)) = &cache_target {
                        self.cache.set(key, response, cache.ttl());
                    }
                    return Ok(reply);
                }
                Err(error) => error,
            };

            let step = self
                .recover_from(error, descriptor, generation, replayed, &mut retry, &mut registration)
                .await;
            self.inflight.complete(&registration);
            // Cancelled while the step settled: never start another attempt.
            let step = match step {
                Step::Retry | Step::Replay if registration.signal.is_cancelled() => {
                    Step::Fail(RequestError::Cancelled)
                }
                step => step,
            };
            match step {
                Step::Retry => continue,
                Step::Replay => {
                    debug!(method = %descriptor.method, url = %descriptor.url, "replaying after refresh");
                    replayed = true;
                }
                Step::Fail(error) => return Err(fail(error)),
            }
        }
    }

    /// Decide what follows a failed attempt. The registration stays live
    /// throughout, so backoff and refresh waits can be cancelled.
    async fn recover_from(
        &self,
        error: RequestError,
        descriptor: &RequestDescriptor,
        generation: u64,
        replayed: bool,
        retry: &mut RetryState,
        registration: &mut Registration,
    ) -> Step {
        if !error.is_cancelled() && retry.should_retry(&error) {
            let delay = retry.next_delay(&error);
            warn!(
                method = %descriptor.method,
                url = %descriptor.url,
                attempt = retry.attempt_count,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "retrying request"
            );
            return tokio::select! {
                biased;
                _ = registration.signal.cancelled() => Step::Fail(RequestError::Cancelled),
                _ = tokio::time::sleep(delay) => Step::Retry,
            };
        }

        let message = match error {
            RequestError::Authorization(message) => message,
            other => return Step::Fail(other),
        };
        if replayed {
            return Step::Fail(RequestError::Authorization(format!(
                "still unauthorized after credential refresh: {message}"
            )));
        }
        let recovery = self.refresh.recover(
            generation,
            self.refresher.as_deref(),
            self.handlers.as_ref(),
        );
        let outcome = tokio::select! {
            biased;
            _ = registration.signal.cancelled() => return Step::Fail(RequestError::Cancelled),
            outcome = recovery => outcome,
        };
        match outcome {
            RefreshOutcome::Refreshed => Step::Replay,
            RefreshOutcome::Failed if self.refresher.is_none() => {
                Step::Fail(RequestError::Authorization(message))
            }
            RefreshOutcome::Failed => Step::Fail(RequestError::Authorization(format!(
                "credential refresh failed: {message}"
            ))),
        }
    }

    fn register(&self, identity: &str, cancel_duplicate: bool) -> Registration {
        if cancel_duplicate {
            self.inflight.add_pending(identity)
        } else {
            self.inflight.track(identity)
        }
    }

    /// One transport exchange, raced against cancellation, classified and shaped.
    async fn attempt(
        &self,
        descriptor: &RequestDescriptor,
        shape: ResponseShape,
        signal: &mut CancelSignal,
    ) -> Result<(TransportResponse, Reply), RequestError> {
        let mut request = OutboundRequest::build(
            descriptor,
            &self.settings.base_url,
            self.settings.params_format,
            self.settings.timeout,
        )?;
        let exchange = async {
            if let Some(interceptor) = &self.interceptor {
                interceptor.on_request(&mut request).await?;
            }
            self.transport.send(&request).await
        };
        let result = tokio::select! {
            biased;
            _ = signal.cancelled() => Err(RequestError::Cancelled),
            result = exchange => result,
        };
        // A newer duplicate may have started while the response was in hand.
        if signal.is_cancelled() {
            return Err(RequestError::Cancelled);
        }
        let mut response = result?;
        if !response.is_success() {
            return Err(classify_status(&response));
        }
        if let Some(interceptor) = &self.interceptor {
            interceptor.on_response(&mut response).await?;
        }
        let reply = self.shape(&response, shape)?;
        Ok((response, reply))
    }

    fn shape(&self, response: &TransportResponse, shape: ResponseShape) -> Result<Reply, RequestError> {
        match shape {
            ResponseShape::Raw => Ok(Reply::Raw(response.clone())),
            ResponseShape::Body => Ok(Reply::Body(response.body.clone())),
            ResponseShape::Data => {
                let Some(envelope) = response.body.as_object() else {
                    return Err(RequestError::InvalidResponse(
                        "expected a {code, data, message} envelope".to_string(),
                    ));
                };
                let Some(code) = envelope.get("code").and_then(Value::as_i64) else {
                    return Err(RequestError::InvalidResponse(
                        "envelope is missing a numeric `code`".to_string(),
                    ));
                };
                if code == self.settings.success_code {
                    return Ok(Reply::Data(
                        envelope.get("data").cloned().unwrap_or(Value::Null),
                    ));
                }
                let message = envelope
                    .get("message")
                    .or_else(|| envelope.get("msg"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if code == self.settings.login_code {
                    return Err(RequestError::Authorization(message));
                }
                Err(RequestError::Business { code, message })
            }
        }
    }

    fn context(&self, descriptor: &RequestDescriptor) -> RequestContext {
        RequestContext {
            method: descriptor.method,
            url: join_url(&self.settings.base_url, &descriptor.url),
            params: stringify_map(&descriptor.params, self.settings.params_format),
        }
    }
}

/// What the executor does after a failed attempt.
enum Step {
    Retry,
    Replay,
    Fail(RequestError),
}

fn classify_status(response: &TransportResponse) -> RequestError {
    let body = response.body_text();
    if response.status == 401 {
        let message = if body.is_empty() {
            "401 Unauthorized".to_string()
        } else {
            body
        };
        return RequestError::Authorization(message);
    }
    let retry_after_secs = response.header("retry-after").and_then(parse_retry_after);
    RequestError::status(response.status, body, retry_after_secs)
}

/// Pairs `show_loading` with a `hide_loading` that runs even if the call is dropped.
struct LoadingGuard<'a> {
    handlers: &'a dyn GlobalHandlers,
}

impl<'a> LoadingGuard<'a> {
    fn show(handlers: &'a dyn GlobalHandlers) -> Self {
        handlers.show_loading();
        Self { handlers }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.handlers.hide_loading();
    }
}
