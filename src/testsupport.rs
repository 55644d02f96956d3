//! Shared test fixtures for the request pipeline and config loader tests.
//!
//! Fakes for every injected collaborator live here so test modules only
//! describe behavior: a scripted transport, recording handlers, a counting
//! refresher, and a token interceptor whose value can be rotated.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

use crate::error::{RequestError, RequestFailure};
use crate::request::{
    GlobalHandlers, OutboundRequest, RequestInterceptor, Severity, TokenRefresher, Transport,
    TransportResponse,
};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary directory fixture with best-effort cleanup.
#[derive(Debug)]
pub struct TestTempDir {
    path: PathBuf,
}

impl TestTempDir {
    pub fn new(prefix: &str) -> Self {
        let suffix = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let dir = std::env::temp_dir().join(format!("courier-{prefix}-{millis}-{suffix}"));
        fs::create_dir_all(&dir).expect("failed to create temporary fixture directory");
        Self { path: dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write UTF-8 text under the fixture root, creating parents as needed.
    pub fn write_text(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directories for fixture");
        }
        fs::write(&path, content).expect("failed to write fixture file");
        path
    }
}

impl Drop for TestTempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// HTTP 200 carrying a `{code, data, message}` envelope.
pub fn envelope(code: i64, data: Value) -> TransportResponse {
    let message = if code == 200 { "ok" } else { "request rejected" };
    TransportResponse::new(200, json!({"code": code, "data": data, "message": message}))
}

type Script = dyn Fn(&OutboundRequest, usize) -> Result<TransportResponse, RequestError> + Send + Sync;

/// Transport that answers from a closure of `(request, call_index)`.
pub struct ScriptedTransport {
    script: Box<Script>,
    delay: Duration,
    requests: Mutex<Vec<OutboundRequest>>,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedTransport {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&OutboundRequest, usize) -> Result<TransportResponse, RequestError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            script: Box::new(script),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            call_times: Mutex::new(Vec::new()),
        }
    }

    pub fn always(response: TransportResponse) -> Self {
        Self::new(move |_, _| Ok(response.clone()))
    }

    /// Sleep before answering, so callers can cancel mid-flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().expect("times lock").clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, RequestError> {
        let index = {
            let mut requests = self.requests.lock().expect("requests lock");
            requests.push(request.clone());
            self.call_times
                .lock()
                .expect("times lock")
                .push(Instant::now());
            requests.len() - 1
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(request, index)
    }
}

/// Handlers that record every event for later assertions.
#[derive(Default)]
pub struct RecordingHandlers {
    logouts: AtomicUsize,
    loading: Mutex<Vec<&'static str>>,
    messages: Mutex<Vec<(String, Severity)>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingHandlers {
    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    pub fn loading_events(&self) -> Vec<&'static str> {
        self.loading.lock().expect("loading lock").clone()
    }

    pub fn messages(&self) -> Vec<(String, Severity)> {
        self.messages.lock().expect("messages lock").clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().expect("errors lock").clone()
    }
}

impl GlobalHandlers for RecordingHandlers {
    fn show_loading(&self) {
        self.loading.lock().expect("loading lock").push("show");
    }

    fn hide_loading(&self) {
        self.loading.lock().expect("loading lock").push("hide");
    }

    fn show_message(&self, text: &str, severity: Severity) {
        self.messages
            .lock()
            .expect("messages lock")
            .push((text.to_string(), severity));
    }

    fn logout(&self) {
        self.logouts.fetch_add(1, Ordering::SeqCst);
    }

    fn resolve_error(&self, failure: &RequestFailure) {
        self.errors
            .lock()
            .expect("errors lock")
            .push(failure.to_string());
    }
}

/// Bearer interceptor whose token can be swapped mid-test.
#[derive(Clone)]
pub struct SharedTokenInterceptor {
    token: Arc<Mutex<String>>,
}

impl SharedTokenInterceptor {
    pub fn new(token: &str) -> Self {
        Self {
            token: Arc::new(Mutex::new(token.to_string())),
        }
    }

    pub fn set(&self, token: &str) {
        *self.token.lock().expect("token lock") = token.to_string();
    }
}

#[async_trait]
impl RequestInterceptor for SharedTokenInterceptor {
    async fn on_request(&self, request: &mut OutboundRequest) -> Result<(), RequestError> {
        let token = self.token.lock().expect("token lock").clone();
        request.set_header("Authorization", format!("Bearer {token}"));
        Ok(())
    }
}

/// Refresher that counts invocations and answers after a delay.
pub struct CountingRefresher {
    calls: AtomicUsize,
    delay: Duration,
    succeed: bool,
    rotate: Option<(SharedTokenInterceptor, String)>,
}

impl CountingRefresher {
    pub fn succeeding(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
            succeed: true,
            rotate: None,
        }
    }

    pub fn failing(delay: Duration) -> Self {
        Self {
            succeed: false,
            ..Self::succeeding(delay)
        }
    }

    /// Install `token` into `interceptor` when the refresh succeeds.
    pub fn rotating(mut self, interceptor: SharedTokenInterceptor, token: &str) -> Self {
        self.rotate = Some((interceptor, token.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for CountingRefresher {
    async fn refresh_token(&self) -> Result<bool, RequestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.succeed {
            if let Some((interceptor, token)) = &self.rotate {
                interceptor.set(token);
            }
        }
        Ok(self.succeed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ArrayFormat, RequestDescriptor};

    #[test]
    fn temp_dir_fixture_writes_files() {
        let fixture = TestTempDir::new("fixture");
        let file = fixture.write_text("nested/file.txt", "hello");
        assert_eq!(fs::read_to_string(file).unwrap(), "hello");
        assert!(fixture.path().exists());
    }

    #[tokio::test]
    async fn scripted_transport_records_calls_in_order() {
        let transport = ScriptedTransport::new(|_, index| Ok(envelope(200, json!(index))));
        let request =
            OutboundRequest::build(&RequestDescriptor::get("https://x.test"), "", ArrayFormat::Repeat, None)
                .unwrap();
        transport.send(&request).await.unwrap();
        let second = transport.send(&request).await.unwrap();
        assert_eq!(second.body["data"], json!(1));
        assert_eq!(transport.calls(), 2);
        assert_eq!(transport.call_times().len(), 2);
    }
}
