//! HTTP request orchestration.
//!
//! Layers, bottom-up:
//! - `key`: canonical query strings and request identity keys
//! - `cache`: TTL response cache
//! - `inflight`: one live call per identity, with cancellation
//! - `retry`: retry decisions and backoff
//! - `refresh`: single-flight credential refresh after 401s
//! - `client`: the executor tying the above to a [`Transport`]

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod cache;
mod client;
mod descriptor;
mod hooks;
pub mod inflight;
pub mod key;
mod options;
pub mod refresh;
pub mod retry;
mod transport;

pub use cache::CacheStore;
pub use client::{
    ClientSettings, Reply, RequestClient, RequestClientBuilder, DEFAULT_LOGIN_CODE,
    DEFAULT_REFRESH_TIMEOUT, DEFAULT_SUCCESS_CODE,
};
pub use descriptor::{ContentType, Method, RequestDescriptor};
pub use hooks::{
    GlobalHandlers, NoopHandlers, RequestInterceptor, Severity, TokenInterceptor, TokenRefresher,
};
pub use inflight::InFlightTracker;
pub use key::{identity_key, stringify, stringify_map, ArrayFormat};
pub use options::{CacheOptions, RequestOptions, ResponseShape, RetryOptions};
pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use retry::{RetryPolicy, RetryState};
pub use transport::{
    build_http_client, OutboundBody, OutboundRequest, ReqwestTransport, Transport,
    TransportResponse,
};

/// Lock a coordination mutex, recovering the data if a holder panicked.
///
/// Every critical section leaves the guarded state consistent, so a
/// poisoned lock carries no torn writes.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
