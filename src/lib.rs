//! Courier: HTTP request orchestration over a pluggable transport.
//!
//! A [`request::RequestClient`] runs every call through one pipeline:
//! response caching, duplicate cancellation, retry with backoff, and a
//! single-flight credential refresh that replays requests after a 401.
//!
//! # Quick start
//!
//! ```no_run
//! use courier::config::load_config;
//! use courier::request::{NoopHandlers, RequestClient, RequestDescriptor, RequestOptions};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let config = load_config(None).unwrap();
//! let client = RequestClient::from_config(&config, Arc::new(NoopHandlers));
//! let user = client
//!     .execute(
//!         &RequestDescriptor::get("/users/7"),
//!         &RequestOptions::default().with_cache(Some(Duration::from_secs(30))),
//!     )
//!     .await
//!     .unwrap();
//! println!("{}", user.into_value());
//! # }
//! ```

pub mod config;
pub mod error;
pub mod render;
pub mod request;
#[cfg(test)]
pub mod testsupport;
