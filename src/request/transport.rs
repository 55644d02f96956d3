//! Transport seam and the reqwest-backed implementation.
//!
//! The executor only needs "send one request, get one response". Abort is
//! cooperative: the executor races the send future against the request's
//! cancel signal and drops it on cancellation, which tears down the
//! underlying reqwest connection.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::RequestError;

use super::descriptor::{ContentType, Method, RequestDescriptor};
use super::key::{stringify, stringify_map, ArrayFormat};

/// Encoded request body ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundBody {
    Json(Value),
    /// Pre-encoded text payload (form-urlencoded or plain text).
    Text(String),
}

/// Fully resolved request as the transport sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: Method,
    /// Absolute URL including the serialized query string.
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<OutboundBody>,
    pub timeout: Option<Duration>,
}

impl OutboundRequest {
    /// Resolve a descriptor against a base URL.
    pub fn build(
        descriptor: &RequestDescriptor,
        base_url: &str,
        params_format: ArrayFormat,
        timeout: Option<Duration>,
    ) -> Result<Self, RequestError> {
        if descriptor.url.trim().is_empty() && base_url.trim().is_empty() {
            return Err(RequestError::InvalidRequest(
                "request has no URL and no base URL is configured".to_string(),
            ));
        }
        let mut url = join_url(base_url, &descriptor.url);
        let query = stringify_map(&descriptor.params, params_format);
        if !query.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }

        let mut headers = descriptor.headers.clone();
        let body = descriptor.body.as_ref().map(|body| match descriptor.content_type {
            ContentType::Json => OutboundBody::Json(body.clone()),
            ContentType::Form => OutboundBody::Text(stringify(body, params_format)),
            ContentType::Text => OutboundBody::Text(match body {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            }),
        });
        let has_content_type = headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("content-type"));
        if body.is_some() && !has_content_type {
            headers.insert(
                "Content-Type".to_string(),
                descriptor.content_type.header_value().to_string(),
            );
        }

        Ok(Self {
            method: descriptor.method,
            url,
            headers,
            body,
            timeout,
        })
    }

    /// Set or replace a header, matching names case-insensitively.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers
            .retain(|existing, _| !existing.eq_ignore_ascii_case(name));
        self.headers.insert(name.to_string(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Response as received, for any status code.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body; non-JSON text is kept as a JSON string, empty bodies as null.
    pub body: Value,
}

impl TransportResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Body rendered as text for error messages.
    pub fn body_text(&self) -> String {
        match &self.body {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// One HTTP exchange. Implementations must be abort-safe when dropped mid-flight.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, RequestError>;
}

/// Build an HTTP client with timeout applied.
pub fn build_http_client(timeout: Duration) -> reqwest::Client {
    // Fall back to reqwest defaults if builder creation fails for any reason.
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Production transport over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: build_http_client(timeout),
        }
    }

    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, RequestError> {
        let mut req = self.http.request(reqwest_method(request.method), &request.url);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }
        req = match &request.body {
            Some(OutboundBody::Json(value)) => req.json(value),
            Some(OutboundBody::Text(text)) => req.body(text.clone()),
            None => req,
        };

        let response = req.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        let text = response.text().await?;
        Ok(TransportResponse {
            status,
            headers,
            body: parse_body(&text),
        })
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
    }
}

pub(crate) fn join_url(base_url: &str, url: &str) -> String {
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || base_url.is_empty() {
        return url.to_string();
    }
    if url.is_empty() {
        return base_url.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        url.trim_start_matches('/')
    )
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn relative_urls_join_base_and_absolute_urls_pass_through() {
        assert_eq!(join_url("https://api.x/v1/", "/users"), "https://api.x/v1/users");
        assert_eq!(join_url("https://api.x/v1", "users"), "https://api.x/v1/users");
        assert_eq!(join_url("https://api.x", "HTTPS://other.y/a"), "HTTPS://other.y/a");
        assert_eq!(join_url("", "/users"), "/users");
    }

    #[test]
    fn build_appends_sorted_query_with_selected_array_format() {
        let descriptor = RequestDescriptor::get("/items?lang=en")
            .param("ids", json!([1, 2]))
            .param("a", "x y");
        let request = OutboundRequest::build(
            &descriptor,
            "https://api.x",
            ArrayFormat::Brackets,
            None,
        )
        .expect("build");
        assert_eq!(
            request.url,
            "https://api.x/items?lang=en&a=x%20y&ids[]=1&ids[]=2"
        );
        assert!(request.body.is_none());
        assert!(request.header("content-type").is_none());
    }

    #[test]
    fn build_encodes_form_bodies_and_sets_content_type() {
        let descriptor = RequestDescriptor::post("/login").form(json!({"user": "ada", "pw": "p&w"}));
        let request =
            OutboundRequest::build(&descriptor, "", ArrayFormat::Repeat, None).expect("build");
        assert_eq!(
            request.body,
            Some(OutboundBody::Text("pw=p%26w&user=ada".to_string()))
        );
        assert_eq!(
            request.header("Content-Type"),
            Some("application/x-www-form-urlencoded;charset=UTF-8")
        );
    }

    #[test]
    fn build_keeps_caller_content_type() {
        let descriptor = RequestDescriptor::post("/raw")
            .json(json!({"a": 1}))
            .header("content-type", "application/vnd.api+json");
        let request =
            OutboundRequest::build(&descriptor, "", ArrayFormat::Repeat, None).expect("build");
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header("Content-Type"), Some("application/vnd.api+json"));
    }

    #[test]
    fn build_rejects_missing_url() {
        let descriptor = RequestDescriptor::get("");
        let err = OutboundRequest::build(&descriptor, "", ArrayFormat::Repeat, None).unwrap_err();
        assert!(matches!(err, RequestError::InvalidRequest(_)));
    }

    #[test]
    fn set_header_replaces_case_insensitively() {
        let descriptor = RequestDescriptor::get("/a").header("authorization", "old");
        let mut request =
            OutboundRequest::build(&descriptor, "", ArrayFormat::Repeat, None).expect("build");
        request.set_header("Authorization", "Bearer new");
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header("authorization"), Some("Bearer new"));
    }

    #[test]
    fn body_parsing_keeps_text_and_nulls_empty() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_body("plain"), json!("plain"));
    }

    #[test]
    fn response_headers_lookup_is_case_insensitive() {
        let response = TransportResponse::new(429, json!("slow")).with_header("Retry-After", "2");
        assert_eq!(response.header("retry-after"), Some("2"));
        assert!(!response.is_success());
        assert_eq!(response.body_text(), "slow");
    }
}
