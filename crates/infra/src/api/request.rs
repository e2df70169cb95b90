//! Request and response descriptors
//!
//! [`ApiRequest`] is the fully prepared request (absolute URL, headers,
//! request id) that travels through breaker, queue, and offline buffer.
//! [`ApiResponse`] is what callers get back, whether it came from the
//! network, the cache, or a fallback.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use steadfast_common::cache::request_signature;
use url::Url;

use super::errors::{ApiError, Headers};

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    Fallback,
}

/// A resolved response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// JSON body; `Null` for an empty body, a JSON string for non-JSON text
    pub data: Value,
    pub headers: Headers,
    /// Served from cache after the live request failed
    pub stale: bool,
    pub source: ResponseSource,
}

impl ApiResponse {
    /// Build a response (e.g. inside a caller fallback)
    pub fn new(status: u16, data: Value) -> Self {
        Self { status, data, headers: Headers::new(), stale: false, source: ResponseSource::Network }
    }

    pub(crate) fn from_network(status: u16, headers: Headers, body: &[u8]) -> Self {
        Self { status, data: decode_body(body), headers, stale: false, source: ResponseSource::Network }
    }

    /// Copy of this response as served from the cache
    pub(crate) fn cached(&self, stale: bool) -> Self {
        Self { stale, source: ResponseSource::Cache, ..self.clone() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the payload
    ///
    /// # Errors
    /// `ApiError::Decode` if the payload does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(self.data.clone()).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn decode_body(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

/// Caller-supplied stand-in used when the breaker blocks a request
pub type Fallback = Arc<dyn Fn() -> ApiResponse + Send + Sync>;

/// Per-call options
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub headers: Headers,
    /// Overrides the configured per-attempt timeout
    pub timeout: Option<Duration>,
    pub fallback: Option<Fallback>,
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn() -> ApiResponse + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }
}

/// A prepared request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub headers: Headers,
    pub body: Option<Value>,
    pub request_id: String,
    /// Retries already made (0 on the first attempt)
    pub retry_count: u32,
    pub timeout: Duration,
}

impl ApiRequest {
    /// Non-idempotent writes are buffered while offline
    pub fn is_queueable(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH)
    }

    /// Only idempotent reads are cached
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }

    /// Breaker key: scheme, host, port and path
    pub fn endpoint_key(&self) -> String {
        endpoint_key(&self.url)
    }

    pub fn cache_key(&self) -> String {
        request_signature(self.method.as_str(), self.url.as_str(), &self.query)
    }
}

pub(crate) fn endpoint_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port_or_known_default() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(method: Method, url: &str) -> ApiRequest {
        ApiRequest {
            method,
            url: Url::parse(url).unwrap(),
            query: Vec::new(),
            headers: Headers::new(),
            body: None,
            request_id: "id".into(),
            retry_count: 0,
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_endpoint_key_ignores_query_and_normalises_port() {
        let a = request(Method::GET, "https://api.test/courses?page=1");
        let b = request(Method::POST, "https://api.test:443/courses");
        assert_eq!(a.endpoint_key(), "https://api.test:443/courses");
        assert_eq!(a.endpoint_key(), b.endpoint_key());
        assert_ne!(a.endpoint_key(), request(Method::GET, "https://api.test/bookings").endpoint_key());
    }

    #[test]
    fn test_method_classification() {
        assert!(request(Method::GET, "http://x/").is_cacheable());
        assert!(!request(Method::GET, "http://x/").is_queueable());
        for method in [Method::POST, Method::PUT, Method::PATCH] {
            let req = request(method, "http://x/");
            assert!(req.is_queueable());
            assert!(!req.is_cacheable());
        }
        let delete = request(Method::DELETE, "http://x/");
        assert!(!delete.is_queueable());
        assert!(!delete.is_cacheable());
    }

    #[test]
    fn test_cache_key_includes_query() {
        let mut req = request(Method::GET, "https://api.test/courses");
        req.query = vec![("b".into(), "2".into()), ("a".into(), "1".into())];
        assert_eq!(req.cache_key(), "GET https://api.test/courses?a=1&b=2");
    }

    #[test]
    fn test_cache_key_ignores_query_encoding() {
        let embedded = request(Method::GET, "https://api.test/search?q=caf%C3%A9%20au%20lait");
        let mut separate = request(Method::GET, "https://api.test/search");
        separate.query = vec![("q".into(), "café au lait".into())];
        assert_eq!(embedded.cache_key(), separate.cache_key());
    }

    #[test]
    fn test_body_decoding() {
        let response = ApiResponse::from_network(200, Headers::new(), br#"{"id": 7}"#);
        assert_eq!(response.data, json!({"id": 7}));

        assert_eq!(ApiResponse::from_network(204, Headers::new(), b"").data, Value::Null);
        assert_eq!(ApiResponse::from_network(200, Headers::new(), b"plain").data, json!("plain"));
    }

    #[test]
    fn test_json_and_cached_copy() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Course {
            id: u32,
        }

        let response = ApiResponse::new(200, json!({"id": 3}));
        assert_eq!(response.json::<Course>().unwrap(), Course { id: 3 });
        assert!(matches!(response.json::<Vec<u32>>(), Err(ApiError::Decode(_))));

        let stale = response.cached(true);
        assert!(stale.stale);
        assert_eq!(stale.source, ResponseSource::Cache);
        assert_eq!(stale.data, response.data);
    }

    #[test]
    fn test_options_builder() {
        let options = RequestOptions::new()
            .query("page", "2")
            .header("x-tenant", "acme")
            .timeout(Duration::from_secs(5))
            .fallback(|| ApiResponse::new(200, json!([])));

        assert_eq!(options.query, vec![("page".to_string(), "2".to_string())]);
        assert_eq!(options.headers.get("x-tenant").map(String::as_str), Some("acme"));
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert_eq!((options.fallback.unwrap())().data, json!([]));
    }
}
