//! Resilient API client
//!
//! Every request goes through the same pipeline:
//!
//! 1. Resolve the URL against `base_url`, attach `X-Request-ID` and the bearer
//!    token.
//! 2. While offline, POST/PUT/PATCH are parked in the offline buffer and the
//!    caller waits until they are replayed or time out.
//! 3. Otherwise each network attempt takes a slot in the request queue and,
//!    inside that slot, runs through the endpoint's circuit breaker bounded by
//!    the per-call timeout. Requests that cannot be built fail before either.
//! 4. Failures are retried with exponential backoff, degraded to a cached
//!    response or the caller's fallback when the breaker opens, or returned
//!    with their original status, body and headers.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use steadfast_common::cache::{CacheStats, ResponseCache};
use steadfast_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, ResilienceError,
    ResilienceResult, RetryConfig, RetryDecision,
};
use steadfast_common::sync::{OfflineBuffer, PendingRequest, QueueMetricsSnapshot, RequestQueue};
use steadfast_domain::constants::{AUTHORIZATION_HEADER, REQUEST_ID_HEADER};
use steadfast_domain::{ClientConfig, SteadfastError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::auth::AccessTokenProvider;
use super::errors::{ApiError, Headers};
use super::request::{endpoint_key, ApiRequest, ApiResponse, Fallback, RequestOptions, ResponseSource};
use crate::errors::InfraError;
use crate::http::{ConnectivityMonitor, HttpClient};

/// Timeout for [`ResilientClient::health_check`]
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

type Outcome = Result<ApiResponse, ApiError>;

/// Raw response of a single attempt
struct Received {
    status: u16,
    headers: Headers,
    body: Vec<u8>,
}

/// HTTP client with per-endpoint circuit breakers, response caching,
/// bounded concurrency and offline buffering
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ResilientClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    http: HttpClient,
    auth: Option<Arc<dyn AccessTokenProvider>>,
    breakers: CircuitBreakerRegistry,
    cache: ResponseCache<ApiResponse>,
    queue: RequestQueue,
    offline: OfflineBuffer<ApiRequest, Outcome>,
    connectivity: ConnectivityMonitor,
    retry: RetryConfig,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("base_url", &self.inner.config.base_url)
            .field("online", &self.inner.connectivity.is_online())
            .field("breakers", &self.inner.breakers.len())
            .field("cached", &self.inner.cache.len())
            .field("offline", &self.inner.offline.len())
            .finish()
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}

impl ResilientClient {
    /// Client with the given configuration and no auth provider
    ///
    /// # Errors
    /// `ApiError::Config` if the configuration is invalid.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        Self::builder().config(config).build()
    }

    /// Start building a client; see [`ResilientClientBuilder`]
    pub fn builder() -> ResilientClientBuilder {
        ResilientClientBuilder::default()
    }

    /// Execute a GET request
    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(Method::GET, url, None, options).await
    }

    /// Execute a POST request with a JSON body
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        self.request(Method::POST, url, Some(to_json(body)?), options).await
    }

    /// Execute a PUT request with a JSON body
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        self.request(Method::PUT, url, Some(to_json(body)?), options).await
    }

    /// Execute a PATCH request with a JSON body
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        self.request(Method::PATCH, url, Some(to_json(body)?), options).await
    }

    /// Execute a DELETE request
    pub async fn delete(&self, url: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.request(Method::DELETE, url, None, options).await
    }

    /// Execute a request through the full pipeline
    ///
    /// # Errors
    /// See [`ApiError`]; 4xx responses are errors, 5xx responses are errors
    /// once retries are exhausted and nothing can stand in for them.
    #[instrument(skip(self, body, options))]
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let fallback = options.fallback.clone();
        let request = self.inner.prepare(method, url, body, options).await?;

        if request.is_queueable() && !self.inner.connectivity.is_online() {
            return self.inner.enqueue_offline(request).await;
        }

        self.inner.dispatch(request, fallback.as_ref()).await
    }

    /// Probe `GET {base_url}/health` directly, bypassing breaker and queue
    ///
    /// Returns `Ok(false)` for a non-success status.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<bool, ApiError> {
        let base = self
            .inner
            .config
            .base_url
            .as_deref()
            .ok_or_else(|| ApiError::Config("health check requires base_url".to_string()))?;
        let url = format!("{}/health", base.trim_end_matches('/'));

        debug!(url = %url, "Health check");

        let http = &self.inner.http;
        let response = tokio::time::timeout(HEALTH_CHECK_TIMEOUT, http.send(http.request(Method::GET, &url)))
            .await
            .map_err(|_| {
                warn!("Health check timeout");
                ApiError::Timeout(HEALTH_CHECK_TIMEOUT)
            })?;

        match response {
            Ok(resp) if resp.status().is_success() => {
                info!("API is healthy");
                Ok(true)
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "API returned non-success status");
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "Health check failed");
                Err(ApiError::from(e))
            }
        }
    }

    /// Start replaying the offline buffer on reconnect
    ///
    /// Called automatically by [`ResilientClientBuilder::build`] when a Tokio
    /// runtime is running. Returns `false` if a listener is already running or
    /// no runtime is available.
    pub fn spawn_reconnect_listener(&self) -> bool {
        let mut listener = self.inner.listener.lock();
        if listener.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        *listener = spawn_reconnect_listener(&self.inner);
        listener.is_some()
    }

    /// Connectivity signal that decides whether writes are buffered
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.inner.connectivity
    }

    /// Configuration the client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Breaker state for the endpoint `url` maps to, if it has been called
    pub fn breaker_state(&self, url: &str) -> Option<CircuitState> {
        let url = self.inner.resolve_url(url).ok()?;
        self.inner.breakers.get(&endpoint_key(&url)).map(|breaker| breaker.state())
    }

    /// Every known endpoint with its breaker state
    pub fn breaker_states(&self) -> Vec<(String, CircuitState)> {
        self.inner.breakers.states()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn queue_metrics(&self) -> QueueMetricsSnapshot {
        self.inner.queue.metrics()
    }

    /// Requests waiting for connectivity
    pub fn offline_len(&self) -> usize {
        self.inner.offline.len()
    }

    /// Drop all breakers, cached responses and buffered requests
    ///
    /// Callers waiting on buffered requests receive `ApiError::Cancelled`.
    pub fn reset(&self) {
        self.inner.breakers.reset();
        self.inner.cache.clear();
        let dropped = self.inner.offline.clear();
        info!(dropped, "Client state reset");
    }
}

impl ClientInner {
    fn resolve_url(&self, url: &str) -> Result<Url, ApiError> {
        if let Ok(absolute) = Url::parse(url) {
            return Ok(absolute);
        }

        let base = self
            .config
            .base_url
            .as_deref()
            .ok_or_else(|| ApiError::Config(format!("relative URL {url} without base_url")))?;
        let joined = format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'));
        Url::parse(&joined).map_err(|e| ApiError::Config(format!("invalid URL {joined}: {e}")))
    }

    async fn prepare(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<ApiRequest, ApiError> {
        let url = self.resolve_url(url)?;
        let request_id = Uuid::new_v4().to_string();

        let mut headers = options.headers;
        headers.insert(REQUEST_ID_HEADER.to_string(), request_id.clone());

        if let Some(auth) = &self.auth {
            if let Some(token) = auth.access_token().await? {
                headers.insert(AUTHORIZATION_HEADER.to_string(), format!("Bearer {token}"));
            }
        }

        Ok(ApiRequest {
            method,
            url,
            query: options.query,
            headers,
            body,
            request_id,
            retry_count: 0,
            timeout: options.timeout.unwrap_or_else(|| self.config.request_timeout()),
        })
    }

    /// Breaker, retry and degradation loop for one request
    async fn dispatch(&self, mut request: ApiRequest, fallback: Option<&Fallback>) -> Outcome {
        let endpoint = request.endpoint_key();
        let breaker = self.breakers.get_or_create(&endpoint);

        loop {
            debug!(
                request_id = %request.request_id,
                retry = request.retry_count,
                "Dispatching request"
            );

            // A request that cannot be built never reaches the breaker
            let http_request = self.build(&request)?;

            let outcome = self.attempt(&breaker, http_request, request.timeout).await?;
            match outcome {
                Ok(received) => return self.complete(&request, received),
                Err(ResilienceError::CircuitOpen) => {
                    debug!(endpoint = %endpoint, "Circuit open, request not sent");
                    return self.degrade(&request, fallback, ApiError::CircuitOpen { endpoint });
                }
                Err(ResilienceError::OperationFailed { source }) => {
                    if breaker.state() == CircuitState::Open {
                        warn!(endpoint = %endpoint, error = %source, "Failure tripped circuit breaker");
                        let error = ApiError::ServiceUnavailable { endpoint, source: Box::new(source) };
                        return self.degrade(&request, fallback, error);
                    }

                    let delay = match self.retry.decide(&source, request.retry_count) {
                        RetryDecision::RetryAfter(delay) => delay,
                        RetryDecision::Stop => return self.exhausted(&request, source),
                    };

                    request.retry_count += 1;
                    debug!(
                        request_id = %request.request_id,
                        retry = request.retry_count,
                        ?delay,
                        error = %source,
                        "Retrying after backoff"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Turn the request into a reqwest `Request`
    fn build(&self, request: &ApiRequest) -> Result<reqwest::Request, ApiError> {
        let mut builder = self.http.request(request.method.clone(), request.url.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder.build().map_err(|e| {
            debug!(request_id = %request.request_id, error = %e, "Request could not be built");
            ApiError::Config(format!("invalid HTTP request: {e}"))
        })
    }

    /// One network attempt: take a queue slot, then run through the breaker
    ///
    /// Only a missing response, a timeout or a 5xx status reaches the breaker
    /// as a failure. A task lost by the queue is reported as `Cancelled` and
    /// leaves the breaker counts alone.
    async fn attempt(
        &self,
        breaker: &Arc<CircuitBreaker>,
        http_request: reqwest::Request,
        timeout: Duration,
    ) -> Result<ResilienceResult<Received, ApiError>, ApiError> {
        let http = self.http.clone();
        let breaker = Arc::clone(breaker);

        self.queue
            .add(async move { breaker.execute(|| exchange(http, http_request, timeout)).await })
            .await
            .map_err(|_| ApiError::Cancelled)
    }

    /// Turn a response the breaker counted as a success into the caller's result
    fn complete(&self, request: &ApiRequest, received: Received) -> Outcome {
        let Received { status, headers, body } = received;

        if status >= 400 {
            debug!(request_id = %request.request_id, status, "Request rejected by server");
            return Err(ApiError::from_status(status, String::from_utf8_lossy(&body).into_owned(), headers));
        }

        let response = ApiResponse::from_network(status, headers, &body);
        if response.is_success() && request.is_cacheable() {
            self.cache.set(request.cache_key(), response.clone());
        }

        info!(
            request_id = %request.request_id,
            status,
            retries = request.retry_count,
            "Request successful"
        );
        Ok(response)
    }

    /// Stand-in for a request the breaker blocked: cache, fallback, or `error`
    fn degrade(&self, request: &ApiRequest, fallback: Option<&Fallback>, error: ApiError) -> Outcome {
        if request.is_cacheable() {
            if let Some(cached) = self.cache.get(&request.cache_key()) {
                warn!(request_id = %request.request_id, "Serving cached response while circuit is open");
                return Ok(cached.cached(false));
            }
        }

        if let Some(fallback) = fallback {
            warn!(request_id = %request.request_id, "Serving fallback response while circuit is open");
            let mut response = fallback();
            response.source = ResponseSource::Fallback;
            return Ok(response);
        }

        Err(error)
    }

    /// Retries are used up or the error is final
    fn exhausted(&self, request: &ApiRequest, error: ApiError) -> Outcome {
        if error.is_network() && request.is_cacheable() {
            if let Some(cached) = self.cache.get(&request.cache_key()) {
                warn!(request_id = %request.request_id, error = %error, "Serving stale cached response");
                return Ok(cached.cached(true));
            }
        }

        debug!(request_id = %request.request_id, error = %error, "Request failed");
        Err(error)
    }

    async fn enqueue_offline(self: &Arc<Self>, request: ApiRequest) -> Outcome {
        let id = request.request_id.clone();
        let receiver = self.offline.enqueue(id.clone(), request);
        info!(request_id = %id, pending = self.offline.len(), "Offline, request buffered");

        spawn_offline_poller(Arc::downgrade(self), id, self.config.offline_poll_interval(), self.config.offline_queue_timeout());

        receiver.await.unwrap_or(Err(ApiError::Cancelled))
    }

    /// Dispatch a buffered request and hand the outcome to its caller
    async fn replay(&self, pending: PendingRequest<ApiRequest, Outcome>) {
        let id = pending.id.clone();
        let waited = pending.waited();

        if pending.is_abandoned() {
            info!(request_id = %id, ?waited, "Caller gave up on buffered request, not replaying");
            return;
        }

        let request = pending.request.clone();

        let outcome = self.dispatch(request, None).await;
        match &outcome {
            Ok(response) => info!(request_id = %id, status = response.status, ?waited, "Buffered request replayed"),
            Err(error) => warn!(request_id = %id, error = %error, "Buffered request failed on replay"),
        }

        if !pending.resolve(outcome) {
            debug!(request_id = %id, "Caller stopped waiting for replayed request");
        }
    }

    /// Replay everything buffered, in insertion order
    async fn replay_all(&self) {
        let pending = self.offline.drain();
        if pending.is_empty() {
            return;
        }

        info!(count = pending.len(), "Connectivity restored, replaying buffered requests");
        join_all(pending.into_iter().map(|entry| self.replay(entry))).await;
    }
}

/// Builder for [`ResilientClient`]
#[derive(Default)]
pub struct ResilientClientBuilder {
    config: Option<ClientConfig>,
    auth: Option<Arc<dyn AccessTokenProvider>>,
    connectivity: Option<ConnectivityMonitor>,
    http: Option<HttpClient>,
}

impl ResilientClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the authentication provider
    pub fn auth(mut self, auth: Arc<dyn AccessTokenProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Share an existing connectivity signal (defaults to a new, online one)
    pub fn connectivity(mut self, connectivity: ConnectivityMonitor) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Use a preconfigured transport
    pub fn http(mut self, http: HttpClient) -> Self {
        self.http = Some(http);
        self
    }

    /// Build the client
    ///
    /// # Errors
    /// `ApiError::Config` if the configuration is invalid or the transport
    /// cannot be created.
    pub fn build(self) -> Result<ResilientClient, ApiError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let breaker_config = CircuitBreakerConfig::builder()
            .failure_threshold(u64::from(config.failure_threshold))
            .reset_timeout(config.reset_timeout())
            .half_open_retries(u64::from(config.half_open_retries))
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;
        let breakers =
            CircuitBreakerRegistry::new(breaker_config).map_err(|e| ApiError::Config(e.to_string()))?;

        let queue = RequestQueue::new(config.max_concurrent).map_err(|e| ApiError::Config(e.to_string()))?;

        let retry = RetryConfig::exponential(config.max_retries, config.base_retry_delay());
        retry.validate().map_err(|e| ApiError::Config(e.to_string()))?;

        let http = match self.http {
            Some(http) => http,
            None => {
                let mut builder = HttpClient::builder();
                if let Some(agent) = &config.user_agent {
                    builder = builder.user_agent(agent.clone());
                }
                builder.build()?
            }
        };

        let inner = Arc::new(ClientInner {
            cache: ResponseCache::new(config.cache_ttl()),
            config,
            http,
            auth: self.auth,
            breakers,
            queue,
            offline: OfflineBuffer::new(),
            connectivity: self.connectivity.unwrap_or_default(),
            retry,
            listener: Mutex::new(None),
        });

        *inner.listener.lock() = spawn_reconnect_listener(&inner);

        Ok(ResilientClient { inner })
    }
}

/// Replay the offline buffer on every offline -> online transition
fn spawn_reconnect_listener(inner: &Arc<ClientInner>) -> Option<JoinHandle<()>> {
    let Ok(runtime) = Handle::try_current() else {
        debug!("No Tokio runtime available; reconnect listener not started");
        return None;
    };

    let weak = Arc::downgrade(inner);
    let mut receiver = inner.connectivity.subscribe();
    let mut was_online = *receiver.borrow_and_update();

    Some(runtime.spawn(async move {
        while receiver.changed().await.is_ok() {
            let online = *receiver.borrow_and_update();
            if online && !was_online {
                let Some(inner) = weak.upgrade() else { break };
                inner.replay_all().await;
            }
            was_online = online;
        }
    }))
}

/// Wait for connectivity or the deadline, whichever comes first
///
/// Whoever takes the entry from the buffer first (this poller, the reconnect
/// listener, or `reset`) owns it.
fn spawn_offline_poller(inner: Weak<ClientInner>, id: String, poll: Duration, timeout: Duration) {
    tokio::spawn(async move {
        let deadline = Instant::now() + timeout;
        let mut ticker = interval(poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(inner) = inner.upgrade() else { return };
            if !inner.offline.contains(&id) {
                return;
            }

            if inner.connectivity.is_online() {
                if let Some(pending) = inner.offline.take(&id) {
                    inner.replay(pending).await;
                }
                return;
            }

            if Instant::now() >= deadline {
                if let Some(pending) = inner.offline.take(&id) {
                    warn!(request_id = %id, ?timeout, "Buffered request timed out waiting for connectivity");
                    pending.resolve(Err(ApiError::QueueTimeout(timeout)));
                }
                return;
            }
        }
    });
}

/// Send one request and read its body within `timeout`; 5xx is an error
async fn exchange(http: HttpClient, request: reqwest::Request, timeout: Duration) -> Result<Received, ApiError> {
    let read = async {
        let response = http.execute(request).await?;
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.bytes().await.map_err(|e| SteadfastError::from(InfraError::from(e)))?;
        Ok::<_, SteadfastError>(Received { status, headers, body: body.to_vec() })
    };

    let received = match tokio::time::timeout(timeout, read).await {
        Ok(Ok(received)) => received,
        Ok(Err(err)) => return Err(ApiError::from(err)),
        Err(_) => return Err(ApiError::Timeout(timeout)),
    };

    if received.status >= 500 {
        return Err(ApiError::Server {
            status: received.status,
            body: String::from_utf8_lossy(&received.body).into_owned(),
            headers: received.headers,
        });
    }

    Ok(received)
}

fn collect_headers(map: &HeaderMap) -> Headers {
    map.iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

fn to_json<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Decode(format!("Failed to serialize body: {e}")))
}
