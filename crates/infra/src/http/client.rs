use std::time::Duration;

use reqwest::{Client as ReqwestClient, Method, Request, RequestBuilder, Response};
use steadfast_domain::SteadfastError;
use tracing::debug;

use crate::errors::InfraError;

/// Thin wrapper over a pooled reqwest client.
///
/// Makes exactly one attempt per [`HttpClient::send`]; retries, timeouts per
/// call and circuit breaking belong to the caller.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: ReqwestClient,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, SteadfastError> {
        Self::builder().build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Execute the provided request builder once.
    ///
    /// Any HTTP status counts as a response; only transport failures are
    /// errors.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, SteadfastError> {
        let request = builder.build().map_err(|err| SteadfastError::from(InfraError::from(err)))?;
        self.execute(request).await
    }

    /// Execute an already built request once.
    pub async fn execute(&self, request: Request) -> Result<Response, SteadfastError> {
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "sending HTTP request");

        match self.client.execute(request).await {
            Ok(response) => {
                debug!(%method, %url, status = %response.status(), "received HTTP response");
                Ok(response)
            }
            Err(err) => {
                debug!(%method, %url, error = %err, "HTTP request failed");
                Err(InfraError::from(err).into())
            }
        }
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug, Default)]
pub struct HttpClientBuilder {
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    user_agent: Option<String>,
    default_headers: Option<reqwest::header::HeaderMap>,
}

impl HttpClientBuilder {
    /// Overall timeout applied by reqwest itself (none by default).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    pub fn build(self) -> Result<HttpClient, SteadfastError> {
        let mut builder = ReqwestClient::builder().no_proxy();

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|err| SteadfastError::from(InfraError::from(err)))?;

        Ok(HttpClient { client })
    }
}
