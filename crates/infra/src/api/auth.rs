//! Bearer token injection
//!
//! The client asks the configured provider for a token before every request
//! and attaches it as `Authorization: Bearer <token>` when one is returned.

use async_trait::async_trait;

use super::errors::ApiError;

/// Trait for providing access tokens
///
/// This trait allows dependency injection and testing with mock providers.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Get the current access token
    ///
    /// `Ok(None)` means "send the request unauthenticated". Implementations
    /// should handle refresh themselves.
    async fn access_token(&self) -> Result<Option<String>, ApiError>;
}

/// Provider that always returns the same token
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: Some(token.into()) }
    }

    /// Provider that never supplies a token
    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<Option<String>, ApiError> {
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticTokenProvider::new("abc");
        assert_eq!(provider.access_token().await.unwrap().as_deref(), Some("abc"));

        let anonymous = StaticTokenProvider::anonymous();
        assert_eq!(anonymous.access_token().await.unwrap(), None);
    }
}
