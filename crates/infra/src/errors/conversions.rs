//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use steadfast_domain::SteadfastError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub SteadfastError);

impl From<InfraError> for SteadfastError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<SteadfastError> for InfraError {
    fn from(value: SteadfastError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoSteadfastError {
    fn into_steadfast(self) -> SteadfastError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → SteadfastError */
/* -------------------------------------------------------------------------- */

impl IntoSteadfastError for HttpError {
    fn into_steadfast(self) -> SteadfastError {
        if self.is_builder() {
            return SteadfastError::InvalidInput(format!("invalid HTTP request: {self}"));
        }

        if self.is_timeout() {
            return SteadfastError::Network("HTTP request timed out".into());
        }

        #[cfg(not(target_arch = "wasm32"))]
        if self.is_connect() {
            return SteadfastError::Network(format!("HTTP connection failure: {self}"));
        }

        SteadfastError::Network(format!("HTTP transport error: {self}"))
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_steadfast())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
