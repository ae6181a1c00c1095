//! Client for the Czech electronic sales registration service (EET).
//!
//! Covers the taxpayer security codes (PKP/BKP), the canonical signed SOAP
//! envelope, request validation, reply interpretation and a submission client
//! with an offline fallback.
//!
//! # Examples
//! ```rust
//! use eet_core::config::{Config, EnvironmentType};
//!
//! let config = Config::new(EnvironmentType::Playground);
//! # let _ = config;
//! ```
pub mod api;
pub mod config;
pub mod receipt;
pub mod response;

pub use api::{ApiError, EetClient, Outcome, Submission};
pub use config::{Config, EnvironmentParseError, EnvironmentType};
pub use receipt::sign::{EnvelopeSigner, SigningError};
pub use receipt::{ParsedRequest, RequestParsingError, SaleRecord, SecurityCodes};
pub use response::{Confirmation, ResponseError, Warning};

/// Top-level error wrapper for core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Request(#[from] RequestParsingError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Response(#[from] ResponseError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl Error {
    /// Failures of the network exchange or of the reply. Only these may be
    /// answered with offline codes; anything else is a caller or key problem.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Response(_) | Error::Api(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn error_conversions_cover_variants() {
        let err: Error = RequestParsingError::Missing { field: "tax_id" }.into();
        assert!(matches!(err, Error::Request(_)));
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "tax_id must be set");

        let err: Error = SigningError::KeyMismatch.into();
        assert!(matches!(err, Error::Signing(_)));
        assert!(!err.is_recoverable());

        let err: Error = ResponseError::WrongServerResponse("odd".into()).into();
        assert!(matches!(err, Error::Response(_)));
        assert!(err.is_recoverable());

        let err: Error = ApiError::Timeout(Duration::from_millis(10)).into();
        assert!(matches!(err, Error::Api(_)));
        assert!(err.is_recoverable());

        let err: Error = ApiError::Network("refused".into()).into();
        assert_eq!(err.to_string(), "Network error: refused");
    }
}
