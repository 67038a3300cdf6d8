//! Result and error types for Capa.

use thiserror::Error;

/// Result type for Capa operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced by the API layer itself.
///
/// Rejections raised by a wrapped, mocked, or overriding callable are not
/// part of this taxonomy: they flow back to the caller verbatim through the
/// api function's error type parameter.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed construction call (double-wrapping, bad dependents,
    /// conflicting call options)
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Layer misconfiguration (mock mode without a resolver, duplicate
    /// implicit global layer, factory without a resolvable layer)
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Dispatch against an identity the layer no longer knows
    #[error("Api function {id} is not installed in its layer")]
    NotFound {
        /// Unique id of the stale api function
        id: String,
    },

    /// Mock resolution failed; the loader's own error is preserved
    #[error("Mock loading failed for {api_name}: {source}")]
    Loader {
        /// Name of the api function whose mock was being resolved
        api_name: String,
        /// Underlying loader failure
        #[source]
        source: LoaderError,
    },

    /// Rejection raised by the wrapped, mocked, or overriding callable
    /// when no richer error type is in play
    #[error("{message}")]
    Upstream {
        /// Error message
        message: String,
    },
}

impl ApiError {
    /// Upstream rejection with the given message.
    ///
    /// Convenience for mocks and overrides that reject with plain text,
    /// mirroring how a wrapped function would fail.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }
}

/// Errors produced by a [`MockResolver`](crate::MockResolver)
/// implementation.
///
/// These are propagated (wrapped in [`ApiError::Loader`]), never
/// reclassified: a missing fixture stays recognizably a missing fixture.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The referenced fixture or producer does not exist
    #[error("Mock reference not found: {path}")]
    NotFound {
        /// Fixture path or producer name
        path: String,
    },

    /// The fixture file exists but is not valid JSON
    #[error("Failed to parse mock fixture {path}: {source}")]
    Parse {
        /// Fixture path
        path: String,
        /// Parse failure
        #[source]
        source: serde_json::Error,
    },

    /// The fixture file has an extension the resolver does not handle
    #[error("Unsupported mock format: {path}")]
    UnsupportedFormat {
        /// Fixture path
        path: String,
    },

    /// Mock mode needs a reference but none was ever attached
    #[error("No mock reference configured for {api_name}")]
    MissingReference {
        /// Name of the api function missing a mock
        api_name: String,
    },

    /// The resolved payload does not match the api function's result type
    #[error("Mock payload does not match the api result type: {source}")]
    Decode {
        /// Decode failure
        #[source]
        source: serde_json::Error,
    },

    /// Call arguments could not be encoded for a mock producer
    #[error("Call arguments could not be encoded for the mock producer: {source}")]
    Encode {
        /// Encode failure
        #[source]
        source: serde_json::Error,
    },

    /// I/O error while reading fixture data
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure a custom resolver wants to surface
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}
