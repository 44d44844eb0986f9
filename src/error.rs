//! Error types for endpoint calls.
//!
//! Every failure at the HTTP layer is delivered through the call's future,
//! never as a panic. The only errors raised synchronously are configuration
//! mistakes (unknown endpoints, bad builder input) and calls that are missing
//! required placeholders.

use crate::transport::ApiResponse;
use http::StatusCode;
use std::sync::Arc;

/// The main error type for endpoint calls.
///
/// `Error` is `Clone` because a single settlement is shared between every
/// caller that was deduplicated onto the same in-flight request.
///
/// # Examples
///
/// ```no_run
/// use fetchstate::{Api, CallArgs, EndpointDefinition, Error};
///
/// # async fn example() -> Result<(), Error> {
/// let api = Api::builder()
///     .base_url("https://api.example.com")?
///     .endpoint("getUser", EndpointDefinition::get("/users/:id"))
///     .build()?;
///
/// let call = api.endpoint("getUser")?.call(CallArgs::new().placeholder("id", 7))?;
/// match call.await {
///     Ok(response) => println!("user: {:?}", response.body),
///     Err(Error::Http(response)) => eprintln!("HTTP {}: {:?}", response.status, response.body),
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// The transport failed before a response was obtained (connection
    /// refused, DNS failure, timeout, ...).
    #[error("Network error: {0}")]
    Network(#[source] Arc<reqwest::Error>),

    /// The server answered with a status outside `200..300`.
    ///
    /// The normalized response is the rejection value, exactly as a success
    /// would have been delivered.
    #[error("HTTP error {}", response_status(.0))]
    Http(ApiResponse),

    /// A non-204 response body could not be parsed as JSON.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to parse
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// The call did not provide a truthy value for every required placeholder.
    ///
    /// No request was sent and no lifecycle event is emitted for it.
    #[error("The {endpoint} API call cannot be performed. The following params were not specified: {}", .missing.join(", "))]
    MissingParameters {
        /// The endpoint that was called
        endpoint: String,
        /// Required placeholder names without a value, in declaration order
        missing: Vec<String>,
    },

    /// An endpoint name was looked up that was never registered.
    #[error("The API endpoint `{0}` does not exist")]
    UnknownEndpoint(String),

    /// Invalid configuration was provided.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Failed to serialize a request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A resolve/reject hook or the background task failed unexpectedly.
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Returns the HTTP status code if this error carries one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Http(response) => Some(response.status),
            Error::DeserializationFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the normalized response for HTTP status errors.
    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            Error::Http(response) => Some(response),
            _ => None,
        }
    }

    /// Returns `true` if the server produced a response (as opposed to a
    /// transport or local failure).
    ///
    /// # Examples
    ///
    /// ```
    /// use fetchstate::{ApiResponse, Error};
    /// use http::StatusCode;
    ///
    /// let err = Error::Http(ApiResponse::new(StatusCode::NOT_FOUND));
    /// assert!(err.is_http());
    ///
    /// let err = Error::Custom("boom".to_string());
    /// assert!(!err.is_http());
    /// ```
    pub fn is_http(&self) -> bool {
        matches!(self, Error::Http(_))
    }
}

fn response_status(response: &ApiResponse) -> StatusCode {
    response.status
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(Arc::new(err))
    }
}

/// A specialized `Result` type for endpoint calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parameters_message_lists_fields() {
        let err = Error::MissingParameters {
            endpoint: "getUser".to_string(),
            missing: vec!["id".to_string(), "org".to_string()],
        };

        assert_eq!(
            err.to_string(),
            "The getUser API call cannot be performed. The following params were not specified: id, org"
        );
    }

    #[test]
    fn http_error_exposes_status_and_response() {
        let err = Error::Http(ApiResponse::new(StatusCode::CONFLICT));

        assert_eq!(err.status(), Some(StatusCode::CONFLICT));
        assert!(err.response().is_some());
        assert_eq!(err.to_string(), "HTTP error 409 Conflict");
    }
}
