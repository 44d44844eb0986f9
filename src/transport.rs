//! The network boundary.
//!
//! A [`Transport`] sends one request and normalizes what comes back into an
//! [`ApiResponse`]. Statuses outside `200..300` are rejected with
//! [`Error::Http`] carrying the same normalized shape a success would have.

use crate::descriptor::{Headers, RequestOptions};
use crate::{Error, Result};
use futures::future::BoxFuture;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use url::Url;

/// A normalized HTTP response.
///
/// # Examples
///
/// ```
/// use fetchstate::ApiResponse;
/// use http::StatusCode;
/// use serde_json::json;
///
/// let response = ApiResponse::new(StatusCode::OK)
///     .with_header("Content-Type", "application/json")
///     .with_body(json!({ "id": 1 }));
///
/// assert!(response.is_success());
/// assert_eq!(response.header("content-type"), Some("application/json"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// The HTTP status code.
    pub status: StatusCode,

    /// Response headers, lowercase names. Repeated headers are joined with `", "`.
    pub headers: Headers,

    /// The parsed JSON body. Always `None` for 204 responses.
    pub body: Option<Value>,

    /// Time from sending the request until the body was read.
    pub latency: Duration,
}

impl ApiResponse {
    /// Creates a response with the given status and nothing else.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: None,
            latency: Duration::ZERO,
        }
    }

    /// Adds a header. The name is stored lowercase.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns `true` for statuses in `200..300`.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns a header value by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Deserializes the body into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] if there is no body or it does
    /// not match `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let body = self.body.clone().unwrap_or(Value::Null);
        serde_json::from_value(body.clone()).map_err(|e| Error::DeserializationFailed {
            raw_response: body.to_string(),
            serde_error: e.to_string(),
            status: self.status,
        })
    }
}

/// Sends requests on behalf of an [`Api`](crate::Api).
///
/// Implement this to run calls over something other than `reqwest`, or to
/// script responses in tests.
pub trait Transport: Send + Sync {
    /// Sends `options` to `url`.
    ///
    /// Resolves with the normalized response for 2xx statuses, rejects with
    /// [`Error::Http`] for any other status and with the underlying failure
    /// when no response was obtained.
    fn execute(&self, url: Url, options: RequestOptions) -> BoxFuture<'static, Result<ApiResponse>>;
}

/// The default [`Transport`], backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with an optional client-wide timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be constructed.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build().map_err(|e| {
            Error::Configuration(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self { http_client })
    }

    /// Wraps an existing `reqwest::Client`.
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, url: Url, options: RequestOptions) -> BoxFuture<'static, Result<ApiResponse>> {
        let http_client = self.http_client.clone();
        Box::pin(async move { send(http_client, url, options).await })
    }
}

async fn send(http_client: reqwest::Client, url: Url, options: RequestOptions) -> Result<ApiResponse> {
    let method = options.method();

    tracing::debug!(
        method = %method,
        url = %url,
        "Executing HTTP request"
    );

    let mut request = http_client
        .request(method.clone(), url.clone())
        .headers(header_map(&options.headers)?);

    if let Some(timeout) = options.timeout {
        request = request.timeout(timeout);
    }

    if let Some(body) = options.body {
        request = request.body(body);
    }

    let start_time = Instant::now();
    let response = request.send().await.map_err(|e| {
        tracing::warn!(error = %e, method = %method, url = %url, "Request failed");
        Error::from(e)
    })?;

    let status = response.status();
    let headers = normalize_headers(response.headers());

    let body = if status == StatusCode::NO_CONTENT {
        None
    } else {
        let raw_body = response.text().await?;
        parse_body(raw_body, status)?
    };

    let latency = start_time.elapsed();

    tracing::info!(
        status = status.as_u16(),
        latency_ms = latency.as_millis(),
        "Received HTTP response"
    );

    let normalized = ApiResponse {
        status,
        headers,
        body,
        latency,
    };

    if normalized.is_success() {
        return Ok(normalized);
    }

    if status.is_client_error() {
        tracing::error!(status = status.as_u16(), url = %url, "Client error (4xx)");
    } else if status.is_server_error() {
        tracing::warn!(status = status.as_u16(), url = %url, "Server error (5xx)");
    }

    Err(Error::Http(normalized))
}

fn parse_body(raw_body: String, status: StatusCode) -> Result<Option<Value>> {
    if raw_body.trim().is_empty() {
        return Ok(None);
    }

    match serde_json::from_str::<Value>(&raw_body) {
        Ok(body) => Ok(Some(body)),
        // Error statuses keep their text so the status itself is not lost.
        Err(_) if !status.is_success() => Ok(Some(Value::String(raw_body))),
        Err(e) => {
            tracing::error!(
                error = %e,
                raw_response = %raw_body,
                "Failed to deserialize response"
            );
            Err(Error::DeserializationFailed {
                raw_response: raw_body,
                serde_error: e.to_string(),
                status,
            })
        }
    }
}

fn header_map(headers: &Headers) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::try_from(name.as_str())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_str())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn normalize_headers(headers: &HeaderMap) -> Headers {
    let mut normalized = Headers::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        match normalized.get_mut(name.as_str()) {
            Some(existing) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            None => {
                normalized.insert(name.as_str().to_string(), value.into_owned());
            }
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repeated_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        headers.insert("x-total", HeaderValue::from_static("10"));

        let normalized = normalize_headers(&headers);
        assert_eq!(normalized.get("set-cookie").map(String::as_str), Some("a=1, b=2"));
        assert_eq!(normalized.get("x-total").map(String::as_str), Some("10"));
    }

    #[test]
    fn invalid_json_on_success_is_an_error() {
        let result = parse_body("not json".to_string(), StatusCode::OK);
        assert!(matches!(result, Err(Error::DeserializationFailed { .. })));
    }

    #[test]
    fn invalid_json_on_error_status_is_kept_as_text() {
        let body = parse_body("Not found".to_string(), StatusCode::NOT_FOUND).unwrap();
        assert_eq!(body, Some(json!("Not found")));
    }

    #[test]
    fn empty_body_is_absent() {
        assert_eq!(parse_body("  ".to_string(), StatusCode::OK).unwrap(), None);
    }

    #[test]
    fn json_deserializes_body() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct User {
            id: u32,
        }

        let response = ApiResponse::new(StatusCode::OK).with_body(json!({ "id": 4 }));
        assert_eq!(response.json::<User>().unwrap(), User { id: 4 });
        assert!(ApiResponse::new(StatusCode::OK).json::<User>().is_err());
    }
}
