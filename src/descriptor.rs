//! Per-verb call descriptors.
//!
//! Callers describe a call with a [`CallArgs`] record. The endpoint's [`Verb`]
//! turns it into a [`CallDescriptor`]: the placeholders to substitute into the
//! path, and the transport options (method, JSON body, headers, mode).

use crate::url_template::Placeholders;
use crate::{Error, Result};
use http::Method;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Header mapping used in request options and normalized responses.
///
/// Names are stored lowercase.
pub type Headers = BTreeMap<String, String>;

/// The HTTP verb an endpoint is called with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    #[serde(alias = "destroy")]
    Delete,
}

/// Cross-origin mode hint forwarded with the request options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    Cors,
    NoCors,
    SameOrigin,
}

/// Transport options for a single call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestOptions {
    /// The HTTP method. `None` means GET.
    #[serde(serialize_with = "serialize_method")]
    pub method: Option<Method>,

    /// The serialized request body.
    pub body: Option<String>,

    /// Request headers.
    pub headers: Headers,

    /// Cross-origin mode.
    pub mode: Option<RequestMode>,

    /// Per-request timeout, overriding the client's.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Adds a header. The name is stored lowercase.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets the cross-origin mode.
    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Sets a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the effective HTTP method.
    pub fn method(&self) -> Method {
        self.method.clone().unwrap_or(Method::GET)
    }

    /// Overlays `overrides` on top of `self`.
    ///
    /// Every field set in `overrides` wins; headers are merged name by name.
    pub fn merge(mut self, overrides: RequestOptions) -> Self {
        if overrides.method.is_some() {
            self.method = overrides.method;
        }
        if overrides.body.is_some() {
            self.body = overrides.body;
        }
        if overrides.mode.is_some() {
            self.mode = overrides.mode;
        }
        if overrides.timeout.is_some() {
            self.timeout = overrides.timeout;
        }
        self.headers.extend(overrides.headers);
        self
    }
}

fn serialize_method<S>(method: &Option<Method>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match method {
        Some(method) => serializer.serialize_some(method.as_str()),
        None => serializer.serialize_none(),
    }
}

/// The arguments of a single endpoint call.
///
/// # Examples
///
/// ```
/// use fetchstate::{CallArgs, Verb};
/// use serde_json::json;
///
/// let args = CallArgs::new()
///     .placeholder("id", 5)
///     .body(json!({ "name": "Alice" }));
///
/// let descriptor = Verb::Put.describe(args);
/// assert_eq!(descriptor.options.method(), http::Method::PUT);
/// assert_eq!(descriptor.options.body.as_deref(), Some(r#"{"name":"Alice"}"#));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    /// Values for path tokens; unmatched ones become query parameters.
    pub placeholders: Placeholders,

    /// JSON body. Ignored by GET and DELETE.
    pub body: Option<Value>,

    /// Caller options. These win over anything the verb sets.
    pub options: RequestOptions,
}

impl CallArgs {
    /// Creates empty call arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single placeholder value.
    pub fn placeholder(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.placeholders.insert(name.into(), value.into());
        self
    }

    /// Replaces the placeholders with the fields of a serializable struct or map.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` does not serialize to a JSON object.
    pub fn with_placeholders<T: Serialize>(mut self, value: &T) -> Result<Self> {
        match serde_json::to_value(value).map_err(|e| Error::SerializationFailed(e.to_string()))? {
            Value::Object(map) => {
                self.placeholders = map;
                Ok(self)
            }
            other => Err(Error::SerializationFailed(format!(
                "placeholders must serialize to an object, got {}",
                other
            ))),
        }
    }

    /// Sets the JSON body.
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serializes `body` and sets it as the JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized.
    pub fn json<T: Serialize>(self, body: &T) -> Result<Self> {
        let value =
            serde_json::to_value(body).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        Ok(self.body(value))
    }

    /// Sets the caller options.
    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// A normalized call: what to substitute and how to send it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallDescriptor {
    pub placeholders: Placeholders,
    pub options: RequestOptions,
}

impl CallDescriptor {
    /// The value identical calls are recognized by.
    ///
    /// A JSON body is compared by structure, not by its serialized text.
    pub(crate) fn signature(&self) -> Result<Value> {
        let mut signature =
            serde_json::to_value(self).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        let parsed = self
            .options
            .body
            .as_deref()
            .and_then(|body| serde_json::from_str::<Value>(body).ok());
        if let (Some(parsed), Some(body)) = (parsed, signature.pointer_mut("/options/body")) {
            *body = parsed;
        }
        Ok(signature)
    }
}

impl Verb {
    /// The HTTP method for this verb.
    pub fn method(self) -> Method {
        match self {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
            Verb::Patch => Method::PATCH,
            Verb::Delete => Method::DELETE,
        }
    }

    /// Whether this verb sends a body.
    pub fn has_body(self) -> bool {
        matches!(self, Verb::Post | Verb::Put | Verb::Patch)
    }

    /// Normalizes call arguments into a descriptor.
    pub fn describe(self, args: CallArgs) -> CallDescriptor {
        let mut base = RequestOptions::new().with_method(self.method());

        if self.has_body() {
            base.body = args
                .body
                .filter(|body| !body.is_null())
                .map(|body| body.to_string());
        } else if args.body.is_some() {
            tracing::warn!(verb = ?self, "Ignoring request body for a body-less verb");
        }

        if self == Verb::Put {
            base.mode = Some(RequestMode::Cors);
        }

        CallDescriptor {
            placeholders: args.placeholders,
            options: base.merge(args.options),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::CallKey;
    use serde_json::json;

    #[test]
    fn get_ignores_body_and_defaults_to_empty() {
        let descriptor = Verb::Get.describe(CallArgs::new().body(json!({ "a": 1 })));

        assert!(descriptor.placeholders.is_empty());
        assert_eq!(descriptor.options.method(), Method::GET);
        assert_eq!(descriptor.options.body, None);
    }

    #[test]
    fn delete_sets_method() {
        let descriptor = Verb::Delete.describe(CallArgs::new().placeholder("id", 3));

        assert_eq!(descriptor.options.method(), Method::DELETE);
        assert_eq!(descriptor.placeholders.get("id"), Some(&json!(3)));
    }

    #[test]
    fn post_serializes_body() {
        let descriptor = Verb::Post.describe(CallArgs::new().body(json!({ "name": "a" })));

        assert_eq!(descriptor.options.method(), Method::POST);
        assert_eq!(descriptor.options.body.as_deref(), Some(r#"{"name":"a"}"#));
        assert_eq!(descriptor.options.mode, None);
    }

    #[test]
    fn put_sets_cors_mode() {
        let descriptor = Verb::Put.describe(CallArgs::new());

        assert_eq!(descriptor.options.mode, Some(RequestMode::Cors));
        assert_eq!(descriptor.options.body, None);
    }

    #[test]
    fn caller_options_take_precedence() {
        let options = RequestOptions::new()
            .with_method(Method::HEAD)
            .with_mode(RequestMode::SameOrigin)
            .with_header("X-Trace", "1");
        let descriptor = Verb::Put.describe(CallArgs::new().options(options));

        assert_eq!(descriptor.options.method(), Method::HEAD);
        assert_eq!(descriptor.options.mode, Some(RequestMode::SameOrigin));
        assert_eq!(descriptor.options.headers.get("x-trace").map(String::as_str), Some("1"));
    }

    #[test]
    fn placeholders_from_struct() {
        #[derive(Serialize)]
        struct Params {
            id: u32,
            active: bool,
        }

        let args = CallArgs::new()
            .with_placeholders(&Params { id: 9, active: true })
            .unwrap();
        assert_eq!(args.placeholders.get("id"), Some(&json!(9)));

        assert!(CallArgs::new().with_placeholders(&vec![1, 2]).is_err());
    }

    #[test]
    fn patch_serializes_body() {
        let descriptor = Verb::Patch.describe(
            CallArgs::new()
                .placeholder("id", 4)
                .body(json!({ "name": "c" })),
        );

        assert_eq!(descriptor.options.method(), Method::PATCH);
        assert_eq!(descriptor.options.body.as_deref(), Some(r#"{"name":"c"}"#));
        assert_eq!(descriptor.options.mode, None);
        assert_eq!(descriptor.placeholders.get("id"), Some(&json!(4)));
    }

    #[test]
    fn signature_ignores_body_field_order() {
        let a = Verb::Post.describe(CallArgs::new().body(json!({ "name": "a", "age": 1 })));
        let b = Verb::Post.describe(CallArgs::new().body(json!({ "age": 1, "name": "a" })));
        assert_ne!(a.options.body, b.options.body);

        let key_a = CallKey::of(&a.signature().unwrap()).unwrap();
        let key_b = CallKey::of(&b.signature().unwrap()).unwrap();
        assert_eq!(key_a, key_b);

        let c = Verb::Post.describe(CallArgs::new().body(json!({ "name": "b", "age": 1 })));
        assert_ne!(key_a, CallKey::of(&c.signature().unwrap()).unwrap());
    }

    #[test]
    fn signature_keeps_non_json_bodies_as_text() {
        let options = RequestOptions {
            body: Some("plain text".to_string()),
            ..RequestOptions::default()
        };
        let descriptor = Verb::Post.describe(CallArgs::new().options(options));

        let signature = descriptor.signature().unwrap();
        assert_eq!(signature.pointer("/options/body"), Some(&json!("plain text")));
    }

    #[test]
    fn verb_names_deserialize() {
        let verb: Verb = serde_json::from_str("\"patch\"").unwrap();
        assert_eq!(verb, Verb::Patch);
        let verb: Verb = serde_json::from_str("\"destroy\"").unwrap();
        assert_eq!(verb, Verb::Delete);
    }
}
