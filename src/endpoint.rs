//! Endpoint definitions and the callable handles built from them.

use crate::client::{Api, ApiCall};
use crate::descriptor::{CallArgs, Verb};
use crate::url_template::{is_truthy, template_placeholders};
use crate::Result;
use serde::Deserialize;
use std::sync::Arc;

/// A static endpoint description.
///
/// Definitions are plain data and can be deserialized, so a whole endpoint
/// map can live in a JSON document:
///
/// ```
/// use fetchstate::EndpointDefinition;
/// use std::collections::BTreeMap;
///
/// let endpoints: BTreeMap<String, EndpointDefinition> = serde_json::from_str(r#"{
///     "getUser": { "path": "/users/:id", "method": "get" },
///     "search": { "path": "/search", "method": "get", "required": ["q"] }
/// }"#).unwrap();
///
/// assert_eq!(endpoints["search"].required, vec!["q".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointDefinition {
    /// Path template with `:name` tokens.
    pub path: String,

    /// Placeholders that must be given even though they are not path tokens.
    #[serde(default)]
    pub required: Vec<String>,

    /// The verb that shapes the call arguments.
    pub method: Verb,
}

impl EndpointDefinition {
    /// Creates a definition for `method` on `path`.
    pub fn new(method: Verb, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            required: Vec::new(),
            method,
        }
    }

    /// Creates a GET definition on `path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Verb::Get, path)
    }

    /// Creates a POST definition on `path`.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Verb::Post, path)
    }

    /// Creates a PUT definition on `path`.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Verb::Put, path)
    }

    /// Creates a PATCH definition on `path`.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Verb::Patch, path)
    }

    /// Creates a DELETE definition on `path`.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Verb::Delete, path)
    }

    /// Declares extra required placeholders.
    pub fn required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(names.into_iter().map(Into::into));
        self
    }
}

/// A definition after registration, with its full required list resolved.
#[derive(Debug)]
pub(crate) struct RegisteredEndpoint {
    pub(crate) name: String,
    pub(crate) definition: EndpointDefinition,
    pub(crate) required: Vec<String>,
}

impl RegisteredEndpoint {
    pub(crate) fn new(name: String, definition: EndpointDefinition) -> Self {
        let mut required = definition.required.clone();
        for token in template_placeholders(&definition.path) {
            if !required.contains(&token) {
                required.push(token);
            }
        }

        Self {
            name,
            definition,
            required,
        }
    }

    /// Required names without a truthy value in `args`.
    pub(crate) fn missing(&self, placeholders: &crate::Placeholders) -> Vec<String> {
        self.required
            .iter()
            .filter(|name| !placeholders.get(name.as_str()).is_some_and(is_truthy))
            .cloned()
            .collect()
    }
}

/// A callable endpoint of an [`Api`].
///
/// # Examples
///
/// ```no_run
/// use fetchstate::{Api, CallArgs, EndpointDefinition};
///
/// # async fn example() -> Result<(), fetchstate::Error> {
/// let api = Api::builder()
///     .base_url("https://api.example.com")?
///     .endpoint("getUser", EndpointDefinition::get("/users/:id"))
///     .build()?;
///
/// let get_user = api.endpoint("getUser")?;
/// let response = get_user.call(CallArgs::new().placeholder("id", 5))?.await?;
/// println!("{:?}", response.body);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Endpoint {
    api: Api,
    registered: Arc<RegisteredEndpoint>,
}

impl Endpoint {
    pub(crate) fn new(api: Api, registered: Arc<RegisteredEndpoint>) -> Self {
        Self { api, registered }
    }

    /// The name this endpoint was registered under.
    pub fn name(&self) -> &str {
        &self.registered.name
    }

    /// The definition this endpoint was registered with.
    pub fn definition(&self) -> &EndpointDefinition {
        &self.registered.definition
    }

    /// Declared plus template-derived required placeholders.
    pub fn required(&self) -> &[String] {
        &self.registered.required
    }

    /// Issues a call.
    ///
    /// Returns immediately; the request runs in the background and the
    /// returned [`ApiCall`] resolves with its outcome. An identical call made
    /// while a previous one is still in flight returns that same call.
    ///
    /// # Errors
    ///
    /// Fails synchronously with [`Error::MissingParameters`](crate::Error::MissingParameters)
    /// when a required placeholder has no truthy value, and with a
    /// configuration error outside a tokio runtime.
    pub fn call(&self, args: CallArgs) -> Result<ApiCall> {
        self.api.call_endpoint(&self.registered, args)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.registered.name)
            .field("definition", &self.registered.definition)
            .finish()
    }
}
