//! The endpoint client and its in-flight request registry.
//!
//! [`Api`] owns the registered endpoints, the configuration hooks and the
//! table of requests that are currently in flight. Use [`ApiBuilder`] to
//! configure and create one.

use crate::descriptor::{CallArgs, CallDescriptor, Headers, RequestOptions};
use crate::endpoint::{Endpoint, EndpointDefinition, RegisteredEndpoint};
use crate::query::{self, CallView, EndpointView};
use crate::signature::CallKey;
use crate::state::ApiState;
use crate::transport::{ApiResponse, ReqwestTransport, Transport};
use crate::url_template::{build_url, Placeholders};
use crate::{Error, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use url::Url;

type ConfigureOptions = Arc<dyn Fn(RequestOptions) -> RequestOptions + Send + Sync>;
type ConfigureHeaders = Arc<dyn Fn(Headers) -> Headers + Send + Sync>;
type HandleResolve =
    Arc<dyn Fn(ApiRequest, ApiResponse) -> BoxFuture<'static, Result<ApiResponse>> + Send + Sync>;
type HandleReject =
    Arc<dyn Fn(ApiRequest, Error) -> BoxFuture<'static, Result<ApiResponse>> + Send + Sync>;

pub(crate) type SharedResponse = Shared<BoxFuture<'static, Result<ApiResponse>>>;

/// A client synthesized from a map of endpoint definitions.
///
/// The client is cheap to clone; clones share the endpoints, hooks and
/// in-flight registry.
///
/// # Examples
///
/// ```no_run
/// use fetchstate::{Api, CallArgs, EndpointDefinition};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), fetchstate::Error> {
/// let api = Api::builder()
///     .base_url("https://api.example.com")?
///     .endpoint("getUser", EndpointDefinition::get("/users/:id"))
///     .endpoint("createUser", EndpointDefinition::post("/users"))
///     .build()?;
///
/// let user = api.call("getUser", CallArgs::new().placeholder("id", 5))?.await?;
/// println!("User: {:?}", user.body);
///
/// let created = api
///     .call("createUser", CallArgs::new().body(json!({ "name": "Alice" })))?
///     .await?;
/// println!("Created with status {}", created.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Api {
    inner: Arc<ApiInner>,
}

struct ApiInner {
    base_url: Url,
    default_headers: Headers,
    endpoints: BTreeMap<String, Arc<RegisteredEndpoint>>,
    transport: Arc<dyn Transport>,
    configure_options: ConfigureOptions,
    configure_headers: ConfigureHeaders,
    handle_resolve: HandleResolve,
    handle_reject: HandleReject,
    in_flight: Mutex<HashMap<CallKey, InFlight>>,
    generation: AtomicU64,
}

struct InFlight {
    generation: u64,
    call: ApiCall,
}

/// What was sent for a call; handed to the resolve/reject hooks.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// The endpoint name.
    pub endpoint: String,
    /// The normalized call descriptor.
    pub descriptor: CallDescriptor,
    /// The absolute URL that was requested.
    pub url: Url,
    /// The transport options after every hook ran.
    pub options: RequestOptions,
}

impl Api {
    /// Creates a new `ApiBuilder` for configuring a client.
    pub fn builder() -> ApiBuilder {
        ApiBuilder::new()
    }

    /// Looks up a registered endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEndpoint`] if no endpoint has this name.
    pub fn endpoint(&self, name: &str) -> Result<Endpoint> {
        self.inner
            .endpoints
            .get(name)
            .map(|registered| Endpoint::new(self.clone(), Arc::clone(registered)))
            .ok_or_else(|| Error::UnknownEndpoint(name.to_string()))
    }

    /// Names of every registered endpoint, sorted.
    pub fn endpoint_names(&self) -> impl Iterator<Item = &str> {
        self.inner.endpoints.keys().map(String::as_str)
    }

    /// Shorthand for `self.endpoint(name)?.call(args)`.
    pub fn call(&self, name: &str, args: CallArgs) -> Result<ApiCall> {
        self.endpoint(name)?.call(args)
    }

    /// Number of distinct calls currently in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.inner.in_flight).len()
    }

    /// Reads a single call of endpoint `name` out of `state`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEndpoint`] if `name` is not registered.
    pub fn query(&self, state: &ApiState, name: &str, placeholders: &Placeholders) -> Result<CallView> {
        let endpoint = self.endpoint(name)?;
        query::query_call(state, &endpoint, placeholders)
    }

    /// Aggregates every recorded call of endpoint `name` in `state`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEndpoint`] if `name` is not registered.
    pub fn query_all(&self, state: &ApiState, name: &str) -> Result<EndpointView> {
        let endpoint = self.endpoint(name)?;
        Ok(query::query_endpoint(state, &endpoint))
    }

    pub(crate) fn call_endpoint(
        &self,
        endpoint: &Arc<RegisteredEndpoint>,
        args: CallArgs,
    ) -> Result<ApiCall> {
        let descriptor = endpoint.definition.method.describe(args);

        let mut headers = self.inner.default_headers.clone();
        headers.extend(descriptor.options.headers.clone());
        let augmented = RequestOptions {
            headers: (self.inner.configure_headers)(headers),
            ..descriptor.options.clone()
        };

        let missing = endpoint.missing(&descriptor.placeholders);
        if !missing.is_empty() {
            let err = Error::MissingParameters {
                endpoint: endpoint.name.clone(),
                missing,
            };
            tracing::error!(endpoint = %endpoint.name, error = %err, "Refusing to send call");
            return Err(err);
        }

        let key = CallKey::of(&(endpoint.name.as_str(), descriptor.signature()?))?;

        if let Some(existing) = lock(&self.inner.in_flight).get(&key) {
            tracing::debug!(endpoint = %endpoint.name, key = %key, "Joining in-flight request");
            return Ok(existing.call.clone());
        }

        let meta = Arc::new(self.prepare(endpoint, descriptor, augmented, key)?);
        self.dispatch(meta, true)
    }

    fn retry(&self, meta: &Arc<CallMeta>) -> Result<ApiCall> {
        tracing::debug!(endpoint = %meta.endpoint.name, path = %meta.path, "Retrying call");
        self.dispatch(Arc::clone(meta), false)
    }

    fn prepare(
        &self,
        endpoint: &Arc<RegisteredEndpoint>,
        descriptor: CallDescriptor,
        augmented: RequestOptions,
        key: CallKey,
    ) -> Result<CallMeta> {
        let path = build_url(&endpoint.definition.path, &descriptor.placeholders);
        let url = join_url(&self.inner.base_url, &path)?;
        let options = (self.inner.configure_options)(augmented);

        Ok(CallMeta {
            api: Arc::downgrade(&self.inner),
            endpoint: Arc::clone(endpoint),
            descriptor,
            url,
            path,
            options,
            key,
        })
    }

    /// Spawns the request for `meta` and registers it as in flight.
    ///
    /// With `join_existing`, an entry registered since the caller's lookup is
    /// returned instead of sending a second request.
    fn dispatch(&self, meta: Arc<CallMeta>, join_existing: bool) -> Result<ApiCall> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::Configuration("endpoint calls must be made inside a tokio runtime".to_string())
        })?;

        // Held until the new call is registered, so its settlement cannot
        // remove the entry before it exists.
        let mut in_flight = lock(&self.inner.in_flight);
        if join_existing {
            if let Some(existing) = in_flight.get(&meta.key) {
                return Ok(existing.call.clone());
            }
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let request = ApiRequest {
            endpoint: meta.endpoint.name.clone(),
            descriptor: meta.descriptor.clone(),
            url: meta.url.clone(),
            options: meta.options.clone(),
        };

        let inner = Arc::downgrade(&self.inner);
        let transport = Arc::clone(&self.inner.transport);
        let handle_resolve = Arc::clone(&self.inner.handle_resolve);
        let handle_reject = Arc::clone(&self.inner.handle_reject);
        let key = meta.key.clone();

        let task = runtime.spawn(async move {
            // Clears the entry even if the transport panics or the task is cancelled.
            let registration = Registration {
                inner,
                key,
                generation,
            };
            let outcome = transport
                .execute(request.url.clone(), request.options.clone())
                .await;
            drop(registration);

            match outcome {
                Ok(response) => handle_resolve(request, response).await,
                Err(err) => {
                    tracing::warn!(error = %err, endpoint = %request.endpoint, "Call failed");
                    handle_reject(request, err).await
                }
            }
        });

        let future: BoxFuture<'static, Result<ApiResponse>> = Box::pin(async move {
            task.await
                .unwrap_or_else(|e| Err(Error::Custom(format!("request task failed: {}", e))))
        });

        let call = ApiCall {
            future: future.shared(),
            meta: Arc::clone(&meta),
        };
        in_flight.insert(
            meta.key.clone(),
            InFlight {
                generation,
                call: call.clone(),
            },
        );

        Ok(call)
    }
}

/// Removes its in-flight entry when dropped, unless a newer request
/// (a retry) has replaced it.
struct Registration {
    inner: Weak<ApiInner>,
    key: CallKey,
    generation: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut in_flight = lock(&inner.in_flight);
        if in_flight
            .get(&self.key)
            .is_some_and(|entry| entry.generation == self.generation)
        {
            in_flight.remove(&self.key);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn join_url(base_url: &Url, path: &str) -> Result<Url> {
    let base = base_url.as_str().trim_end_matches('/');
    Ok(Url::parse(&format!("{}{}", base, path))?)
}

struct CallMeta {
    api: Weak<ApiInner>,
    endpoint: Arc<RegisteredEndpoint>,
    descriptor: CallDescriptor,
    url: Url,
    path: String,
    options: RequestOptions,
    key: CallKey,
}

/// An issued call.
///
/// `ApiCall` is a cloneable future: every clone resolves with the same
/// settlement. It also carries the call's metadata so a lifecycle observer
/// can describe it without awaiting it.
#[derive(Clone)]
pub struct ApiCall {
    future: SharedResponse,
    meta: Arc<CallMeta>,
}

impl ApiCall {
    /// The endpoint this call was made on.
    pub fn endpoint_name(&self) -> &str {
        &self.meta.endpoint.name
    }

    /// The normalized call descriptor.
    pub fn descriptor(&self) -> &CallDescriptor {
        &self.meta.descriptor
    }

    /// The requested path, placeholders substituted and query appended.
    pub fn path(&self) -> &str {
        &self.meta.path
    }

    /// The endpoint's path template.
    pub fn template(&self) -> &str {
        &self.meta.endpoint.definition.path
    }

    /// The transport options the request was sent with.
    pub fn options(&self) -> &RequestOptions {
        &self.meta.options
    }

    /// The absolute URL the request was sent to.
    pub fn url(&self) -> &Url {
        &self.meta.url
    }

    /// Returns `true` if both values observe the same underlying request.
    pub fn same_request(&self, other: &ApiCall) -> bool {
        self.future.ptr_eq(&other.future)
    }

    /// Sends the request again.
    ///
    /// The new call has the same metadata but a fresh network request, and
    /// replaces this one in the in-flight registry.
    ///
    /// # Errors
    ///
    /// Fails if the client was dropped or no tokio runtime is available.
    pub fn retry(&self) -> Result<ApiCall> {
        let inner = self
            .meta
            .api
            .upgrade()
            .ok_or_else(|| Error::Configuration("the client was dropped".to_string()))?;
        Api { inner }.retry(&self.meta)
    }

    /// The same call, resolving through `future` instead.
    pub(crate) fn with_future(&self, future: SharedResponse) -> ApiCall {
        ApiCall {
            future,
            meta: Arc::clone(&self.meta),
        }
    }

    pub(crate) fn settlement(&self) -> SharedResponse {
        self.future.clone()
    }
}

impl Future for ApiCall {
    type Output = Result<ApiResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.future).poll(cx)
    }
}

impl std::fmt::Debug for ApiCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCall")
            .field("endpoint", &self.meta.endpoint.name)
            .field("path", &self.meta.path)
            .field("descriptor", &self.meta.descriptor)
            .finish()
    }
}

/// Builder for configuring and creating an [`Api`].
///
/// # Examples
///
/// ```no_run
/// use fetchstate::{ApiBuilder, EndpointDefinition};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), fetchstate::Error> {
/// let api = ApiBuilder::new()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(30))
///     .default_header("User-Agent", "my-app/1.0")
///     .configure_headers(|mut headers| {
///         headers.insert("authorization".to_string(), "Bearer token".to_string());
///         headers
///     })
///     .endpoint("getUser", EndpointDefinition::get("/users/:id"))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ApiBuilder {
    base_url: Option<Url>,
    default_headers: Headers,
    endpoints: BTreeMap<String, EndpointDefinition>,
    timeout: Option<Duration>,
    transport: Option<Arc<dyn Transport>>,
    configure_options: ConfigureOptions,
    configure_headers: ConfigureHeaders,
    handle_resolve: HandleResolve,
    handle_reject: HandleReject,
}

impl ApiBuilder {
    /// Creates a new `ApiBuilder` with default settings.
    pub fn new() -> Self {
        let mut default_headers = Headers::new();
        default_headers.insert("content-type".to_string(), "application/json".to_string());
        default_headers.insert("accept".to_string(), "application/json".to_string());

        Self {
            base_url: None,
            default_headers,
            endpoints: BTreeMap::new(),
            timeout: None,
            transport: None,
            configure_options: Arc::new(|options: RequestOptions| options),
            configure_headers: Arc::new(|headers: Headers| headers),
            handle_resolve: Arc::new(
                |_: ApiRequest, response: ApiResponse| -> BoxFuture<'static, Result<ApiResponse>> {
                    Box::pin(async move { Ok(response) })
                },
            ),
            handle_reject: Arc::new(
                |_: ApiRequest, err: Error| -> BoxFuture<'static, Result<ApiResponse>> {
                    Box::pin(async move { Err(err) })
                },
            ),
        }
    }

    /// Sets the base URL that every endpoint path is appended to.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Adds a header to the default set every call starts from.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.default_headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets a client-wide request timeout for the default transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replaces the default `reqwest` transport.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Registers an endpoint. A later registration under the same name wins.
    pub fn endpoint(mut self, name: impl Into<String>, definition: EndpointDefinition) -> Self {
        let name = name.into();
        if self.endpoints.insert(name.clone(), definition).is_some() {
            tracing::warn!(endpoint = %name, "Endpoint registered twice, keeping the last definition");
        }
        self
    }

    /// Registers several endpoints.
    pub fn endpoints<I, S>(self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = (S, EndpointDefinition)>,
        S: Into<String>,
    {
        endpoints
            .into_iter()
            .fold(self, |builder, (name, definition)| builder.endpoint(name, definition))
    }

    /// Registers the endpoints of a JSON object mapping names to definitions.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid endpoint map.
    pub fn endpoints_json(self, json: &str) -> Result<Self> {
        let endpoints: BTreeMap<String, EndpointDefinition> = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("Invalid endpoint definitions: {}", e)))?;
        Ok(self.endpoints(endpoints))
    }

    /// Transforms the transport options of every request just before it is sent.
    pub fn configure_options<F>(mut self, f: F) -> Self
    where
        F: Fn(RequestOptions) -> RequestOptions + Send + Sync + 'static,
    {
        self.configure_options = Arc::new(f);
        self
    }

    /// Transforms the header set of every call (defaults plus caller headers).
    pub fn configure_headers<F>(mut self, f: F) -> Self
    where
        F: Fn(Headers) -> Headers + Send + Sync + 'static,
    {
        self.configure_headers = Arc::new(f);
        self
    }

    /// Runs after every successful response; its result is what callers see.
    pub fn handle_resolve<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ApiRequest, ApiResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        self.handle_resolve = Arc::new(
            move |request: ApiRequest, response: ApiResponse| -> BoxFuture<'static, Result<ApiResponse>> {
                Box::pin(f(request, response))
            },
        );
        self
    }

    /// Runs after every failure; its result is what callers see.
    ///
    /// Returning `Ok` turns the failure into a success.
    pub fn handle_reject<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ApiRequest, Error) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        self.handle_reject = Arc::new(
            move |request: ApiRequest, err: Error| -> BoxFuture<'static, Result<ApiResponse>> {
                Box::pin(f(request, err))
            },
        );
        self
    }

    /// Builds the configured `Api`.
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL was provided or if the transport
    /// cannot be constructed.
    pub fn build(self) -> Result<Api> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Configuration("Base URL is required".to_string()))?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.timeout)?),
        };

        let endpoints = self
            .endpoints
            .into_iter()
            .map(|(name, definition)| {
                let registered = RegisteredEndpoint::new(name.clone(), definition);
                (name, Arc::new(registered))
            })
            .collect();

        Ok(Api {
            inner: Arc::new(ApiInner {
                base_url,
                default_headers: self.default_headers,
                endpoints,
                transport,
                configure_options: self.configure_options,
                configure_headers: self.configure_headers,
                handle_resolve: self.handle_resolve,
                handle_reject: self.handle_reject,
                in_flight: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        })
    }
}

impl Default for ApiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_appends_path_to_base() {
        let base = Url::parse("https://api.example.com/v1/").unwrap();
        let url = join_url(&base, "/users/5?active=true").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/users/5?active=true");
    }

    #[test]
    fn build_requires_base_url() {
        let result = Api::builder().build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn unknown_endpoint_is_reported() {
        let api = Api::builder()
            .base_url("http://localhost")
            .unwrap()
            .endpoint("getUser", EndpointDefinition::get("/users/:id"))
            .build()
            .unwrap();

        assert!(api.endpoint("getUser").is_ok());
        assert!(matches!(api.endpoint("nope"), Err(Error::UnknownEndpoint(name)) if name == "nope"));
        assert_eq!(api.endpoint_names().collect::<Vec<_>>(), vec!["getUser"]);
    }

    #[test]
    fn endpoints_load_from_json() {
        let api = Api::builder()
            .base_url("http://localhost")
            .unwrap()
            .endpoints_json(r#"{ "removeUser": { "path": "/users/:id", "method": "destroy" } }"#)
            .unwrap()
            .build()
            .unwrap();

        let endpoint = api.endpoint("removeUser").unwrap();
        assert_eq!(endpoint.required(), ["id".to_string()]);
    }

    #[test]
    fn missing_parameters_fail_before_runtime_is_needed() {
        let api = Api::builder()
            .base_url("http://localhost")
            .unwrap()
            .endpoint("getUser", EndpointDefinition::get("/users/:id"))
            .build()
            .unwrap();

        let result = api.call("getUser", CallArgs::new());
        match result {
            Err(Error::MissingParameters { endpoint, missing }) => {
                assert_eq!(endpoint, "getUser");
                assert_eq!(missing, vec!["id".to_string()]);
            }
            other => panic!("Expected MissingParameters, got {:?}", other),
        }
        assert_eq!(api.in_flight(), 0);
    }

    #[test]
    fn calls_outside_a_runtime_are_rejected() {
        let api = Api::builder()
            .base_url("http://localhost")
            .unwrap()
            .endpoint("getUser", EndpointDefinition::get("/users/:id"))
            .build()
            .unwrap();

        let result = api.call("getUser", CallArgs::new().placeholder("id", 1));
        assert!(matches!(result, Err(Error::Configuration(_))));
        assert_eq!(api.in_flight(), 0);
    }
}
