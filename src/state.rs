//! The read model folded from lifecycle events.
//!
//! State is nested by endpoint name and then by the canonical key of the
//! call's placeholders. Entries are created on the first event for a key and
//! never removed.

use crate::lifecycle::{LifecycleEvent, LifecycleMiddleware};
use crate::descriptor::Headers;
use crate::signature::CallKey;
use crate::url_template::Placeholders;
use crate::Error;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// What is known about one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallState {
    /// The placeholders the call was made with.
    pub params: Placeholders,
    pub is_loading: bool,
    pub has_failed: bool,
    pub error: Option<String>,
    pub headers: Option<Headers>,
    pub status: Option<u16>,
    pub result: Option<Value>,
}

/// Calls of every endpoint, keyed by endpoint name then placeholder key.
///
/// Cloning is cheap: each endpoint's calls sit behind an `Arc` and are only
/// copied when an event touches that endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApiState {
    endpoints: BTreeMap<String, Arc<BTreeMap<CallKey, CallState>>>,
}

impl ApiState {
    /// Creates an empty state with no recorded calls.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded calls of `endpoint`.
    pub fn calls(&self, endpoint: &str) -> Option<&BTreeMap<CallKey, CallState>> {
        self.endpoints.get(endpoint).map(Arc::as_ref)
    }

    /// One recorded call.
    pub fn call(&self, endpoint: &str, key: &CallKey) -> Option<&CallState> {
        self.calls(endpoint)?.get(key)
    }

    fn entry(&mut self, endpoint: &str, params: &Placeholders) -> Option<&mut CallState> {
        let key = match CallKey::of(params) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "Ignoring event with unserializable params");
                return None;
            }
        };

        let calls = Arc::make_mut(self.endpoints.entry(endpoint.to_string()).or_default());
        Some(calls.entry(key).or_insert_with(|| CallState {
            params: params.clone(),
            ..CallState::default()
        }))
    }
}

/// Anything a state container may dispatch.
///
/// Only values that carry a lifecycle event change the read model.
pub trait ApiAction {
    fn lifecycle(&self) -> Option<&LifecycleEvent>;
}

impl ApiAction for LifecycleEvent {
    fn lifecycle(&self) -> Option<&LifecycleEvent> {
        Some(self)
    }
}

impl<T: ApiAction> ApiAction for Option<T> {
    fn lifecycle(&self) -> Option<&LifecycleEvent> {
        self.as_ref()?.lifecycle()
    }
}

/// Folds `action` into `state`, returning the new state.
///
/// `state` itself is never modified. Actions without a lifecycle event
/// return an unchanged copy.
///
/// # Examples
///
/// ```
/// use fetchstate::{reduce, ApiResponse, ApiState, CallDescriptor, EventMeta, LifecycleEvent};
/// use http::StatusCode;
/// use serde_json::json;
///
/// let meta = EventMeta { name: "getUser".to_string(), params: CallDescriptor::default() };
///
/// let state = reduce(&ApiState::new(), &LifecycleEvent::Request(meta.clone()));
/// let response = ApiResponse::new(StatusCode::OK).with_body(json!({ "id": 1 }));
/// let state = reduce(&state, &LifecycleEvent::Response(meta, response));
///
/// let call = state.calls("getUser").unwrap().values().next().unwrap();
/// assert!(!call.is_loading);
/// assert_eq!(call.result, Some(json!({ "id": 1 })));
/// ```
pub fn reduce<A: ApiAction + ?Sized>(state: &ApiState, action: &A) -> ApiState {
    let mut next = state.clone();
    let Some(event) = action.lifecycle() else {
        return next;
    };

    let meta = event.meta();
    let Some(call) = next.entry(&meta.name, &meta.params.placeholders) else {
        return state.clone();
    };

    match event {
        LifecycleEvent::Request(_) => {
            call.is_loading = true;
            call.has_failed = false;
            call.error = None;
        }
        LifecycleEvent::Response(_, response) => {
            call.is_loading = false;
            call.headers = Some(response.headers.clone());
            call.status = Some(response.status.as_u16());
            if let Some(body) = response.body.as_ref().filter(|body| !body.is_null()) {
                call.result = Some(body.clone());
            }
        }
        LifecycleEvent::Error(_, err) => {
            call.is_loading = false;
            call.has_failed = true;
            call.result = None;
            match err {
                Error::Http(response) => {
                    call.error = Some(error_message(err, response.body.as_ref()));
                    call.headers = Some(response.headers.clone());
                    call.status = Some(response.status.as_u16());
                }
                other => {
                    call.error = Some(other.to_string());
                    call.headers = None;
                    call.status = None;
                }
            }
        }
    }

    next
}

fn error_message(err: &Error, body: Option<&Value>) -> String {
    match body.and_then(|body| body.get("error")) {
        Some(Value::String(message)) => message.clone(),
        _ => err.to_string(),
    }
}

/// A minimal state holder that folds every dispatched action.
///
/// Useful on its own, or as the `next` stage of a [`LifecycleMiddleware`].
#[derive(Debug, Default)]
pub struct ApiStore {
    state: Mutex<ApiState>,
}

impl ApiStore {
    /// Creates a store holding an empty [`ApiState`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `action` into the held state.
    pub fn dispatch<A: ApiAction + ?Sized>(&self, action: &A) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = reduce(&state, action);
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> ApiState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A middleware whose events are folded into this store.
    pub fn middleware(
        self: &Arc<Self>,
    ) -> LifecycleMiddleware<LifecycleEvent, impl Fn(LifecycleEvent) + Send + Sync + 'static> {
        let store = Arc::clone(self);
        LifecycleMiddleware::new(move |event: LifecycleEvent| store.dispatch(&event))
    }
}
