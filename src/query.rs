//! Selectors over [`ApiState`].
//!
//! [`query_call`] reads one call back out of the read model;
//! [`query_endpoint`] summarizes every recorded call of an endpoint.

use crate::descriptor::Headers;
use crate::endpoint::Endpoint;
use crate::signature::CallKey;
use crate::state::ApiState;
use crate::url_template::Placeholders;
use crate::Result;
use serde::Serialize;
use serde_json::Value;

/// The state of a single call. Every field defaults to its not-started value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallView {
    pub is_loading: bool,
    pub has_started: bool,
    pub has_failed: bool,
    pub result: Option<Value>,
    pub headers: Headers,
    pub error: Option<String>,
    pub status: Option<u16>,
}

/// One call's parameters paired with its result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallResult {
    pub params: Placeholders,
    pub payload: Option<Value>,
}

/// Summary of every recorded call of an endpoint.
///
/// The per-call lists (`result`, `headers`, `error`) and `status` are only
/// filled once no call is loading. Calls are listed in [`CallKey`] order of
/// their placeholders, which is textual: `{"id":10}` comes before `{"id":2}`.
///
/// [`CallKey`]: crate::CallKey
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EndpointView {
    /// Any call is loading.
    pub is_loading: bool,
    /// At least one call was recorded.
    pub has_started: bool,
    /// Any call has an error.
    pub has_failed: bool,
    pub result: Option<Vec<CallResult>>,
    pub headers: Vec<Headers>,
    pub error: Option<Vec<Option<String>>>,
    /// Status of the first call in the listing order.
    pub status: Option<u16>,
}

/// Reads the call of `endpoint` made with `placeholders`.
///
/// # Errors
///
/// Fails only if `placeholders` cannot be encoded into a key.
///
/// # Examples
///
/// ```
/// use fetchstate::{query_call, Api, ApiState, EndpointDefinition, Placeholders};
///
/// # fn example() -> Result<(), fetchstate::Error> {
/// let api = Api::builder()
///     .base_url("https://api.example.com")?
///     .endpoint("getUser", EndpointDefinition::get("/users/:id"))
///     .build()?;
///
/// let view = query_call(&ApiState::new(), &api.endpoint("getUser")?, &Placeholders::new())?;
/// assert!(!view.has_started);
/// assert!(!view.is_loading);
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
pub fn query_call(state: &ApiState, endpoint: &Endpoint, placeholders: &Placeholders) -> Result<CallView> {
    let key = CallKey::of(placeholders)?;

    let Some(call) = state.call(endpoint.name(), &key) else {
        return Ok(CallView::default());
    };

    Ok(CallView {
        is_loading: call.is_loading,
        has_started: true,
        has_failed: call.has_failed || call.error.is_some(),
        result: call.result.clone(),
        headers: call.headers.clone().unwrap_or_default(),
        error: call.error.clone(),
        status: call.status,
    })
}

/// Summarizes every recorded call of `endpoint`.
pub fn query_endpoint(state: &ApiState, endpoint: &Endpoint) -> EndpointView {
    let Some(calls) = state.calls(endpoint.name()).filter(|calls| !calls.is_empty()) else {
        return EndpointView::default();
    };

    let is_loading = calls.values().any(|call| call.is_loading);
    let has_failed = calls.values().any(|call| call.error.is_some());

    if is_loading {
        return EndpointView {
            is_loading,
            has_started: true,
            has_failed,
            ..EndpointView::default()
        };
    }

    EndpointView {
        is_loading,
        has_started: true,
        has_failed,
        result: Some(
            calls
                .values()
                .map(|call| CallResult {
                    params: call.params.clone(),
                    payload: call.result.clone(),
                })
                .collect(),
        ),
        headers: calls
            .values()
            .map(|call| call.headers.clone().unwrap_or_default())
            .collect(),
        error: Some(calls.values().map(|call| call.error.clone()).collect()),
        status: calls.values().next().and_then(|call| call.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::CallDescriptor;
    use crate::lifecycle::{EventMeta, LifecycleEvent};
    use crate::state::reduce;
    use crate::transport::ApiResponse;
    use crate::{Api, EndpointDefinition, Error};
    use http::StatusCode;
    use serde_json::json;

    fn api() -> Api {
        Api::builder()
            .base_url("http://localhost")
            .unwrap()
            .endpoint("getUser", EndpointDefinition::get("/users/:id"))
            .endpoint("listUsers", EndpointDefinition::get("/users"))
            .build()
            .unwrap()
    }

    fn placeholders(value: Value) -> Placeholders {
        match value {
            Value::Object(map) => map,
            _ => panic!("placeholders must be an object"),
        }
    }

    fn meta(placeholders: Placeholders) -> EventMeta {
        EventMeta {
            name: "getUser".to_string(),
            params: CallDescriptor {
                placeholders,
                ..CallDescriptor::default()
            },
        }
    }

    #[test]
    fn request_then_response_round_trips() {
        let api = api();
        let args = placeholders(json!({ "id": 5 }));
        let response = ApiResponse::new(StatusCode::OK)
            .with_header("etag", "v1")
            .with_body(json!({ "id": 5, "name": "a" }));

        let mut state = reduce(&ApiState::new(), &LifecycleEvent::Request(meta(args.clone())));
        let loading = api.query(&state, "getUser", &args).unwrap();
        assert!(loading.is_loading);
        assert!(loading.has_started);

        state = reduce(&state, &LifecycleEvent::Response(meta(args.clone()), response.clone()));
        let view = api.query(&state, "getUser", &args).unwrap();

        assert!(!view.is_loading);
        assert!(!view.has_failed);
        assert_eq!(view.result, response.body);
        assert_eq!(view.status, Some(200));
        assert_eq!(view.headers, response.headers);
    }

    #[test]
    fn native_error_round_trips_without_status() {
        let api = api();
        let args = placeholders(json!({ "id": 5 }));

        let mut state = reduce(&ApiState::new(), &LifecycleEvent::Request(meta(args.clone())));
        state = reduce(
            &state,
            &LifecycleEvent::Error(meta(args.clone()), Error::Custom("offline".to_string())),
        );
        let view = api.query(&state, "getUser", &args).unwrap();

        assert!(view.has_failed);
        assert_eq!(view.error.as_deref(), Some("offline"));
        assert_eq!(view.status, None);
        assert!(view.headers.is_empty());
    }

    #[test]
    fn aggregate_pairs_params_with_payloads() {
        let api = api();
        let mut state = ApiState::new();
        for id in [1, 2] {
            let args = placeholders(json!({ "id": id }));
            state = reduce(&state, &LifecycleEvent::Request(meta(args.clone())));
            state = reduce(
                &state,
                &LifecycleEvent::Response(
                    meta(args),
                    ApiResponse::new(StatusCode::OK).with_body(json!({ "id": id })),
                ),
            );
        }

        let view = api.query_all(&state, "getUser").unwrap();
        let result = view.result.unwrap();

        assert!(!view.is_loading);
        assert!(view.has_started);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].params, placeholders(json!({ "id": 1 })));
        assert_eq!(result[0].payload, Some(json!({ "id": 1 })));
        assert_eq!(result[1].payload, Some(json!({ "id": 2 })));
        assert_eq!(view.status, Some(200));
        assert_eq!(view.error, Some(vec![None, None]));
    }

    #[test]
    fn aggregate_lists_calls_in_key_order() {
        let api = api();
        let mut state = ApiState::new();
        for (id, status) in [(2, StatusCode::OK), (10, StatusCode::CREATED)] {
            let args = placeholders(json!({ "id": id }));
            state = reduce(&state, &LifecycleEvent::Request(meta(args.clone())));
            state = reduce(
                &state,
                &LifecycleEvent::Response(meta(args), ApiResponse::new(status)),
            );
        }

        let view = api.query_all(&state, "getUser").unwrap();
        let result = view.result.unwrap();

        assert_eq!(result[0].params, placeholders(json!({ "id": 10 })));
        assert_eq!(result[1].params, placeholders(json!({ "id": 2 })));
        assert_eq!(view.status, Some(201));
    }

    #[test]
    fn aggregate_withholds_results_while_loading() {
        let api = api();
        let mut state = reduce(
            &ApiState::new(),
            &LifecycleEvent::Request(meta(placeholders(json!({ "id": 1 })))),
        );
        state = reduce(
            &state,
            &LifecycleEvent::Error(
                meta(placeholders(json!({ "id": 2 }))),
                Error::Custom("boom".to_string()),
            ),
        );

        let view = api.query_all(&state, "getUser").unwrap();
        assert!(view.is_loading);
        assert!(view.has_failed);
        assert_eq!(view.result, None);
        assert_eq!(view.error, None);
    }

    #[test]
    fn untouched_endpoint_has_defaults() {
        let api = api();
        let view = api.query_all(&ApiState::new(), "listUsers").unwrap();
        assert_eq!(view, EndpointView::default());

        let call = api.query(&ApiState::new(), "listUsers", &Placeholders::new()).unwrap();
        assert_eq!(call, CallView::default());
    }

    #[test]
    fn unknown_endpoint_fails() {
        let api = api();
        assert!(matches!(
            api.query_all(&ApiState::new(), "missing"),
            Err(Error::UnknownEndpoint(_))
        ));
    }
}
