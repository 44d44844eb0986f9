//! Lifecycle events for issued calls.
//!
//! [`LifecycleMiddleware`] sits in front of a state container's dispatch
//! path. Plain actions pass straight through to `next`; issued calls are
//! observed, producing exactly one `request` event followed by exactly one
//! `response` or `error` event.

use crate::client::{ApiCall, SharedResponse};
use crate::descriptor::CallDescriptor;
use crate::transport::ApiResponse;
use crate::Error;
use futures::future::FutureExt;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// The stage of a call an event marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    Request,
    Response,
    Error,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            LifecyclePhase::Request => "request",
            LifecyclePhase::Response => "response",
            LifecyclePhase::Error => "error",
        };
        f.write_str(phase)
    }
}

/// Identifies the call an event belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventMeta {
    /// The endpoint name.
    pub name: String,
    /// The normalized call descriptor.
    pub params: CallDescriptor,
}

/// One stage of a call's progress.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// The request was sent.
    Request(EventMeta),
    /// The call resolved.
    Response(EventMeta, ApiResponse),
    /// The call was rejected.
    Error(EventMeta, Error),
}

impl LifecycleEvent {
    /// The stage this event marks.
    pub fn phase(&self) -> LifecyclePhase {
        match self {
            LifecycleEvent::Request(_) => LifecyclePhase::Request,
            LifecycleEvent::Response(..) => LifecyclePhase::Response,
            LifecycleEvent::Error(..) => LifecyclePhase::Error,
        }
    }

    /// The call this event belongs to.
    pub fn meta(&self) -> &EventMeta {
        match self {
            LifecycleEvent::Request(meta)
            | LifecycleEvent::Response(meta, _)
            | LifecycleEvent::Error(meta, _) => meta,
        }
    }

    /// The action type string, e.g. `@@fetchstate/getUser/response`.
    pub fn action_type(&self) -> String {
        format!("@@fetchstate/{}/{}", self.meta().name, self.phase())
    }
}

/// A value travelling through a dispatch pipeline.
#[derive(Debug)]
pub enum Dispatched<A> {
    /// An ordinary action, forwarded untouched.
    Action(A),
    /// An issued call to observe.
    Call(ApiCall),
}

impl<A> From<ApiCall> for Dispatched<A> {
    fn from(call: ApiCall) -> Self {
        Dispatched::Call(call)
    }
}

/// Turns issued calls into lifecycle events for `next`.
///
/// # Examples
///
/// ```no_run
/// use fetchstate::{Api, CallArgs, Dispatched, EndpointDefinition, LifecycleEvent, LifecycleMiddleware};
///
/// # async fn example() -> Result<(), fetchstate::Error> {
/// let api = Api::builder()
///     .base_url("https://api.example.com")?
///     .endpoint("getUser", EndpointDefinition::get("/users/:id"))
///     .build()?;
///
/// let middleware = LifecycleMiddleware::new(|event: LifecycleEvent| {
///     println!("{}", event.action_type());
/// });
///
/// let call = api.call("getUser", CallArgs::new().placeholder("id", 1))?;
/// if let Some(tracked) = middleware.dispatch(Some(Dispatched::Call(call))) {
///     let response = tracked.await?;
///     println!("{}", response.status);
/// }
/// # Ok(())
/// # }
/// ```
pub struct LifecycleMiddleware<A, N> {
    next: Arc<N>,
    _action: PhantomData<fn(A)>,
}

impl<A, N> LifecycleMiddleware<A, N>
where
    A: From<LifecycleEvent> + 'static,
    N: Fn(A) + Send + Sync + 'static,
{
    /// Creates a middleware forwarding to `next`.
    pub fn new(next: N) -> Self {
        Self {
            next: Arc::new(next),
            _action: PhantomData,
        }
    }

    /// Handles one dispatched value.
    ///
    /// `None` is swallowed and plain actions go to `next`; both return
    /// `None`. Calls are passed to [`track`](Self::track).
    pub fn dispatch(&self, value: Option<Dispatched<A>>) -> Option<ApiCall> {
        match value? {
            Dispatched::Action(action) => {
                (self.next)(action);
                None
            }
            Dispatched::Call(call) => Some(self.track(call)),
        }
    }

    /// Observes a call.
    ///
    /// The `request` event is emitted before this returns. The returned call
    /// settles exactly like `call`, but only after the matching `response`
    /// or `error` event reached `next`. Inside a tokio runtime the events are
    /// emitted even if nobody awaits the result.
    pub fn track(&self, call: ApiCall) -> ApiCall {
        let meta = EventMeta {
            name: call.endpoint_name().to_string(),
            params: call.descriptor().clone(),
        };

        tracing::trace!(endpoint = %meta.name, "Emitting request event");
        (self.next)(A::from(LifecycleEvent::Request(meta.clone())));

        let next = Arc::clone(&self.next);
        let settlement = call.settlement();
        let observed: SharedResponse = async move {
            let outcome = settlement.await;
            let event = match &outcome {
                Ok(response) => LifecycleEvent::Response(meta, response.clone()),
                Err(err) => LifecycleEvent::Error(meta, err.clone()),
            };
            next(A::from(event));
            outcome
        }
        .boxed()
        .shared();

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(observed.clone().map(|_| ()));
        }

        call.with_future(observed)
    }
}

/// Issues `call` through `middleware`, passing missing-parameter failures
/// back without any event.
pub fn dispatch_call<A, N>(
    middleware: &LifecycleMiddleware<A, N>,
    call: crate::Result<ApiCall>,
) -> crate::Result<ApiCall>
where
    A: From<LifecycleEvent> + 'static,
    N: Fn(A) + Send + Sync + 'static,
{
    call.map(|call| middleware.track(call))
}
