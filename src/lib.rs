//! # Fetchstate - declarative REST endpoints with a foldable lifecycle
//!
//! Fetchstate turns a map of endpoint definitions (path template, verb,
//! required parameters) into callable endpoints. Every call builds its URL
//! from `:name` placeholders, joins an identical call that is already in
//! flight instead of sending a second request, and can be observed as a
//! `request` / `response` / `error` event sequence that a reducer folds into
//! a read model.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fetchstate::{Api, ApiStore, CallArgs, EndpointDefinition};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fetchstate::Error> {
//!     let api = Api::builder()
//!         .base_url("https://api.example.com")?
//!         .endpoint("getUser", EndpointDefinition::get("/users/:id"))
//!         .endpoint("createUser", EndpointDefinition::post("/users"))
//!         .build()?;
//!
//!     // Fold every call's lifecycle into a store
//!     let store = Arc::new(ApiStore::new());
//!     let middleware = store.middleware();
//!
//!     let args = CallArgs::new().placeholder("id", 5);
//!     let user = middleware.track(api.call("getUser", args.clone())?).await?;
//!     println!("User: {:?}", user.body);
//!
//!     let view = api.query(&store.state(), "getUser", &args.placeholders)?;
//!     assert!(!view.is_loading);
//!
//!     let created = api
//!         .call("createUser", CallArgs::new().body(json!({ "name": "Alice" })))?
//!         .await?;
//!     println!("Created with status {}", created.status);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Placeholder URLs** - `/users/:id` templates; leftover values become query parameters
//! - **In-flight deduplication** - identical calls share one request until it settles
//! - **Hooks** - transform options and headers, post-process resolutions and rejections
//! - **Lifecycle events** - `request` then exactly one of `response` or `error` per call
//! - **Read model** - a pure reducer and selectors for loading/failed/result views
//! - **Automatic logging** - structured logging with `tracing`
//!
//! ## Error Handling
//!
//! HTTP failures arrive through the call's future with the normalized
//! response attached:
//!
//! ```no_run
//! use fetchstate::{Api, CallArgs, EndpointDefinition, Error};
//!
//! # async fn example() -> Result<(), Error> {
//! # let api = Api::builder()
//! #     .base_url("https://api.example.com")?
//! #     .endpoint("getUser", EndpointDefinition::get("/users/:id"))
//! #     .build()?;
//! match api.call("getUser", CallArgs::new())  {
//!     Err(Error::MissingParameters { endpoint, missing }) => {
//!         eprintln!("{} needs {:?}", endpoint, missing);
//!     }
//!     Err(e) => eprintln!("Could not issue call: {}", e),
//!     Ok(call) => match call.await {
//!         Ok(response) => println!("Success: {:?}", response.body),
//!         Err(Error::Http(response)) => eprintln!("HTTP {}: {:?}", response.status, response.body),
//!         Err(e) => eprintln!("Other error: {}", e),
//!     },
//! }
//! # Ok(())
//! # }
//! ```

mod client;
pub mod descriptor;
mod endpoint;
mod error;
pub mod lifecycle;
pub mod query;
mod signature;
pub mod state;
pub mod transport;
pub mod url_template;

pub use client::{Api, ApiBuilder, ApiCall, ApiRequest};
pub use descriptor::{CallArgs, CallDescriptor, Headers, RequestMode, RequestOptions, Verb};
pub use endpoint::{Endpoint, EndpointDefinition};
pub use error::{Error, Result};
pub use lifecycle::{dispatch_call, Dispatched, EventMeta, LifecycleEvent, LifecycleMiddleware, LifecyclePhase};
pub use query::{query_call, query_endpoint, CallResult, CallView, EndpointView};
pub use signature::CallKey;
pub use state::{reduce, ApiAction, ApiState, ApiStore, CallState};
pub use transport::{ApiResponse, ReqwestTransport, Transport};
pub use url_template::{build_url, Placeholders};
