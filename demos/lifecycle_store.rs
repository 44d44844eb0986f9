//! Folding call lifecycles into a read model.
//!
//! This example shows how to:
//! - Observe calls with the lifecycle middleware
//! - Share one request between identical concurrent calls
//! - Read per-call and per-endpoint views out of the store
//!
//! Run with: `cargo run --example lifecycle_store`

use fetchstate::{Api, ApiStore, CallArgs, EndpointDefinition, Error};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("fetchstate=debug,lifecycle_store=info")
        .init();

    let api = Api::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .endpoints_json(
            r#"{
                "getUser": { "path": "/users/:id", "method": "get" },
                "getTodo": { "path": "/todos/:id", "method": "get" }
            }"#,
        )?
        .build()?;

    let store = Arc::new(ApiStore::new());
    let middleware = store.middleware();

    let args = CallArgs::new().placeholder("id", 1);
    let first = api.call("getUser", args.clone())?;
    let second = api.call("getUser", args.clone())?;
    println!("Shared request: {}", first.same_request(&second));

    let tracked = middleware.track(first);
    let view = api.query(&store.state(), "getUser", &args.placeholders)?;
    println!("Loading: {}", view.is_loading);

    tracked.await?;
    let view = api.query(&store.state(), "getUser", &args.placeholders)?;
    println!("Loading: {}, status: {:?}", view.is_loading, view.status);
    println!("Result: {:?}", view.result);

    for id in [1, 2, 3] {
        let call = api.call("getTodo", CallArgs::new().placeholder("id", id))?;
        middleware.track(call).await?;
    }

    let all = api.query_all(&store.state(), "getTodo")?;
    for call in all.result.unwrap_or_default() {
        println!("{:?} -> {:?}", call.params, call.payload);
    }

    match api.call("getTodo", CallArgs::new()) {
        Err(Error::MissingParameters { endpoint, missing }) => {
            println!("{} was not sent, missing {:?}", endpoint, missing);
        }
        other => println!("Unexpected: {:?}", other.map(|call| call.path().to_string())),
    }

    Ok(())
}
