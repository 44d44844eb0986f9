//! Basic example demonstrating endpoint definitions and calls.
//!
//! This example shows how to:
//! - Register endpoints from path templates
//! - Call them with placeholders and JSON bodies
//! - Access the normalized response
//!
//! Run with: `cargo run --example basic_call`

use fetchstate::{Api, CallArgs, EndpointDefinition, Error};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter("fetchstate=debug,basic_call=info")
        .init();

    // Endpoints for the JSONPlaceholder API
    let api = Api::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .endpoint("getPost", EndpointDefinition::get("/posts/:id"))
        .endpoint("listPosts", EndpointDefinition::get("/posts"))
        .endpoint("createPost", EndpointDefinition::post("/posts"))
        .build()?;

    println!("=== GET with a path placeholder ===");
    let call = api.call("getPost", CallArgs::new().placeholder("id", 1))?;
    println!("Requested path: {}", call.path());
    let response = call.await?;
    let post: Post = response.json()?;
    println!("Title: {}", post.title);
    println!("Status code: {}", response.status);
    println!("Request latency: {:?}", response.latency);
    println!();

    println!("=== GET with query parameters ===");
    let call = api.call("listPosts", CallArgs::new().placeholder("userId", 1))?;
    println!("Requested path: {}", call.path());
    let posts: Vec<Post> = call.await?.json()?;
    println!("User 1 has {} posts", posts.len());
    println!();

    println!("=== POST with a JSON body ===");
    let response = api
        .call(
            "createPost",
            CallArgs::new().body(json!({ "title": "My New Post", "body": "Hello", "userId": 1 })),
        )?
        .await?;
    println!("Created: {:?}", response.body);
    println!("Content-Type: {:?}", response.header("content-type"));

    Ok(())
}
