//! Stream RPC example using the in-memory transport.
//!
//! Two endpoints, "main" and "renderer", share one hub. Main registers a
//! streaming operation; the renderer invokes it, cancels a second, endless
//! invocation after a few items, and prints what it received.
//!
//! Run with: RUST_LOG=stream_rpc=debug cargo run --example echo_memory

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::panic_in_result_fn
)]

use std::time::Duration;

use futures::{stream, StreamExt};
use serde_json::{json, Value};
use stream_rpc::{Endpoint, MemoryHub, Result, RpcEngineBuilder, TransportBuilder};
use tracing_subscriber::{fmt as tracing_format, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_format()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_line_number(true)
        .init();

    let hub = MemoryHub::new();

    let main_transport = TransportBuilder::new()
        .node_id("main")
        .hub(hub.clone())
        .build()
        .await?;
    let main = RpcEngineBuilder::new(main_transport).prefix("$demo/").build().await?;

    let renderer_transport = TransportBuilder::new()
        .node_id("renderer")
        .hub(hub)
        .build()
        .await?;
    let renderer = RpcEngineBuilder::new(renderer_transport)
        .prefix("$demo/")
        .default_target(Endpoint::from("main"))
        .build()
        .await?;

    main.register("echo", |args, _cancel| {
        // ---
        stream::iter(args.into_iter().map(Ok::<Value, Value>))
    })
    .await?;

    main.register("heartbeat", |_args, cancel| {
        // ---
        stream::unfold(0u64, move |n| {
            let cancel = cancel.clone();
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        Some((Ok::<Value, Value>(json!({ "beat": n })), n + 1))
                    }
                }
            }
        })
    })
    .await?;

    let mut echoed = renderer.run("echo", None, vec![json!(1), json!("two"), json!({"three": 3})]);
    while let Some(item) = echoed.next().await {
        println!("echo      -> {}", item?);
    }

    let beats: Vec<_> = renderer.run("heartbeat", None, vec![]).take(3).collect().await;
    for beat in beats {
        println!("heartbeat -> {}", beat?);
    }

    match renderer.run("missing", None, vec![]).next().await {
        Some(Err(err)) => println!("missing   -> {err}"),
        other => println!("missing   -> unexpected {other:?}"),
    }

    // Let the cancel reach main before the engines go away.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
