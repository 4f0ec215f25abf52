use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use stream_rpc::{
    //
    CancellationToken,
    Endpoint,
    MemoryHub,
    Result,
    RpcEngineBuilder,
    RpcError,
    TransportBuilder,
    TransportPtr,
};

mod common;
use common::{engine_on, init_logging, ticker};

async fn transport_on(hub: &Arc<MemoryHub>, node_id: &str) -> Result<TransportPtr> {
    // ---
    TransportBuilder::new()
        .node_id(node_id)
        .hub(hub.clone())
        .build()
        .await
}

/// Wait until `channel` on `transport` has no listeners left.
async fn wait_detached(transport: &TransportPtr, channel: &str) {
    // ---
    for _ in 0..100 {
        if transport.listener_count(channel) == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{channel} still has {} listeners", transport.listener_count(channel));
}

#[tokio::test]
async fn test_unregister_releases_stacked_registrations() -> Result<()> {
    // ---
    init_logging();

    let hub = MemoryHub::new();
    let transport = transport_on(&hub, "cleanup").await?;
    let engine = RpcEngineBuilder::new(transport.clone()).build().await?;

    let noop = |_args: Vec<Value>, _cancel: CancellationToken| {
        stream::empty::<std::result::Result<Value, Value>>()
    };

    engine.register("remove-test-1", noop).await?;
    engine.register("remove-test-1", noop).await?;
    assert_eq!(engine.listener_count("remove-test-1"), 2);

    engine.unregister("remove-test-1");
    assert_eq!(engine.listener_count("remove-test-1"), 0);
    assert!(!engine.is_registered("remove-test-1"));

    engine.register("remove-test-2", noop).await?;
    assert_eq!(engine.listener_count("remove-test-2"), 1);
    assert_eq!(transport.listener_count("check-listener"), 1);

    engine.unregister_all();
    assert_eq!(engine.listener_count("remove-test-2"), 0);
    assert_eq!(transport.listener_count("check-listener"), 0);
    Ok(())
}

#[tokio::test]
async fn test_completed_invocation_leaves_no_listeners() -> Result<()> {
    // ---
    init_logging();

    let hub = MemoryHub::new();
    let transport = transport_on(&hub, "settled").await?;
    let engine = RpcEngineBuilder::new(transport.clone()).build().await?;

    engine
        .register("once", |_args, _cancel| {
            stream::iter([Ok::<Value, Value>(json!("done"))])
        })
        .await?;

    let values: Vec<_> = engine.run("once", None, vec![]).collect().await;
    assert_eq!(values.len(), 1);

    assert_eq!(transport.listener_count("once:0"), 0);
    wait_detached(&transport, "once:0:cancel").await;
    wait_detached(&transport, "check-reply:once").await;
    Ok(())
}

#[tokio::test]
async fn test_stream_is_cold_until_polled() -> Result<()> {
    // ---
    init_logging();

    let hub = MemoryHub::new();
    let engine = engine_on(&hub, "cold", "").await?;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    engine
        .register("counted", move |_args, _cancel| {
            counter.fetch_add(1, Ordering::SeqCst);
            stream::iter([Ok::<Value, Value>(json!(1))])
        })
        .await?;

    let pending = engine.run("counted", None, vec![]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let values: Vec<_> = pending.collect().await;
    assert_eq!(values.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_dropping_the_stream_cancels_the_producer() -> Result<()> {
    // ---
    init_logging();

    let hub = MemoryHub::new();
    let transport = transport_on(&hub, "dropper").await?;
    let engine = RpcEngineBuilder::new(transport.clone()).build().await?;

    let (token_tx, mut token_rx) = mpsc::unbounded_channel::<CancellationToken>();
    engine
        .register("ticker", move |_args, cancel| {
            let _ = token_tx.send(cancel);
            ticker()
        })
        .await?;

    let mut ticks = engine.run("ticker", None, vec![]);
    let first = ticks.next().await;
    assert!(matches!(first, Some(Ok(_))));
    assert_eq!(transport.listener_count("ticker:0"), 1);

    drop(ticks);
    assert_eq!(transport.listener_count("ticker:0"), 0);

    let token = token_rx.recv().await;
    let Some(token) = token else {
        panic!("producer factory was never called");
    };
    tokio::time::timeout(Duration::from_secs(1), token.cancelled())
        .await
        .expect("producer was not cancelled");
    wait_detached(&transport, "ticker:0:cancel").await;
    Ok(())
}

#[tokio::test]
async fn test_closing_the_caller_stops_the_producer() -> Result<()> {
    // ---
    init_logging();

    let hub = MemoryHub::new();
    let main = engine_on(&hub, "main", "").await?;
    let renderer_transport = transport_on(&hub, "renderer").await?;
    let renderer = RpcEngineBuilder::new(renderer_transport.clone())
        .default_target(Endpoint::from("main"))
        .build()
        .await?;

    let (token_tx, mut token_rx) = mpsc::unbounded_channel::<CancellationToken>();
    main.register("ticker", move |_args, cancel| {
        let _ = token_tx.send(cancel);
        ticker()
    })
    .await?;

    let mut ticks = renderer.run("ticker", None, vec![]);
    assert!(matches!(ticks.next().await, Some(Ok(_))));

    renderer_transport.close().await?;

    let Some(token) = token_rx.recv().await else {
        panic!("producer factory was never called");
    };
    tokio::time::timeout(Duration::from_secs(1), token.cancelled())
        .await
        .expect("producer kept running after its caller went away");

    // Items buffered before the close drain first, then the loss surfaces.
    let ending = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            match ticks.next().await {
                Some(Ok(_)) => continue,
                other => break other,
            }
        }
    })
    .await
    .expect("stream hung after its transport closed");
    assert!(matches!(ending, Some(Err(RpcError::ConnectionLost))));
    assert!(ticks.next().await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_cancel_only_reaches_its_own_invocation() -> Result<()> {
    // ---
    init_logging();

    let hub = MemoryHub::new();
    let main = engine_on(&hub, "main", "").await?;
    let first = RpcEngineBuilder::new(transport_on(&hub, "renderer-1").await?)
        .default_target(Endpoint::from("main"))
        .build()
        .await?;
    let second = RpcEngineBuilder::new(transport_on(&hub, "renderer-2").await?)
        .default_target(Endpoint::from("main"))
        .build()
        .await?;

    let (token_tx, mut token_rx) = mpsc::unbounded_channel::<(Value, CancellationToken)>();
    main.register("ticker", move |args, cancel| {
        let who = args.into_iter().next().unwrap_or(Value::Null);
        let _ = token_tx.send((who, cancel));
        ticker()
    })
    .await?;

    // Both invokers start at sub-channel ticker:0.
    let mut from_first = first.run("ticker", None, vec![json!("first")]);
    let mut from_second = second.run("ticker", None, vec![json!("second")]);
    assert!(matches!(from_first.next().await, Some(Ok(_))));
    assert!(matches!(from_second.next().await, Some(Ok(_))));

    let mut tokens = Vec::new();
    for _ in 0..2 {
        let Some(entry) = token_rx.recv().await else {
            panic!("producer factory was not called twice");
        };
        tokens.push(entry);
    }
    let token_of = |who: &str| {
        tokens
            .iter()
            .find(|(caller, _)| caller == &json!(who))
            .map(|(_, token)| token.clone())
            .expect("no producer for caller")
    };
    let first_token = token_of("first");
    let second_token = token_of("second");

    drop(from_first);
    tokio::time::timeout(Duration::from_secs(1), first_token.cancelled())
        .await
        .expect("dropped invocation was not cancelled");

    let more: Vec<_> = tokio::time::timeout(
        Duration::from_secs(1),
        from_second.by_ref().take(3).collect::<Vec<_>>(),
    )
    .await
    .expect("surviving invocation stalled after the other was cancelled");
    assert_eq!(more.len(), 3);
    assert!(more.iter().all(|item| item.is_ok()));
    assert!(!second_token.is_cancelled());
    Ok(())
}

#[tokio::test]
async fn test_destroyed_target_fails_the_invocation() -> Result<()> {
    // ---
    init_logging();

    let hub = MemoryHub::new();
    let caller = engine_on(&hub, "caller", "").await?;
    let silent = transport_on(&hub, "silent").await?;

    let mut pending = caller.run("anything", Some(Endpoint::from("silent")), vec![]);
    let closer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        silent.close().await
    });

    let outcome = tokio::time::timeout(Duration::from_secs(1), pending.next())
        .await
        .expect("invocation hung after its target was destroyed");
    assert!(matches!(
        outcome,
        Some(Err(RpcError::InvalidOperation(op))) if op == "anything"
    ));

    closer.await.expect("closer task panicked")?;
    Ok(())
}
