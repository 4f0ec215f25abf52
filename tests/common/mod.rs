#![allow(dead_code)]

use std::time::Duration;

use futures::Stream;
use serde_json::{json, Value};
use stream_rpc::{
    //
    MemoryHub,
    Result,
    RpcEngine,
    RpcEngineBuilder,
    TransportBuilder,
};

/// Attach `node_id` to `hub` and build an engine over it.
pub async fn engine_on(hub: &std::sync::Arc<MemoryHub>, node_id: &str, prefix: &str) -> Result<RpcEngine> {
    // ---
    let transport = TransportBuilder::new()
        .node_id(node_id)
        .hub(hub.clone())
        .build()
        .await?;
    RpcEngineBuilder::new(transport).prefix(prefix).build().await
}

/// Never-ending producer emitting 0, 1, 2, ... every few milliseconds.
pub fn ticker() -> impl Stream<Item = std::result::Result<Value, Value>> + Send + 'static {
    futures::stream::unfold(0u64, |n| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Some((Ok::<Value, Value>(json!(n)), n + 1))
    })
}

#[cfg(feature = "logging")]
mod imp {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}

#[cfg(not(feature = "logging"))]
mod imp {
    #[inline]
    pub fn init() {}
}

pub fn init_logging() {
    imp::init();
}
