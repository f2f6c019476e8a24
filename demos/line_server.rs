//! Line-protocol fan-out server.
//!
//! Broadcasts a JSON tick to every connected subscriber and merges ticks
//! into the snapshot replayed to late joiners. Try it with two terminals:
//!
//! ```text
//! cargo run --example line_server
//! nc 127.0.0.1 9000            # watch ticks arrive
//! _DELAY=500                   # batch to one update per 500ms
//! _DELAY=0                     # back to immediate delivery
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;

use fancast::{ErrorSink, Hub, HubConfig, IntervalCodec, LineReader, LineWriter, MergeFn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fancast=debug".into()),
        )
        .init();

    // Shallow object merge: batched ticks collapse into one object, and
    // the snapshot carries the latest value of every key.
    let merge: MergeFn<Value> = Arc::new(|source, diff| match (source, diff) {
        (Some(Value::Object(merged)), Value::Object(diff)) => {
            let mut merged = merged.clone();
            for (key, value) in diff {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        (_, diff) => diff.clone(),
    });
    let on_error: ErrorSink = Arc::new(|e| tracing::warn!(error = %e, "pipe error"));

    let hub = Arc::new(Hub::with_config(
        Some(on_error),
        Some(merge),
        HubConfig::with_interval(Duration::from_millis(100)),
    ));
    let _watcher = hub.spawn_shutdown_watcher(async {
        let _ = tokio::signal::ctrl_c().await;
    });

    {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(50));
            let mut tick = 0u64;
            loop {
                ticker.tick().await;
                hub.send_all(Arc::new(serde_json::json!({ "tick": tick }))).await;
                tick += 1;
            }
        });
    }

    let listener = TcpListener::bind("127.0.0.1:9000").await?;
    tracing::info!(addr = %listener.local_addr()?, "line server listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        let (rd, wr) = socket.into_split();
        let reader = LineReader::new(rd, IntervalCodec::new(), |line: &str| {
            serde_json::from_str::<Value>(line).map_err(Into::into)
        });
        let writer = LineWriter::new(wr);

        let (mut inbox, _handle) = hub.add(reader, writer, None).await;
        tracing::info!(peer = %peer, "subscriber joined");

        tokio::spawn(async move {
            while let Some(msg) = inbox.recv().await {
                tracing::info!(peer = %peer, %msg, "inbound message");
            }
            tracing::info!(peer = %peer, "subscriber left");
        });
    }
}
