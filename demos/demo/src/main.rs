use std::sync::mpsc;
use std::time::Duration;

use serde_json::{Value, json};
use ws_dispatch::{DispatchError, Dispatcher, DispatcherConfig};

const DEFAULT_ADDRESS: &str = "ws://127.0.0.1:9001/echo";

/// Usage: ping [ADDRESS] [JSON-MESSAGE]
fn main() {
    demo::init_logging();

    let mut args = std::env::args().skip(1);
    let address = args.next().unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
    let message = match args.next() {
        Some(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("message is not valid JSON: {e}");
                std::process::exit(2);
            }
        },
        None => json!({ "op": "ping" }),
    };

    let config = DispatcherConfig::new()
        .with_connect_timeout(Duration::from_secs(5))
        .with_reply_timeout(Duration::from_secs(10));
    let dispatcher = match Dispatcher::builder().with_config(config).build() {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            tracing::error!("failed to start dispatcher: {e}");
            std::process::exit(1);
        }
    };

    let (tx, rx) = mpsc::channel::<Result<(Value, String), (DispatchError, String)>>();
    let err_tx = tx.clone();
    dispatcher.dispatch_or_else(
        &address,
        &message,
        move |reply: Value, context: String| {
            let _ = tx.send(Ok((reply, context)));
        },
        move |error, context: String| {
            let _ = err_tx.send(Err((error, context)));
        },
        format!("ping {address}"),
    );

    match rx.recv() {
        Ok(Ok((reply, context))) => println!("[{context}] {reply}"),
        Ok(Err((error, context))) => {
            tracing::error!("[{context}] {error}");
            std::process::exit(1);
        }
        Err(_) => {
            tracing::error!("dispatcher stopped before the exchange finished");
            std::process::exit(1);
        }
    }
}
