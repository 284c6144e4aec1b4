//! Echoes every text frame back to its sender.
//!
//! Usage: echo-server [LISTEN-ADDR]

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    demo::init_logging();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9001".to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!("echo server listening on ws://{addr}");

    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "accepted connection");
        tokio::spawn(async move {
            if let Err(e) = echo(stream).await {
                warn!(%peer, "connection failed: {e}");
            }
        });
    }
}

async fn echo(stream: TcpStream) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let mut ws = tokio_tungstenite::accept_async(stream).await?;
    while let Some(message) = ws.next().await {
        match message? {
            Message::Text(text) => {
                info!("echo: {}", text.as_str());
                ws.send(Message::Text(text)).await?;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}
