//! In-process websocket peer for the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// How long a test waits for something that should happen.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// What the peer does after reading the request frame.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Send the request text straight back.
    Echo,
    /// Send this text.
    Reply(String),
    /// Send both texts, one frame each.
    Twice(String, String),
    /// Send a binary frame, then this text.
    BinaryThen(String),
    /// Send a ping, then this text.
    PingThen(String),
    /// Never answer.
    Silent,
    /// Close the connection without answering.
    Close,
    /// Drop the TCP connection without a close handshake.
    Drop,
}

/// What the peer saw on one connection.
#[derive(Debug, Clone)]
pub struct Observation {
    pub request: String,
    pub origin: Option<String>,
    pub subprotocol: Option<String>,
    /// The next thing read after the peer acted: `true` when the client
    /// closed (close frame or end of stream) rather than sending more data.
    pub client_closed: bool,
}

pub struct TestPeer {
    addr: SocketAddr,
    observations: mpsc::UnboundedReceiver<Observation>,
}

impl TestPeer {
    pub async fn start(behaviour: Behaviour) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, observations) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let behaviour = behaviour.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(observation) = serve(stream, behaviour).await {
                        let _ = tx.send(observation);
                    }
                });
            }
        });

        Self { addr, observations }
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Wait for the next finished connection.
    pub async fn observation(&mut self) -> Observation {
        tokio::time::timeout(PATIENCE, self.observations.recv())
            .await
            .expect("peer saw no connection in time")
            .expect("peer stopped")
    }
}

async fn serve(stream: tokio::net::TcpStream, behaviour: Behaviour) -> Option<Observation> {
    let headers: Arc<Mutex<(Option<String>, Option<String>)>> = Arc::default();
    let seen = headers.clone();

    let callback = move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let subprotocol = header("Sec-WebSocket-Protocol");
        if let Some(protocol) = &subprotocol {
            response
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", protocol.parse().unwrap());
        }
        *seen.lock().unwrap() = (header("Origin"), subprotocol);
        Ok(response)
    };

    let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .ok()?;

    let request = loop {
        match ws.next().await? {
            Ok(Message::Text(text)) => break text.as_str().to_owned(),
            Ok(_) => continue,
            Err(_) => return None,
        }
    };

    match behaviour {
        Behaviour::Echo => {
            ws.send(Message::Text(request.clone().into())).await.ok()?;
        }
        Behaviour::Reply(text) => {
            ws.send(Message::Text(text.into())).await.ok()?;
        }
        Behaviour::Twice(first, second) => {
            ws.send(Message::Text(first.into())).await.ok()?;
            ws.send(Message::Text(second.into())).await.ok()?;
        }
        Behaviour::BinaryThen(text) => {
            ws.send(Message::Binary(vec![0xde, 0xad].into())).await.ok()?;
            ws.send(Message::Text(text.into())).await.ok()?;
        }
        Behaviour::PingThen(text) => {
            ws.send(Message::Ping(vec![7].into())).await.ok()?;
            ws.send(Message::Text(text.into())).await.ok()?;
        }
        Behaviour::Silent => {}
        Behaviour::Drop => {
            drop(ws);
            let (origin, subprotocol) = headers.lock().unwrap().clone();
            return Some(Observation {
                request,
                origin,
                subprotocol,
                client_closed: true,
            });
        }
        Behaviour::Close => {
            let _ = ws.close(None).await;
        }
    }

    let client_closed = loop {
        match ws.next().await {
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            None | Some(Ok(Message::Close(_))) | Some(Err(_)) => break true,
            Some(Ok(_)) => break false,
        }
    };

    let (origin, subprotocol) = headers.lock().unwrap().clone();
    Some(Observation {
        request,
        origin,
        subprotocol,
        client_closed,
    })
}

/// Receive from a handler channel, failing the test after [`PATIENCE`].
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(PATIENCE, rx.recv())
        .await
        .expect("handler was not called in time")
        .expect("handler channel closed")
}

/// Assert nothing arrives within `window`.
pub async fn assert_quiet<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>, window: Duration) {
    if let Ok(Some(value)) = tokio::time::timeout(window, rx.recv()).await {
        panic!("handler called unexpectedly with {value:?}");
    }
}
