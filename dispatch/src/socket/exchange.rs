//! One request/response exchange: connect, send one frame, read one frame,
//! close.

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{self, Message};

use super::connect::{self, Endpoint, WsStream};
use crate::config::DispatcherConfig;
use crate::error::{DispatchError, TimeoutPhase};

/// Lifecycle of an exchange. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ExchangeState {
    Connecting,
    /// Connected and the message has been sent; waiting for the reply.
    Open,
    Closed,
}

pub(crate) struct Exchange {
    id: u32,
    state: ExchangeState,
}

impl Exchange {
    pub(crate) fn new(id: u32) -> Self {
        Self {
            id,
            state: ExchangeState::Connecting,
        }
    }

    #[cfg(test)]
    fn state(&self) -> ExchangeState {
        self.state
    }

    fn transition(&mut self, next: ExchangeState) {
        debug_assert!(next >= self.state, "exchange state went backwards");
        log::debug!("[Exchange {}] {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }

    /// Run the exchange to completion. The connection is closed before this
    /// returns, whatever the outcome.
    pub(crate) async fn run<R: DeserializeOwned>(
        mut self,
        address: &str,
        payload: String,
        config: &DispatcherConfig,
    ) -> Result<R, DispatchError> {
        let result = self.perform(address, payload, config).await;
        self.transition(ExchangeState::Closed);
        if let Err(e) = &result {
            log::warn!("[Exchange {}] Failed: {}", self.id, e);
        }
        result
    }

    async fn perform<R: DeserializeOwned>(
        &mut self,
        address: &str,
        payload: String,
        config: &DispatcherConfig,
    ) -> Result<R, DispatchError> {
        let id = self.id;
        log::info!("[Exchange {}] Connecting to {}", id, address);

        let endpoint = Endpoint::parse(address)?;
        let request = endpoint.request(config)?;
        let mut stream = with_deadline(
            TimeoutPhase::Connect,
            config.connect_timeout(),
            connect::open(id, &endpoint, request),
        )
        .await?;

        log::debug!("[Exchange {}] Sending: {}", id, preview(&payload, 200));
        if let Err(e) = stream.send(Message::Text(payload.into())).await {
            close(id, stream).await;
            return Err(DispatchError::Send(e));
        }
        self.transition(ExchangeState::Open);

        let reply = with_deadline(
            TimeoutPhase::Reply,
            config.reply_timeout(),
            read_reply(id, &mut stream),
        )
        .await;
        close(id, stream).await;

        let text = reply?;
        serde_json::from_str(&text).map_err(DispatchError::Deserialize)
    }
}

/// Read frames until the first text frame. Control and binary frames are
/// skipped.
async fn read_reply(id: u32, stream: &mut WsStream) -> Result<String, DispatchError> {
    while let Some(frame) = stream.next().await {
        match frame.map_err(|e| receive_error(id, e))? {
            Message::Text(text) => {
                log::debug!("[Exchange {}] Received: {}", id, preview(text.as_str(), 100));
                return Ok(text.as_str().to_owned());
            }
            Message::Binary(data) => {
                log::debug!(
                    "[Exchange {}] Skipping binary frame ({} bytes)",
                    id,
                    data.len()
                );
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Answered by tungstenite
            }
            Message::Close(frame) => {
                let (code, reason) = frame
                    .map(|f| (f.code.into(), f.reason.to_string()))
                    .unwrap_or((1005u16, String::new()));
                log::info!(
                    "[Exchange {}] Peer closed before replying: {} {}",
                    id,
                    code,
                    reason
                );
                return Err(DispatchError::ClosedBeforeReply);
            }
            Message::Frame(_) => {}
        }
    }

    log::info!("[Exchange {}] Stream ended before a reply", id);
    Err(DispatchError::ClosedBeforeReply)
}

/// A peer that hangs up without a close handshake has still closed first.
fn receive_error(id: u32, e: tungstenite::Error) -> DispatchError {
    match e {
        tungstenite::Error::ConnectionClosed
        | tungstenite::Error::AlreadyClosed
        | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            log::info!("[Exchange {}] Peer dropped the connection before replying", id);
            DispatchError::ClosedBeforeReply
        }
        tungstenite::Error::Io(io) if io.kind() == std::io::ErrorKind::ConnectionReset => {
            log::info!("[Exchange {}] Peer reset the connection before replying", id);
            DispatchError::ClosedBeforeReply
        }
        e => DispatchError::Receive(e),
    }
}

/// Send a close frame and drop the stream without waiting for the peer.
async fn close(id: u32, mut stream: WsStream) {
    if let Err(e) = stream.close(None).await {
        log::debug!("[Exchange {}] Close frame not delivered: {}", id, e);
    }
    log::info!("[Exchange {}] Connection closed", id);
}

async fn with_deadline<T, F>(
    phase: TimeoutPhase,
    limit: Option<Duration>,
    fut: F,
) -> Result<T, DispatchError>
where
    F: Future<Output = Result<T, DispatchError>>,
{
    match limit {
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| DispatchError::Timeout { phase, after })?,
        None => fut.await,
    }
}

/// At most `max` bytes of `text`, cut on a char boundary.
fn preview(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
