use std::time::Duration;

use serde::Deserialize;

/// Per-dispatcher settings applied to every exchange.
///
/// Both timeouts default to `None`: an unreachable peer or a peer that never
/// answers keeps the exchange pending until the dispatcher shuts down.
///
/// Can be built with the `with_*` methods or deserialized from any serde
/// format, e.g.
///
/// ```
/// # use ws_dispatch::DispatcherConfig;
/// let config: DispatcherConfig =
///     serde_json::from_str(r#"{ "reply_timeout_ms": 5000, "origin": "http://localhost" }"#).unwrap();
/// assert_eq!(config.reply_timeout(), Some(std::time::Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherConfig {
    connect_timeout_ms: Option<u64>,
    reply_timeout_ms: Option<u64>,
    origin: Option<String>,
    subprotocol: Option<String>,
}

impl DispatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound TCP connect plus websocket handshake.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(duration_to_ms(timeout));
        self
    }

    /// Bound the wait for the reply once the message is sent.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout_ms = Some(duration_to_ms(timeout));
        self
    }

    /// Send an `Origin` header during the handshake.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Send a `Sec-WebSocket-Protocol` header during the handshake.
    pub fn with_subprotocol(mut self, subprotocol: impl Into<String>) -> Self {
        self.subprotocol = Some(subprotocol.into());
        self
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_ms.map(Duration::from_millis)
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
