//! Failure classes of a single exchange.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Stage of an exchange bounded by a configured timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// TCP connect plus websocket handshake.
    Connect,
    /// Waiting for the reply after the message was sent.
    Reply,
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Reply => "reply",
        })
    }
}

/// Everything that can stop an exchange before the completion handler runs.
///
/// [`Dispatcher::dispatch`](crate::Dispatcher::dispatch) only logs these;
/// `dispatch_or_else` and `request` hand them to the caller.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("unsupported scheme {scheme:?} (expected ws or wss)")]
    UnsupportedScheme { scheme: String },

    #[error("{address:?} needs TLS; build with the native-tls or rustls-tls-native-roots feature")]
    TlsNotEnabled { address: String },

    #[error("invalid {header} header value {value:?}")]
    InvalidHeader { header: &'static str, value: String },

    #[error("failed to serialize message: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("TCP connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("handshake failed: {0}")]
    Handshake(#[source] tungstenite::Error),

    #[error("send failed: {0}")]
    Send(#[source] tungstenite::Error),

    #[error("read failed: {0}")]
    Receive(#[source] tungstenite::Error),

    #[error("connection closed before a reply arrived")]
    ClosedBeforeReply,

    #[error("reply is not valid JSON: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("{phase} timed out after {after:?}")]
    Timeout {
        phase: TimeoutPhase,
        after: Duration,
    },

    #[error("dispatcher event loop is not running")]
    Shutdown,
}

impl DispatchError {
    /// True when the exchange never reached the peer.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress { .. }
                | Self::UnsupportedScheme { .. }
                | Self::TlsNotEnabled { .. }
                | Self::InvalidHeader { .. }
                | Self::Connect { .. }
                | Self::Handshake(_)
                | Self::Timeout {
                    phase: TimeoutPhase::Connect,
                    ..
                }
        )
    }
}
