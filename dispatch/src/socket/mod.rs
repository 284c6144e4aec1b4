//! WebSocket transport
//!
//! Opens a tokio-tungstenite connection per exchange and drives it through
//! connect, send, receive-one and close.

mod connect;
mod exchange;

pub(crate) use exchange::Exchange;
