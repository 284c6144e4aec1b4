//! One-shot JSON request/response over WebSockets.
//!
//! Each dispatch opens a fresh connection, sends one JSON text frame, waits
//! for the first JSON text frame back, closes the connection and hands the
//! decoded reply to a completion handler together with a caller-supplied
//! context value.
//!
//! ```no_run
//! use serde_json::{Value, json};
//!
//! ws_dispatch::dispatch(
//!     "ws://localhost:9001/echo",
//!     &json!({ "op": "ping" }),
//!     |reply: Value, origin: &'static str| println!("{origin}: {reply}"),
//!     "toolbar-button",
//! );
//! ```

mod config;
mod dispatcher;
mod error;
mod event_loop;
mod socket;

pub use config::DispatcherConfig;
pub use dispatcher::{Dispatcher, DispatcherBuilder, dispatch};
pub use error::{DispatchError, TimeoutPhase};
