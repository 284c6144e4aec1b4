//! Single-threaded event loop hosting the exchanges.

mod client;
mod engine;

pub use client::EventLoopClient;
pub use engine::{EventLoop, LoopTask};
