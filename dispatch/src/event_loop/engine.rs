//! Event loop
//!
//! Runs a single-threaded tokio runtime on a dedicated worker thread.
//! Exchanges are spawned onto its `LocalSet`, so every completion handler
//! runs on that one thread.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};

use futures_util::future::LocalBoxFuture;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::LocalSet;

use super::client::EventLoopClient;
use crate::error::DispatchError;

/// Unit of work posted to the loop.
pub trait LoopTask: Send + 'static {
    /// Start the task on the loop thread.
    fn run(self: Box<Self>) -> LocalBoxFuture<'static, ()>;

    /// Called instead of `run` when the loop can no longer accept work.
    fn abandon(self: Box<Self>, reason: DispatchError);
}

/// Commands that can be sent to the event loop thread.
pub enum LoopCommand {
    Spawn { task: Box<dyn LoopTask> },
    Shutdown,
}

/// Event loop with dedicated worker thread. Dropping it stops the loop.
pub struct EventLoop {
    client: EventLoopClient,
    _handle: JoinHandle<()>,
}

impl EventLoop {
    /// Start a new loop on a thread named `thread_name`.
    pub fn start(thread_name: impl Into<String>) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let client = EventLoopClient::new(sender);

        let handle = thread::Builder::new()
            .name(thread_name.into())
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| run_loop(receiver)));
                if let Err(e) = result {
                    log::error!("Event loop panicked: {:?}", e);
                }
            })?;

        Ok(Self {
            client,
            _handle: handle,
        })
    }

    /// Get a client handle for posting work to the loop.
    pub fn client(&self) -> EventLoopClient {
        self.client.clone()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.client.shutdown();
    }
}

/// Main loop for the worker thread.
fn run_loop(mut receiver: UnboundedReceiver<LoopCommand>) {
    log::info!("Event loop thread started");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to build event loop runtime: {}", e);
            return;
        }
    };
    let local = LocalSet::new();

    local.block_on(&runtime, async {
        while let Some(command) = receiver.recv().await {
            match command {
                LoopCommand::Spawn { task } => spawn_task(task),
                LoopCommand::Shutdown => {
                    log::info!("Event loop shutting down");
                    break;
                }
            }
        }
    });

    // Work queued behind the shutdown never starts.
    receiver.close();
    while let Ok(command) = receiver.try_recv() {
        if let LoopCommand::Spawn { task } = command {
            task.abandon(DispatchError::Shutdown);
        }
    }

    // In-flight tasks are dropped together with the LocalSet.
    drop(local);
    log::info!("Event loop thread stopped");
}

fn spawn_task(task: Box<dyn LoopTask>) {
    let handle = tokio::task::spawn_local(task.run());
    tokio::task::spawn_local(async move {
        if let Err(e) = handle.await {
            if e.is_panic() {
                log::error!("Task panicked on the event loop: {}", e);
            }
        }
    });
}
