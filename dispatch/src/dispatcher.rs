//! Request Dispatcher
//!
//! Public entry points. Every call opens its own websocket, sends one JSON
//! frame, reads one JSON frame back and closes the connection. The exchange
//! runs on the dispatcher's event loop thread, which is also where the
//! completion handler is invoked.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use futures_util::future::LocalBoxFuture;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::event_loop::{EventLoop, EventLoopClient, LoopTask};
use crate::socket::Exchange;

const DEFAULT_THREAD_NAME: &str = "ws-dispatch";

/// Process-wide dispatcher used by [`dispatch`].
static DEFAULT_DISPATCHER: Lazy<Dispatcher> = Lazy::new(|| {
    DispatcherBuilder::new()
        .build()
        .expect("Failed to start default dispatcher thread")
});

/// Receives the outcome of one exchange, exactly once.
type Settle<R> = Box<dyn FnOnce(Result<R, DispatchError>) + Send>;

pub struct DispatcherBuilder {
    config: DispatcherConfig,
    thread_name: String,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self {
            config: DispatcherConfig::default(),
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Name of the event loop thread (visible in panics and debuggers).
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Start the event loop thread.
    pub fn build(self) -> std::io::Result<Dispatcher> {
        let event_loop = EventLoop::start(self.thread_name)?;
        let client = event_loop.client();

        Ok(Dispatcher {
            inner: Arc::new(Inner {
                config: Arc::new(self.config),
                client,
                next_id: AtomicU32::new(1),
                _event_loop: event_loop,
            }),
        })
    }
}

struct Inner {
    config: Arc<DispatcherConfig>,
    client: EventLoopClient,
    next_id: AtomicU32,
    _event_loop: EventLoop,
}

/// Handle to a running event loop. Clones share the loop; it stops when the
/// last clone is dropped or [`Dispatcher::shutdown`] is called.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Start a dispatcher with default configuration.
    pub fn new() -> std::io::Result<Self> {
        DispatcherBuilder::new().build()
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// The shared dispatcher behind the free [`dispatch`] function.
    pub fn global() -> &'static Dispatcher {
        &DEFAULT_DISPATCHER
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Send `message` to `address`, then call `on_complete(reply, context)`
    /// once the reply arrives.
    ///
    /// Returns immediately. If anything goes wrong (bad address, refused
    /// connection, undecodable reply, peer closing first) the failure is
    /// logged and `on_complete` is never called; the caller gets no signal.
    /// A peer that never answers keeps the exchange open until a configured
    /// reply timeout fires or the dispatcher shuts down.
    pub fn dispatch<M, R, C, F>(&self, address: &str, message: &M, on_complete: F, context: C)
    where
        M: Serialize + ?Sized,
        R: DeserializeOwned + 'static,
        C: Send + 'static,
        F: FnOnce(R, C) + Send + 'static,
    {
        self.submit(
            address,
            message,
            Box::new(move |result: Result<R, DispatchError>| {
                if let Ok(reply) = result {
                    on_complete(reply, context);
                }
            }),
        );
    }

    /// Like [`dispatch`](Self::dispatch), but failures are reported through
    /// `on_error(error, context)`. Exactly one of the two handlers runs,
    /// unless the dispatcher shuts down while the exchange is in flight.
    ///
    /// If the event loop has already stopped, `on_error` runs on the calling
    /// thread with [`DispatchError::Shutdown`].
    pub fn dispatch_or_else<M, R, C, F, E>(
        &self,
        address: &str,
        message: &M,
        on_complete: F,
        on_error: E,
        context: C,
    ) where
        M: Serialize + ?Sized,
        R: DeserializeOwned + 'static,
        C: Send + 'static,
        F: FnOnce(R, C) + Send + 'static,
        E: FnOnce(DispatchError, C) + Send + 'static,
    {
        self.submit(
            address,
            message,
            Box::new(move |result: Result<R, DispatchError>| match result {
                Ok(reply) => on_complete(reply, context),
                Err(e) => on_error(e, context),
            }),
        );
    }

    /// Future-returning form. The exchange starts right away, whether or not
    /// the future is polled; dropping the future does not cancel it.
    pub fn request<M, R>(
        &self,
        address: &str,
        message: &M,
    ) -> impl Future<Output = Result<R, DispatchError>> + Send + use<M, R>
    where
        M: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<R, DispatchError>>();
        self.submit(
            address,
            message,
            Box::new(move |result: Result<R, DispatchError>| {
                let _ = tx.send(result);
            }),
        );

        async move { rx.await.unwrap_or(Err(DispatchError::Shutdown)) }
    }

    /// Stop the event loop. Exchanges in flight are dropped without calling
    /// their handlers; later calls fail with [`DispatchError::Shutdown`].
    pub fn shutdown(&self) {
        self.inner.client.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.inner.client.is_running()
    }

    fn submit<M, R>(&self, address: &str, message: &M, settle: Settle<R>)
    where
        M: Serialize + ?Sized,
        R: DeserializeOwned + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let job = ExchangeJob {
            id,
            address: address.to_string(),
            payload: serde_json::to_string(message).map_err(DispatchError::Serialize),
            config: self.inner.config.clone(),
            settle,
        };

        if let Err(job) = self.inner.client.spawn(Box::new(job)) {
            log::error!("[Exchange {}] Event loop is not running, dropping request", id);
            job.abandon(DispatchError::Shutdown);
        }
    }
}

/// Send `message` to `address` on the process-wide dispatcher and call
/// `on_complete(reply, context)` when the reply arrives.
///
/// See [`Dispatcher::dispatch`] for the failure contract.
pub fn dispatch<M, R, C, F>(address: &str, message: &M, on_complete: F, context: C)
where
    M: Serialize + ?Sized,
    R: DeserializeOwned + 'static,
    C: Send + 'static,
    F: FnOnce(R, C) + Send + 'static,
{
    Dispatcher::global().dispatch(address, message, on_complete, context);
}

struct ExchangeJob<R> {
    id: u32,
    address: String,
    payload: Result<String, DispatchError>,
    config: Arc<DispatcherConfig>,
    settle: Settle<R>,
}

impl<R: DeserializeOwned + 'static> LoopTask for ExchangeJob<R> {
    fn run(self: Box<Self>) -> LocalBoxFuture<'static, ()> {
        Box::pin(async move {
            let ExchangeJob {
                id,
                address,
                payload,
                config,
                settle,
            } = *self;

            let result = match payload {
                Ok(payload) => Exchange::new(id).run::<R>(&address, payload, &config).await,
                Err(e) => {
                    log::warn!("[Exchange {}] Failed: {}", id, e);
                    Err(e)
                }
            };
            settle(result);
        })
    }

    fn abandon(self: Box<Self>, reason: DispatchError) {
        (self.settle)(Err(reason));
    }
}
