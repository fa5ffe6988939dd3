//! Notification dispatch — bounded, lossy fan-out to registered handlers.
//!
//! `RequestSender::send` never waits: when the queue is full the request is
//! dropped and logged. The dispatch loop hands every dequeued request to all
//! handlers at once; handler failures are logged and go nowhere else.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use tripbell_core::error::Result;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// An outbound notification for one user about one trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub user_id: String,
    pub trip_id: String,
    pub message: String,
}

/// A delivery sink for requests (chat message, webhook, log line...).
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str {
        "handler"
    }

    async fn handle(&self, request: &Request) -> Result<()>;
}

/// Adapter turning an async closure into a [`RequestHandler`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

/// Wrap `f` as a named handler.
pub fn handler_fn<F, Fut>(name: &str, f: F) -> FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    FnHandler {
        name: name.to_string(),
        f,
    }
}

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, request: &Request) -> Result<()> {
        (self.f)(request.clone()).await
    }
}

/// Cloneable, non-blocking entry point into the dispatch queue.
#[derive(Clone)]
pub struct RequestSender {
    tx: mpsc::Sender<Request>,
    dropped: Arc<AtomicU64>,
}

impl RequestSender {
    /// Enqueue without waiting. Returns `false` if the request was dropped.
    pub fn send(&self, request: Request) -> bool {
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(request)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    user = %request.user_id,
                    trip = %request.trip_id,
                    "📭 Request queue full, dropping request"
                );
                false
            }
            Err(TrySendError::Closed(request)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    user = %request.user_id,
                    trip = %request.trip_id,
                    "📭 Dispatcher stopped, dropping request"
                );
                false
            }
        }
    }

    /// Requests dropped so far (full or closed queue).
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Owns the queue receiver and the handler list until [`Dispatcher::run`].
pub struct Dispatcher {
    sender: RequestSender,
    rx: mpsc::Receiver<Request>,
    handlers: Vec<Arc<dyn RequestHandler>>,
}

impl Dispatcher {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            sender: RequestSender {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
            handlers: Vec::new(),
        }
    }

    /// Register a handler. Only possible before the loop starts.
    pub fn add_handler<H: RequestHandler + 'static>(&mut self, handler: H) {
        tracing::debug!("📮 Handler registered: {}", handler.name());
        self.handlers.push(Arc::new(handler));
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn sender(&self) -> RequestSender {
        self.sender.clone()
    }

    /// Drain the queue until `cancel` fires. Handler invocations are spawned
    /// on `tracker` and are not awaited by the loop.
    pub async fn run(self, cancel: CancellationToken, tracker: TaskTracker) {
        let Self { mut rx, handlers, .. } = self;
        tracing::info!("📬 Dispatcher started ({} handlers)", handlers.len());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(request) => fan_out(&handlers, request, &tracker),
                    None => break,
                },
            }
        }

        tracing::info!("📬 Dispatcher stopped");
    }
}

fn fan_out(handlers: &[Arc<dyn RequestHandler>], request: Request, tracker: &TaskTracker) {
    tracing::debug!(
        user = %request.user_id,
        trip = %request.trip_id,
        "📨 Dispatching to {} handlers",
        handlers.len()
    );
    for handler in handlers {
        let handler = Arc::clone(handler);
        let request = request.clone();
        tracker.spawn(async move {
            if let Err(e) = handler.handle(&request).await {
                tracing::warn!(
                    user = %request.user_id,
                    trip = %request.trip_id,
                    "⚠️ Handler '{}' failed: {e}",
                    handler.name()
                );
            }
        });
    }
}
