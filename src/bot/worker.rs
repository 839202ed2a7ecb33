//! Per-user serialized dispatch.

use super::event::Inbound;
use super::router::Router;
use crate::models::UserId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// How long a worker waits for its user's next event before exiting.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

type Queues = Arc<Mutex<HashMap<UserId, mpsc::UnboundedSender<Inbound>>>>;

/// Runs events concurrently across users and strictly in order per user.
///
/// Each user with pending events has one worker task draining a private
/// queue. Workers exit after an idle period and are respawned on demand.
pub struct WorkerPool {
    router: Arc<Router>,
    queues: Queues,
    idle_timeout: Duration,
}

impl WorkerPool {
    /// Creates a pool dispatching to `router`.
    #[must_use]
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            queues: Arc::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Overrides the idle timeout.
    #[must_use]
    pub const fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Queues `event` behind any earlier events from the same user.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, event: Inbound) {
        let user = event.sender().id;
        let mut queues = lock(&self.queues);

        let event = match queues.get(&user) {
            Some(tx) => match tx.send(event) {
                Ok(()) => return,
                // The worker died; fall through and start a fresh one.
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(event).is_err() {
            return;
        }
        queues.insert(user, tx);
        metrics::gauge!("bot_active_workers").set(queues.len() as f64);
        drop(queues);

        tokio::spawn(run_worker(
            user,
            rx,
            Arc::clone(&self.router),
            Arc::clone(&self.queues),
            self.idle_timeout,
        ));
    }

    /// Number of users with a live worker.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        lock(&self.queues).len()
    }
}

async fn run_worker(
    user: UserId,
    mut rx: mpsc::UnboundedReceiver<Inbound>,
    router: Arc<Router>,
    queues: Queues,
    idle_timeout: Duration,
) {
    loop {
        let event = match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => {
                // Retire only if nothing slipped in; dispatch sends under the same lock.
                let next = {
                    let mut map = lock(&queues);
                    let next = rx.try_recv().ok();
                    if next.is_none() {
                        map.remove(&user);
                        metrics::gauge!("bot_active_workers").set(map.len() as f64);
                    }
                    next
                };
                match next {
                    Some(event) => event,
                    None => break,
                }
            },
        };

        let handler = Arc::clone(&router);
        let handled = tokio::spawn(async move { handler.handle(event).await }).await;
        if let Err(e) = handled {
            tracing::error!(user.id = %user, error = %e, "Event handler panicked");
            metrics::counter!("bot_handler_panics_total").increment(1);
            router.apologize(user).await;
        }
    }
    tracing::debug!(user.id = %user, "Worker retired");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
