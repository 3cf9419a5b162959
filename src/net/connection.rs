//! Open session accounting.
//!
//! Every client connection holds a [`SessionGuard`] while it is served.
//! Shutdown waits on [`OpenSessions::drained`] for the count to reach zero.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::observability::metrics;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id attached to a connection's tracing span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Counter {
    open: AtomicUsize,
    drained: Notify,
}

/// Count of client connections being served.
#[derive(Debug, Clone, Default)]
pub struct OpenSessions {
    inner: Arc<Counter>,
}

impl OpenSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) -> SessionGuard {
        let open = self.inner.open.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::set_active_connections(open);
        SessionGuard {
            counter: Arc::clone(&self.inner),
            id: SessionId::next(),
        }
    }

    pub fn count(&self) -> usize {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for every guard to drop. Returns whether the
    /// count reached zero in time.
    pub async fn drained(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                // Register before checking so a drop in between still wakes us.
                let notified = self.inner.drained.notified();
                if self.count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

/// Marks one connection as open until dropped.
#[derive(Debug)]
pub struct SessionGuard {
    counter: Arc<Counter>,
    id: SessionId,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let left = self.counter.open.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics::set_active_connections(left);
        if left == 0 {
            self.counter.drained.notify_waiters();
        }
    }
}
