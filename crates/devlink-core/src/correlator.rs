// ── Command/reply correlation ──
//
// One PendingRequest per outstanding request key. Whoever removes the
// entry from the map (a matching reply, the waiter's own deadline, or a
// connection-wide cancel) owns the oneshot sender, so each request is
// resolved exactly once no matter how those sources race.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{CancelReason, CoreError};
use crate::model::{Event, RequestKey};

type Outcome<P> = Result<Arc<Event<P>>, CoreError>;

struct PendingRequest<P> {
    generation: u64,
    tx: oneshot::Sender<Outcome<P>>,
}

/// Tracks outstanding requests and matches replies to them.
pub struct Correlator<P> {
    pending: DashMap<RequestKey, PendingRequest<P>>,
    next_generation: AtomicU64,
}

impl<P: Send + Sync + 'static> Default for Correlator<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Send + Sync + 'static> Correlator<P> {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Open a PendingRequest for `key` that expires `timeout` from now.
    ///
    /// Fails fast with [`CoreError::RequestInFlight`] when the same key is
    /// already outstanding.
    pub fn begin(self: &Arc<Self>, key: RequestKey, timeout: Duration) -> Result<Ticket<P>, CoreError> {
        let (tx, rx) = oneshot::channel();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        match self.pending.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(CoreError::RequestInFlight {
                    key: key.to_string(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingRequest { generation, tx });
            }
        }

        Ok(Ticket {
            correlator: Arc::clone(self),
            key,
            generation,
            deadline: Instant::now() + timeout,
            timeout,
            rx,
        })
    }

    /// Deliver a reply. Returns `false` when nothing was waiting for `key`
    /// (unsolicited duplicate, or the request already timed out).
    pub fn resolve(&self, key: &RequestKey, event: Arc<Event<P>>) -> bool {
        let Some((_, pending)) = self.pending.remove(key) else {
            return false;
        };
        if pending.tx.send(Ok(event)).is_err() {
            debug!(%key, "reply arrived after the caller went away");
        }
        true
    }

    /// Fail one specific request, e.g. when its frame could not be written.
    pub fn fail(&self, ticket: &Ticket<P>, error: CoreError) -> bool {
        let Some((_, pending)) = self
            .pending
            .remove_if(&ticket.key, |_, p| p.generation == ticket.generation)
        else {
            return false;
        };
        let _ = pending.tx.send(Err(error));
        true
    }

    /// Resolve every outstanding request with a cancellation failure.
    /// Returns how many were cancelled.
    pub fn cancel_all(&self, reason: CancelReason) -> usize {
        let keys: Vec<RequestKey> = self.pending.iter().map(|e| e.key().clone()).collect();

        let mut cancelled = 0;
        for key in keys {
            if let Some((key, pending)) = self.pending.remove(&key) {
                let _ = pending.tx.send(Err(CoreError::RequestCancelled {
                    key: key.to_string(),
                    reason,
                }));
                cancelled += 1;
            }
        }

        if cancelled > 0 {
            debug!(cancelled, %reason, "pending requests cancelled");
        }
        cancelled
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ── Ticket ───────────────────────────────────────────────────────────

/// Caller's handle on one PendingRequest.
///
/// Dropping an unresolved ticket withdraws the request so a late reply
/// is dropped instead of leaking the slot.
pub struct Ticket<P: Send + Sync + 'static> {
    correlator: Arc<Correlator<P>>,
    key: RequestKey,
    generation: u64,
    deadline: Instant,
    timeout: Duration,
    rx: oneshot::Receiver<Outcome<P>>,
}

impl<P: Send + Sync + 'static> Ticket<P> {
    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    /// Wait for the reply, the deadline, or a cancellation, whichever
    /// resolves the request first.
    pub async fn wait(mut self) -> Result<Arc<Event<P>>, CoreError> {
        if let Ok(received) = tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            return received.unwrap_or_else(|_| Err(self.orphaned()));
        }

        let removed = self
            .correlator
            .pending
            .remove_if(&self.key, |_, p| p.generation == self.generation);

        if removed.is_some() {
            debug!(key = %self.key, "request timed out");
            return Err(CoreError::RequestTimeout {
                key: self.key.to_string(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }

        // Lost the race: a reply or cancel already owns the sender and
        // its result is on the way.
        (&mut self.rx)
            .await
            .unwrap_or_else(|_| Err(self.orphaned()))
    }

    fn orphaned(&self) -> CoreError {
        CoreError::Internal(format!("request {} dropped without a result", self.key))
    }
}

impl<P: Send + Sync + 'static> Drop for Ticket<P> {
    fn drop(&mut self) {
        self.correlator
            .pending
            .remove_if(&self.key, |_, p| p.generation == self.generation);
    }
}
