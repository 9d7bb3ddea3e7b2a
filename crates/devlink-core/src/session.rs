// ── Session manager ──
//
// Full lifecycle management for one device connection: open and
// authenticate the link, run the receive loop, write outbound commands,
// detect loss, and reconnect with exponential backoff. A single
// supervisor task owns the link; reconnection is a loop in that task,
// never a callback calling `connect` again.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, trace, warn};

use devlink_api::{FrameSink, FrameStream, Link, Transport};

use crate::backoff::Backoff;
use crate::codec::Codec;
use crate::config::SessionConfig;
use crate::correlator::Correlator;
use crate::dispatch::Dispatcher;
use crate::error::{CancelReason, CoreError, ErrorClass};
use crate::model::{EntityKey, Event};
use crate::registry::{EntityListener, Registry};
use crate::status::{ConnectionState, OfflineReason, Status, StatusDetail, StatusListener};

const COMMAND_CHANNEL_SIZE: usize = 64;
const EVENT_CHANNEL_SIZE: usize = 256;
const CLOSE_GRACE: Duration = Duration::from_secs(1);

type Payload<C> = <C as Codec>::Payload;

/// One frame queued for the writer task, with its write acknowledgement.
struct Outbound {
    frame: Bytes,
    written: oneshot::Sender<Result<(), CoreError>>,
}

struct Supervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

enum LinkEnd {
    Cancelled,
    Lost(CoreError),
}

/// How a live link ended, with the delay before the next attempt.
enum Outcome {
    Cancelled,
    Lost { error: CoreError, retry_in: Duration },
}

// ── Session ──────────────────────────────────────────────────────────

/// The main entry point for hosts.
///
/// Cheaply cloneable via `Arc<SessionInner>`. Owns the transport, the
/// listener registry and the request correlator for one device.
pub struct Session<C: Codec> {
    inner: Arc<SessionInner<C>>,
}

impl<C: Codec> Clone for Session<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct SessionInner<C: Codec> {
    config: SessionConfig,
    codec: Arc<C>,
    transport: Arc<dyn Transport>,
    registry: Arc<Registry<Payload<C>>>,
    correlator: Arc<Correlator<Payload<C>>>,
    event_tx: broadcast::Sender<Arc<Event<Payload<C>>>>,
    connection_state: watch::Sender<ConnectionState>,
    status: watch::Sender<Status>,
    status_listener: std::sync::Mutex<Option<Arc<dyn StatusListener>>>,
    outbound: Mutex<Option<mpsc::Sender<Outbound>>>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl<C: Codec> Session<C> {
    /// Create a session whose transport is built from `config.endpoint`.
    /// Does NOT connect -- call [`connect()`](Self::connect).
    pub fn new(config: SessionConfig, codec: C) -> Self {
        let transport: Arc<dyn Transport> = Arc::from(config.build_transport());
        Self::with_transport(config, codec, transport)
    }

    /// Create a session over an explicit transport (in-memory links,
    /// custom wires).
    pub fn with_transport(config: SessionConfig, codec: C, transport: Arc<dyn Transport>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (status, _) = watch::channel(Status::Offline(OfflineReason::stopped()));

        Self {
            inner: Arc::new(SessionInner {
                config,
                codec: Arc::new(codec),
                transport,
                registry: Arc::new(Registry::new()),
                correlator: Arc::new(Correlator::new()),
                event_tx,
                connection_state,
                status,
                status_listener: std::sync::Mutex::new(None),
                outbound: Mutex::new(None),
                supervisor: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<Registry<Payload<C>>> {
        &self.inner.registry
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Validate the configuration, start the supervisor and wait for the
    /// outcome of the first connection attempt.
    ///
    /// A failed first attempt is returned to the caller, but the
    /// supervisor keeps retrying with backoff until
    /// [`disconnect()`](Self::disconnect).
    pub async fn connect(&self) -> Result<(), CoreError> {
        if let Err(e) = self.inner.config.validate() {
            warn!(session = %self.inner.config.name, error = %e, "configuration incomplete");
            self.publish_status(Status::Offline(OfflineReason::new(
                StatusDetail::ConfigurationError,
                e.to_string(),
            )));
            return Err(e);
        }

        let (first_tx, first_rx) = oneshot::channel();
        {
            let mut slot = self.inner.supervisor.lock().await;
            if slot.as_ref().is_some_and(|s| !s.handle.is_finished()) {
                return Err(CoreError::AlreadyConnected);
            }

            let cancel = CancellationToken::new();
            let span = info_span!("session", name = %self.inner.config.name);
            let handle = tokio::spawn(
                supervise(self.clone(), cancel.clone(), first_tx).instrument(span),
            );
            *slot = Some(Supervisor { cancel, handle });
        }

        first_rx.await.unwrap_or(Err(CoreError::NotConnected))
    }

    /// Stop the session.
    ///
    /// Cancels any scheduled reconnect, closes the link, and fails every
    /// pending request with a cancellation. No connection attempt is made
    /// after this returns.
    pub async fn disconnect(&self) {
        let supervisor = self.inner.supervisor.lock().await.take();
        if let Some(supervisor) = supervisor {
            supervisor.cancel.cancel();
            if let Err(e) = supervisor.handle.await {
                warn!(error = %e, "supervisor task failed");
            }
        }

        *self.inner.outbound.lock().await = None;
        let cancelled = self.inner.correlator.cancel_all(CancelReason::Disconnected);

        self.set_state(ConnectionState::Disconnected);
        self.publish_status(Status::Offline(OfflineReason::stopped()));
        info!(session = %self.inner.config.name, cancelled, "disconnected");
    }

    pub fn is_online(&self) -> bool {
        *self.inner.connection_state.borrow() == ConnectionState::Online
    }

    /// Wait until the session is online, or fail after `timeout`.
    pub async fn wait_online(&self, timeout: Duration) -> Result<(), CoreError> {
        let mut rx = self.inner.connection_state.subscribe();
        let online = async move {
            rx.wait_for(|state| *state == ConnectionState::Online)
                .await
                .map(|_| ())
        };

        match tokio::time::timeout(timeout, online).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(CoreError::NotConnected),
            Err(_) => Err(self.not_online_error(timeout)),
        }
    }

    fn not_online_error(&self, waited: Duration) -> CoreError {
        let status = self.inner.status.borrow().clone();
        match status {
            Status::Offline(reason) if reason.detail == StatusDetail::ConfigurationError => {
                CoreError::AuthenticationFailed {
                    message: reason.message,
                }
            }
            Status::Offline(reason) if reason.detail == StatusDetail::CommunicationError => {
                CoreError::ConnectionFailed {
                    target: self.inner.transport.describe(),
                    reason: reason.message,
                }
            }
            _ => CoreError::ConnectionFailed {
                target: self.inner.transport.describe(),
                reason: format!("not online after {}s", waited.as_secs()),
            },
        }
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Send a command and wait for its correlated reply.
    ///
    /// Fails with `RequestInFlight` if a request with the same key is
    /// outstanding, `RequestTimeout` after `request_timeout`, and
    /// `RequestCancelled` if the link drops first.
    pub async fn request(&self, command: &C::Command) -> Result<Arc<Event<Payload<C>>>, CoreError> {
        let key = self
            .inner
            .codec
            .request_key(command)
            .ok_or(CoreError::Uncorrelated)?;
        let frame = self.inner.codec.encode(command)?;

        if !self.is_online() {
            return Err(CoreError::NotConnected);
        }

        let ticket = self
            .inner
            .correlator
            .begin(key, self.inner.config.request_timeout)?;
        debug!(key = %ticket.key(), "request submitted");

        // The failure goes through the correlator so a reply or cancel
        // racing the write still resolves the request exactly once.
        if let Err(e) = self.write(frame).await {
            self.inner.correlator.fail(&ticket, e);
        }
        ticket.wait().await
    }

    /// Fire-and-forget: returns once the frame has been written.
    pub async fn send(&self, command: &C::Command) -> Result<(), CoreError> {
        let frame = self.inner.codec.encode(command)?;
        if !self.is_online() {
            return Err(CoreError::NotConnected);
        }
        self.write(frame).await
    }

    async fn write(&self, frame: Bytes) -> Result<(), CoreError> {
        let tx = self
            .inner
            .outbound
            .lock()
            .await
            .clone()
            .ok_or(CoreError::NotConnected)?;

        let (written_tx, written_rx) = oneshot::channel();
        tx.send(Outbound {
            frame,
            written: written_tx,
        })
        .await
        .map_err(|_| CoreError::NotConnected)?;

        written_rx.await.map_err(|_| CoreError::NotConnected)?
    }

    // ── Entity listeners ─────────────────────────────────────────

    /// Attach a listener for `key`; returns the one it replaced.
    pub fn register(
        &self,
        key: EntityKey,
        listener: impl EntityListener<Payload<C>> + 'static,
    ) -> Option<Arc<dyn EntityListener<Payload<C>>>> {
        self.inner.registry.register(key, Arc::new(listener))
    }

    pub fn unregister(&self, key: &EntityKey) -> Option<Arc<dyn EntityListener<Payload<C>>>> {
        self.inner.registry.unregister(key)
    }

    /// Install the host's online/offline hook.
    pub fn set_status_listener(&self, listener: Arc<dyn StatusListener>) {
        *self
            .inner
            .status_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Subscribe to online/offline status changes.
    pub fn status(&self) -> watch::Receiver<Status> {
        self.inner.status.subscribe()
    }

    /// Every event delivered to entity listeners, for observers.
    pub fn events(&self) -> broadcast::Receiver<Arc<Event<Payload<C>>>> {
        self.inner.event_tx.subscribe()
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending_len()
    }

    // ── Internals ────────────────────────────────────────────────

    fn set_state(&self, state: ConnectionState) {
        debug!(%state, "connection state");
        self.inner.connection_state.send_replace(state);
    }

    fn publish_status(&self, status: Status) {
        let changed = self.inner.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status.clone();
            true
        });
        if !changed {
            return;
        }

        let listener = self
            .inner
            .status_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            match &status {
                Status::Online => listener.on_online(),
                Status::Offline(reason) => listener.on_offline(reason),
            }
        }
    }

    /// Open the transport and run the codec handshake.
    async fn establish(&self) -> Result<Link, CoreError> {
        self.set_state(ConnectionState::Connecting);
        info!(peer = %self.inner.transport.describe(), "connecting");
        let mut link = self.inner.transport.open().await.inspect_err(|e| {
            debug!(error = %e, transient = e.is_transient(), "open failed");
        })?;

        self.set_state(ConnectionState::Authenticating);
        self.inner
            .codec
            .handshake(&mut link, &self.inner.config.credentials)
            .await?;
        Ok(link)
    }

    /// Record one more failure and move to `Reconnecting`.
    fn schedule_retry(&self, backoff: &mut Backoff) -> Duration {
        let delay = backoff.sleep_duration();
        backoff.record_failure();
        self.set_state(ConnectionState::Reconnecting {
            attempt: backoff.failures(),
            delay,
        });
        delay
    }

    /// Drive one live link until it drops or the session is cancelled.
    async fn run_link(
        &self,
        link: Link,
        cancel: &CancellationToken,
        first: &mut Option<oneshot::Sender<Result<(), CoreError>>>,
        backoff: &mut Backoff,
    ) -> Outcome {
        let peer = link.peer().to_owned();
        let (sink, stream) = link.into_parts();
        let link_cancel = cancel.child_token();

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&self.inner.registry),
            Arc::clone(&self.inner.correlator),
            self.inner.event_tx.clone(),
        ));
        let (out_tx, out_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        *self.inner.outbound.lock().await = Some(out_tx.clone());

        let mut reader = tokio::spawn(
            receive_loop(
                stream,
                Arc::clone(&self.inner.codec),
                Arc::clone(&dispatcher),
                peer.clone(),
                link_cancel.clone(),
            )
            .in_current_span(),
        );
        let mut writer = tokio::spawn(
            write_loop(sink, out_rx, peer.clone(), link_cancel.clone()).in_current_span(),
        );
        let poller = self.inner.config.poll_interval.map(|period| {
            tokio::spawn(
                poll_loop(Arc::clone(&self.inner.codec), out_tx, period, link_cancel.clone())
                    .in_current_span(),
            )
        });

        self.set_state(ConnectionState::Online);
        self.publish_status(Status::Online);
        info!(%peer, "online");
        if let Some(tx) = first.take() {
            let _ = tx.send(Ok(()));
        }

        let end = tokio::select! {
            biased;
            () = cancel.cancelled() => LinkEnd::Cancelled,
            end = &mut reader => task_end(end),
            end = &mut writer => task_end(end),
        };

        // Leave `Online` before teardown so callers stop submitting.
        let outcome = match end {
            LinkEnd::Cancelled => Outcome::Cancelled,
            LinkEnd::Lost(error) => Outcome::Lost {
                retry_in: self.schedule_retry(backoff),
                error,
            },
        };

        link_cancel.cancel();
        *self.inner.outbound.lock().await = None;
        reader.abort();
        if let Some(poller) = poller {
            poller.abort();
        }
        if !writer.is_finished() && tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
            writer.abort();
        }

        let counts = dispatcher.counts();
        info!(
            %peer,
            delivered = counts.delivered,
            unrouted = counts.unrouted,
            replies_matched = counts.replies_matched,
            replies_dropped = counts.replies_dropped,
            "link closed"
        );
        outcome
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Connect, run, back off, repeat -- until cancelled.
async fn supervise<C: Codec>(
    session: Session<C>,
    cancel: CancellationToken,
    first: oneshot::Sender<Result<(), CoreError>>,
) {
    let mut first = Some(first);
    let mut backoff = Backoff::new(session.inner.config.backoff);

    loop {
        let attempt = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = session.establish() => result,
        };

        let delay = match attempt {
            Ok(link) => {
                backoff.reset();
                match session.run_link(link, &cancel, &mut first, &mut backoff).await {
                    Outcome::Cancelled => break,
                    Outcome::Lost { error, retry_in } => {
                        warn!(%error, "connection lost");
                        session.publish_status(offline_status(&error));
                        session
                            .inner
                            .correlator
                            .cancel_all(CancelReason::ConnectionLost);
                        retry_in
                    }
                }
            }
            Err(e) => {
                let delay = session.schedule_retry(&mut backoff);
                warn!(error = %e, class = %e.class(), "connection attempt failed");
                session.publish_status(offline_status(&e));
                if let Some(tx) = first.take() {
                    let _ = tx.send(Err(e));
                }
                delay
            }
        };
        info!(delay_secs = delay.as_secs_f64(), attempt = backoff.failures(), "reconnect scheduled");

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    debug!("supervisor stopped");
}

/// Read, decode and dispatch frames in wire order until the link ends.
async fn receive_loop<C: Codec>(
    mut stream: FrameStream,
    codec: Arc<C>,
    dispatcher: Arc<Dispatcher<Payload<C>>>,
    peer: String,
    cancel: CancellationToken,
) -> LinkEnd {
    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return LinkEnd::Cancelled,
            frame = stream.next() => frame,
        };

        match frame {
            None => {
                return LinkEnd::Lost(CoreError::ConnectionFailed {
                    target: peer,
                    reason: "peer closed the connection".into(),
                });
            }
            Some(Err(e)) => return LinkEnd::Lost(link_error(&peer, e)),
            Some(Ok(bytes)) => {
                trace!(bytes = bytes.len(), "frame received");
                match codec.decode(&bytes) {
                    Ok(events) => {
                        for event in events {
                            dispatcher.dispatch(event);
                        }
                    }
                    Err(e) => warn!(error = %e, "undecodable frame dropped"),
                }
            }
        }
    }
}

/// Own the sink and write queued frames one at a time.
async fn write_loop(
    mut sink: FrameSink,
    mut rx: mpsc::Receiver<Outbound>,
    peer: String,
    cancel: CancellationToken,
) -> LinkEnd {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
                return LinkEnd::Cancelled;
            }
            next = rx.recv() => next,
        };
        let Some(outbound) = next else {
            return LinkEnd::Lost(CoreError::ConnectionFailed {
                target: peer,
                reason: "command channel closed".into(),
            });
        };

        match sink.send(outbound.frame).await {
            Ok(()) => {
                trace!("frame written");
                let _ = outbound.written.send(Ok(()));
            }
            Err(e) => {
                let error = link_error(&peer, e);
                let _ = outbound.written.send(Err(same_failure(&error)));
                return LinkEnd::Lost(error);
            }
        }
    }
}

/// Queue the codec's refresh commands every `period`. The first tick
/// fires immediately so a fresh link starts with a full refresh.
async fn poll_loop<C: Codec>(
    codec: Arc<C>,
    out: mpsc::Sender<Outbound>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                for command in codec.poll_commands() {
                    let frame = match codec.encode(&command) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(error = %e, "poll command could not be encoded");
                            continue;
                        }
                    };
                    let (written, _) = oneshot::channel();
                    if out.send(Outbound { frame, written }).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

fn task_end(result: Result<LinkEnd, JoinError>) -> LinkEnd {
    result.unwrap_or_else(|e| LinkEnd::Lost(CoreError::Internal(format!("link task failed: {e}"))))
}

/// Wire error as a `CoreError`, naming the peer when the wire didn't.
fn link_error(peer: &str, err: devlink_api::Error) -> CoreError {
    match CoreError::from(err) {
        CoreError::ConnectionFailed { target, reason } if target.is_empty() => {
            CoreError::ConnectionFailed {
                target: peer.to_owned(),
                reason,
            }
        }
        other => other,
    }
}

/// A second copy of a link failure, for the caller whose write hit it.
fn same_failure(err: &CoreError) -> CoreError {
    match err {
        CoreError::AuthenticationFailed { message } => CoreError::AuthenticationFailed {
            message: message.clone(),
        },
        CoreError::ConnectionFailed { target, reason } => CoreError::ConnectionFailed {
            target: target.clone(),
            reason: reason.clone(),
        },
        other => CoreError::Internal(other.to_string()),
    }
}

/// Offline status for a failure: auth and config problems are
/// `ConfigurationError`, everything else `CommunicationError`.
fn offline_status(err: &CoreError) -> Status {
    let detail = if err.class() == ErrorClass::Configuration {
        StatusDetail::ConfigurationError
    } else {
        StatusDetail::CommunicationError
    };
    Status::Offline(OfflineReason::new(detail, err.to_string()))
}
