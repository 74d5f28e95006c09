//! # Reconnecting Stream Client
//!
//! Owns the single logical connection to the upstream push source and keeps
//! it alive across drops.
//!
//! ## Lifecycle
//! - `connect()` tears down any live session, waits for the socket to settle,
//!   then opens a new one through the injected [`Connector`]. A second call while
//!   an attempt is in flight is a no-op.
//! - `disconnect()` and `terminate()` abandon an in-flight attempt: the settle
//!   wait and the handshake race the attempt's cancellation token.
//! - An unexpected drop (remote close, read error, liveness timeout) schedules a
//!   reconnect after the policy's disconnect delay.
//! - A failed attempt schedules a reconnect with exponential backoff; a
//!   successful one resets the backoff.
//! - At most one reconnect timer is pending; scheduling a new one cancels the old.
//! - `terminate()` is final: timers are cancelled, the session is closed and the
//!   event channel is dropped so consumers drain and stop.
//!
//! Inbound events are published on a channel owned by the client; the transport
//! behind it is rebuilt on every connect, the channel is not.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::configs::ReconnectPolicy;
use crate::error::{RelayError, TransportError};

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Terminated,
}

/// Opens sessions to the upstream source.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn Session>, TransportError>;
}

/// One live upstream session.
#[async_trait]
pub trait Session: Send + 'static {
    /// Next relayed event payload. `None` means the remote closed the stream.
    async fn next_event(&mut self) -> Option<Result<Value, TransportError>>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read-only view for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ClientDiagnostics {
    pub state: ConnectionState,
    pub consecutive_failures: u32,
    pub pending_reconnect: Option<Duration>,
}

#[derive(Clone, Copy)]
enum AttemptKind {
    Connect,
    Reconnect,
}

struct ReconnectTimer {
    token: CancellationToken,
    delay: Duration,
}

struct LiveSession {
    generation: u64,
    token: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Lifecycle {
    /// Cancellation handle of the in-flight attempt.
    attempt: Option<CancellationToken>,
    terminated: bool,
    consecutive_failures: u32,
    generation: u64,
    session: Option<LiveSession>,
    reconnect: Option<ReconnectTimer>,
}

struct Inner {
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    lifecycle: Mutex<Lifecycle>,
    state: watch::Sender<ConnectionState>,
    events: Mutex<Option<mpsc::UnboundedSender<Value>>>,
}

#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<Inner>,
}

impl StreamClient {
    pub fn new(policy: ReconnectPolicy, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                policy,
                connector,
                lifecycle: Mutex::new(Lifecycle::default()),
                state,
                events: Mutex::new(None),
            }),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            log::debug!("Upstream state: {:?} -> {:?}", previous, state);
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn diagnostics(&self) -> ClientDiagnostics {
        let lc = self.lifecycle();
        ClientDiagnostics {
            state: self.state(),
            consecutive_failures: lc.consecutive_failures,
            pending_reconnect: lc.reconnect.as_ref().map(|t| t.delay),
        }
    }

    /// Delay of the currently scheduled reconnect, if any.
    pub fn pending_reconnect(&self) -> Option<Duration> {
        self.lifecycle().reconnect.as_ref().map(|t| t.delay)
    }

    /// True when both handles drive the same underlying client.
    pub fn same_as(&self, other: &StreamClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Registers the consumer of inbound events. Only one consumer is active:
    /// registering again replaces the previous one, whose receiver then closes.
    /// Returns a closed receiver once the client is terminated.
    pub fn events(&self) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.lifecycle().terminated {
            *self
                .inner
                .events
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(tx);
        }
        rx
    }

    fn emit(&self, payload: Value) {
        let events = self
            .inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match events.as_ref() {
            Some(tx) if tx.send(payload).is_ok() => {}
            _ => log::debug!("No event consumer registered; dropping upstream event"),
        }
    }

    /// Establishes the upstream stream.
    ///
    /// Returns `Ok(())` when connected or when another attempt is already in
    /// flight. On failure a reconnect is scheduled before the error is returned.
    pub async fn connect(&self) -> Result<(), RelayError> {
        self.attempt(AttemptKind::Connect).await
    }

    async fn attempt(&self, kind: AttemptKind) -> Result<(), RelayError> {
        let (attempt, stale) = {
            let mut lc = self.lifecycle();
            if lc.terminated {
                return Err(RelayError::Terminated);
            }
            if lc.attempt.is_some() {
                log::debug!("Connect already in progress; ignoring request");
                return Ok(());
            }
            let attempt = CancellationToken::new();
            lc.attempt = Some(attempt.clone());
            if let Some(timer) = lc.reconnect.take() {
                timer.token.cancel();
            }
            self.set_state(match kind {
                AttemptKind::Connect => ConnectionState::Connecting,
                AttemptKind::Reconnect => ConnectionState::Reconnecting,
            });
            (attempt, lc.session.take())
        };

        // Release the old socket fully before handshaking again.
        if let Some(session) = stale {
            log::info!("Closing existing upstream session before reconnecting");
            session.token.cancel();
            let _ = session.task.await;
        }

        let handshake = async {
            tokio::time::sleep(self.inner.policy.settle_delay()).await;
            self.inner.connector.connect().await
        };
        let outcome = tokio::select! {
            biased;
            _ = attempt.cancelled() => None,
            outcome = handshake => Some(outcome),
        };
        let Some(outcome) = outcome else {
            let err = abandoned_error(&self.lifecycle());
            log::info!("Connect attempt abandoned before the handshake finished: {}", err);
            return Err(err);
        };

        match outcome {
            Ok(session) => {
                let rejected = {
                    let mut lc = self.lifecycle();
                    if attempt.is_cancelled() {
                        Some((session, abandoned_error(&lc)))
                    } else {
                        lc.attempt = None;
                        lc.generation += 1;
                        lc.consecutive_failures = 0;
                        let generation = lc.generation;
                        let token = CancellationToken::new();
                        let task =
                            tokio::spawn(pump(self.clone(), session, token.clone(), generation));
                        lc.session = Some(LiveSession {
                            generation,
                            token,
                            task,
                        });
                        self.set_state(ConnectionState::Connected);
                        None
                    }
                };

                if let Some((mut session, err)) = rejected {
                    log::info!("Discarding session opened by an abandoned attempt: {}", err);
                    let _ = session.close().await;
                    return Err(err);
                }
                log::info!("Connected to upstream push source");
                Ok(())
            }
            Err(e) => {
                let mut lc = self.lifecycle();
                if attempt.is_cancelled() {
                    return Err(abandoned_error(&lc));
                }
                lc.attempt = None;
                lc.consecutive_failures = lc.consecutive_failures.saturating_add(1);
                let delay = self
                    .inner
                    .policy
                    .delay_after_failures(lc.consecutive_failures);
                self.set_state(ConnectionState::Disconnected);
                self.schedule_reconnect(&mut lc, delay);
                log::error!(
                    "Upstream connect failed ({} in a row): {}. Retrying in {}s",
                    lc.consecutive_failures,
                    e,
                    delay.as_secs()
                );
                Err(e.into())
            }
        }
    }

    /// Replaces any pending reconnect with a new one after `delay`.
    fn schedule_reconnect(&self, lc: &mut Lifecycle, delay: Duration) {
        if let Some(previous) = lc.reconnect.take() {
            previous.token.cancel();
        }
        let token = CancellationToken::new();
        lc.reconnect = Some(ReconnectTimer {
            token: token.clone(),
            delay,
        });

        let client = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    // Errors are logged and rescheduled inside `attempt`.
                    let _ = client.attempt(AttemptKind::Reconnect).await;
                }
            }
        });
    }

    /// Called by the session pump when the stream ends without being asked to.
    fn on_unexpected_disconnect(&self, generation: u64) {
        let mut lc = self.lifecycle();
        if lc.terminated {
            return;
        }
        match &lc.session {
            Some(live) if live.generation == generation => {}
            _ => return,
        }
        lc.session = None;
        self.set_state(ConnectionState::Disconnected);
        let delay = self.inner.policy.disconnect_delay();
        self.schedule_reconnect(&mut lc, delay);
        log::warn!(
            "Disconnected from upstream push source. Reconnecting in {}s",
            delay.as_secs()
        );
    }

    /// Tears down the live stream, if any, abandons an in-flight attempt and
    /// cancels any pending reconnect. Safe to call when already disconnected.
    pub async fn disconnect(&self) {
        let session = {
            let mut lc = self.lifecycle();
            if let Some(timer) = lc.reconnect.take() {
                timer.token.cancel();
            }
            if let Some(attempt) = lc.attempt.take() {
                attempt.cancel();
            }
            if !lc.terminated {
                self.set_state(ConnectionState::Disconnected);
            }
            lc.session.take()
        };
        if let Some(session) = session {
            session.token.cancel();
            let _ = session.task.await;
            log::info!("Upstream connection closed");
        }
    }

    /// Final shutdown. No connect or reconnect happens afterwards.
    pub async fn terminate(&self) -> Result<(), RelayError> {
        let session = {
            let mut lc = self.lifecycle();
            lc.terminated = true;
            if let Some(timer) = lc.reconnect.take() {
                timer.token.cancel();
            }
            if let Some(attempt) = lc.attempt.take() {
                attempt.cancel();
            }
            self.set_state(ConnectionState::Terminated);
            lc.session.take()
        };
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(session) = session {
            session.token.cancel();
            session
                .task
                .await
                .map_err(|e| TransportError::SessionTask(e.to_string()))?;
            log::info!("Upstream connection closed on terminate");
        }
        Ok(())
    }
}

fn abandoned_error(lc: &Lifecycle) -> RelayError {
    if lc.terminated {
        RelayError::Terminated
    } else {
        RelayError::Cancelled
    }
}

enum PumpStep {
    Cancelled,
    Next(Option<Result<Value, TransportError>>),
}

/// Moves events from one session onto the client's channel until the session
/// ends or is cancelled.
async fn pump(
    client: StreamClient,
    mut session: Box<dyn Session>,
    token: CancellationToken,
    generation: u64,
) {
    loop {
        let step = tokio::select! {
            biased;
            _ = token.cancelled() => PumpStep::Cancelled,
            next = session.next_event() => PumpStep::Next(next),
        };

        match step {
            PumpStep::Cancelled => {
                if let Err(e) = session.close().await {
                    log::debug!("Error while closing upstream session (ignored): {}", e);
                }
                return;
            }
            PumpStep::Next(Some(Ok(payload))) => client.emit(payload),
            PumpStep::Next(Some(Err(e))) => {
                log::error!("Upstream read error: {}", e);
                break;
            }
            PumpStep::Next(None) => {
                log::warn!("Upstream stream closed by remote host");
                break;
            }
        }
    }
    let _ = session.close().await;
    client.on_unexpected_disconnect(generation);
}
