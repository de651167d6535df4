//! Connection lifecycle
//!
//! Owns the transition between [`ConnectionState`]s. Every transport open gets
//! a fresh generation number; close notifications from the reader or the
//! heartbeat carry the generation they were started with and are ignored once
//! it is stale. A manual `disconnect` additionally bumps the epoch, which is
//! what a sleeping reconnect task checks before it acts.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──open+handshake──▶ Connected
//!      ▲                        │                             │
//!      │◀──────── failure ──────┘                             │ unexpected close
//!      │                                                      ▼
//!      └──── attempts exhausted ◀── Reconnecting ◀── schedule (delay)
//! ```

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt as _;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use toolrelay_transport::{Transport, TransportError};
use tracing::{debug, info, warn};

use super::core::ClientInner;
use super::{dispatcher, heartbeat};
use crate::config::ReconnectConfig;
use crate::error::{ClientError, ClientResult};
use crate::events::ClientEvent;

/// Close code reported for a disconnect requested by the caller.
const NORMAL_CLOSURE: u16 = 1000;

/// Connection state as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and no reconnect pending
    Disconnected,
    /// Transport opening or handshake running
    Connecting,
    /// Open and handshaken
    Connected,
    /// Waiting to retry after an unexpected close
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Bounded, fixed-delay reconnect policy.
///
/// Each unexpected close consumes one attempt; a successful connect resets
/// the counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    /// A policy allowing `max_attempts` retries, `delay` apart.
    pub const fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
            attempts: 0,
        }
    }

    /// Policy described by a [`ReconnectConfig`].
    pub const fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(config.delay(), config.max_attempts)
    }

    /// Record an unexpected close. Returns the delay before the next attempt,
    /// or `None` once the bound is reached.
    pub fn on_unexpected_close(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.delay)
    }

    /// Forget previous failures.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts consumed since the last success.
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Attempt bound.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether automatic reconnection has given up.
    pub const fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

pub(crate) type ConnectAttempt = Shared<BoxFuture<'static, ClientResult<()>>>;

/// Mutable connection bookkeeping, guarded by one lock.
#[derive(Debug)]
pub(crate) struct LinkState {
    pub(crate) state: ConnectionState,
    pub(crate) policy: ReconnectPolicy,
    pub(crate) generation: u64,
    pub(crate) epoch: u64,
    pub(crate) lost_while_opening: Option<TransportError>,
    pub(crate) reader: Option<JoinHandle<()>>,
    pub(crate) heartbeat: Option<JoinHandle<()>>,
    pub(crate) reconnect: Option<JoinHandle<()>>,
    /// Teardown of a lost connection; the next open waits for it
    pub(crate) closing: Option<JoinHandle<()>>,
}

impl LinkState {
    pub(crate) const fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            policy,
            generation: 0,
            epoch: 0,
            lost_while_opening: None,
            reader: None,
            heartbeat: None,
            reconnect: None,
            closing: None,
        }
    }

    pub(crate) fn take_tasks(&mut self) -> Vec<JoinHandle<()>> {
        [self.reader.take(), self.heartbeat.take(), self.reconnect.take()]
            .into_iter()
            .flatten()
            .collect()
    }
}

enum OpenOutcome {
    Open,
    Stale,
    Lost(TransportError),
}

async fn stop_task(task: JoinHandle<()>) {
    task.abort();
    let _ = task.await;
}

impl<T: Transport + 'static> ClientInner<T> {
    pub(crate) fn state(&self) -> ConnectionState {
        self.link.lock().state
    }

    pub(crate) async fn ensure_connected(self: &Arc<Self>) -> ClientResult<()> {
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }
        self.connect().await
    }

    /// Join the in-flight attempt or start one.
    pub(crate) async fn connect(self: &Arc<Self>) -> ClientResult<()> {
        let attempt = {
            let mut slot = self.connecting.lock();
            if let Some((_, attempt)) = slot.as_ref() {
                attempt.clone()
            } else {
                if self.state() == ConnectionState::Connected {
                    return Ok(());
                }
                let id = self.next_attempt_id();
                let inner = Arc::clone(self);
                let future: BoxFuture<'static, ClientResult<()>> = Box::pin(async move {
                    let result = inner.open().await;
                    let mut slot = inner.connecting.lock();
                    if slot.as_ref().is_some_and(|(current, _)| *current == id) {
                        slot.take();
                    }
                    result
                });
                let attempt = future.shared();
                *slot = Some((id, attempt.clone()));
                attempt
            }
        };
        attempt.await
    }

    async fn open(self: &Arc<Self>) -> ClientResult<()> {
        let generation = {
            let mut link = self.link.lock();
            link.generation += 1;
            link.state = ConnectionState::Connecting;
            link.lost_while_opening = None;
            link.generation
        };
        debug!(generation, endpoint = ?self.transport.endpoint(), "opening connection");

        let closing = self.link.lock().closing.take();
        if let Some(closing) = closing {
            let _ = closing.await;
        }

        if let Err(error) = self.transport.connect().await {
            warn!(generation, %error, "transport failed to open");
            let _ = self.abandon_open(generation);
            let error = ClientError::Transport(error);
            self.events.emit(&ClientEvent::Error(error.clone()));
            return Err(error);
        }
        self.heartbeat.lock().clear();

        let reader = dispatcher::spawn_reader(self, generation);
        let stale_reader = {
            let mut link = self.link.lock();
            if link.generation == generation {
                link.reader = Some(reader);
                None
            } else {
                Some(reader)
            }
        };
        if let Some(reader) = stale_reader {
            debug!(generation, "connection abandoned while opening");
            stop_task(reader).await;
            let _ = self.transport.disconnect().await;
            return Err(ClientError::Disconnected);
        }

        if self.config.handshake.enabled
            && let Err(error) = self.handshake().await
        {
            if self.link.lock().generation != generation {
                debug!(generation, "connection abandoned during handshake");
                return Err(ClientError::Disconnected);
            }
            warn!(generation, %error, "handshake failed");
            if let Some(reader) = self.abandon_open(generation) {
                stop_task(reader).await;
            }
            let _ = self.transport.disconnect().await;
            self.events.emit(&ClientEvent::Error(error.clone()));
            return Err(error);
        }

        let outcome = {
            let mut link = self.link.lock();
            if link.generation != generation {
                OpenOutcome::Stale
            } else if let Some(error) = link.lost_while_opening.take() {
                link.state = ConnectionState::Disconnected;
                link.reader.take();
                OpenOutcome::Lost(error)
            } else {
                link.state = ConnectionState::Connected;
                link.policy.reset();
                if self.config.heartbeat.enabled {
                    link.heartbeat = Some(heartbeat::spawn(
                        self,
                        generation,
                        self.config.heartbeat.interval(),
                    ));
                }
                OpenOutcome::Open
            }
        };
        match outcome {
            OpenOutcome::Open => {}
            OpenOutcome::Stale => {
                debug!(generation, "connection abandoned during handshake");
                let _ = self.transport.disconnect().await;
                return Err(ClientError::Disconnected);
            }
            OpenOutcome::Lost(error) => {
                warn!(generation, %error, "connection lost before it was established");
                let _ = self.transport.disconnect().await;
                let error = ClientError::Transport(error);
                self.events.emit(&ClientEvent::Error(error.clone()));
                return Err(error);
            }
        }

        let endpoint = self.transport.endpoint();
        info!(generation, endpoint = ?endpoint, "connected");
        self.events.emit(&ClientEvent::Connected { endpoint });
        Ok(())
    }

    /// Mark a failed open; returns its reader if the attempt is still current.
    fn abandon_open(&self, generation: u64) -> Option<JoinHandle<()>> {
        let mut link = self.link.lock();
        if link.generation != generation {
            return None;
        }
        link.state = ConnectionState::Disconnected;
        link.reader.take()
    }

    /// Close on request. Returns `true` if a connection was open.
    pub(crate) async fn disconnect(&self) -> bool {
        let (was_connected, tasks, closing) = {
            let mut link = self.link.lock();
            link.generation += 1;
            link.epoch += 1;
            let was_connected = link.state == ConnectionState::Connected;
            link.state = ConnectionState::Disconnected;
            (was_connected, link.take_tasks(), link.closing.take())
        };
        let attempt = self.connecting.lock().take();
        if let Some(closing) = closing {
            let _ = closing.await;
        }

        for task in tasks {
            stop_task(task).await;
        }
        self.heartbeat.lock().clear();

        let failed = self.pending.fail_all(&ClientError::Disconnected);
        if failed > 0 {
            debug!(failed, "failed pending requests on disconnect");
        }

        if was_connected || attempt.is_some() {
            if let Err(error) = self.transport.disconnect().await {
                warn!(%error, "transport close failed");
            }
        }

        if was_connected {
            info!("disconnected by caller");
            self.events.emit(&ClientEvent::Disconnected {
                code: Some(NORMAL_CLOSURE),
                reason: "client disconnect".to_string(),
            });
        }
        was_connected
    }

    /// React to the reader or heartbeat losing the connection.
    pub(crate) fn handle_connection_lost(self: &Arc<Self>, generation: u64, error: &TransportError) {
        let mut link = self.link.lock();
        if link.generation != generation {
            debug!(generation, "ignoring close from stale connection");
            return;
        }
        let state = link.state;
        match state {
            ConnectionState::Connected => {}
            ConnectionState::Connecting => {
                link.lost_while_opening = Some(error.clone());
                drop(link);
                // Handshake requests would otherwise wait for their deadline.
                let failed = self
                    .pending
                    .fail_untracked(&ClientError::Transport(error.clone()));
                debug!(generation, failed, %error, "connection lost during handshake");
                return;
            }
            _ => return,
        }

        link.state = ConnectionState::Disconnected;
        let tasks: Vec<JoinHandle<()>> = [link.heartbeat.take(), link.reader.take()]
            .into_iter()
            .flatten()
            .collect();
        for task in &tasks {
            task.abort();
        }
        let epoch = link.epoch;
        link.closing = Some(tokio::spawn(
            Arc::clone(self).close_lost(generation, epoch, tasks, error.clone()),
        ));
    }

    /// Close the transport of a lost connection, then report and retry.
    async fn close_lost(
        self: Arc<Self>,
        generation: u64,
        epoch: u64,
        tasks: Vec<JoinHandle<()>>,
        error: TransportError,
    ) {
        for task in tasks {
            let _ = task.await;
        }
        self.heartbeat.lock().clear();
        if let Err(error) = self.transport.disconnect().await {
            debug!(generation, %error, "transport close after loss failed");
        }

        let (code, reason) = error.close_details();
        if error.is_close() {
            info!(generation, ?code, %reason, "connection closed by peer");
        } else {
            warn!(generation, %error, "connection lost");
        }
        self.events.emit(&ClientEvent::Disconnected { code, reason });
        if !error.is_close() {
            self.events
                .emit(&ClientEvent::Error(ClientError::Transport(error.clone())));
        }

        if self.link.lock().epoch == epoch {
            self.schedule_reconnect();
        }
    }

    /// Consume one attempt and arm the reconnect task, unless exhausted.
    pub(crate) fn schedule_reconnect(self: &Arc<Self>) {
        if !self.config.reconnect.enabled {
            return;
        }
        let mut link = self.link.lock();
        if link.state != ConnectionState::Disconnected {
            return;
        }
        match link.policy.on_unexpected_close() {
            Some(delay) => {
                link.state = ConnectionState::Reconnecting;
                info!(
                    attempt = link.policy.attempts(),
                    max_attempts = link.policy.max_attempts(),
                    ?delay,
                    "scheduling reconnect"
                );
                link.reconnect = Some(spawn_reconnect(Arc::downgrade(self), link.epoch, delay));
            }
            None => {
                warn!(
                    attempts = link.policy.attempts(),
                    "reconnect attempts exhausted, call connect() to retry"
                );
            }
        }
    }
}

fn spawn_reconnect<T: Transport + 'static>(
    inner: Weak<ClientInner<T>>,
    epoch: u64,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if inner.link.lock().epoch != epoch {
            debug!("reconnect cancelled by disconnect");
            return;
        }

        match inner.connect().await {
            Ok(()) => info!("reconnected"),
            Err(error) => {
                warn!(%error, "reconnect attempt failed");
                let still_wanted = inner.link.lock().epoch == epoch;
                if still_wanted {
                    inner.schedule_reconnect();
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_are_bounded() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(3), 5);
        for n in 1..=8u32 {
            let delay = policy.on_unexpected_close();
            assert_eq!(policy.attempts(), n.min(5));
            if n <= 5 {
                assert_eq!(delay, Some(Duration::from_secs(3)));
            } else {
                assert_eq!(delay, None);
            }
        }
        assert!(policy.is_exhausted());
    }

    #[test]
    fn reset_restores_budget() {
        let mut policy = ReconnectPolicy::from_config(&ReconnectConfig::default());
        policy.on_unexpected_close();
        policy.on_unexpected_close();
        assert_eq!(policy.attempts(), 2);
        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert!(!policy.is_exhausted());
    }

    #[test]
    fn zero_budget_never_schedules() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(10), 0);
        assert_eq!(policy.on_unexpected_close(), None);
        assert_eq!(policy.attempts(), 0);
    }

    #[test]
    fn state_display() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
