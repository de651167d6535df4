//! Heartbeat
//!
//! While connected, a probe goes out every interval under the reserved
//! heartbeat identifier. The reply is matched by identifier only and turned
//! into a latency sample; it never touches the pending table.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use toolrelay_transport::{Transport, TransportError};
use toolrelay_wire::OutboundFrame;
use tracing::{debug, trace, warn};

use super::core::ClientInner;
use crate::config::duration_millis;
use crate::error::ClientError;
use crate::events::ClientEvent;

/// Round-trip bookkeeping for the liveness probe.
#[derive(Debug, Default, Clone)]
pub struct HeartbeatMonitor {
    sent_at: Option<Instant>,
    last_latency: Option<Duration>,
}

impl HeartbeatMonitor {
    /// Note that a probe left at `at`.
    pub fn mark_sent(&mut self, at: Instant) {
        self.sent_at = Some(at);
    }

    /// Match a reply received at `at`. Returns the round trip, or `None` when
    /// no probe is outstanding.
    pub fn on_reply(&mut self, at: Instant) -> Option<Duration> {
        let sent_at = self.sent_at.take()?;
        let latency = at.saturating_duration_since(sent_at);
        self.last_latency = Some(latency);
        Some(latency)
    }

    /// Most recent round trip.
    pub const fn last_latency(&self) -> Option<Duration> {
        self.last_latency
    }

    /// Forget the outstanding probe. The last latency is kept for status.
    pub fn clear(&mut self) {
        self.sent_at = None;
    }
}

pub(crate) fn spawn<T: Transport + 'static>(
    inner: &Arc<ClientInner<T>>,
    generation: u64,
    interval: Duration,
) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Err(error) = inner.send_heartbeat().await {
                warn!(generation, %error, "heartbeat send failed");
                let error = match error {
                    ClientError::Transport(error) => error,
                    other => TransportError::SendFailed(other.to_string()),
                };
                inner.handle_connection_lost(generation, &error);
                return;
            }
        }
    })
}

impl<T: Transport + 'static> ClientInner<T> {
    async fn send_heartbeat(&self) -> Result<(), ClientError> {
        let identity = &self.config.identity;
        let frame = OutboundFrame::heartbeat(identity.agent.as_str(), identity.emotion.as_str());
        self.heartbeat.lock().mark_sent(Instant::now());
        self.send_frame(&frame).await?;
        trace!("heartbeat sent");
        Ok(())
    }

    pub(crate) fn on_heartbeat_reply(&self) {
        let latency = self.heartbeat.lock().on_reply(Instant::now());
        match latency {
            Some(latency) => {
                debug!(latency_ms = duration_millis(latency), "heartbeat reply");
                self.events.emit(&ClientEvent::Latency(latency));
            }
            None => trace!("unsolicited heartbeat reply"),
        }
    }

    pub(crate) fn latency(&self) -> Option<Duration> {
        self.heartbeat.lock().last_latency()
    }
}
