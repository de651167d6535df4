//! Client event bus.
//!
//! Listeners subscribe to one [`EventKind`] and receive every [`ClientEvent`]
//! of that kind. Emission is synchronous on the emitting task and walks a
//! snapshot of the listener list, so listeners may subscribe or unsubscribe
//! from inside a callback. A panicking listener is logged and skipped.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use toolrelay_wire::InboundFrame;
use tracing::{error, trace};

use crate::error::ClientError;
use crate::tools::ToolDescriptor;
use crate::tracker::ToolInvocation;

/// Every kind of event the client emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Connection opened and handshake finished
    Connected,
    /// Connection closed
    Disconnected,
    /// Transport or connection failure
    Error,
    /// A frame was decoded
    Message,
    /// A heartbeat round trip was measured
    Latency,
    /// The available-tools view changed
    ToolsUpdated,
    /// A caller invocation completed successfully
    ToolInvoked,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Connected,
        Self::Disconnected,
        Self::Error,
        Self::Message,
        Self::Latency,
        Self::ToolsUpdated,
        Self::ToolInvoked,
    ];

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Message => "message",
            Self::Latency => "latency",
            Self::ToolsUpdated => "tools_updated",
            Self::ToolInvoked => "tool_invoked",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event and its payload.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Connection opened and handshake finished.
    Connected {
        /// Endpoint reported by the transport
        endpoint: Option<String>,
    },
    /// Connection closed.
    Disconnected {
        /// Close code, when the peer sent one
        code: Option<u16>,
        /// Close reason
        reason: String,
    },
    /// Transport or connection failure.
    Error(ClientError),
    /// A frame was decoded.
    Message(InboundFrame),
    /// Heartbeat round trip.
    Latency(Duration),
    /// New available-tools view.
    ToolsUpdated(Vec<ToolDescriptor>),
    /// A caller invocation completed successfully.
    ToolInvoked(ToolInvocation),
}

impl ClientEvent {
    /// The kind listeners subscribe to for this event.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Connected { .. } => EventKind::Connected,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::Error(_) => EventKind::Error,
            Self::Message(_) => EventKind::Message,
            Self::Latency(_) => EventKind::Latency,
            Self::ToolsUpdated(_) => EventKind::ToolsUpdated,
            Self::ToolInvoked(_) => EventKind::ToolInvoked,
        }
    }
}

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

/// Typed publish/subscribe hub.
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        let counts: HashMap<EventKind, usize> =
            listeners.iter().map(|(kind, list)| (*kind, list.len())).collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe `listener` to `kind`.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        trace!(%kind, ?id, "listener registered");
        id
    }

    /// Unsubscribe. Returns `false` if `id` was not registered for `kind`.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(&kind);
        }
        removed
    }

    /// Listeners currently subscribed to `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to its listeners and return how many ran to completion.
    pub fn emit(&self, event: &ClientEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Listener> = match self.listeners.read().get(&kind) {
            Some(list) => list.iter().map(|(_, listener)| Arc::clone(listener)).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for listener in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(_) => error!(%kind, "event listener panicked"),
            }
        }
        delivered
    }
}
