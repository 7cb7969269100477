//! Connection lifecycle to the sync daemon.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──probe + subscribe ok──▶ Connected
//!      ▲                          │                                  │
//!      └──────── probe/subscribe failed ◀┘          disconnect() ────┘
//! ```
//!
//! Subscriptions are live before the state reads `Connected` and before any
//! `on_connected` handler runs. Every disconnect bumps the [`Epoch`], which
//! invalidates completions and signals issued under the previous one.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{ControllerError, TransportError};
use crate::listeners::Listeners;
use crate::transport::{CallTicket, Epoch, RemoteCall, RemoteEvent, RemoteEventKind, Reply, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Result of a [`Supervisor::connect`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Connected(Epoch),
    /// Not `Disconnected` when asked; nothing was done.
    Unchanged,
    /// Probe or subscription failed; back to `Disconnected`.
    Failed,
}

pub struct Supervisor<T> {
    transport: T,
    state: ConnectionState,
    epoch: Epoch,
    on_connected: Listeners<Epoch>,
    on_disconnected: Listeners<Epoch>,
    remote_handlers: HashMap<RemoteEventKind, Listeners<RemoteEvent>>,
}

impl<T: Transport> Supervisor<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            epoch: Epoch::default(),
            on_connected: Listeners::new(),
            on_disconnected: Listeners::new(),
            remote_handlers: HashMap::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn on_connected<F>(&mut self, handler: F)
    where
        F: FnMut(&Epoch) + Send + Sync + 'static,
    {
        self.on_connected.add(handler);
    }

    /// Handlers receive the epoch that just ended.
    pub fn on_disconnected<F>(&mut self, handler: F)
    where
        F: FnMut(&Epoch) + Send + Sync + 'static,
    {
        self.on_disconnected.add(handler);
    }

    pub fn on_remote_event<F>(&mut self, kind: RemoteEventKind, handler: F)
    where
        F: FnMut(&RemoteEvent) + Send + Sync + 'static,
    {
        self.remote_handlers.entry(kind).or_default().add(handler);
    }

    /// Start presence reporting. Failure is logged; the controller can still
    /// connect on startup, it just will not hear about restarts.
    pub async fn watch(&self) {
        if let Err(err) = self.transport.watch_presence().await {
            tracing::warn!(error = %err, "failed to watch daemon presence");
        }
    }

    pub async fn connect(&mut self) -> Transition {
        if self.state != ConnectionState::Disconnected {
            return Transition::Unchanged;
        }
        self.state = ConnectionState::Connecting;

        if let Err(err) = self.establish().await {
            tracing::warn!(error = %err, "failed to connect to sync daemon");
            self.transport.unsubscribe_all().await;
            self.state = ConnectionState::Disconnected;
            return Transition::Failed;
        }

        self.state = ConnectionState::Connected;
        tracing::info!(epoch = %self.epoch, "connected to sync daemon");
        let epoch = self.epoch;
        self.on_connected.emit(&epoch);
        Transition::Connected(epoch)
    }

    async fn establish(&self) -> Result<(), TransportError> {
        self.transport.probe().await?;
        for kind in RemoteEventKind::ALL {
            self.transport.subscribe(self.epoch, kind).await?;
        }
        Ok(())
    }

    /// Returns `false` if already disconnected.
    pub async fn disconnect(&mut self) -> bool {
        if self.state == ConnectionState::Disconnected {
            return false;
        }
        self.transport.unsubscribe_all().await;
        let ended = self.epoch;
        self.epoch = ended.next();
        self.state = ConnectionState::Disconnected;
        tracing::info!(epoch = %ended, "lost sync daemon");
        self.on_disconnected.emit(&ended);
        true
    }

    /// Route a signal to its handlers. Returns `false` (and drops it) when
    /// not connected or when it belongs to an earlier epoch.
    pub fn accept_remote(&mut self, epoch: Epoch, event: &RemoteEvent) -> bool {
        if !self.is_connected() || epoch != self.epoch {
            tracing::debug!(
                event_epoch = %epoch,
                current_epoch = %self.epoch,
                "dropping stale daemon signal"
            );
            return false;
        }
        if let Some(handlers) = self.remote_handlers.get_mut(&event.kind()) {
            handlers.emit(event);
        }
        true
    }

    pub async fn call(&self, call: RemoteCall) -> Result<Reply, ControllerError> {
        if !self.is_connected() {
            return Err(ControllerError::NotConnected);
        }
        Ok(self.transport.call(call).await?)
    }

    pub fn call_async(&self, ticket: CallTicket, call: RemoteCall) -> Result<(), ControllerError> {
        if !self.is_connected() {
            return Err(ControllerError::NotConnected);
        }
        Ok(self.transport.call_async(ticket, call)?)
    }
}
