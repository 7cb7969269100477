//! The seam between the controller and the message bus.
//!
//! The controller never talks to the bus directly. It issues [`RemoteCall`]s
//! through a [`Transport`] and receives everything else (presence changes,
//! daemon signals, async call completions) as [`BusEvent`]s on its own
//! timeline.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use buteo_core::{ProfileChangeType, ProfileId, SyncStatus};

use crate::error::TransportError;

/// Connection generation. Bumped on every disconnect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Epoch(pub u64);

impl Epoch {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifies one outstanding asynchronous call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallTicket {
    pub epoch: Epoch,
    pub id: u64,
}

/// The daemon methods the controller uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    StartSync(ProfileId),
    AbortSync(ProfileId),
    RunningSyncs,
    RemoveProfile(ProfileId),
    SyncProfilesByKey { key: String, value: String },
}

/// Shape of the reply a [`RemoteCall`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Unit,
    Bool,
    Strings,
}

impl RemoteCall {
    /// Method name on the daemon's bus interface.
    pub fn method(&self) -> &'static str {
        match self {
            RemoteCall::StartSync(_) => "startSync",
            RemoteCall::AbortSync(_) => "abortSync",
            RemoteCall::RunningSyncs => "runningSyncs",
            RemoteCall::RemoveProfile(_) => "removeProfile",
            RemoteCall::SyncProfilesByKey { .. } => "syncProfilesByKey",
        }
    }

    pub fn reply_kind(&self) -> ReplyKind {
        match self {
            RemoteCall::AbortSync(_) => ReplyKind::Unit,
            RemoteCall::StartSync(_) | RemoteCall::RemoveProfile(_) => ReplyKind::Bool,
            RemoteCall::RunningSyncs | RemoteCall::SyncProfilesByKey { .. } => ReplyKind::Strings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Unit,
    Bool(bool),
    Strings(Vec<String>),
}

impl Reply {
    pub fn into_bool(self, method: &'static str) -> Result<bool, TransportError> {
        match self {
            Reply::Bool(value) => Ok(value),
            _ => Err(TransportError::UnexpectedReply {
                method,
                expected: "bool",
            }),
        }
    }

    pub fn into_strings(self, method: &'static str) -> Result<Vec<String>, TransportError> {
        match self {
            Reply::Strings(values) => Ok(values),
            _ => Err(TransportError::UnexpectedReply {
                method,
                expected: "string list",
            }),
        }
    }
}

/// Daemon signals the controller subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteEventKind {
    SyncStatus,
    ProfileChanged,
}

impl RemoteEventKind {
    pub const ALL: [RemoteEventKind; 2] = [RemoteEventKind::SyncStatus, RemoteEventKind::ProfileChanged];

    /// Signal member name on the daemon's bus interface.
    pub fn signal_name(self) -> &'static str {
        match self {
            RemoteEventKind::SyncStatus => "syncStatus",
            RemoteEventKind::ProfileChanged => "signalProfileChanged",
        }
    }
}

/// A decoded daemon signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    SyncStatus {
        profile: ProfileId,
        status: SyncStatus,
        message: String,
        details: i32,
    },
    ProfileChanged {
        profile: ProfileId,
        change: ProfileChangeType,
        document: String,
    },
}

impl RemoteEvent {
    pub fn kind(&self) -> RemoteEventKind {
        match self {
            RemoteEvent::SyncStatus { .. } => RemoteEventKind::SyncStatus,
            RemoteEvent::ProfileChanged { .. } => RemoteEventKind::ProfileChanged,
        }
    }
}

/// Everything the bus delivers to the controller's timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    ServiceAppeared,
    ServiceVanished,
    Remote {
        epoch: Epoch,
        event: RemoteEvent,
    },
    CallFinished {
        ticket: CallTicket,
        reply: Result<Reply, TransportError>,
    },
}

/// What the controller needs from an IPC transport.
///
/// Implementations push presence changes, subscribed signals and async call
/// completions as [`BusEvent`]s into the channel the controller's runtime
/// drains.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start reporting `ServiceAppeared` / `ServiceVanished`.
    async fn watch_presence(&self) -> Result<(), TransportError>;

    /// Succeeds when the daemon is reachable and answers on its interface.
    async fn probe(&self) -> Result<(), TransportError>;

    /// Call and wait for the reply.
    async fn call(&self, call: RemoteCall) -> Result<Reply, TransportError>;

    /// Dispatch without waiting; the reply arrives as
    /// [`BusEvent::CallFinished`] carrying `ticket`.
    fn call_async(&self, ticket: CallTicket, call: RemoteCall) -> Result<(), TransportError>;

    /// Deliver `kind` signals as [`BusEvent::Remote`] tagged with `epoch`.
    async fn subscribe(&self, epoch: Epoch, kind: RemoteEventKind) -> Result<(), TransportError>;

    async fn unsubscribe_all(&self);
}
