//! Client-side controller for the Buteo sync daemon.
//!
//! [`Supervisor`] tracks the daemon's presence and signal subscriptions,
//! [`SyncController`] keeps the category → profiles cache and issues sync
//! requests, and [`runtime`] drives a controller on its own task behind a
//! [`ControllerHandle`]. [`DbusTransport`] is the production [`Transport`].

pub mod controller;
pub mod dbus;
mod error;
mod listeners;
mod pending;
pub mod runtime;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
mod fake;

pub use controller::{ControllerEvent, SyncController};
pub use dbus::DbusTransport;
pub use error::{ControllerError, TransportError};
pub use listeners::Listeners;
pub use runtime::{init_tracing, ControllerHandle, Snapshot};
pub use supervisor::{ConnectionState, Supervisor, Transition};
pub use transport::{
    BusEvent, CallTicket, Epoch, RemoteCall, RemoteEvent, RemoteEventKind, Reply, ReplyKind,
    Transport,
};
