use thiserror::Error;

/// Failure reported by the bus transport for a dispatched call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to dispatch call: {0}")]
    Dispatch(String),

    #[error("remote call '{method}' failed: {message}")]
    Remote {
        method: &'static str,
        message: String,
    },

    #[error("remote call '{method}' returned an unexpected reply (expected {expected})")]
    UnexpectedReply {
        method: &'static str,
        expected: &'static str,
    },

    #[error("transport closed")]
    Closed,
}

/// Error surface for the supervisor, controller, runtime and D-Bus adapter.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("not connected to the sync daemon")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    #[error("config error: {0}")]
    Config(#[from] buteo_core::ConfigError),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("controller task failed: {0}")]
    Task(String),
}
