//! [`Transport`] over D-Bus.
//!
//! Presence comes from `NameOwnerChanged` on the bus daemon, filtered to the
//! configured service name. Every subscribed signal gets its own pump task
//! that decodes messages and forwards them as [`BusEvent::Remote`]; async
//! calls run on spawned tasks and report back as [`BusEvent::CallFinished`].

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use zbus::fdo::DBusProxy;
use zbus::names::BusName;
use zbus::{Connection, Message, Proxy};

use buteo_core::{BusKind, ControllerConfig, ProfileChangeType, ProfileId, SyncStatus};

use crate::controller::{ControllerEvent, SyncController};
use crate::error::{ControllerError, TransportError};
use crate::runtime::{self, ControllerHandle};
use crate::transport::{
    BusEvent, CallTicket, Epoch, RemoteCall, RemoteEvent, RemoteEventKind, Reply, Transport,
};

const NAME_HAS_OWNER: &str = "NameHasOwner";

type SyncStatusBody = (String, i32, String, i32);
type ProfileChangedBody = (String, i32, String);

pub struct DbusTransport {
    connection: Connection,
    proxy: Proxy<'static>,
    service_name: String,
    events: mpsc::UnboundedSender<BusEvent>,
    presence: Mutex<Option<JoinHandle<()>>>,
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

impl DbusTransport {
    /// Open the configured bus and build a proxy for the daemon. The daemon
    /// does not have to be running yet.
    pub async fn connect(
        config: &ControllerConfig,
        events: mpsc::UnboundedSender<BusEvent>,
    ) -> Result<Self, ControllerError> {
        let connection = match config.bus {
            BusKind::Session => Connection::session().await?,
            BusKind::System => Connection::system().await?,
        };
        let proxy = Proxy::new(
            &connection,
            config.service_name.clone(),
            config.object_path.clone(),
            config.interface.clone(),
        )
        .await?;

        tracing::debug!(
            service = %config.service_name,
            path = %config.object_path,
            bus = ?config.bus,
            "opened D-Bus connection"
        );
        Ok(Self {
            connection,
            proxy,
            service_name: config.service_name.clone(),
            events,
            presence: Mutex::new(None),
            pumps: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Transport for DbusTransport {
    async fn watch_presence(&self) -> Result<(), TransportError> {
        let dbus = DBusProxy::new(&self.connection)
            .await
            .map_err(|err| remote("NameOwnerChanged", err))?;
        let mut changes = dbus
            .receive_name_owner_changed_with_args(&[(0, self.service_name.as_str())])
            .await
            .map_err(|err| remote("NameOwnerChanged", err))?;

        let events = self.events.clone();
        let task = tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                let args = match change.args() {
                    Ok(args) => args,
                    Err(err) => {
                        tracing::warn!(error = %err, "undecodable NameOwnerChanged signal");
                        continue;
                    }
                };
                let event = if args.new_owner().is_some() {
                    BusEvent::ServiceAppeared
                } else {
                    BusEvent::ServiceVanished
                };
                if events.send(event).is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.presence.lock().await.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn probe(&self) -> Result<(), TransportError> {
        let dbus = DBusProxy::new(&self.connection)
            .await
            .map_err(|err| remote(NAME_HAS_OWNER, err))?;
        let name = BusName::try_from(self.service_name.as_str())
            .map_err(|err| TransportError::Dispatch(err.to_string()))?;
        let owned = dbus
            .name_has_owner(name)
            .await
            .map_err(|err| TransportError::Remote {
                method: NAME_HAS_OWNER,
                message: err.to_string(),
            })?;
        if owned {
            Ok(())
        } else {
            Err(TransportError::Remote {
                method: NAME_HAS_OWNER,
                message: format!("{} is not running", self.service_name),
            })
        }
    }

    async fn call(&self, call: RemoteCall) -> Result<Reply, TransportError> {
        invoke(&self.proxy, call).await
    }

    fn call_async(&self, ticket: CallTicket, call: RemoteCall) -> Result<(), TransportError> {
        if self.events.is_closed() {
            return Err(TransportError::Closed);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| TransportError::Dispatch(err.to_string()))?;
        let proxy = self.proxy.clone();
        let events = self.events.clone();
        runtime.spawn(async move {
            let reply = invoke(&proxy, call).await;
            let _ = events.send(BusEvent::CallFinished { ticket, reply });
        });
        Ok(())
    }

    async fn subscribe(&self, epoch: Epoch, kind: RemoteEventKind) -> Result<(), TransportError> {
        let mut signals = self
            .proxy
            .receive_signal(kind.signal_name())
            .await
            .map_err(|err| remote(kind.signal_name(), err))?;

        let events = self.events.clone();
        let pump = tokio::spawn(async move {
            while let Some(message) = signals.next().await {
                let event = match decode(kind, &message) {
                    Ok(Some(event)) => event,
                    Ok(None) => continue,
                    Err(err) => {
                        tracing::warn!(signal = kind.signal_name(), error = %err, "undecodable daemon signal");
                        continue;
                    }
                };
                if events.send(BusEvent::Remote { epoch, event }).is_err() {
                    break;
                }
            }
        });
        self.pumps.lock().await.push(pump);
        Ok(())
    }

    async fn unsubscribe_all(&self) {
        for pump in self.pumps.lock().await.drain(..) {
            pump.abort();
        }
    }
}

impl Drop for DbusTransport {
    fn drop(&mut self) {
        if let Some(presence) = self.presence.get_mut().take() {
            presence.abort();
        }
        for pump in self.pumps.get_mut().drain(..) {
            pump.abort();
        }
    }
}

/// Connect to the configured bus and spawn a controller on it.
pub async fn spawn(
    config: ControllerConfig,
) -> Result<
    (
        ControllerHandle,
        broadcast::Receiver<ControllerEvent>,
        JoinHandle<Result<(), ControllerError>>,
    ),
    ControllerError,
> {
    let (bus_tx, bus_rx) = mpsc::unbounded_channel();
    let transport = DbusTransport::connect(&config, bus_tx).await?;
    let controller = SyncController::new(config, transport);
    Ok(runtime::spawn(controller, bus_rx))
}

async fn invoke(proxy: &Proxy<'_>, call: RemoteCall) -> Result<Reply, TransportError> {
    let method = call.method();
    let fail = |err: zbus::Error| remote(method, err);
    let reply = match call {
        RemoteCall::StartSync(profile) => {
            let accepted: bool = proxy.call(method, &(profile.as_str(),)).await.map_err(fail)?;
            Reply::Bool(accepted)
        }
        RemoteCall::AbortSync(profile) => {
            let () = proxy.call(method, &(profile.as_str(),)).await.map_err(fail)?;
            Reply::Unit
        }
        RemoteCall::RunningSyncs => {
            let running: Vec<String> = proxy.call(method, &()).await.map_err(fail)?;
            Reply::Strings(running)
        }
        RemoteCall::RemoveProfile(profile) => {
            let removed: bool = proxy.call(method, &(profile.as_str(),)).await.map_err(fail)?;
            Reply::Bool(removed)
        }
        RemoteCall::SyncProfilesByKey { key, value } => {
            let documents: Vec<String> = proxy
                .call(method, &(key.as_str(), value.as_str()))
                .await
                .map_err(fail)?;
            Reply::Strings(documents)
        }
    };
    Ok(reply)
}

fn decode(kind: RemoteEventKind, message: &Message) -> zbus::Result<Option<RemoteEvent>> {
    let body = message.body();
    Ok(match kind {
        RemoteEventKind::SyncStatus => sync_status_event(body.deserialize::<SyncStatusBody>()?),
        RemoteEventKind::ProfileChanged => {
            profile_changed_event(body.deserialize::<ProfileChangedBody>()?)
        }
    })
}

/// Unknown status codes are dropped.
fn sync_status_event((profile, code, message, details): SyncStatusBody) -> Option<RemoteEvent> {
    let Some(status) = SyncStatus::from_code(code) else {
        tracing::warn!(profile = %profile, code, "unknown sync status code");
        return None;
    };
    Some(RemoteEvent::SyncStatus {
        profile: ProfileId::from(profile),
        status,
        message,
        details,
    })
}

/// Unknown change codes are dropped.
fn profile_changed_event((profile, code, document): ProfileChangedBody) -> Option<RemoteEvent> {
    let Some(change) = ProfileChangeType::from_code(code) else {
        tracing::warn!(profile = %profile, code, "unknown profile change code");
        return None;
    };
    Some(RemoteEvent::ProfileChanged {
        profile: ProfileId::from(profile),
        change,
        document,
    })
}

fn remote(method: &'static str, err: zbus::Error) -> TransportError {
    TransportError::Remote {
        method,
        message: err.to_string(),
    }
}
