//! Drives a [`SyncController`] on its own task.
//!
//! Bus events and handle commands are drained by one `select!` loop, so the
//! controller sees a single ordered stream of work. Controller events fan
//! out over a broadcast channel.

use std::collections::BTreeSet;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use buteo_core::{Category, ProfileId, ProfileIndex};

use crate::controller::{ControllerEvent, SyncController};
use crate::error::ControllerError;
use crate::transport::{BusEvent, Transport};

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

/// Point-in-time view of the controller's observable properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub connected: bool,
    pub syncing: bool,
    pub profiles_count: usize,
    pub visible_sync_profiles: Vec<ProfileId>,
    pub index: ProfileIndex,
    /// Async calls still waiting for their reply.
    pub pending_calls: usize,
}

enum Command {
    Snapshot {
        respond_to: oneshot::Sender<Snapshot>,
    },
    Refresh {
        respond_to: oneshot::Sender<bool>,
    },
    StartSync {
        profile: ProfileId,
        respond_to: oneshot::Sender<bool>,
    },
    StartSyncByCategory {
        category: Category,
        respond_to: oneshot::Sender<bool>,
    },
    AbortSync {
        profile: ProfileId,
        respond_to: oneshot::Sender<()>,
    },
    RunningSyncs {
        respond_to: oneshot::Sender<BTreeSet<ProfileId>>,
    },
    SyncProfilesByCategory {
        category: Category,
        respond_to: oneshot::Sender<Vec<ProfileId>>,
    },
    RemoveProfile {
        profile: ProfileId,
        respond_to: oneshot::Sender<bool>,
    },
}

/// Cloneable front door to a spawned controller.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    shutdown: broadcast::Sender<()>,
    events: broadcast::Sender<ControllerEvent>,
}

impl ControllerHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Ask the controller task to stop. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    pub async fn snapshot(&self) -> Result<Snapshot, ControllerError> {
        self.request(|respond_to| Command::Snapshot { respond_to })
            .await
    }

    pub async fn refresh_profiles(&self) -> Result<bool, ControllerError> {
        self.request(|respond_to| Command::Refresh { respond_to })
            .await
    }

    pub async fn start_sync(&self, profile: ProfileId) -> Result<bool, ControllerError> {
        self.request(|respond_to| Command::StartSync {
            profile,
            respond_to,
        })
        .await
    }

    pub async fn start_sync_by_category(&self, category: Category) -> Result<bool, ControllerError> {
        self.request(|respond_to| Command::StartSyncByCategory {
            category,
            respond_to,
        })
        .await
    }

    pub async fn abort_sync(&self, profile: ProfileId) -> Result<(), ControllerError> {
        self.request(|respond_to| Command::AbortSync {
            profile,
            respond_to,
        })
        .await
    }

    pub async fn running_sync_list(&self) -> Result<BTreeSet<ProfileId>, ControllerError> {
        self.request(|respond_to| Command::RunningSyncs { respond_to })
            .await
    }

    pub async fn sync_profiles_by_category(
        &self,
        category: Category,
    ) -> Result<Vec<ProfileId>, ControllerError> {
        self.request(|respond_to| Command::SyncProfilesByCategory {
            category,
            respond_to,
        })
        .await
    }

    pub async fn remove_profile(&self, profile: ProfileId) -> Result<bool, ControllerError> {
        self.request(|respond_to| Command::RemoveProfile {
            profile,
            respond_to,
        })
        .await
    }

    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, ControllerError> {
        let (respond_to, reply) = oneshot::channel();
        self.commands
            .send(make(respond_to))
            .await
            .map_err(|_| ControllerError::ChannelClosed("controller commands"))?;
        reply
            .await
            .map_err(|_| ControllerError::ChannelClosed("controller reply"))
    }
}

/// Spawn the controller task. It connects immediately, then serves bus
/// events and handle commands until shutdown.
///
/// The returned receiver is subscribed before the task starts, so it sees
/// the initial `ConnectionChanged`.
pub fn spawn<T>(
    mut controller: SyncController<T>,
    bus_events: mpsc::UnboundedReceiver<BusEvent>,
) -> (
    ControllerHandle,
    broadcast::Receiver<ControllerEvent>,
    JoinHandle<Result<(), ControllerError>>,
)
where
    T: Transport + 'static,
{
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (shutdown_tx, _) = broadcast::channel(1);
    let (events_tx, events_rx) = broadcast::channel(EVENT_CAPACITY);

    let forward = events_tx.clone();
    controller.on_event(move |event| {
        // No subscribers is fine.
        let _ = forward.send(event.clone());
    });

    let handle = ControllerHandle {
        commands: commands_tx,
        shutdown: shutdown_tx.clone(),
        events: events_tx,
    };
    let task = tokio::spawn(run(
        controller,
        bus_events,
        commands_rx,
        shutdown_tx.subscribe(),
    ));
    (handle, events_rx, task)
}

async fn run<T: Transport>(
    mut controller: SyncController<T>,
    mut bus_events: mpsc::UnboundedReceiver<BusEvent>,
    mut commands: mpsc::Receiver<Command>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ControllerError> {
    controller.start().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_event = bus_events.recv() => {
                let Some(event) = maybe_event else {
                    return Err(ControllerError::ChannelClosed("bus events"));
                };
                controller.handle_event(event).await;
            }
            maybe_command = commands.recv() => {
                let Some(command) = maybe_command else { break };
                serve(&mut controller, command).await;
            }
        }
    }

    tracing::debug!("sync controller stopped");
    Ok(())
}

async fn serve<T: Transport>(controller: &mut SyncController<T>, command: Command) {
    // A dropped receiver means the caller gave up; nothing to report.
    match command {
        Command::Snapshot { respond_to } => {
            let _ = respond_to.send(snapshot(controller).await);
        }
        Command::Refresh { respond_to } => {
            let _ = respond_to.send(controller.refresh_profiles());
        }
        Command::StartSync {
            profile,
            respond_to,
        } => {
            let _ = respond_to.send(controller.start_sync(&profile));
        }
        Command::StartSyncByCategory {
            category,
            respond_to,
        } => {
            let _ = respond_to.send(controller.start_sync_by_category(&category).await);
        }
        Command::AbortSync {
            profile,
            respond_to,
        } => {
            controller.abort_sync(&profile);
            let _ = respond_to.send(());
        }
        Command::RunningSyncs { respond_to } => {
            let _ = respond_to.send(controller.running_sync_list().await);
        }
        Command::SyncProfilesByCategory {
            category,
            respond_to,
        } => {
            let _ = respond_to.send(controller.sync_profiles_by_category(&category));
        }
        Command::RemoveProfile {
            profile,
            respond_to,
        } => {
            let _ = respond_to.send(controller.remove_profile(&profile).await);
        }
    }
}

async fn snapshot<T: Transport>(controller: &SyncController<T>) -> Snapshot {
    Snapshot {
        connected: controller.is_connected(),
        syncing: controller.syncing().await,
        profiles_count: controller.profiles_count(),
        visible_sync_profiles: controller.visible_sync_profiles(),
        index: controller.index().clone(),
        pending_calls: controller.pending_calls(),
    }
}

/// Await the controller task, folding a panic or cancellation into
/// [`ControllerError::Task`].
pub async fn join(task: JoinHandle<Result<(), ControllerError>>) -> Result<(), ControllerError> {
    match task.await {
        Ok(inner) => inner,
        Err(err) => Err(ControllerError::Task(format!("join failure: {err}"))),
    }
}

/// Install the fmt subscriber; `RUST_LOG` overrides the default level.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
