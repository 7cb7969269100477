//! One controller per CLI invocation.

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

use buteo_controller::{dbus, runtime, ControllerError, ControllerEvent, ControllerHandle, Snapshot};

use crate::GlobalArgs;

const SETTLE_POLL: Duration = Duration::from_millis(50);

/// Run `future` on a fresh multi-threaded runtime.
pub fn block_on<F, T>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(future)
}

pub struct Session {
    pub handle: ControllerHandle,
    pub events: broadcast::Receiver<ControllerEvent>,
    task: JoinHandle<Result<(), ControllerError>>,
    timeout: Duration,
}

impl Session {
    pub async fn open(global: &GlobalArgs) -> Result<Self> {
        let config = global.load_config()?;
        let service = config.service_name.clone();
        let (handle, events, task) = dbus::spawn(config)
            .await
            .with_context(|| format!("failed to open D-Bus connection for {service}"))?;
        Ok(Self {
            handle,
            events,
            task,
            timeout: global.timeout(),
        })
    }

    /// Open a session and wait for the first profile load.
    pub async fn connect(global: &GlobalArgs) -> Result<(Self, Snapshot)> {
        let mut session = Self::open(global).await?;
        let snapshot = session.ready().await?;
        Ok((session, snapshot))
    }

    /// Fails fast when the daemon is not running; otherwise waits (bounded
    /// by the timeout) for the profile cache to be filled.
    pub async fn ready(&mut self) -> Result<Snapshot> {
        let snapshot = self.snapshot().await?;
        if !snapshot.connected {
            bail!("sync daemon is not reachable (is msyncd running?)");
        }

        let events = &mut self.events;
        timeout(self.timeout, async {
            loop {
                match events.recv().await {
                    Ok(ControllerEvent::ProfilesChanged) => return Ok(()),
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return Err(anyhow!("controller stopped")),
                }
            }
        })
        .await
        .context("timed out waiting for sync profiles")??;

        self.snapshot().await
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        self.handle
            .snapshot()
            .await
            .context("failed to query controller state")
    }

    /// Wait until every dispatched call has been answered, so nothing is
    /// lost when the runtime goes away.
    pub async fn settle(&self) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        while self.snapshot().await?.pending_calls > 0 {
            if Instant::now() >= deadline {
                bail!("timed out waiting for the daemon to answer");
            }
            sleep(SETTLE_POLL).await;
        }
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        self.handle.shutdown();
        runtime::join(self.task)
            .await
            .context("controller task failed")
    }
}
