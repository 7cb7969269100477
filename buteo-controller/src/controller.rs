//! The public-facing sync controller.
//!
//! Owns the [`Supervisor`], the profile cache and the pending-call table, and
//! turns daemon traffic into [`ControllerEvent`]s. Everything runs on one
//! timeline: public operations and [`SyncController::handle_event`] take
//! `&mut self` and are never interleaved.
//!
//! Cache rules:
//! - the index is only ever replaced wholesale, by the latest issued refresh;
//! - a disconnect clears it, together with all pending calls;
//! - `syncing` reads `true` from a successful `start_sync` until the next
//!   daemon status signal, whatever profile it is for.

use std::collections::BTreeSet;

use serde::Serialize;

use buteo_core::{
    parse_all, Category, ControllerConfig, ProfileChangeType, ProfileId, ProfileIndex, SyncStatus,
};

use crate::error::{ControllerError, TransportError};
use crate::listeners::Listeners;
use crate::pending::{PendingCalls, PendingOp};
use crate::supervisor::{Supervisor, Transition};
use crate::transport::{BusEvent, CallTicket, Epoch, RemoteCall, RemoteEvent, Reply, Transport};

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControllerEvent {
    ConnectionChanged {
        connected: bool,
    },
    /// Re-read `syncing`.
    SyncStatusChanged,
    /// Re-read `profiles_count` and `visible_sync_profiles`.
    ProfilesChanged,
    ProfileChanged {
        profile: ProfileId,
        change: ProfileChangeType,
        document: String,
    },
    SyncStatus {
        profile: ProfileId,
        status: SyncStatus,
        message: String,
        details: i32,
    },
}

pub struct SyncController<T> {
    config: ControllerConfig,
    supervisor: Supervisor<T>,
    index: ProfileIndex,
    pending: PendingCalls,
    latest_refresh: Option<CallTicket>,
    awaiting_start: bool,
    listeners: Listeners<ControllerEvent>,
}

impl<T: Transport> SyncController<T> {
    pub fn new(config: ControllerConfig, transport: T) -> Self {
        Self {
            config,
            supervisor: Supervisor::new(transport),
            index: ProfileIndex::new(),
            pending: PendingCalls::default(),
            latest_refresh: None,
            awaiting_start: false,
            listeners: Listeners::new(),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn supervisor(&self) -> &Supervisor<T> {
        &self.supervisor
    }

    /// For registering connection and raw signal handlers.
    pub fn supervisor_mut(&mut self) -> &mut Supervisor<T> {
        &mut self.supervisor
    }

    pub fn on_event<F>(&mut self, handler: F)
    where
        F: FnMut(&ControllerEvent) + Send + Sync + 'static,
    {
        self.listeners.add(handler);
    }

    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }

    pub fn epoch(&self) -> Epoch {
        self.supervisor.epoch()
    }

    pub fn index(&self) -> &ProfileIndex {
        &self.index
    }

    pub fn is_refreshing(&self) -> bool {
        self.latest_refresh.is_some()
    }

    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    // -----------------------------------------------------------------------
    // Observable properties
    // -----------------------------------------------------------------------

    /// `true` while a start is awaiting its first status signal or while the
    /// daemon reports running syncs.
    pub async fn syncing(&self) -> bool {
        if self.awaiting_start {
            return true;
        }
        if !self.is_connected() {
            return false;
        }
        !self.running_sync_list().await.is_empty()
    }

    pub fn profiles_count(&self) -> usize {
        self.index.len()
    }

    pub fn visible_sync_profiles(&self) -> Vec<ProfileId> {
        self.index.profile_ids(None, self.config.visible_enabled_only)
    }

    // -----------------------------------------------------------------------
    // Lifecycle and event intake
    // -----------------------------------------------------------------------

    /// Begin watching daemon presence and try to connect right away.
    pub async fn start(&mut self) {
        self.supervisor.watch().await;
        self.service_appeared().await;
    }

    pub async fn handle_event(&mut self, event: BusEvent) {
        match event {
            BusEvent::ServiceAppeared => self.service_appeared().await,
            BusEvent::ServiceVanished => self.service_vanished().await,
            BusEvent::Remote { epoch, event } => self.remote_event(epoch, event),
            BusEvent::CallFinished { ticket, reply } => self.call_finished(ticket, reply),
        }
    }

    async fn service_appeared(&mut self) {
        match self.supervisor.connect().await {
            Transition::Connected(_) => {
                self.awaiting_start = false;
                self.emit(ControllerEvent::ConnectionChanged { connected: true });
                self.refresh_profiles();
                self.emit(ControllerEvent::SyncStatusChanged);
            }
            Transition::Unchanged => tracing::debug!("sync daemon already connected"),
            Transition::Failed => {}
        }
    }

    async fn service_vanished(&mut self) {
        if !self.supervisor.disconnect().await {
            return;
        }
        self.pending.clear();
        self.latest_refresh = None;
        self.awaiting_start = false;
        self.index.clear();

        self.emit(ControllerEvent::ConnectionChanged { connected: false });
        self.emit(ControllerEvent::ProfilesChanged);
        self.emit(ControllerEvent::SyncStatusChanged);
    }

    fn remote_event(&mut self, epoch: Epoch, event: RemoteEvent) {
        if !self.supervisor.accept_remote(epoch, &event) {
            return;
        }
        match event {
            RemoteEvent::SyncStatus {
                profile,
                status,
                message,
                details,
            } => {
                self.awaiting_start = false;
                self.emit(ControllerEvent::SyncStatus {
                    profile,
                    status,
                    message,
                    details,
                });
                self.emit(ControllerEvent::SyncStatusChanged);
            }
            RemoteEvent::ProfileChanged {
                profile,
                change,
                document,
            } => {
                self.emit(ControllerEvent::ProfileChanged {
                    profile,
                    change,
                    document,
                });
                self.emit(ControllerEvent::ProfilesChanged);
                self.refresh_profiles();
            }
        }
    }

    fn call_finished(&mut self, ticket: CallTicket, reply: Result<Reply, TransportError>) {
        if ticket.epoch != self.supervisor.epoch() {
            tracing::debug!(
                epoch = %ticket.epoch,
                id = ticket.id,
                "dropping completion from an earlier connection"
            );
            return;
        }
        let Some(op) = self.pending.complete(ticket) else {
            tracing::debug!(id = ticket.id, "dropping completion for a forgotten call");
            return;
        };

        match op {
            PendingOp::Refresh => self.refresh_finished(ticket, reply),
            PendingOp::StartSync(profile) => {
                match reply.and_then(|reply| reply.into_bool("startSync")) {
                    Ok(true) => tracing::debug!(profile = %profile, "sync start accepted"),
                    Ok(false) => {
                        tracing::warn!(profile = %profile, "daemon refused to start sync")
                    }
                    Err(err) => {
                        tracing::warn!(profile = %profile, error = %err, "failed to start sync")
                    }
                }
            }
            PendingOp::AbortSync(profile) => {
                if let Err(err) = reply {
                    tracing::warn!(profile = %profile, error = %err, "failed to abort sync");
                }
            }
        }
    }

    fn refresh_finished(&mut self, ticket: CallTicket, reply: Result<Reply, TransportError>) {
        if self.latest_refresh != Some(ticket) {
            tracing::debug!(id = ticket.id, "dropping superseded profile refresh");
            return;
        }
        self.latest_refresh = None;

        let documents = match reply.and_then(|reply| reply.into_strings("syncProfilesByKey")) {
            Ok(documents) => documents,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load sync profiles");
                Vec::new()
            }
        };
        self.replace_index(parse_all(documents));
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Ask the daemon for all matching profiles; the cache is replaced when
    /// the reply arrives. A refresh already in flight is superseded.
    pub fn refresh_profiles(&mut self) -> bool {
        let call = self.refresh_call();
        match self.dispatch(PendingOp::Refresh, call) {
            Ok(ticket) => {
                if let Some(stale) = self.latest_refresh.replace(ticket) {
                    self.pending.cancel(stale);
                }
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to request sync profiles");
                false
            }
        }
    }

    /// Blocking variant of [`Self::refresh_profiles`]; also supersedes any
    /// refresh in flight.
    pub async fn refresh_profiles_now(&mut self) -> Result<(), ControllerError> {
        let call = self.refresh_call();
        let method = call.method();
        let documents = self.supervisor.call(call).await?.into_strings(method)?;
        if let Some(stale) = self.latest_refresh.take() {
            self.pending.cancel(stale);
        }
        self.replace_index(parse_all(documents));
        Ok(())
    }

    /// Fire-and-forget start. `true` once the request is on the bus.
    pub fn start_sync(&mut self, profile: &ProfileId) -> bool {
        let op = PendingOp::StartSync(profile.clone());
        match self.dispatch(op, RemoteCall::StartSync(profile.clone())) {
            Ok(_) => {
                if !self.awaiting_start {
                    self.awaiting_start = true;
                    self.emit(ControllerEvent::SyncStatusChanged);
                }
                true
            }
            Err(err) => {
                tracing::warn!(profile = %profile, error = %err, "failed to start sync");
                false
            }
        }
    }

    /// Start every enabled profile of `category`, stopping at the first
    /// failed dispatch. Loads the profiles first if the category is not
    /// cached.
    pub async fn start_sync_by_category(&mut self, category: &Category) -> bool {
        if !self.is_connected() {
            tracing::warn!(category = %category, "cannot start sync: not connected");
            return false;
        }
        if !self.index.contains_category(category) {
            if let Err(err) = self.refresh_profiles_now().await {
                tracing::warn!(category = %category, error = %err, "failed to load sync profiles");
                return false;
            }
        }

        for profile in self.sync_profiles_by_category(category) {
            if !self.start_sync(&profile) {
                return false;
            }
        }
        true
    }

    pub fn abort_sync(&mut self, profile: &ProfileId) {
        let op = PendingOp::AbortSync(profile.clone());
        if let Err(err) = self.dispatch(op, RemoteCall::AbortSync(profile.clone())) {
            tracing::warn!(profile = %profile, error = %err, "failed to abort sync");
        }
    }

    /// Profiles the daemon is syncing right now; empty on any failure.
    pub async fn running_sync_list(&self) -> BTreeSet<ProfileId> {
        match self.query_running_syncs().await {
            Ok(running) => running,
            Err(ControllerError::NotConnected) => BTreeSet::new(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to query running syncs");
                BTreeSet::new()
            }
        }
    }

    /// Enabled profile ids of `category`, from the cache.
    pub fn sync_profiles_by_category(&self, category: &Category) -> Vec<ProfileId> {
        self.index.profile_ids(Some(category), true)
    }

    pub async fn remove_profile(&self, profile: &ProfileId) -> bool {
        match self.try_remove_profile(profile).await {
            Ok(removed) => removed,
            Err(err) => {
                tracing::warn!(profile = %profile, error = %err, "failed to remove profile");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn refresh_call(&self) -> RemoteCall {
        RemoteCall::SyncProfilesByKey {
            key: self.config.profile_filter.key.clone(),
            value: self.config.profile_filter.value.clone(),
        }
    }

    fn dispatch(&mut self, op: PendingOp, call: RemoteCall) -> Result<CallTicket, ControllerError> {
        if !self.is_connected() {
            return Err(ControllerError::NotConnected);
        }
        let ticket = self.pending.issue(self.supervisor.epoch(), op);
        if let Err(err) = self.supervisor.call_async(ticket, call) {
            self.pending.cancel(ticket);
            return Err(err);
        }
        Ok(ticket)
    }

    async fn query_running_syncs(&self) -> Result<BTreeSet<ProfileId>, ControllerError> {
        let call = RemoteCall::RunningSyncs;
        let method = call.method();
        let running = self.supervisor.call(call).await?.into_strings(method)?;
        Ok(running.into_iter().map(ProfileId::from).collect())
    }

    async fn try_remove_profile(&self, profile: &ProfileId) -> Result<bool, ControllerError> {
        let call = RemoteCall::RemoveProfile(profile.clone());
        let method = call.method();
        Ok(self.supervisor.call(call).await?.into_bool(method)?)
    }

    fn replace_index(&mut self, index: ProfileIndex) {
        self.index = index;
        self.emit(ControllerEvent::ProfilesChanged);
    }

    fn emit(&mut self, event: ControllerEvent) {
        self.listeners.emit(&event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::fake::{FakeTransport, Recorded};
    use crate::transport::RemoteEventKind;

    type Events = Arc<Mutex<Vec<ControllerEvent>>>;

    fn doc(name: &str, category: &str, enabled: Option<&str>) -> String {
        let enabled = enabled
            .map(|value| format!(r#"<key name="enabled" value="{value}"/>"#))
            .unwrap_or_default();
        format!(
            r#"<profile type="sync" name="{name}"><key name="category" value="{category}"/>{enabled}</profile>"#
        )
    }

    fn sample_batch() -> Vec<String> {
        vec![
            doc("a", "X", None),
            doc("b", "X", Some("false")),
            doc("c", "Y", Some("true")),
            "<profile name=".to_string(),
        ]
    }

    fn take(events: &Events) -> Vec<ControllerEvent> {
        std::mem::take(&mut *events.lock().unwrap())
    }

    fn ids(names: &[&str]) -> Vec<ProfileId> {
        names.iter().copied().map(ProfileId::from).collect()
    }

    async fn started(
        config: ControllerConfig,
    ) -> (SyncController<FakeTransport>, FakeTransport, Events) {
        let transport = FakeTransport::new();
        let mut controller = SyncController::new(config, transport.clone());
        let events: Events = Arc::default();
        let sink = events.clone();
        controller.on_event(move |event| sink.lock().unwrap().push(event.clone()));
        controller.start().await;
        (controller, transport, events)
    }

    fn last_refresh(transport: &FakeTransport) -> CallTicket {
        transport
            .async_calls(Some("syncProfilesByKey"))
            .last()
            .map(|(ticket, _)| *ticket)
            .expect("a refresh was dispatched")
    }

    async fn complete(
        controller: &mut SyncController<FakeTransport>,
        ticket: CallTicket,
        reply: Result<Reply, TransportError>,
    ) {
        controller
            .handle_event(BusEvent::CallFinished { ticket, reply })
            .await;
    }

    async fn finish_refresh(
        controller: &mut SyncController<FakeTransport>,
        transport: &FakeTransport,
        documents: Vec<String>,
    ) {
        let ticket = last_refresh(transport);
        complete(controller, ticket, Ok(Reply::Strings(documents))).await;
    }

    fn status_signal(epoch: Epoch, profile: &str) -> BusEvent {
        BusEvent::Remote {
            epoch,
            event: RemoteEvent::SyncStatus {
                profile: ProfileId::from(profile),
                status: SyncStatus::Started,
                message: String::new(),
                details: 0,
            },
        }
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn start_connects_then_requests_profiles() {
        let (controller, transport, events) = started(ControllerConfig::default()).await;

        assert!(controller.is_connected());
        assert!(controller.is_refreshing());
        let log = transport.recorded();
        assert_eq!(log[0], Recorded::WatchPresence);
        assert_eq!(log[1], Recorded::Probe);
        assert_eq!(log[2], Recorded::Subscribe(Epoch(0), RemoteEventKind::SyncStatus));
        assert_eq!(log[3], Recorded::Subscribe(Epoch(0), RemoteEventKind::ProfileChanged));
        assert!(matches!(
            &log[4],
            Recorded::CallAsync(_, RemoteCall::SyncProfilesByKey { key, value })
                if key == "use_accounts" && value == "true"
        ));
        assert_eq!(
            take(&events),
            vec![
                ControllerEvent::ConnectionChanged { connected: true },
                ControllerEvent::SyncStatusChanged,
            ]
        );
    }

    #[tokio::test]
    async fn unreachable_daemon_stays_disconnected_and_silent() {
        let transport = FakeTransport::new();
        transport.set_reachable(false);
        let mut controller = SyncController::new(ControllerConfig::default(), transport.clone());
        let events: Events = Arc::default();
        let sink = events.clone();
        controller.on_event(move |event| sink.lock().unwrap().push(event.clone()));

        controller.start().await;

        assert!(!controller.is_connected());
        assert!(take(&events).is_empty());
        assert!(transport.async_calls(None).is_empty());
    }

    #[tokio::test]
    async fn repeated_appearance_is_ignored_while_connected() {
        let (mut controller, transport, events) = started(ControllerConfig::default()).await;
        take(&events);

        controller.handle_event(BusEvent::ServiceAppeared).await;

        assert!(take(&events).is_empty());
        assert_eq!(transport.async_calls(Some("syncProfilesByKey")).len(), 1);
    }

    #[tokio::test]
    async fn disconnect_resets_cache_and_discards_late_completions() {
        let (mut controller, transport, events) = started(ControllerConfig::default()).await;
        finish_refresh(&mut controller, &transport, sample_batch()).await;
        assert!(controller.start_sync(&ProfileId::from("a")));
        controller.refresh_profiles();
        let stale_refresh = last_refresh(&transport);
        take(&events);

        controller.handle_event(BusEvent::ServiceVanished).await;

        assert!(!controller.is_connected());
        assert_eq!(controller.epoch(), Epoch(1));
        assert_eq!(controller.profiles_count(), 0);
        assert!(controller.visible_sync_profiles().is_empty());
        assert!(!controller.syncing().await);
        assert_eq!(controller.pending_calls(), 0);
        assert!(!controller.is_refreshing());
        assert_eq!(
            take(&events),
            vec![
                ControllerEvent::ConnectionChanged { connected: false },
                ControllerEvent::ProfilesChanged,
                ControllerEvent::SyncStatusChanged,
            ]
        );

        complete(
            &mut controller,
            stale_refresh,
            Ok(Reply::Strings(vec![doc("z", "X", None)])),
        )
        .await;
        assert_eq!(controller.profiles_count(), 0);
        assert!(take(&events).is_empty());

        controller.handle_event(BusEvent::ServiceVanished).await;
        assert!(take(&events).is_empty(), "second vanish is a no-op");
    }

    #[tokio::test]
    async fn reconnect_subscribes_under_new_epoch_and_refreshes() {
        let (mut controller, transport, events) = started(ControllerConfig::default()).await;
        controller.handle_event(BusEvent::ServiceVanished).await;
        transport.clear_recorded();
        take(&events);

        controller.handle_event(BusEvent::ServiceAppeared).await;

        assert!(controller.is_connected());
        let log = transport.recorded();
        assert!(log.contains(&Recorded::Subscribe(Epoch(1), RemoteEventKind::SyncStatus)));
        let refreshes = transport.async_calls(Some("syncProfilesByKey"));
        assert_eq!(refreshes.len(), 1);
        assert_eq!(refreshes[0].0.epoch, Epoch(1));
        assert_eq!(
            take(&events),
            vec![
                ControllerEvent::ConnectionChanged { connected: true },
                ControllerEvent::SyncStatusChanged,
            ]
        );
    }

    #[tokio::test]
    async fn signals_from_an_earlier_connection_are_ignored() {
        let (mut controller, _transport, events) = started(ControllerConfig::default()).await;
        controller.handle_event(BusEvent::ServiceVanished).await;
        controller.handle_event(BusEvent::ServiceAppeared).await;
        assert!(controller.start_sync(&ProfileId::from("a")));
        take(&events);

        controller.handle_event(status_signal(Epoch(0), "a")).await;

        assert!(take(&events).is_empty());
        assert!(controller.syncing().await, "still awaiting the first status");
    }

    // -----------------------------------------------------------------------
    // Profile cache
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn refresh_reply_rebuilds_index() {
        let (mut controller, transport, events) = started(ControllerConfig::default()).await;
        take(&events);

        finish_refresh(&mut controller, &transport, sample_batch()).await;

        assert!(!controller.is_refreshing());
        assert_eq!(controller.profiles_count(), 3);
        assert_eq!(controller.visible_sync_profiles(), ids(&["a", "b", "c"]));
        assert_eq!(
            controller.sync_profiles_by_category(&Category::from("X")),
            ids(&["a"])
        );
        assert_eq!(take(&events), vec![ControllerEvent::ProfilesChanged]);
    }

    #[tokio::test]
    async fn visible_profiles_can_hide_disabled_ones() {
        let config = ControllerConfig {
            visible_enabled_only: true,
            ..ControllerConfig::default()
        };
        let (mut controller, transport, _events) = started(config).await;

        finish_refresh(&mut controller, &transport, sample_batch()).await;

        assert_eq!(controller.profiles_count(), 3);
        assert_eq!(controller.visible_sync_profiles(), ids(&["a", "c"]));
    }

    #[tokio::test]
    async fn last_issued_refresh_wins() {
        let (mut controller, transport, _events) = started(ControllerConfig::default()).await;
        let first = last_refresh(&transport);
        assert!(controller.refresh_profiles());
        let second = last_refresh(&transport);
        assert_ne!(first, second);

        complete(
            &mut controller,
            second,
            Ok(Reply::Strings(vec![doc("b", "X", None), doc("c", "Y", None)])),
        )
        .await;
        complete(
            &mut controller,
            first,
            Ok(Reply::Strings(vec![doc("a", "X", None)])),
        )
        .await;

        assert_eq!(controller.visible_sync_profiles(), ids(&["b", "c"]));
        assert_eq!(controller.pending_calls(), 0);
    }

    #[tokio::test]
    async fn failed_refresh_leaves_an_empty_cache() {
        let (mut controller, transport, events) = started(ControllerConfig::default()).await;
        finish_refresh(&mut controller, &transport, sample_batch()).await;
        controller.refresh_profiles();
        take(&events);

        let ticket = last_refresh(&transport);
        let failure = TransportError::Remote {
            method: "syncProfilesByKey",
            message: "timeout".to_string(),
        };
        complete(&mut controller, ticket, Err(failure)).await;

        assert_eq!(controller.profiles_count(), 0);
        assert_eq!(take(&events), vec![ControllerEvent::ProfilesChanged]);
    }

    #[tokio::test]
    async fn profile_change_signal_triggers_refresh() {
        let (mut controller, transport, events) = started(ControllerConfig::default()).await;
        finish_refresh(&mut controller, &transport, sample_batch()).await;
        take(&events);

        controller
            .handle_event(BusEvent::Remote {
                epoch: Epoch(0),
                event: RemoteEvent::ProfileChanged {
                    profile: ProfileId::from("c"),
                    change: ProfileChangeType::Removed,
                    document: String::new(),
                },
            })
            .await;

        assert_eq!(
            take(&events),
            vec![
                ControllerEvent::ProfileChanged {
                    profile: ProfileId::from("c"),
                    change: ProfileChangeType::Removed,
                    document: String::new(),
                },
                ControllerEvent::ProfilesChanged,
            ]
        );
        assert_eq!(transport.async_calls(Some("syncProfilesByKey")).len(), 2);
        assert!(controller.is_refreshing());
    }

    // -----------------------------------------------------------------------
    // Sync operations
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn start_sync_reports_syncing_until_first_status() {
        let (mut controller, transport, events) = started(ControllerConfig::default()).await;
        take(&events);

        assert!(controller.start_sync(&ProfileId::from("a")));
        assert!(controller.start_sync(&ProfileId::from("b")));
        assert!(controller.syncing().await);
        assert_eq!(take(&events), vec![ControllerEvent::SyncStatusChanged]);

        let (ticket, _) = transport.async_calls(Some("startSync"))[0].clone();
        complete(&mut controller, ticket, Ok(Reply::Bool(true))).await;
        assert!(controller.syncing().await, "completion alone does not clear it");

        controller.handle_event(status_signal(Epoch(0), "other")).await;
        assert!(!controller.syncing().await);
        assert_eq!(
            take(&events),
            vec![
                ControllerEvent::SyncStatus {
                    profile: ProfileId::from("other"),
                    status: SyncStatus::Started,
                    message: String::new(),
                    details: 0,
                },
                ControllerEvent::SyncStatusChanged,
            ]
        );
    }

    #[tokio::test]
    async fn running_syncs_on_the_daemon_count_as_syncing() {
        let (controller, transport, _events) = started(ControllerConfig::default()).await;
        assert!(!controller.syncing().await);

        transport.set_reply("runningSyncs", Ok(Reply::Strings(vec!["p9".to_string()])));

        assert!(controller.syncing().await);
        assert_eq!(
            controller.running_sync_list().await,
            BTreeSet::from([ProfileId::from("p9")])
        );
    }

    #[tokio::test]
    async fn running_sync_list_is_empty_on_failure() {
        let (controller, transport, _events) = started(ControllerConfig::default()).await;
        transport.set_reply(
            "runningSyncs",
            Err(TransportError::Remote {
                method: "runningSyncs",
                message: "no reply".to_string(),
            }),
        );

        assert!(controller.running_sync_list().await.is_empty());
        assert!(!controller.syncing().await);
    }

    #[tokio::test]
    async fn category_start_covers_only_enabled_profiles() {
        let (mut controller, transport, _events) = started(ControllerConfig::default()).await;
        let batch = vec![
            doc("a", "X", None),
            doc("b", "X", Some("false")),
            doc("d", "X", Some("true")),
            doc("c", "Y", None),
        ];
        finish_refresh(&mut controller, &transport, batch).await;

        assert!(controller.start_sync_by_category(&Category::from("X")).await);

        let started: Vec<RemoteCall> = transport
            .async_calls(Some("startSync"))
            .into_iter()
            .map(|(_, call)| call)
            .collect();
        assert_eq!(
            started,
            vec![
                RemoteCall::StartSync(ProfileId::from("a")),
                RemoteCall::StartSync(ProfileId::from("d")),
            ]
        );
        assert!(transport.sync_calls().is_empty(), "cached category needs no reload");
    }

    #[tokio::test]
    async fn uncached_category_is_loaded_before_starting() {
        let (mut controller, transport, _events) = started(ControllerConfig::default()).await;
        let in_flight = last_refresh(&transport);
        transport.set_reply(
            "syncProfilesByKey",
            Ok(Reply::Strings(vec![doc("m", "Z", None), doc("n", "Z", Some("false"))])),
        );

        assert!(controller.start_sync_by_category(&Category::from("Z")).await);

        assert!(matches!(
            transport.sync_calls().as_slice(),
            [RemoteCall::SyncProfilesByKey { .. }]
        ));
        assert!(!controller.is_refreshing(), "blocking load supersedes the async one");
        let started = transport.async_calls(Some("startSync"));
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].1, RemoteCall::StartSync(ProfileId::from("m")));

        complete(&mut controller, in_flight, Ok(Reply::Strings(Vec::new()))).await;
        assert_eq!(controller.profiles_count(), 2, "superseded reply is dropped");
    }

    #[tokio::test]
    async fn empty_category_starts_nothing_and_succeeds() {
        let (mut controller, transport, _events) = started(ControllerConfig::default()).await;

        assert!(controller.start_sync_by_category(&Category::from("nothing")).await);
        assert!(transport.async_calls(Some("startSync")).is_empty());
    }

    #[tokio::test]
    async fn category_start_stops_at_first_failed_dispatch() {
        let (mut controller, transport, _events) = started(ControllerConfig::default()).await;
        let batch = vec![
            doc("a", "X", None),
            doc("b", "X", None),
            doc("c", "X", None),
        ];
        finish_refresh(&mut controller, &transport, batch).await;
        transport.limit_dispatches(1);

        assert!(!controller.start_sync_by_category(&Category::from("X")).await);

        assert_eq!(transport.async_calls(Some("startSync")).len(), 1);
        assert_eq!(controller.pending_calls(), 1, "failed dispatch leaves no ticket");
    }

    #[tokio::test]
    async fn remove_profile_reports_daemon_answer() {
        let (controller, transport, _events) = started(ControllerConfig::default()).await;
        let profile = ProfileId::from("a");

        transport.set_reply("removeProfile", Ok(Reply::Bool(true)));
        assert!(controller.remove_profile(&profile).await);

        transport.set_reply("removeProfile", Ok(Reply::Bool(false)));
        assert!(!controller.remove_profile(&profile).await);

        transport.set_reply(
            "removeProfile",
            Err(TransportError::Remote {
                method: "removeProfile",
                message: "denied".to_string(),
            }),
        );
        assert!(!controller.remove_profile(&profile).await);
    }

    #[tokio::test]
    async fn abort_is_dispatched_and_its_completion_consumed() {
        let (mut controller, transport, _events) = started(ControllerConfig::default()).await;
        finish_refresh(&mut controller, &transport, Vec::new()).await;

        controller.abort_sync(&ProfileId::from("a"));
        let aborts = transport.async_calls(Some("abortSync"));
        assert_eq!(aborts.len(), 1);
        assert_eq!(controller.pending_calls(), 1);

        complete(&mut controller, aborts[0].0, Ok(Reply::Unit)).await;
        assert_eq!(controller.pending_calls(), 0);
    }

    #[tokio::test]
    async fn operations_fail_fast_while_disconnected() {
        let transport = FakeTransport::new();
        transport.set_reachable(false);
        let mut controller = SyncController::new(ControllerConfig::default(), transport.clone());
        controller.start().await;
        let profile = ProfileId::from("a");

        assert!(!controller.start_sync(&profile));
        assert!(!controller.refresh_profiles());
        assert!(!controller.start_sync_by_category(&Category::from("X")).await);
        assert!(!controller.remove_profile(&profile).await);
        controller.abort_sync(&profile);
        assert!(matches!(
            controller.refresh_profiles_now().await,
            Err(ControllerError::NotConnected)
        ));
        assert!(controller.running_sync_list().await.is_empty());
        assert!(!controller.syncing().await);

        assert!(transport.async_calls(None).is_empty());
        assert!(transport.sync_calls().is_empty());
    }
}
