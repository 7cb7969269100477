//! In-memory transport for tests: records every interaction and answers
//! calls from a reply table. Completions and signals are delivered by the
//! test itself through `SyncController::handle_event`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::TransportError;
use crate::transport::{CallTicket, Epoch, RemoteCall, RemoteEventKind, Reply, ReplyKind, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    WatchPresence,
    Probe,
    Call(RemoteCall),
    CallAsync(CallTicket, RemoteCall),
    Subscribe(Epoch, RemoteEventKind),
    UnsubscribeAll,
}

struct State {
    log: Vec<Recorded>,
    reachable: bool,
    fail_subscriptions: bool,
    fail_dispatch: bool,
    dispatch_budget: Option<usize>,
    replies: HashMap<&'static str, Result<Reply, TransportError>>,
}

#[derive(Clone)]
pub struct FakeTransport {
    state: Arc<Mutex<State>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                log: Vec::new(),
                reachable: true,
                fail_subscriptions: false,
                fail_dispatch: false,
                dispatch_budget: None,
                replies: HashMap::new(),
            })),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unwrap().reachable = reachable;
    }

    pub fn fail_subscriptions(&self, fail: bool) {
        self.state.lock().unwrap().fail_subscriptions = fail;
    }

    pub fn fail_dispatch(&self, fail: bool) {
        self.state.lock().unwrap().fail_dispatch = fail;
    }

    /// Let `count` more async dispatches through, then fail the rest.
    pub fn limit_dispatches(&self, count: usize) {
        self.state.lock().unwrap().dispatch_budget = Some(count);
    }

    /// Reply returned by synchronous calls to `method`.
    pub fn set_reply(&self, method: &'static str, reply: Result<Reply, TransportError>) {
        self.state.lock().unwrap().replies.insert(method, reply);
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn clear_recorded(&self) {
        self.state.lock().unwrap().log.clear();
    }

    /// Async dispatches in order, optionally restricted to one method.
    pub fn async_calls(&self, method: Option<&str>) -> Vec<(CallTicket, RemoteCall)> {
        self.recorded()
            .into_iter()
            .filter_map(|entry| match entry {
                Recorded::CallAsync(ticket, call)
                    if method.map_or(true, |method| call.method() == method) =>
                {
                    Some((ticket, call))
                }
                _ => None,
            })
            .collect()
    }

    pub fn sync_calls(&self) -> Vec<RemoteCall> {
        self.recorded()
            .into_iter()
            .filter_map(|entry| match entry {
                Recorded::Call(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    fn record(&self, entry: Recorded) {
        self.state.lock().unwrap().log.push(entry);
    }

    fn probe_result(&self) -> Result<(), TransportError> {
        let state = self.state.lock().unwrap();
        if state.reachable {
            Ok(())
        } else {
            Err(TransportError::Remote {
                method: "NameHasOwner",
                message: "service not running".to_string(),
            })
        }
    }

    fn reply_for(&self, call: &RemoteCall) -> Result<Reply, TransportError> {
        let state = self.state.lock().unwrap();
        match state.replies.get(call.method()) {
            Some(reply) => reply.clone(),
            None => Ok(match call.reply_kind() {
                ReplyKind::Unit => Reply::Unit,
                ReplyKind::Bool => Reply::Bool(true),
                ReplyKind::Strings => Reply::Strings(Vec::new()),
            }),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn watch_presence(&self) -> Result<(), TransportError> {
        self.record(Recorded::WatchPresence);
        Ok(())
    }

    async fn probe(&self) -> Result<(), TransportError> {
        self.record(Recorded::Probe);
        self.probe_result()
    }

    async fn call(&self, call: RemoteCall) -> Result<Reply, TransportError> {
        let reply = self.reply_for(&call);
        self.record(Recorded::Call(call));
        reply
    }

    fn call_async(&self, ticket: CallTicket, call: RemoteCall) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        let exhausted = match state.dispatch_budget.as_mut() {
            Some(0) => true,
            Some(budget) => {
                *budget -= 1;
                false
            }
            None => false,
        };
        if state.fail_dispatch || exhausted {
            return Err(TransportError::Dispatch("bus connection lost".to_string()));
        }
        state.log.push(Recorded::CallAsync(ticket, call));
        Ok(())
    }

    async fn subscribe(&self, epoch: Epoch, kind: RemoteEventKind) -> Result<(), TransportError> {
        self.record(Recorded::Subscribe(epoch, kind));
        if self.state.lock().unwrap().fail_subscriptions {
            return Err(TransportError::Remote {
                method: "AddMatch",
                message: "access denied".to_string(),
            });
        }
        Ok(())
    }

    async fn unsubscribe_all(&self) {
        self.record(Recorded::UnsubscribeAll);
    }
}
