use std::collections::HashMap;

use buteo_core::ProfileId;

use crate::transport::{CallTicket, Epoch};

/// What an outstanding async call was for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOp {
    Refresh,
    StartSync(ProfileId),
    AbortSync(ProfileId),
}

/// Outstanding async calls keyed by ticket. Cleared wholesale on
/// disconnect; a completion whose ticket is no longer present is stale.
#[derive(Debug, Default)]
pub struct PendingCalls {
    next_id: u64,
    calls: HashMap<CallTicket, PendingOp>,
}

impl PendingCalls {
    pub fn issue(&mut self, epoch: Epoch, op: PendingOp) -> CallTicket {
        self.next_id += 1;
        let ticket = CallTicket {
            epoch,
            id: self.next_id,
        };
        self.calls.insert(ticket, op);
        ticket
    }

    /// Forget a ticket whose dispatch failed.
    pub fn cancel(&mut self, ticket: CallTicket) {
        self.calls.remove(&ticket);
    }

    pub fn complete(&mut self, ticket: CallTicket) -> Option<PendingOp> {
        self.calls.remove(&ticket)
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
