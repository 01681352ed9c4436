// Copyright (C) 2026 mom-client-core contributors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Per-session commit/rollback state. Two variants: `None` (send/acknowledge pass straight
//! through, commit/rollback always fail) and `Local` (a single open local transaction that
//! commit/rollback atomically replace with a fresh one, even when the underlying provider call
//! failed).

use crate::error::{CoreError, CoreResult};
use crate::ids::{ConnectionId, IdSequence, TransactionId};
use crate::message::{AckType, InboundEnvelope, OutboundEnvelope};
use crate::provider::{Provider, Resource, provider_future};
use crate::request_tracker::RequestTracker;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
enum TxState {
    Active(TransactionId),
    /// The current transaction's outcome cannot be confirmed -- either the discharge call
    /// (commit/rollback) failed, or a fresh transaction could not be declared after a discharge
    /// that did succeed. Sends and acknowledges fail until recovery re-arms the context.
    InDoubt,
}

struct LocalTransaction {
    connection_id: ConnectionId,
    sequence: IdSequence,
    state: Mutex<TxState>,
}

pub enum TransactionContext {
    None,
    Local(LocalTransaction),
}

impl TransactionContext {
    pub fn none() -> Self {
        Self::None
    }

    /// Allocates the session's first transaction id and declares it with the provider. A
    /// transactional session always has an open transaction from creation until shutdown.
    pub fn local(
        connection_id: ConnectionId,
        provider: &dyn Provider,
        tracker: &RequestTracker,
        timeout: Duration,
    ) -> CoreResult<Self> {
        let sequence = IdSequence::new();
        let first_id = TransactionId {
            connection_id: connection_id.clone(),
            sequence: sequence.next(),
        };
        declare_transaction(provider, tracker, &first_id, timeout)?;
        Ok(Self::Local(LocalTransaction {
            connection_id,
            sequence,
            state: Mutex::new(TxState::Active(first_id)),
        }))
    }

    pub fn is_transacted(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// The id to stamp on outbound envelopes/acknowledgements, or `None` for a non-transacted
    /// session or an in-doubt local session (which must not enlist new work under a transaction
    /// that may no longer exist on the broker).
    pub fn current_transaction_id(&self) -> Option<TransactionId> {
        match self {
            Self::None => None,
            Self::Local(local) => match &*local.state.lock().unwrap() {
                TxState::Active(id) => Some(id.clone()),
                TxState::InDoubt => None,
            },
        }
    }

    pub fn is_in_doubt(&self) -> bool {
        match self {
            Self::None => false,
            Self::Local(local) => matches!(&*local.state.lock().unwrap(), TxState::InDoubt),
        }
    }

    /// Tags an outbound envelope with the current transaction, if any. Sends on an in-doubt
    /// local session are refused rather than silently sent outside a transaction.
    pub fn tag_send(&self, envelope: &mut OutboundEnvelope) -> CoreResult<()> {
        if let Self::Local(_) = self {
            if self.is_in_doubt() {
                return Err(CoreError::illegal_state(
                    "transaction is in-doubt, cannot send until recovery re-arms it",
                ));
            }
        }
        envelope.transaction_id = self.current_transaction_id();
        Ok(())
    }

    /// Tags an inbound envelope's acknowledgement with the current transaction, same rules as
    /// `tag_send`.
    pub fn tag_ack(&self, envelope: &InboundEnvelope) -> CoreResult<Option<TransactionId>> {
        if let Self::Local(_) = self {
            if self.is_in_doubt() {
                return Err(CoreError::illegal_state(
                    "transaction is in-doubt, cannot acknowledge until recovery re-arms it",
                ));
            }
        }
        let _ = envelope;
        Ok(self.current_transaction_id())
    }

    pub fn commit(
        &self,
        provider: &dyn Provider,
        tracker: &RequestTracker,
        timeout: Duration,
    ) -> CoreResult<()> {
        self.discharge_and_rearm(provider, tracker, timeout, Discharge::Commit)
    }

    pub fn rollback(
        &self,
        provider: &dyn Provider,
        tracker: &RequestTracker,
        timeout: Duration,
    ) -> CoreResult<()> {
        self.discharge_and_rearm(provider, tracker, timeout, Discharge::Rollback)
    }

    fn discharge_and_rearm(
        &self,
        provider: &dyn Provider,
        tracker: &RequestTracker,
        timeout: Duration,
        kind: Discharge,
    ) -> CoreResult<()> {
        let Self::Local(local) = self else {
            return Err(CoreError::illegal_state("not transacted"));
        };

        let old = {
            let state = local.state.lock().unwrap();
            match &*state {
                TxState::Active(id) => Some(id.clone()),
                TxState::InDoubt => None,
            }
        };

        let discharge_result = match &old {
            Some(id) => match kind {
                Discharge::Commit => discharge_commit(provider, tracker, id, timeout),
                Discharge::Rollback => discharge_rollback(provider, tracker, id, timeout),
            },
            None => Ok(()),
        };

        let next_id = TransactionId {
            connection_id: local.connection_id.clone(),
            sequence: local.sequence.next(),
        };
        let rearm_result = declare_transaction(provider, tracker, &next_id, timeout);

        let mut state = local.state.lock().unwrap();
        *state = match &rearm_result {
            Ok(()) => TxState::Active(next_id),
            Err(_) => TxState::InDoubt,
        };
        drop(state);

        if let Err(e) = discharge_result {
            warn!(error = %e, "transaction discharge failed, rolled over to a fresh transaction regardless");
            return Err(e);
        }
        rearm_result
    }

    /// Called when the provider reports the connection is interrupted: the current transaction
    /// is doomed because the broker may have lost track of it. Recovery must re-arm with a
    /// fresh id before replaying any producer/consumer.
    pub fn mark_interrupted(&self) {
        if let Self::Local(local) = self {
            *local.state.lock().unwrap() = TxState::InDoubt;
        }
    }

    /// Re-arms a local transaction context after recovery, unconditionally allocating and
    /// declaring a fresh transaction id on the new provider handle.
    pub fn rearm_after_recovery(
        &self,
        provider: &dyn Provider,
        tracker: &RequestTracker,
        timeout: Duration,
    ) -> CoreResult<()> {
        let Self::Local(local) = self else {
            return Ok(());
        };
        let next_id = TransactionId {
            connection_id: local.connection_id.clone(),
            sequence: local.sequence.next(),
        };
        let result = declare_transaction(provider, tracker, &next_id, timeout);
        let mut state = local.state.lock().unwrap();
        *state = match &result {
            Ok(()) => TxState::Active(next_id),
            Err(_) => TxState::InDoubt,
        };
        result
    }
}

enum Discharge {
    Commit,
    Rollback,
}

fn declare_transaction(
    provider: &dyn Provider,
    tracker: &RequestTracker,
    id: &TransactionId,
    timeout: Duration,
) -> CoreResult<()> {
    let request_id = tracker.next_request_id();
    let (completer, future) = provider_future::<()>();
    tracker.register(request_id.clone(), std::sync::Arc::new(completer.clone()));
    provider.create(Resource::Transaction(id.clone()), completer);
    let result = future.wait(timeout);
    tracker.deregister(&request_id);
    result
}

fn discharge_commit(
    provider: &dyn Provider,
    tracker: &RequestTracker,
    id: &TransactionId,
    timeout: Duration,
) -> CoreResult<()> {
    let request_id = tracker.next_request_id();
    let (completer, future) = provider_future::<()>();
    tracker.register(request_id.clone(), std::sync::Arc::new(completer.clone()));
    provider.commit(id.clone(), completer);
    let result = future.wait(timeout);
    tracker.deregister(&request_id);
    result
}

fn discharge_rollback(
    provider: &dyn Provider,
    tracker: &RequestTracker,
    id: &TransactionId,
    timeout: Duration,
) -> CoreResult<()> {
    let request_id = tracker.next_request_id();
    let (completer, future) = provider_future::<()>();
    tracker.register(request_id.clone(), std::sync::Arc::new(completer.clone()));
    provider.rollback(id.clone(), completer);
    let result = future.wait(timeout);
    tracker.deregister(&request_id);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockProvider;

    #[test]
    fn none_context_rejects_commit_and_rollback() {
        let ctx = TransactionContext::none();
        let provider = MockProvider::new();
        let tracker = RequestTracker::new();
        assert!(matches!(
            ctx.commit(&provider, &tracker, Duration::from_secs(1)),
            Err(CoreError::IllegalState(_))
        ));
        assert!(ctx.current_transaction_id().is_none());
    }

    #[test]
    fn local_context_starts_with_an_open_transaction() {
        let provider = MockProvider::new();
        let tracker = RequestTracker::new();
        let ctx =
            TransactionContext::local(ConnectionId::new(), &provider, &tracker, Duration::from_secs(1))
                .unwrap();
        assert!(ctx.is_transacted());
        assert!(ctx.current_transaction_id().is_some());
    }

    #[test]
    fn commit_rolls_over_to_a_fresh_transaction() {
        let provider = MockProvider::new();
        let tracker = RequestTracker::new();
        let ctx =
            TransactionContext::local(ConnectionId::new(), &provider, &tracker, Duration::from_secs(1))
                .unwrap();
        let first = ctx.current_transaction_id().unwrap();
        ctx.commit(&provider, &tracker, Duration::from_secs(1)).unwrap();
        let second = ctx.current_transaction_id().unwrap();
        assert_ne!(first, second);
        assert!(!ctx.is_in_doubt());
    }

    #[test]
    fn rollback_rolls_over_even_when_discharge_fails() {
        let provider = MockProvider::new();
        let tracker = RequestTracker::new();
        let ctx =
            TransactionContext::local(ConnectionId::new(), &provider, &tracker, Duration::from_secs(1))
                .unwrap();
        provider.fail_next_rollback();
        let first = ctx.current_transaction_id().unwrap();
        let result = ctx.rollback(&provider, &tracker, Duration::from_secs(1));
        assert!(result.is_err());
        // Still rolled over to a fresh transaction despite the failure.
        let second = ctx.current_transaction_id().unwrap();
        assert_ne!(first, second);
        assert!(!ctx.is_in_doubt());
    }

    #[test]
    fn interruption_marks_in_doubt_until_recovery_rearms() {
        let provider = MockProvider::new();
        let tracker = RequestTracker::new();
        let ctx =
            TransactionContext::local(ConnectionId::new(), &provider, &tracker, Duration::from_secs(1))
                .unwrap();
        ctx.mark_interrupted();
        assert!(ctx.is_in_doubt());
        assert!(ctx.current_transaction_id().is_none());

        ctx.rearm_after_recovery(&provider, &tracker, Duration::from_secs(1))
            .unwrap();
        assert!(!ctx.is_in_doubt());
        assert!(ctx.current_transaction_id().is_some());
    }
}
