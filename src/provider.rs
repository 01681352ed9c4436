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

//! The provider contract: the core's async collaborator. The provider itself (wire
//! encoding, socket I/O, reconnection policy) is out of scope -- this module only defines the
//! trait boundary the core calls through and the callback boundary the provider calls back on.

use crate::destination::Destination;
use crate::error::{CoreError, CoreResult, FailureCause};
use crate::ids::{ConsumerId, ProducerId, SessionId, TransactionId};
use crate::message::{AckType, InboundEnvelope, OutboundEnvelope};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Tagged resource variant, carried by `create/start/stop/destroy` calls and by
/// `onResourceClosed`. Dispatching on the tag in `onResourceClosed` eliminates the downcasting
/// a `JmsResource`-style object hierarchy would otherwise need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Connection(crate::ids::ConnectionId),
    Session(SessionId),
    Producer(ProducerId),
    Consumer(ConsumerId),
    TempDestination(Destination),
    Transaction(TransactionId),
}

/// A single-producer/single-consumer completion primitive carrying either success or a typed
/// error. Cloning shares the same underlying slot; whichever clone completes first wins and
/// every later `complete` call is a silent no-op (idempotent duplicate completion, required so
/// the request tracker can safely fail a request a second time on the executor after an inline
/// failure pass already fired).
pub struct Completer<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<CoreResult<T>>>>>,
}

impl<T> Clone for Completer<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T: Send + 'static> Completer<T> {
    pub fn complete(&self, result: CoreResult<T>) {
        if let Some(tx) = self.slot.lock().unwrap().take() {
            let _ = tx.send(result);
        }
    }
}

/// Type-erased handle used by the request tracker, which must hold completers of differing `T`
/// in one map.
pub trait CompletionSink: Send + Sync {
    fn fail(&self, err: CoreError);
}

impl<T: Send + 'static> CompletionSink for Completer<T> {
    fn fail(&self, err: CoreError) {
        self.complete(Err(err));
    }
}

/// The blocking side of a `Completer`: the application thread that issued the provider call
/// waits here. This is the only blocking point the core itself introduces.
pub struct ProviderFuture<T> {
    rx: oneshot::Receiver<CoreResult<T>>,
}

impl<T> ProviderFuture<T> {
    pub fn wait(self, timeout: Duration) -> CoreResult<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(oneshot::RecvTimeoutError::Timeout) => Err(CoreError::Timeout(timeout)),
            Err(oneshot::RecvTimeoutError::Disconnected) => Err(CoreError::ProviderClosed),
        }
    }
}

/// Builds a matched `Completer`/`ProviderFuture` pair.
pub fn provider_future<T: Send + 'static>() -> (Completer<T>, ProviderFuture<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Completer {
            slot: Arc::new(Mutex::new(Some(tx))),
        },
        ProviderFuture { rx },
    )
}

/// The downstream API contract this crate's core calls through. All methods are fire-and-report:
/// the call itself does not block, completion is signaled through the given `Completer`.
pub trait Provider: Send + Sync {
    /// Connection-level lifecycle start, triggered by the core's lazy `connect()`. Named `open`
    /// (rather than `start`) to keep it distinct from the per-resource `start` below.
    fn open(&self);

    fn create(&self, resource: Resource, completer: Completer<()>);
    fn start(&self, resource: Resource, completer: Completer<()>);
    fn stop(&self, resource: Resource, completer: Completer<()>);
    fn destroy(&self, resource: Resource, completer: Completer<()>);

    fn send(&self, envelope: OutboundEnvelope, completer: Completer<()>);

    fn acknowledge_envelope(
        &self,
        envelope: InboundEnvelope,
        ack: AckType,
        completer: Completer<()>,
    );
    fn acknowledge_session(&self, session_id: SessionId, ack: AckType, completer: Completer<()>);

    fn commit(&self, transaction_id: TransactionId, completer: Completer<()>);
    fn rollback(&self, transaction_id: TransactionId, completer: Completer<()>);

    fn recover(&self, session_id: SessionId, completer: Completer<()>);

    fn pull(
        &self,
        consumer_id: ConsumerId,
        timeout: Duration,
        completer: Completer<Option<InboundEnvelope>>,
    );

    fn unsubscribe(&self, name: String, completer: Completer<()>);

    fn remote_uri(&self) -> String;

    /// Orderly provider shutdown; does not itself report completion, mirroring the source's
    /// fire-and-forget `close()`.
    fn close(&self);
}

/// Callbacks the provider pushes back into the core, from its own threads. Implementations must
/// not block: the core routes these onto sessions/consumers and the connection Executor.
pub trait ProviderListener: Send + Sync {
    fn on_inbound_message(&self, envelope: InboundEnvelope);
    fn on_connection_interrupted(&self, uri: String);
    fn on_connection_recovery(&self, provider: Arc<dyn Provider>);
    fn on_connection_recovered(&self, provider: Arc<dyn Provider>);
    fn on_connection_restored(&self, uri: String);
    fn on_connection_established(&self, uri: String);
    fn on_connection_failure(&self, cause: FailureCause);
    fn on_resource_closed(&self, resource: Resource, cause: FailureCause);
    fn on_provider_exception(&self, cause: FailureCause);
}
