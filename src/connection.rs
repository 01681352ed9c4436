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

//! Owns sessions, temporary destinations, the provider handle, and the recovery driver. This is
//! the `ProviderListener` the embedding adapter registers with its provider; callbacks arrive on
//! provider threads and must not block, so anything beyond marking a flag or failing the request
//! tracker is deferred onto the connection's own [`Executor`].

use crate::destination::Destination;
use crate::error::{CoreError, CoreResult, FailureCause};
use crate::executor::Executor;
use crate::ids::{ConnectionId, IdSequence, SessionId};
use crate::policy::{AckMode, ConnectionInfo, SessionInfo};
use crate::provider::{Provider, ProviderListener, Resource, provider_future};
use crate::request_tracker::RequestTracker;
use crate::session::Session;
use crate::temp_destinations::TempDestinationRegistry;
use arc_swap::ArcSwap;
use papaya::HashMap as ConcurrentMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// The connection's lifecycle, walked in order as the stages below actually occur. Interruption
/// and restoration are not a loop back to `Connected` -- a connection that has seen one
/// interruption is `Restored`, not `Connected`, even once healthy again; only `close()` moves it
/// any further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    New,
    Connected,
    Interrupted,
    Restored,
    Closing,
    Closed,
}

/// Upstream callbacks an application registers on a connection. Every method has a no-op default
/// so a listener only needs to implement what it cares about.
#[allow(unused_variables)]
pub trait ConnectionEventListener: Send + Sync {
    fn on_interrupted(&self, uri: &str) {}
    fn on_restored(&self, uri: &str) {}
    fn on_established(&self, uri: &str) {}
    fn on_resource_closed(&self, resource: Resource, cause: FailureCause) {}
    fn on_failure(&self, cause: FailureCause) {}
}

/// Snapshot of which consumers were running in each session right before an interruption, so
/// recovery knows what to resume once the connection is restored.
#[derive(Default)]
struct InterruptionSnapshot {
    started_consumers: std::collections::HashMap<SessionId, Vec<crate::ids::ConsumerId>>,
}

pub struct Connection {
    pub connection_id: ConnectionId,
    info: Mutex<ConnectionInfo>,
    provider: Arc<ArcSwap<dyn Provider>>,
    tracker: Arc<RequestTracker>,
    executor: Mutex<Executor>,

    sessions: Arc<ConcurrentMap<SessionId, Arc<Session>>>,
    session_seq: IdSequence,
    temp_destinations: Arc<TempDestinationRegistry>,

    state: Mutex<ConnectionState>,
    started: AtomicBool,
    failed: Mutex<Option<FailureCause>>,

    interruption: Mutex<InterruptionSnapshot>,
    listeners: Mutex<Vec<Arc<dyn ConnectionEventListener>>>,
}

impl Connection {
    pub fn new(info: ConnectionInfo, provider: Arc<dyn Provider>) -> Self {
        let connection_id = info.connection_id.clone();
        Self {
            connection_id,
            info: Mutex::new(info),
            provider: Arc::new(ArcSwap::from(provider)),
            tracker: Arc::new(RequestTracker::new()),
            executor: Mutex::new(Executor::new("connection-executor")),
            sessions: Arc::new(ConcurrentMap::new()),
            session_seq: IdSequence::new(),
            temp_destinations: Arc::new(TempDestinationRegistry::new()),
            state: Mutex::new(ConnectionState::New),
            started: AtomicBool::new(false),
            failed: Mutex::new(None),
            interruption: Mutex::new(InterruptionSnapshot::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ConnectionEventListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    fn check_open(&self) -> CoreResult<()> {
        if let Some(cause) = self.failed.lock().unwrap().clone() {
            return Err(CoreError::ConnectionFailed(cause));
        }
        if matches!(
            *self.state.lock().unwrap(),
            ConnectionState::Closing | ConnectionState::Closed
        ) {
            return Err(CoreError::illegal_state("connection is closed"));
        }
        Ok(())
    }

    fn request_timeout(&self) -> std::time::Duration {
        self.info.lock().unwrap().timeouts.request
    }

    // -- lazy connect ---------------------------------------------------------

    /// Triggered by `set_client_id`, `start`, `create_session`, or any producer/consumer
    /// creation. Idempotent: a second call once past `New` is a no-op, since the state mutex
    /// held for the whole check-and-transition makes "first connect wins" a single critical
    /// section rather than a double-checked load.
    pub fn connect(&self) -> CoreResult<()> {
        self.check_open()?;
        let mut state = self.state.lock().unwrap();
        if *state != ConnectionState::New {
            return Ok(());
        }
        let mut info = self.info.lock().unwrap();
        self.provider.load().open();
        info.connected_uri = Some(self.provider.load().remote_uri());
        drop(info);
        *state = ConnectionState::Connected;
        drop(state);
        info!(connection = %self.connection_id, "connection established");
        Ok(())
    }

    /// Setting the client id is itself one of `connect()`'s lazy triggers (alongside `start()`,
    /// `createSession`, and resource creation): the first call sets the id and connects, so any
    /// further call observes a state past `New` and fails with the same `IllegalState` every
    /// other post-connect attempt does.
    pub fn set_client_id(&self, client_id: impl Into<String>) -> CoreResult<()> {
        {
            let mut info = self.info.lock().unwrap();
            if *self.state.lock().unwrap() != ConnectionState::New {
                return Err(CoreError::illegal_state(
                    "client id cannot be set after the connection is established",
                ));
            }
            if info.client_id_set() {
                return Err(CoreError::InvalidClientId(
                    "client id is already set".to_string(),
                ));
            }
            info.set_client_id(client_id);
        }
        self.connect()
    }

    pub fn client_id(&self) -> Option<String> {
        self.info.lock().unwrap().client_id().map(str::to_string)
    }

    // -- provider-resource helpers ----------------------------------------------

    fn declare(&self, resource: Resource) -> CoreResult<()> {
        self.check_open()?;
        let request_id = self.tracker.next_request_id();
        let (completer, future) = provider_future::<()>();
        self.tracker
            .register(request_id.clone(), Arc::new(completer.clone()));
        self.provider.load().create(resource, completer);
        let result = future.wait(self.request_timeout());
        self.tracker.deregister(&request_id);
        result
    }

    fn destroy(&self, resource: Resource) -> CoreResult<()> {
        let request_id = self.tracker.next_request_id();
        let (completer, future) = provider_future::<()>();
        self.tracker
            .register(request_id.clone(), Arc::new(completer.clone()));
        self.provider.load().destroy(resource, completer);
        let result = future.wait(self.request_timeout());
        self.tracker.deregister(&request_id);
        result
    }

    // -- sessions ---------------------------------------------------------------

    pub fn create_session(&self, ack_mode: AckMode) -> CoreResult<SessionId> {
        self.connect()?;
        self.check_open()?;
        let session_id = SessionId {
            connection_id: self.connection_id.clone(),
            sequence: self.session_seq.next(),
        };
        self.declare(Resource::Session(session_id.clone()))?;
        let info = SessionInfo::inherit(&self.info.lock().unwrap(), ack_mode);
        let session = Arc::new(Session::new(
            session_id.clone(),
            info,
            self.provider.clone(),
            self.tracker.clone(),
            self.request_timeout(),
        )?);
        if self.started.load(Ordering::SeqCst) {
            session.mark_started()?;
        }
        self.sessions.pin().insert(session_id.clone(), session);
        Ok(session_id)
    }

    pub fn session(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.pin().get(id).cloned()
    }

    pub fn temp_destinations(&self) -> &Arc<TempDestinationRegistry> {
        &self.temp_destinations
    }

    pub fn create_temporary_queue(&self) -> CoreResult<Destination> {
        self.connect()?;
        let destination = self.temp_destinations.create_queue(&self.connection_id);
        self.declare(Resource::TempDestination(destination.clone()))?;
        Ok(destination)
    }

    pub fn create_temporary_topic(&self) -> CoreResult<Destination> {
        self.connect()?;
        let destination = self.temp_destinations.create_topic(&self.connection_id);
        self.declare(Resource::TempDestination(destination.clone()))?;
        Ok(destination)
    }

    /// Invariant 6: refuses deletion while any consumer of this connection still subscribes to
    /// the destination.
    pub fn delete_temporary_destination(&self, destination: &Destination) -> CoreResult<()> {
        self.check_open()?;
        let in_use = self.sessions.pin().values().any(|session| {
            session
                .consumer_destinations()
                .iter()
                .any(|d| d == destination)
        });
        if in_use {
            return Err(CoreError::illegal_state(
                "temporary destination has active consumers",
            ));
        }
        self.temp_destinations
            .delete(destination, &self.connection_id)?;
        self.destroy(Resource::TempDestination(destination.clone()))
    }

    // -- start / stop / close ----------------------------------------------------

    pub fn start(&self) -> CoreResult<()> {
        self.connect()?;
        self.check_open()?;
        self.started.store(true, Ordering::SeqCst);
        for (_, session) in self.sessions.pin().iter() {
            session.mark_started()?;
        }
        Ok(())
    }

    pub fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
        for (_, session) in self.sessions.pin().iter() {
            session.mark_stopped();
        }
    }

    /// Idempotent and tolerant of an already-failed connection -- close must not throw in that
    /// case per the upstream contract.
    pub fn close(&self) -> CoreResult<()> {
        let was_established = {
            let mut state = self.state.lock().unwrap();
            if *state == ConnectionState::Closed {
                return Ok(());
            }
            let was_established = !matches!(*state, ConnectionState::New);
            *state = ConnectionState::Closing;
            was_established
        };
        let already_failed = self.failed.lock().unwrap().is_some();

        for (_, session) in self.sessions.pin().iter() {
            if let Err(e) = session.close() {
                if !already_failed {
                    warn!(error = %e, "error closing session during connection close");
                }
            }
        }
        self.sessions.pin().clear();
        self.temp_destinations.clear();

        if was_established {
            if let Err(e) = self.destroy(Resource::Connection(self.connection_id.clone())) {
                if !already_failed {
                    debug!(error = %e, "error destroying connection resource during close");
                }
            }
        }

        self.provider.load().close();
        self.executor.lock().unwrap().shutdown();
        *self.state.lock().unwrap() = ConnectionState::Closed;
        Ok(())
    }

    fn fan_out<F>(&self, f: F)
    where
        F: Fn(&Arc<dyn ConnectionEventListener>) + Send + 'static,
    {
        let listeners = self.listeners.lock().unwrap().clone();
        self.executor.lock().unwrap().submit(move || {
            for listener in &listeners {
                f(listener);
            }
        });
    }
}

impl ProviderListener for Connection {
    fn on_inbound_message(&self, envelope: crate::message::InboundEnvelope) {
        let session_id = envelope.consumer_id.session_id.clone();
        if let Some(session) = self.sessions.pin().get(&session_id).cloned() {
            if let Err(e) = session.on_inbound_message(envelope) {
                warn!(session = %session_id, error = %e, "failed to buffer inbound envelope");
            }
        } else {
            debug!(session = %session_id, "dropping envelope for unknown session");
        }
    }

    fn on_connection_interrupted(&self, uri: String) {
        info!(connection = %self.connection_id, %uri, "connection interrupted");
        *self.state.lock().unwrap() = ConnectionState::Interrupted;
        let mut snapshot = self.interruption.lock().unwrap();
        snapshot.started_consumers.clear();
        for (id, session) in self.sessions.pin().iter() {
            session.mark_interrupted();
            snapshot
                .started_consumers
                .insert(id.clone(), session.snapshot_started_consumers());
        }
        drop(snapshot);

        let uri_for_listeners = uri.clone();
        self.fan_out(move |listener| listener.on_interrupted(&uri_for_listeners));
    }

    /// Steps 1-3 of recovery orchestration. Runs on whatever thread the provider calls this
    /// from, which is expected to tolerate blocking for the duration of the re-declare sweep.
    fn on_connection_recovery(&self, provider: Arc<dyn Provider>) {
        info!(connection = %self.connection_id, "connection recovery starting");
        self.provider.store(provider);

        let redeclare = || -> CoreResult<()> {
            self.declare(Resource::Connection(self.connection_id.clone()))?;
            for destination in self.temp_destinations.owned_by(&self.connection_id) {
                self.declare(Resource::TempDestination(destination))?;
            }
            for (_, session) in self.sessions.pin().iter() {
                session.redeclare_after_recovery()?;
            }
            Ok(())
        };

        if let Err(e) = redeclare() {
            warn!(error = %e, "recovery re-declare sweep failed");
        }
    }

    fn on_connection_recovered(&self, provider: Arc<dyn Provider>) {
        let mut info = self.info.lock().unwrap();
        info.connected_uri = Some(provider.remote_uri());
        info!(connection = %self.connection_id, uri = ?info.connected_uri, "connection recovered");
    }

    fn on_connection_restored(&self, uri: String) {
        info!(connection = %self.connection_id, %uri, "connection restored");
        *self.state.lock().unwrap() = ConnectionState::Restored;
        let mut snapshot = self.interruption.lock().unwrap();
        for (id, session) in self.sessions.pin().iter() {
            if let Some(ids) = snapshot.started_consumers.remove(id) {
                session.restore_consumers_started(&ids);
            }
        }
        snapshot.started_consumers.clear();
        drop(snapshot);

        let uri_for_listeners = uri.clone();
        self.fan_out(move |listener| listener.on_restored(&uri_for_listeners));
    }

    fn on_connection_established(&self, uri: String) {
        let uri_for_listeners = uri.clone();
        self.fan_out(move |listener| listener.on_established(&uri_for_listeners));
    }

    /// §4.6.3: set `failed=true`, capture the first cause, fan out the exception callback, fail
    /// every tracked request -- all inline so a currently-blocked synchronous call observes the
    /// failure immediately. Then, on the executor: close the provider, sweep the tracker again
    /// for late registrations, run full shutdown, and notify listeners.
    fn on_connection_failure(&self, cause: FailureCause) {
        let first = {
            let mut failed = self.failed.lock().unwrap();
            if failed.is_none() {
                *failed = Some(cause.clone());
                true
            } else {
                false
            }
        };
        if !first {
            return;
        }
        warn!(connection = %self.connection_id, %cause, "connection failed");

        for (_, session) in self.sessions.pin().iter() {
            session.mark_failed(cause.clone());
        }
        self.tracker.fail_all(cause.clone());

        if matches!(
            *self.state.lock().unwrap(),
            ConnectionState::Closing | ConnectionState::Closed
        ) {
            return;
        }

        let cause_for_executor = cause.clone();
        self.fan_out(move |listener| listener.on_failure(cause_for_executor.clone()));

        let tracker = self.tracker.clone();
        let provider = self.provider.clone();
        let cause_for_sweep = cause.clone();
        self.executor.lock().unwrap().submit(move || {
            provider.load().close();
            tracker.fail_all(cause_for_sweep);
        });
    }

    /// §4.6.2: mark the resource failed immediately, then defer full shutdown and the typed
    /// listener notification to the executor.
    fn on_resource_closed(&self, resource: Resource, cause: FailureCause) {
        match &resource {
            Resource::Session(id) => {
                if let Some(session) = self.sessions.pin().get(id) {
                    session.mark_resource_failed(&resource, cause.clone());
                }
            }
            Resource::Producer(id) => {
                if let Some(session) = self.sessions.pin().get(&id.session_id) {
                    session.mark_resource_failed(&resource, cause.clone());
                }
            }
            Resource::Consumer(id) => {
                if let Some(session) = self.sessions.pin().get(&id.session_id) {
                    session.mark_resource_failed(&resource, cause.clone());
                }
            }
            _ => {}
        }

        let sessions = self.sessions.clone();
        let resource_for_cleanup = resource.clone();
        self.executor.lock().unwrap().submit(move || match &resource_for_cleanup {
            Resource::Session(id) => {
                if let Some(session) = sessions.pin().get(id).cloned() {
                    session.force_close_locally();
                }
                sessions.pin().remove(id);
            }
            Resource::Producer(id) => {
                if let Some(session) = sessions.pin().get(&id.session_id).cloned() {
                    session.remove_producer(id);
                }
            }
            Resource::Consumer(id) => {
                if let Some(session) = sessions.pin().get(&id.session_id).cloned() {
                    session.remove_consumer(id);
                }
            }
            _ => {}
        });

        let resource_for_listener = resource.clone();
        self.fan_out(move |listener| {
            listener.on_resource_closed(resource_for_listener.clone(), cause.clone())
        });
    }

    fn on_provider_exception(&self, cause: FailureCause) {
        warn!(connection = %self.connection_id, %cause, "asynchronous provider exception");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockProvider;

    fn make_connection() -> (Arc<Connection>, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider::new());
        let info = ConnectionInfo::new(ConnectionId::new(), vec!["mock://localhost".into()]);
        let connection = Arc::new(Connection::new(info, provider.clone() as Arc<dyn Provider>));
        (connection, provider)
    }

    #[test]
    fn set_client_id_fails_after_connect() {
        let (connection, _provider) = make_connection();
        connection.connect().unwrap();
        assert!(matches!(
            connection.set_client_id("alice"),
            Err(CoreError::IllegalState(_))
        ));
    }

    #[test]
    fn set_client_id_twice_fails() {
        let (connection, _provider) = make_connection();
        connection.set_client_id("alice").unwrap();
        assert!(connection.set_client_id("bob").is_err());
    }

    #[test]
    fn create_session_lazily_connects() {
        let (connection, _provider) = make_connection();
        assert_eq!(*connection.state.lock().unwrap(), ConnectionState::New);
        connection.create_session(AckMode::AutoAck).unwrap();
        assert_eq!(*connection.state.lock().unwrap(), ConnectionState::Connected);
    }

    #[test]
    fn close_after_interruption_lands_on_closed_not_restored() {
        let (connection, _provider) = make_connection();
        connection.connect().unwrap();
        connection.on_connection_interrupted("mock://localhost".to_string());
        assert_eq!(*connection.state.lock().unwrap(), ConnectionState::Interrupted);
        connection.close().unwrap();
        assert_eq!(*connection.state.lock().unwrap(), ConnectionState::Closed);
    }

    #[test]
    fn close_is_idempotent() {
        let (connection, _provider) = make_connection();
        connection.create_session(AckMode::AutoAck).unwrap();
        connection.close().unwrap();
        connection.close().unwrap();
    }

    #[test]
    fn connection_failure_fails_every_tracked_request() {
        let (connection, _provider) = make_connection();
        connection.connect().unwrap();
        let cause: FailureCause = Arc::from("socket reset");
        connection.on_connection_failure(cause.clone());
        assert!(connection.failed.lock().unwrap().is_some());
    }

    #[test]
    fn temp_destination_delete_guarded_by_active_consumer() {
        let (connection, _provider) = make_connection();
        let dest = connection.create_temporary_queue().unwrap();
        let session_id = connection.create_session(AckMode::AutoAck).unwrap();
        let session = connection.session(&session_id).unwrap();
        session
            .create_consumer(dest.clone(), None, false, &connection.temp_destinations)
            .unwrap();
        assert!(connection.delete_temporary_destination(&dest).is_err());
    }
}
