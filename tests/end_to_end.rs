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

//! End-to-end scenarios spanning connection, session, and a provider double, built against the
//! public API only (no `#[cfg(test)]` access to crate internals).

use mom_client_core::test_support::{MockCall, MockProvider};
use mom_client_core::{
    AckMode, AckType, Completer, Connection, ConnectionId, ConnectionInfo, ConsumerId, CoreError,
    DeliveryMode, Destination, FailureCause, InboundEnvelope, Message, OutboundEnvelope, Provider,
    ProviderListener, Resource, SessionId, TransactionId,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn ordered_delivery_and_acknowledgement() {
    let provider = Arc::new(MockProvider::new());
    let info = ConnectionInfo::new(ConnectionId::new(), vec!["mock://localhost".into()]);
    let connection = Arc::new(Connection::new(info, provider.clone() as Arc<dyn Provider>));

    let session_id = connection.create_session(AckMode::AutoAck).unwrap();
    let session = connection.session(&session_id).unwrap();
    let consumer_id = session
        .create_consumer(
            Destination::queue("q"),
            None,
            false,
            connection.temp_destinations(),
        )
        .unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let received_clone = received.clone();
    session
        .set_message_listener(&consumer_id, move |env: InboundEnvelope| {
            received_clone.lock().unwrap().push(env.dispatch_id);
        })
        .unwrap();

    connection.start().unwrap();

    for i in 0..3 {
        connection.on_inbound_message(InboundEnvelope {
            consumer_id: consumer_id.clone(),
            transaction_id: None,
            message: Message::default(),
            dispatch_id: i,
        });
    }

    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(*received.lock().unwrap(), vec![0, 1, 2]);

    for i in 0..3 {
        session
            .acknowledge(
                InboundEnvelope {
                    consumer_id: consumer_id.clone(),
                    transaction_id: None,
                    message: Message::default(),
                    dispatch_id: i,
                },
                AckType::Accepted,
            )
            .unwrap();
    }

    let calls = provider.calls.lock().unwrap();
    let acked = calls
        .iter()
        .filter(|c| matches!(c, MockCall::AcknowledgeEnvelope(id, _) if *id == consumer_id))
        .count();
    assert_eq!(acked, 3);
}

#[test]
fn second_set_client_id_fails_because_the_first_already_connected() {
    let provider = Arc::new(MockProvider::new());
    let info = ConnectionInfo::new(ConnectionId::new(), vec!["mock://localhost".into()]);
    let connection = Arc::new(Connection::new(info, provider as Arc<dyn Provider>));

    // Setting the client id is itself a connect trigger, so the first call both sets the id and
    // establishes the connection.
    connection.set_client_id("alice").unwrap();
    assert_eq!(connection.client_id().as_deref(), Some("alice"));
    assert!(matches!(
        connection.set_client_id("bob"),
        Err(CoreError::IllegalState(_))
    ));
}

#[test]
fn transactional_rollback_then_commit_as_noop() {
    let provider = Arc::new(MockProvider::new());
    let info = ConnectionInfo::new(ConnectionId::new(), vec!["mock://localhost".into()]);
    let connection = Arc::new(Connection::new(info, provider.clone() as Arc<dyn Provider>));

    let session_id = connection.create_session(AckMode::Transacted).unwrap();
    let session = connection.session(&session_id).unwrap();
    let producer_id = session
        .create_producer(Some(Destination::queue("q")))
        .unwrap();

    session
        .send(
            &producer_id,
            Destination::queue("q"),
            vec![1],
            DeliveryMode::NonPersistent,
            4,
            0,
            None,
            connection.temp_destinations(),
        )
        .unwrap();
    session
        .send(
            &producer_id,
            Destination::queue("q"),
            vec![2],
            DeliveryMode::NonPersistent,
            4,
            0,
            None,
            connection.temp_destinations(),
        )
        .unwrap();

    session.rollback().unwrap();
    // A commit immediately after rollback runs against the fresh, empty transaction rollback
    // just armed -- it must succeed as a no-op, not fail because "nothing was sent under it".
    session.commit().unwrap();

    let calls = provider.calls.lock().unwrap();
    let rollbacks = calls
        .iter()
        .filter(|c| matches!(c, MockCall::Rollback(_)))
        .count();
    let commits = calls
        .iter()
        .filter(|c| matches!(c, MockCall::Commit(_)))
        .count();
    assert_eq!(rollbacks, 1);
    assert_eq!(commits, 1);
}

#[test]
fn recovery_redeclares_in_order_and_resumes_started_consumers() {
    let provider = Arc::new(MockProvider::new());
    let info = ConnectionInfo::new(ConnectionId::new(), vec!["mock://localhost".into()]);
    let connection = Arc::new(Connection::new(info, provider.clone() as Arc<dyn Provider>));

    connection.create_temporary_queue().unwrap();
    let session_id = connection.create_session(AckMode::AutoAck).unwrap();
    let session = connection.session(&session_id).unwrap();
    session
        .create_producer(Some(Destination::queue("q")))
        .unwrap();
    session
        .create_consumer(
            Destination::queue("q"),
            None,
            false,
            connection.temp_destinations(),
        )
        .unwrap();
    connection.start().unwrap();

    let new_provider = Arc::new(MockProvider::new());
    connection.on_connection_interrupted("mock://localhost".to_string());
    connection.on_connection_recovery(new_provider.clone() as Arc<dyn Provider>);
    connection.on_connection_recovered(new_provider.clone() as Arc<dyn Provider>);
    connection.on_connection_restored("mock://localhost".to_string());

    let calls = new_provider.calls.lock().unwrap();
    let conn_idx = calls
        .iter()
        .position(|c| matches!(c, MockCall::Create(Resource::Connection(_))))
        .expect("connection resource re-declared");
    let temp_idx = calls
        .iter()
        .position(|c| matches!(c, MockCall::Create(Resource::TempDestination(_))))
        .expect("temp destination re-declared");
    let session_idx = calls
        .iter()
        .position(|c| matches!(c, MockCall::Create(Resource::Session(_))))
        .expect("session re-declared");
    let producer_idx = calls
        .iter()
        .position(|c| matches!(c, MockCall::Create(Resource::Producer(_))))
        .expect("producer re-declared");
    let consumer_idx = calls
        .iter()
        .position(|c| matches!(c, MockCall::Create(Resource::Consumer(_))))
        .expect("consumer re-declared");
    let consumer_start_idx = calls
        .iter()
        .position(|c| matches!(c, MockCall::Start(Resource::Consumer(_))))
        .expect("consumer resumed since it was started before interruption");

    assert!(conn_idx < temp_idx);
    assert!(temp_idx < session_idx);
    assert!(session_idx < producer_idx);
    assert!(producer_idx < consumer_idx);
    assert!(consumer_idx < consumer_start_idx);
}

/// A provider whose `send` never completes on its own, simulating a broker round-trip that is
/// still in flight when the connection fails out from under it.
struct BlockingSendProvider {
    pending_send: Mutex<Option<Completer<()>>>,
}

impl BlockingSendProvider {
    fn new() -> Self {
        Self {
            pending_send: Mutex::new(None),
        }
    }

    fn has_pending_send(&self) -> bool {
        self.pending_send.lock().unwrap().is_some()
    }
}

impl Provider for BlockingSendProvider {
    fn open(&self) {}

    fn create(&self, _resource: Resource, completer: Completer<()>) {
        completer.complete(Ok(()));
    }

    fn start(&self, _resource: Resource, completer: Completer<()>) {
        completer.complete(Ok(()));
    }

    fn stop(&self, _resource: Resource, completer: Completer<()>) {
        completer.complete(Ok(()));
    }

    fn destroy(&self, _resource: Resource, completer: Completer<()>) {
        completer.complete(Ok(()));
    }

    fn send(&self, _envelope: OutboundEnvelope, completer: Completer<()>) {
        *self.pending_send.lock().unwrap() = Some(completer);
    }

    fn acknowledge_envelope(
        &self,
        _envelope: InboundEnvelope,
        _ack: AckType,
        completer: Completer<()>,
    ) {
        completer.complete(Ok(()));
    }

    fn acknowledge_session(&self, _session_id: SessionId, _ack: AckType, completer: Completer<()>) {
        completer.complete(Ok(()));
    }

    fn commit(&self, _transaction_id: TransactionId, completer: Completer<()>) {
        completer.complete(Ok(()));
    }

    fn rollback(&self, _transaction_id: TransactionId, completer: Completer<()>) {
        completer.complete(Ok(()));
    }

    fn recover(&self, _session_id: SessionId, completer: Completer<()>) {
        completer.complete(Ok(()));
    }

    fn pull(
        &self,
        _consumer_id: ConsumerId,
        _timeout: Duration,
        completer: Completer<Option<InboundEnvelope>>,
    ) {
        completer.complete(Ok(None));
    }

    fn unsubscribe(&self, _name: String, completer: Completer<()>) {
        completer.complete(Ok(()));
    }

    fn remote_uri(&self) -> String {
        "blocking://localhost".to_string()
    }

    fn close(&self) {}
}

#[test]
fn sync_send_blocked_during_connection_failure_sees_first_cause() {
    let provider = Arc::new(BlockingSendProvider::new());
    let mut info = ConnectionInfo::new(ConnectionId::new(), vec!["blocking://localhost".into()]);
    info.timeouts.request = Duration::from_secs(5);
    let connection = Arc::new(Connection::new(info, provider.clone() as Arc<dyn Provider>));

    let session_id = connection.create_session(AckMode::AutoAck).unwrap();
    let session = connection.session(&session_id).unwrap();
    let producer_id = session
        .create_producer(Some(Destination::queue("q")))
        .unwrap();
    let temp_destinations = connection.temp_destinations().clone();

    let session_for_thread = session.clone();
    let producer_for_thread = producer_id.clone();
    let send_thread = std::thread::spawn(move || {
        session_for_thread.send(
            &producer_for_thread,
            Destination::queue("q"),
            vec![1, 2, 3],
            DeliveryMode::Persistent,
            4,
            0,
            None,
            &temp_destinations,
        )
    });

    while !provider.has_pending_send() {
        std::thread::sleep(Duration::from_millis(5));
    }

    let cause: FailureCause = Arc::from("broker connection reset");
    connection.on_connection_failure(cause.clone());

    match send_thread.join().unwrap() {
        Err(CoreError::ConnectionFailed(observed)) => assert_eq!(&*observed, &*cause),
        other => panic!("expected ConnectionFailed, got {other:?}"),
    }

    // Every subsequent call on the connection fails with the same cause.
    assert!(matches!(
        connection.create_session(AckMode::AutoAck),
        Err(CoreError::ConnectionFailed(_))
    ));
}

#[test]
fn temporary_destination_delete_guard_releases_after_consumer_closes() {
    let provider = Arc::new(MockProvider::new());
    let info = ConnectionInfo::new(ConnectionId::new(), vec!["mock://localhost".into()]);
    let connection = Arc::new(Connection::new(info, provider.clone() as Arc<dyn Provider>));

    let dest = connection.create_temporary_queue().unwrap();
    let session_id = connection.create_session(AckMode::AutoAck).unwrap();
    let session = connection.session(&session_id).unwrap();
    let consumer_id = session
        .create_consumer(dest.clone(), None, false, connection.temp_destinations())
        .unwrap();

    assert!(matches!(
        connection.delete_temporary_destination(&dest),
        Err(CoreError::IllegalState(_))
    ));

    session.close_consumer(&consumer_id).unwrap();

    connection.delete_temporary_destination(&dest).unwrap();

    let calls = provider.calls.lock().unwrap();
    assert!(calls.iter().any(
        |c| matches!(c, MockCall::Destroy(Resource::TempDestination(d)) if *d == dest)
    ));
}
