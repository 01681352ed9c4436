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

//! A hand-rolled mock provider, shared by unit tests across the crate and by the end-to-end
//! scenarios in `tests/`. Every call completes inline (synchronously, from the calling thread)
//! unless a test has armed a specific failure, which keeps test bodies free of sleeps.

use crate::destination::Destination;
use crate::error::CoreError;
use crate::ids::{ConsumerId, ProducerId, SessionId, TransactionId};
use crate::message::{AckType, InboundEnvelope, OutboundEnvelope};
use crate::provider::{Completer, Provider, Resource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum MockCall {
    Create(Resource),
    Start(Resource),
    Stop(Resource),
    Destroy(Resource),
    Send(OutboundEnvelope),
    AcknowledgeEnvelope(ConsumerId, AckType),
    AcknowledgeSession(SessionId, AckType),
    Commit(TransactionId),
    Rollback(TransactionId),
    Recover(SessionId),
    Pull(ConsumerId),
    Unsubscribe(String),
}

#[derive(Default)]
pub struct MockProvider {
    pub calls: Mutex<Vec<MockCall>>,
    fail_next_commit: AtomicBool,
    fail_next_rollback: AtomicBool,
    fail_next_send: AtomicBool,
    fail_everything: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_rollback(&self) {
        self.fail_next_rollback.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_send(&self) {
        self.fail_next_send.store(true, Ordering::SeqCst);
    }

    /// Simulates a provider that has gone permanently dark: every subsequent call fails
    /// immediately instead of completing, as if the transport were already gone.
    pub fn fail_everything(&self) {
        self.fail_everything.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn is_down(&self) -> bool {
        self.fail_everything.load(Ordering::SeqCst)
    }
}

impl Provider for MockProvider {
    fn open(&self) {}

    fn create(&self, resource: Resource, completer: Completer<()>) {
        self.record(MockCall::Create(resource));
        if self.is_down() {
            completer.complete(Err(CoreError::ProviderClosed));
            return;
        }
        completer.complete(Ok(()));
    }

    fn start(&self, resource: Resource, completer: Completer<()>) {
        self.record(MockCall::Start(resource));
        completer.complete(Ok(()));
    }

    fn stop(&self, resource: Resource, completer: Completer<()>) {
        self.record(MockCall::Stop(resource));
        completer.complete(Ok(()));
    }

    fn destroy(&self, resource: Resource, completer: Completer<()>) {
        self.record(MockCall::Destroy(resource));
        completer.complete(Ok(()));
    }

    fn send(&self, envelope: OutboundEnvelope, completer: Completer<()>) {
        self.record(MockCall::Send(envelope));
        if self.fail_next_send.swap(false, Ordering::SeqCst) || self.is_down() {
            completer.complete(Err(CoreError::ProviderClosed));
            return;
        }
        completer.complete(Ok(()));
    }

    fn acknowledge_envelope(
        &self,
        envelope: InboundEnvelope,
        ack: AckType,
        completer: Completer<()>,
    ) {
        self.record(MockCall::AcknowledgeEnvelope(envelope.consumer_id, ack));
        completer.complete(Ok(()));
    }

    fn acknowledge_session(&self, session_id: SessionId, ack: AckType, completer: Completer<()>) {
        self.record(MockCall::AcknowledgeSession(session_id, ack));
        completer.complete(Ok(()));
    }

    fn commit(&self, transaction_id: TransactionId, completer: Completer<()>) {
        self.record(MockCall::Commit(transaction_id));
        if self.fail_next_commit.swap(false, Ordering::SeqCst) || self.is_down() {
            completer.complete(Err(CoreError::ProviderClosed));
            return;
        }
        completer.complete(Ok(()));
    }

    fn rollback(&self, transaction_id: TransactionId, completer: Completer<()>) {
        self.record(MockCall::Rollback(transaction_id));
        if self.fail_next_rollback.swap(false, Ordering::SeqCst) || self.is_down() {
            completer.complete(Err(CoreError::ProviderClosed));
            return;
        }
        completer.complete(Ok(()));
    }

    fn recover(&self, session_id: SessionId, completer: Completer<()>) {
        self.record(MockCall::Recover(session_id));
        completer.complete(Ok(()));
    }

    fn pull(
        &self,
        consumer_id: ConsumerId,
        _timeout: Duration,
        completer: Completer<Option<InboundEnvelope>>,
    ) {
        self.record(MockCall::Pull(consumer_id));
        completer.complete(Ok(None));
    }

    fn unsubscribe(&self, name: String, completer: Completer<()>) {
        self.record(MockCall::Unsubscribe(name));
        completer.complete(Ok(()));
    }

    fn remote_uri(&self) -> String {
        "mock://localhost".to_string()
    }

    fn close(&self) {}
}

pub fn temp_destination(name: &str) -> Destination {
    Destination::queue(name)
}
