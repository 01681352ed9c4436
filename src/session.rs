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

//! Owns producers/consumers, message routing, send serialization, and recover/rollback
//! coordination for one session. A session never holds its owning connection by strong
//! reference -- the connection hands it a shared provider slot and request tracker at
//! construction and passes anything connection-scoped (like the temporary-destination registry)
//! as an explicit argument to the calls that need it.

use crate::destination::Destination;
use crate::dispatch_queue::DispatchQueue;
use crate::error::{CoreError, CoreResult, FailureCause};
use crate::executor::Executor;
use crate::ids::{ConnectionId, ConsumerId, IdSequence, ProducerId, SessionId};
use crate::message::{AckType, InboundEnvelope, Message, MessageHeaders, OutboundEnvelope};
use crate::policy::{ConnectionInfo, ConsumerInfo, ProducerInfo, SessionInfo};
use crate::provider::{Provider, Resource, provider_future};
use crate::request_tracker::RequestTracker;
use crate::temp_destinations::TempDestinationRegistry;
use crate::transaction::TransactionContext;
use arc_swap::ArcSwap;
use papaya::HashMap as ConcurrentMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Created,
    Started,
    Stopped,
    Closing,
    Closed,
}

struct ProducerHandle {
    info: ProducerInfo,
    dispatch_seq: IdSequence,
    failed: Mutex<Option<FailureCause>>,
}

struct ConsumerHandle {
    info: ConsumerInfo,
    started: AtomicBool,
    failed: Mutex<Option<FailureCause>>,
    listener: Mutex<Option<Arc<dyn Fn(InboundEnvelope) + Send + Sync>>>,
}

/// A session's message routing and transactional state. See module docs for the collaborator
/// ownership rule.
pub struct Session {
    pub session_id: SessionId,
    info: SessionInfo,
    provider: Arc<ArcSwap<dyn Provider>>,
    tracker: Arc<RequestTracker>,
    request_timeout: Duration,

    state: Mutex<SessionState>,
    failed: Mutex<Option<FailureCause>>,

    send_lock: Mutex<()>,
    producers: ConcurrentMap<ProducerId, Arc<ProducerHandle>>,
    consumers: ConcurrentMap<ConsumerId, Arc<ConsumerHandle>>,
    producer_seq: IdSequence,
    consumer_seq: IdSequence,

    dispatch_queue: DispatchQueue,
    message_executor: OnceLock<Executor>,

    transaction: TransactionContext,
    session_recovered: AtomicBool,
}

impl Session {
    pub fn new(
        session_id: SessionId,
        info: SessionInfo,
        provider: Arc<ArcSwap<dyn Provider>>,
        tracker: Arc<RequestTracker>,
        request_timeout: Duration,
    ) -> CoreResult<Self> {
        let transaction = if info.is_transacted() {
            TransactionContext::local(
                session_id.connection_id.clone(),
                &**provider.load(),
                &tracker,
                request_timeout,
            )?
        } else {
            TransactionContext::none()
        };

        Ok(Self {
            session_id,
            info,
            provider,
            tracker,
            request_timeout,
            state: Mutex::new(SessionState::Created),
            failed: Mutex::new(None),
            send_lock: Mutex::new(()),
            producers: ConcurrentMap::new(),
            consumers: ConcurrentMap::new(),
            producer_seq: IdSequence::new(),
            consumer_seq: IdSequence::new(),
            dispatch_queue: DispatchQueue::default(),
            message_executor: OnceLock::new(),
            transaction,
            session_recovered: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> CoreResult<()> {
        if let Some(cause) = self.failed.lock().unwrap().clone() {
            return Err(CoreError::ConnectionFailed(cause));
        }
        let state = *self.state.lock().unwrap();
        if matches!(state, SessionState::Closed | SessionState::Closing) {
            return Err(CoreError::illegal_state("session is closed"));
        }
        Ok(())
    }

    fn message_executor(&self) -> &Executor {
        self.message_executor
            .get_or_init(|| Executor::new(format!("session-{}-listener", self.session_id)))
    }

    // -- lifecycle ---------------------------------------------------------

    pub(crate) fn mark_started(&self) -> CoreResult<()> {
        self.check_open()?;
        *self.state.lock().unwrap() = SessionState::Started;
        for (_, consumer) in self.consumers.pin().iter() {
            consumer.started.store(true, Ordering::SeqCst);
        }
        self.drain_dispatch_queue();
        Ok(())
    }

    pub(crate) fn mark_stopped(&self) {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, SessionState::Closing | SessionState::Closed) {
            return;
        }
        *state = SessionState::Stopped;
        drop(state);
        for (_, consumer) in self.consumers.pin().iter() {
            consumer.started.store(false, Ordering::SeqCst);
        }
    }

    pub(crate) fn is_started(&self) -> bool {
        *self.state.lock().unwrap() == SessionState::Started
    }

    /// Suspends every consumer without touching the session's state machine. Used around
    /// rollback so in-flight handlers observe no new messages while the provider tears down the
    /// transaction, independent of whether the session is logically started or stopped.
    fn suspend_all_consumers(&self) -> Vec<ConsumerId> {
        let mut suspended = Vec::new();
        for (id, consumer) in self.consumers.pin().iter() {
            if consumer.started.swap(false, Ordering::SeqCst) {
                suspended.push(id.clone());
            }
        }
        suspended
    }

    /// Resumes consumers suspended by `suspend_all_consumers`. Attempted for every consumer
    /// regardless of whether the rollback that triggered the suspension itself succeeded.
    fn resume_consumers(&self, ids: &[ConsumerId]) {
        let pinned = self.consumers.pin();
        for id in ids {
            if let Some(consumer) = pinned.get(id) {
                consumer.started.store(true, Ordering::SeqCst);
            }
        }
    }

    pub(crate) fn mark_failed(&self, cause: FailureCause) {
        *self.failed.lock().unwrap() = Some(cause);
    }

    pub(crate) fn mark_interrupted(&self) {
        self.transaction.mark_interrupted();
    }

    /// Consumer ids currently started, captured before an interruption so recovery knows which
    /// ones to resume once the connection is restored.
    pub(crate) fn snapshot_started_consumers(&self) -> Vec<ConsumerId> {
        self.consumers
            .pin()
            .iter()
            .filter(|(_, handle)| handle.started.load(Ordering::SeqCst))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub(crate) fn restore_consumers_started(&self, ids: &[ConsumerId]) {
        let pinned = self.consumers.pin();
        for id in ids {
            if let Some(consumer) = pinned.get(id) {
                consumer.started.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Re-declares this session's resources against the (already swapped-in) recovered provider:
    /// the session itself, its transaction context, every producer, then every consumer --
    /// restarting any consumer that was started before the interruption.
    pub(crate) fn redeclare_after_recovery(&self) -> CoreResult<()> {
        self.declare(Resource::Session(self.session_id.clone()))?;
        self.transaction.rearm_after_recovery(
            &**self.provider.load(),
            &self.tracker,
            self.request_timeout,
        )?;
        let producer_ids: Vec<ProducerId> = self.producers.pin().keys().cloned().collect();
        for id in producer_ids {
            self.declare(Resource::Producer(id))?;
        }
        let consumer_ids: Vec<ConsumerId> = self.consumers.pin().keys().cloned().collect();
        for id in consumer_ids {
            self.declare(Resource::Consumer(id.clone()))?;
            let started = self
                .consumers
                .pin()
                .get(&id)
                .map(|handle| handle.started.load(Ordering::SeqCst))
                .unwrap_or(false);
            if started {
                self.start_resource(Resource::Consumer(id))?;
            }
        }
        Ok(())
    }

    /// Marks the named producer/consumer/session-level resource failed in response to a
    /// provider-initiated `onResourceClosed`. Applied immediately (before any cleanup) so an
    /// in-progress synchronous call on that resource observes the failure.
    pub(crate) fn mark_resource_failed(&self, resource: &Resource, cause: FailureCause) {
        match resource {
            Resource::Session(id) if *id == self.session_id => self.mark_failed(cause),
            Resource::Producer(id) => {
                if let Some(handle) = self.producers.pin().get(id) {
                    *handle.failed.lock().unwrap() = Some(cause);
                }
            }
            Resource::Consumer(id) => {
                if let Some(handle) = self.consumers.pin().get(id) {
                    *handle.failed.lock().unwrap() = Some(cause);
                }
            }
            _ => {}
        }
    }

    pub(crate) fn remove_producer(&self, id: &ProducerId) {
        self.producers.pin().remove(id);
    }

    pub(crate) fn remove_consumer(&self, id: &ConsumerId) {
        self.consumers.pin().remove(id);
    }

    /// Destinations every currently-registered consumer of this session subscribes to, used by
    /// the temporary-destination delete guard (Invariant 6).
    pub(crate) fn consumer_destinations(&self) -> Vec<Destination> {
        self.consumers
            .pin()
            .values()
            .map(|handle| handle.info.destination.clone())
            .collect()
    }

    /// Tears down session state locally without round-tripping to the provider, used when the
    /// provider itself reports the session resource already closed.
    pub(crate) fn force_close_locally(&self) {
        *self.state.lock().unwrap() = SessionState::Closed;
    }

    /// Shutdown drains consumers then producers then destroys the session resource remotely.
    /// Idempotent.
    pub fn close(&self) -> CoreResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            if matches!(*state, SessionState::Closed | SessionState::Closing) {
                return Ok(());
            }
            *state = SessionState::Closing;
        }

        let already_failed = self.failed.lock().unwrap().is_some();

        let consumer_ids: Vec<ConsumerId> = self.consumers.pin().keys().cloned().collect();
        for id in consumer_ids {
            if let Err(e) = self.destroy_resource(Resource::Consumer(id.clone())) {
                if !already_failed {
                    warn!(consumer = %id, error = %e, "error destroying consumer during close");
                }
            }
            self.consumers.pin().remove(&id);
        }

        let producer_ids: Vec<ProducerId> = self.producers.pin().keys().cloned().collect();
        for id in producer_ids {
            if let Err(e) = self.destroy_resource(Resource::Producer(id.clone())) {
                if !already_failed {
                    warn!(producer = %id, error = %e, "error destroying producer during close");
                }
            }
            self.producers.pin().remove(&id);
        }

        if let Err(e) = self.destroy_resource(Resource::Session(self.session_id.clone())) {
            if !already_failed {
                warn!(session = %self.session_id, error = %e, "error destroying session during close");
            }
        }

        *self.state.lock().unwrap() = SessionState::Closed;
        Ok(())
    }

    fn destroy_resource(&self, resource: Resource) -> CoreResult<()> {
        let request_id = self.tracker.next_request_id();
        let (completer, future) = provider_future::<()>();
        self.tracker
            .register(request_id.clone(), Arc::new(completer.clone()));
        self.provider.load().destroy(resource, completer);
        let result = future.wait(self.request_timeout);
        self.tracker.deregister(&request_id);
        result
    }

    // -- producers / consumers ----------------------------------------------

    pub fn create_producer(&self, destination: Option<Destination>) -> CoreResult<ProducerId> {
        self.check_open()?;
        let producer_id = ProducerId {
            session_id: self.session_id.clone(),
            sequence: self.producer_seq.next(),
        };
        self.declare(Resource::Producer(producer_id.clone()))?;
        self.producers.pin().insert(
            producer_id.clone(),
            Arc::new(ProducerHandle {
                info: ProducerInfo { destination },
                dispatch_seq: IdSequence::new(),
                failed: Mutex::new(None),
            }),
        );
        Ok(producer_id)
    }

    pub fn create_consumer(
        &self,
        destination: Destination,
        selector: Option<String>,
        no_local: bool,
        temp_destinations: &TempDestinationRegistry,
    ) -> CoreResult<ConsumerId> {
        self.check_open()?;
        if destination.temporary && temp_destinations.is_deleted(&destination) {
            return Err(CoreError::InvalidDestination(format!(
                "{destination} has been deleted"
            )));
        }
        self.create_consumer_inner(ConsumerInfo {
            destination,
            selector,
            no_local,
            durable_subscription_name: None,
        })
    }

    pub fn create_durable_subscriber(
        &self,
        destination: Destination,
        selector: Option<String>,
        no_local: bool,
        subscription_name: String,
        connection_info: &ConnectionInfo,
    ) -> CoreResult<ConsumerId> {
        self.check_open()?;
        if !connection_info.client_id_set() {
            return Err(CoreError::illegal_state(
                "durable subscriptions require an explicit client id",
            ));
        }
        self.create_consumer_inner(ConsumerInfo {
            destination,
            selector,
            no_local,
            durable_subscription_name: Some(subscription_name),
        })
    }

    fn create_consumer_inner(&self, info: ConsumerInfo) -> CoreResult<ConsumerId> {
        let consumer_id = ConsumerId {
            session_id: self.session_id.clone(),
            sequence: self.consumer_seq.next(),
        };
        self.declare(Resource::Consumer(consumer_id.clone()))?;
        let handle = Arc::new(ConsumerHandle {
            info,
            started: AtomicBool::new(false),
            failed: Mutex::new(None),
            listener: Mutex::new(None),
        });
        if self.is_started() {
            self.start_resource(Resource::Consumer(consumer_id.clone()))?;
            handle.started.store(true, Ordering::SeqCst);
        }
        self.consumers.pin().insert(consumer_id.clone(), handle);
        Ok(consumer_id)
    }

    pub fn set_message_listener(
        &self,
        consumer_id: &ConsumerId,
        listener: impl Fn(InboundEnvelope) + Send + Sync + 'static,
    ) -> CoreResult<()> {
        let pinned = self.consumers.pin();
        let consumer = pinned
            .get(consumer_id)
            .ok_or_else(|| CoreError::illegal_state("no such consumer"))?;
        *consumer.listener.lock().unwrap() = Some(Arc::new(listener));
        Ok(())
    }

    /// Closes one consumer independently of the rest of the session: destroys the resource
    /// remotely and drops its local handle. A temporary destination this consumer was the last
    /// subscriber to becomes eligible for deletion once this returns.
    pub fn close_consumer(&self, consumer_id: &ConsumerId) -> CoreResult<()> {
        self.check_open()?;
        self.destroy_resource(Resource::Consumer(consumer_id.clone()))?;
        self.consumers.pin().remove(consumer_id);
        Ok(())
    }

    /// Closes one producer independently of the rest of the session.
    pub fn close_producer(&self, producer_id: &ProducerId) -> CoreResult<()> {
        self.check_open()?;
        self.destroy_resource(Resource::Producer(producer_id.clone()))?;
        self.producers.pin().remove(producer_id);
        Ok(())
    }

    fn declare(&self, resource: Resource) -> CoreResult<()> {
        let request_id = self.tracker.next_request_id();
        let (completer, future) = provider_future::<()>();
        self.tracker
            .register(request_id.clone(), Arc::new(completer.clone()));
        self.provider.load().create(resource, completer);
        let result = future.wait(self.request_timeout);
        self.tracker.deregister(&request_id);
        result
    }

    fn start_resource(&self, resource: Resource) -> CoreResult<()> {
        let request_id = self.tracker.next_request_id();
        let (completer, future) = provider_future::<()>();
        self.tracker
            .register(request_id.clone(), Arc::new(completer.clone()));
        self.provider.load().start(resource, completer);
        let result = future.wait(self.request_timeout);
        self.tracker.deregister(&request_id);
        result
    }

    // -- send ----------------------------------------------------------------

    /// The ordered send algorithm from the send-lock through hand-off to the transaction
    /// context. Held for the whole call so messages from this session leave in issue order.
    #[allow(clippy::too_many_arguments)]
    pub fn send(
        &self,
        producer_id: &ProducerId,
        destination: Destination,
        body: Vec<u8>,
        delivery_mode: crate::policy::DeliveryMode,
        priority: u8,
        ttl_millis: u64,
        populate_user_id_from: Option<&str>,
        temp_destinations: &TempDestinationRegistry,
    ) -> CoreResult<u64> {
        self.check_open()?;
        let _guard = self.send_lock.lock().unwrap();

        // 1. Validate destination.
        if destination.temporary && temp_destinations.is_deleted(&destination) {
            return Err(CoreError::InvalidDestination(format!(
                "{destination} has been deleted"
            )));
        }

        let pinned = self.producers.pin();
        let producer = pinned
            .get(producer_id)
            .ok_or_else(|| CoreError::illegal_state("no such producer"))?;

        // 2-3. Stamp headers and allocate the message sequence from the producer in one step, so
        // the message id and the dispatch id agree on the same sequence number.
        let now = Message::now_millis();
        let dispatch_id = producer.dispatch_seq.next();
        let headers = MessageHeaders {
            delivery_mode,
            priority,
            redelivered: false,
            destination: Some(destination.clone()),
            timestamp: now,
            expiration: if ttl_millis == 0 {
                0
            } else {
                now + ttl_millis
            },
            message_id: Some(format!("{producer_id}:{dispatch_id}")),
            user_id: populate_user_id_from.map(|s| s.to_string()),
        };

        // 5. Sync vs async: sync if force-sync, or (not force-async and persistent-and-not-
        // transacted) -- the toggles take priority over the delivery-mode default either way.
        let transacted = self.info.is_transacted();
        let toggles = &self.info.toggles;
        let persistent_and_not_transacted =
            delivery_mode == crate::policy::DeliveryMode::Persistent && !transacted;
        let sync =
            toggles.force_sync_send || (!toggles.force_async_send && persistent_and_not_transacted);
        let send_async = !sync;

        // 6. Build outbound envelope.
        let presettle = producer.info.destination.is_none()
            && matches!(
                self.info.presettle_policy,
                crate::policy::PresettlePolicy::Always
                    | crate::policy::PresettlePolicy::ProducersOnly
            );
        let mut envelope = OutboundEnvelope {
            producer_id: producer_id.clone(),
            destination,
            message: Message {
                headers,
                body,
            },
            dispatch_id,
            presettle,
            send_async,
            transaction_id: None,
        };

        // 7. Hand to the transaction context.
        self.transaction.tag_send(&mut envelope)?;

        let request_id = self.tracker.next_request_id();
        let (completer, future) = provider_future::<()>();
        self.tracker
            .register(request_id.clone(), Arc::new(completer.clone()));
        self.provider.load().send(envelope, completer);

        if send_async {
            // Async sends return immediately; completion surfaces via the provider's async
            // failure callback, so we deregister without waiting.
            self.tracker.deregister(&request_id);
            return Ok(dispatch_id);
        }

        let result = future.wait(self.request_timeout);
        self.tracker.deregister(&request_id);
        result.map(|_| dispatch_id)
    }

    // -- acknowledge / recover / commit / rollback ----------------------------

    pub fn acknowledge(&self, envelope: InboundEnvelope, ack: AckType) -> CoreResult<()> {
        self.check_open()?;
        let tx_id = self.transaction.tag_ack(&envelope)?;
        let mut tagged = envelope;
        tagged.transaction_id = tx_id;
        let request_id = self.tracker.next_request_id();
        let (completer, future) = provider_future::<()>();
        self.tracker
            .register(request_id.clone(), Arc::new(completer.clone()));
        self.provider.load().acknowledge_envelope(tagged, ack, completer);
        let result = future.wait(self.request_timeout);
        self.tracker.deregister(&request_id);
        result
    }

    pub fn recover(&self) -> CoreResult<()> {
        self.check_open()?;
        if self.transaction.is_transacted() {
            return Err(CoreError::illegal_state(
                "recover() is not valid on a transacted session",
            ));
        }
        let request_id = self.tracker.next_request_id();
        let (completer, future) = provider_future::<()>();
        self.tracker
            .register(request_id.clone(), Arc::new(completer.clone()));
        self.provider
            .load()
            .recover(self.session_id.clone(), completer);
        let result = future.wait(self.request_timeout);
        self.tracker.deregister(&request_id);
        result?;
        self.session_recovered.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn session_recovered(&self) -> bool {
        self.session_recovered.load(Ordering::SeqCst)
    }

    pub fn commit(&self) -> CoreResult<()> {
        self.check_open()?;
        if !self.transaction.is_transacted() {
            return Err(CoreError::illegal_state("not transacted"));
        }
        self.transaction
            .commit(&**self.provider.load(), &self.tracker, self.request_timeout)
    }

    /// Suspends every consumer, rolls back, then resumes every consumer regardless of whether
    /// the rollback itself succeeded.
    pub fn rollback(&self) -> CoreResult<()> {
        self.check_open()?;
        if !self.transaction.is_transacted() {
            return Err(CoreError::illegal_state("not transacted"));
        }
        let suspended = self.suspend_all_consumers();
        let result =
            self.transaction
                .rollback(&**self.provider.load(), &self.tracker, self.request_timeout);
        self.resume_consumers(&suspended);
        result
    }

    pub fn unsubscribe(&self, name: String) -> CoreResult<()> {
        self.check_open()?;
        let in_use = self.consumers.pin().values().any(|consumer| {
            consumer.info.durable_subscription_name.as_deref() == Some(name.as_str())
        });
        if in_use {
            return Err(CoreError::illegal_state(
                "cannot unsubscribe a name with an active consumer",
            ));
        }
        let request_id = self.tracker.next_request_id();
        let (completer, future) = provider_future::<()>();
        self.tracker
            .register(request_id.clone(), Arc::new(completer.clone()));
        self.provider.load().unsubscribe(name, completer);
        let result = future.wait(self.request_timeout);
        self.tracker.deregister(&request_id);
        result
    }

    /// Session-level bulk acknowledgement, separate from the per-envelope `acknowledge()`: not
    /// valid on a transacted session, which settles through `commit`/`rollback` instead.
    pub fn acknowledge_session(&self, ack: AckType) -> CoreResult<()> {
        self.check_open()?;
        if self.transaction.is_transacted() {
            return Err(CoreError::illegal_state(
                "acknowledge_session is not valid on a transacted session",
            ));
        }
        let request_id = self.tracker.next_request_id();
        let (completer, future) = provider_future::<()>();
        self.tracker
            .register(request_id.clone(), Arc::new(completer.clone()));
        self.provider
            .load()
            .acknowledge_session(self.session_id.clone(), ack, completer);
        let result = future.wait(self.request_timeout);
        self.tracker.deregister(&request_id);
        result
    }

    /// Synchronous consumer receive: a direct forward to the provider's `pull`, waited on for up
    /// to `timeout` (the caller's own receive timeout, not the session's fixed request timeout --
    /// a blocking `receive()` with no message available may legitimately wait far longer).
    /// Returns `Ok(None)` on a timeout with nothing delivered, mirroring `receiveNoWait`/
    /// `receive(timeout)` rather than surfacing it as an error.
    pub fn pull(
        &self,
        consumer_id: &ConsumerId,
        timeout: Duration,
    ) -> CoreResult<Option<InboundEnvelope>> {
        self.check_open()?;
        if !self.consumers.pin().contains_key(consumer_id) {
            return Err(CoreError::illegal_state("no such consumer"));
        }
        let request_id = self.tracker.next_request_id();
        let (completer, future) = provider_future::<Option<InboundEnvelope>>();
        self.tracker
            .register(request_id.clone(), Arc::new(completer.clone()));
        self.provider.load().pull(consumer_id.clone(), timeout, completer);
        let result = future.wait(timeout);
        self.tracker.deregister(&request_id);
        result
    }

    // -- inbound dispatch ------------------------------------------------------

    /// Routes an inbound envelope from the provider. Buffers it if the session is not started;
    /// otherwise delivers it to the consumer's listener (if any) on the session's lazily
    /// allocated message executor, preserving arrival order.
    pub fn on_inbound_message(&self, envelope: InboundEnvelope) -> CoreResult<()> {
        if !self.is_started() {
            self.dispatch_queue.push(envelope)?;
            return Ok(());
        }
        self.deliver(envelope);
        Ok(())
    }

    fn drain_dispatch_queue(&self) {
        for envelope in self.dispatch_queue.drain() {
            self.deliver(envelope);
        }
    }

    fn deliver(&self, envelope: InboundEnvelope) {
        let pinned = self.consumers.pin();
        let Some(consumer) = pinned.get(&envelope.consumer_id) else {
            debug!(consumer = %envelope.consumer_id, "dropping envelope for unknown consumer");
            return;
        };
        let Some(listener) = consumer.listener.lock().unwrap().clone() else {
            return;
        };
        // Submitted to the executor (rather than called inline) to preserve ordering against
        // other callbacks and to avoid running user code on a provider thread.
        self.message_executor().submit(move || listener(envelope));
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}
