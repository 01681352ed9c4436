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

//! Configuration clusters for connections, sessions, producers and consumers. This is the
//! core's only notion of "configuration" -- it is handed in by the embedding adapter, not read
//! from files or environment variables by this crate.

use crate::destination::Destination;
use crate::ids::ConnectionId;
use std::time::Duration;

/// Opaque redelivery policy. The core treats this as configuration it forwards to the provider
/// untouched; redelivery counting and backoff live in the provider.
#[derive(Debug, Clone, Default)]
pub struct RedeliveryPolicy {
    pub max_redeliveries: Option<u32>,
}

/// Opaque prefetch policy, forwarded to the provider untouched.
#[derive(Debug, Clone, Default)]
pub struct PrefetchPolicy {
    pub queue_prefetch: u32,
    pub topic_prefetch: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresettlePolicy {
    #[default]
    Never,
    ProducersOnly,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    #[default]
    Persistent,
    NonPersistent,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Timeouts {
    pub connect: Duration,
    pub close: Duration,
    pub send: Duration,
    pub request: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            close: Duration::from_secs(15),
            send: Duration::from_secs(0),
            request: Duration::from_secs(20),
        }
    }
}

/// Independent boolean toggles that change send/ack/validation behavior. Grouped together
/// because the source models them as a flat bag of flags on the connection info, not as
/// individually-named fields scattered across the connection struct.
#[derive(Debug, Clone, Default)]
pub struct ConnectionToggles {
    pub force_sync_send: bool,
    pub force_async_send: bool,
    pub force_async_acks: bool,
    pub populate_user_id: bool,
    pub validate_property_names: bool,
    pub local_message_expiry: bool,
    pub local_message_priority: bool,
    pub receive_local_only: bool,
    pub receive_no_wait_local_only: bool,
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    client_id: Option<String>,
    client_id_set: bool,
    pub configured_uris: Vec<String>,
    pub connected_uri: Option<String>,
    pub credentials: Credentials,
    pub prefetch_policy: PrefetchPolicy,
    pub redelivery_policy: RedeliveryPolicy,
    pub presettle_policy: PresettlePolicy,
    pub timeouts: Timeouts,
    pub toggles: ConnectionToggles,
}

impl ConnectionInfo {
    pub fn new(connection_id: ConnectionId, configured_uris: Vec<String>) -> Self {
        Self {
            connection_id,
            client_id: None,
            client_id_set: false,
            configured_uris,
            connected_uri: None,
            credentials: Credentials {
                username: None,
                password: None,
            },
            prefetch_policy: PrefetchPolicy::default(),
            redelivery_policy: RedeliveryPolicy::default(),
            presettle_policy: PresettlePolicy::default(),
            timeouts: Timeouts::default(),
            toggles: ConnectionToggles::default(),
        }
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn client_id_set(&self) -> bool {
        self.client_id_set
    }

    /// Invariant 2: monotonic false -> true, caller must have already checked `connected`.
    pub fn set_client_id(&mut self, client_id: impl Into<String>) {
        self.client_id = Some(client_id.into());
        self.client_id_set = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    Transacted,
    AutoAck,
    ClientAck,
    DupsOk,
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub ack_mode: AckMode,
    pub prefetch_policy: PrefetchPolicy,
    pub redelivery_policy: RedeliveryPolicy,
    pub presettle_policy: PresettlePolicy,
    pub toggles: ConnectionToggles,
}

impl SessionInfo {
    pub fn inherit(connection_info: &ConnectionInfo, ack_mode: AckMode) -> Self {
        Self {
            ack_mode,
            prefetch_policy: connection_info.prefetch_policy.clone(),
            redelivery_policy: connection_info.redelivery_policy.clone(),
            presettle_policy: connection_info.presettle_policy,
            toggles: connection_info.toggles.clone(),
        }
    }

    pub fn is_transacted(&self) -> bool {
        self.ack_mode == AckMode::Transacted
    }
}

#[derive(Debug, Clone)]
pub struct ProducerInfo {
    pub destination: Option<Destination>,
}

#[derive(Debug, Clone)]
pub struct ConsumerInfo {
    pub destination: Destination,
    pub selector: Option<String>,
    pub no_local: bool,
    pub durable_subscription_name: Option<String>,
}
