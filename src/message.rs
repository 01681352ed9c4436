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

//! Envelopes: in-memory wrappers around a message plus routing metadata. Message body encoding
//! is out of scope for the core -- `Message` carries an opaque byte body and the header fields
//! the send algorithm and recover()/redelivery semantics actually touch.

use crate::destination::Destination;
use crate::ids::{ConsumerId, ProducerId, TransactionId};
use crate::policy::DeliveryMode;
use std::time::SystemTime;

#[derive(Debug, Clone, Default)]
pub struct MessageHeaders {
    pub delivery_mode: DeliveryMode,
    pub priority: u8,
    pub redelivered: bool,
    pub destination: Option<Destination>,
    pub timestamp: u64,
    pub expiration: u64,
    pub message_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Message {
    pub headers: MessageHeaders,
    pub body: Vec<u8>,
}

impl Message {
    pub fn now_millis() -> u64 {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Acknowledgement kinds forwarded to the provider. The core does not enforce which kinds are
/// valid in which acknowledgement mode -- it forwards whatever the caller picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckType {
    Delivered,
    Accepted,
    Released,
    Rejected,
    ModifiedFailed,
    ModifiedFailedUndeliverable,
    Poisoned,
}

/// An inbound envelope as delivered from the provider to a consumer.
#[derive(Debug, Clone)]
pub struct InboundEnvelope {
    pub consumer_id: ConsumerId,
    pub transaction_id: Option<TransactionId>,
    pub message: Message,
    pub dispatch_id: u64,
}

/// An outbound envelope as handed from a producer to the provider.
#[derive(Debug, Clone)]
pub struct OutboundEnvelope {
    pub producer_id: ProducerId,
    pub destination: Destination,
    pub message: Message,
    pub dispatch_id: u64,
    pub presettle: bool,
    pub send_async: bool,
    pub transaction_id: Option<TransactionId>,
}
