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

//! Destinations are treated as values with identity and a `temporary` flag; the type hierarchy
//! and name-parsing rules that a full implementation would have live in the adapter, out of
//! scope for the core.

use crate::ids::ConnectionId;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationKind {
    Queue,
    Topic,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub kind: DestinationKind,
    pub name: String,
    pub temporary: bool,
}

impl Destination {
    pub fn queue(name: impl Into<String>) -> Self {
        Self {
            kind: DestinationKind::Queue,
            name: name.into(),
            temporary: false,
        }
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            kind: DestinationKind::Topic,
            name: name.into(),
            temporary: false,
        }
    }

    /// Builds the temporary destination name `"{connectionId}:{counter}"` and marks it temporary.
    fn temporary(kind: DestinationKind, connection_id: &ConnectionId, counter: u64) -> Self {
        Self {
            kind,
            name: format!("{connection_id}:{counter}"),
            temporary: true,
        }
    }

    pub fn temporary_queue(connection_id: &ConnectionId, counter: u64) -> Self {
        Self::temporary(DestinationKind::Queue, connection_id, counter)
    }

    pub fn temporary_topic(connection_id: &ConnectionId, counter: u64) -> Self {
        Self::temporary(DestinationKind::Topic, connection_id, counter)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DestinationKind::Queue => "queue",
            DestinationKind::Topic => "topic",
        };
        write!(f, "{kind}://{}", self.name)
    }
}

/// A temporary destination plus the connection that owns it. Lives in the connection's
/// temp-destination set until deleted explicitly or the connection closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporaryDestination {
    pub destination: Destination,
    pub owner: ConnectionId,
}

impl TemporaryDestination {
    pub fn new(destination: Destination, owner: ConnectionId) -> Self {
        debug_assert!(destination.temporary);
        Self { destination, owner }
    }

    /// A temporary destination is only deletable by the connection that created it.
    pub fn owned_by(&self, connection_id: &ConnectionId) -> bool {
        &self.owner == connection_id
    }
}
