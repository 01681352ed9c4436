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

//! The connection-owned registry of temporary destinations it has created. Kept as its own
//! small collaborator (rather than folded into `Connection`) so sessions can be handed a
//! reference to it without holding their owning connection by strong reference.

use crate::destination::{Destination, TemporaryDestination};
use crate::error::{CoreError, CoreResult};
use crate::ids::{ConnectionId, IdSequence};
use papaya::HashMap as ConcurrentMap;

pub struct TempDestinationRegistry {
    entries: ConcurrentMap<String, TemporaryDestination>,
    counter: IdSequence,
}

impl TempDestinationRegistry {
    pub fn new() -> Self {
        Self {
            entries: ConcurrentMap::new(),
            counter: IdSequence::new(),
        }
    }

    pub fn create_queue(&self, connection_id: &ConnectionId) -> Destination {
        self.create(connection_id, true)
    }

    pub fn create_topic(&self, connection_id: &ConnectionId) -> Destination {
        self.create(connection_id, false)
    }

    fn create(&self, connection_id: &ConnectionId, is_queue: bool) -> Destination {
        let counter = self.counter.next();
        let destination = if is_queue {
            Destination::temporary_queue(connection_id, counter)
        } else {
            Destination::temporary_topic(connection_id, counter)
        };
        self.entries.pin().insert(
            destination.name.clone(),
            TemporaryDestination::new(destination.clone(), connection_id.clone()),
        );
        destination
    }

    /// A non-temporary destination is never "deleted" in this registry's sense. A temporary one
    /// is deleted if it is not (or no longer) present here -- either it never existed, or
    /// `delete` already removed it.
    pub fn is_deleted(&self, destination: &Destination) -> bool {
        destination.temporary && !self.entries.pin().contains_key(&destination.name)
    }

    /// Deletes a temporary destination this connection owns. Refuses deletion of a destination
    /// owned by a different connection or one that does not exist.
    pub fn delete(&self, destination: &Destination, connection_id: &ConnectionId) -> CoreResult<()> {
        let pinned = self.entries.pin();
        match pinned.get(&destination.name) {
            None => Err(CoreError::InvalidDestination(format!(
                "{destination} does not exist"
            ))),
            Some(temp) if !temp.owned_by(connection_id) => Err(CoreError::InvalidDestination(
                format!("{destination} is not owned by this connection"),
            )),
            Some(_) => {
                pinned.remove(&destination.name);
                Ok(())
            }
        }
    }

    /// All temporary destinations this connection currently owns, in no particular order. Used
    /// by recovery to redeclare them against a freshly (re)connected provider.
    pub fn owned_by(&self, connection_id: &ConnectionId) -> Vec<Destination> {
        self.entries
            .pin()
            .values()
            .filter(|temp| temp.owned_by(connection_id))
            .map(|temp| temp.destination.clone())
            .collect()
    }

    /// Drops every entry. Called on connection close; the source also calls the equivalent
    /// clear on each per-destination delete, which is redundant once the whole table is being
    /// torn down (see the open question in DESIGN.md) but harmless, so this type tolerates being
    /// called again after individual deletes.
    pub fn clear(&self) {
        self.entries.pin().clear();
    }
}

impl Default for TempDestinationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_destination_is_not_deleted() {
        let registry = TempDestinationRegistry::new();
        let connection_id = ConnectionId::new();
        let dest = registry.create_queue(&connection_id);
        assert!(!registry.is_deleted(&dest));
    }

    #[test]
    fn unknown_temp_destination_is_deleted() {
        let registry = TempDestinationRegistry::new();
        let connection_id = ConnectionId::new();
        let dest = Destination::temporary_queue(&connection_id, 99);
        assert!(registry.is_deleted(&dest));
    }

    #[test]
    fn permanent_destination_is_never_deleted() {
        let registry = TempDestinationRegistry::new();
        assert!(!registry.is_deleted(&Destination::queue("orders")));
    }

    #[test]
    fn delete_is_refused_for_foreign_owner() {
        let registry = TempDestinationRegistry::new();
        let owner = ConnectionId::new();
        let other = ConnectionId::new();
        let dest = registry.create_queue(&owner);
        assert!(registry.delete(&dest, &other).is_err());
        assert!(registry.delete(&dest, &owner).is_ok());
        assert!(registry.is_deleted(&dest));
    }

    #[test]
    fn owned_by_lists_only_this_connections_destinations() {
        let registry = TempDestinationRegistry::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        registry.create_queue(&a);
        registry.create_topic(&a);
        registry.create_queue(&b);
        assert_eq!(registry.owned_by(&a).len(), 2);
        assert_eq!(registry.owned_by(&b).len(), 1);
    }
}
