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

//! Per-session buffer of inbound envelopes while the session is stopped. `start()` drains this
//! FIFO in order, ahead of anything arriving live, so a consumer never observes reordering
//! across the stop/start boundary.

use crate::error::{CoreError, CoreResult};
use crate::message::InboundEnvelope;
use std::collections::VecDeque;
use std::sync::Mutex;

pub const DEFAULT_CAPACITY: usize = 10_000;

pub struct DispatchQueue {
    capacity: usize,
    buffer: Mutex<VecDeque<InboundEnvelope>>,
}

impl DispatchQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueues an envelope that arrived while the session was stopped. Refuses to accept past
    /// capacity rather than growing unbounded or silently dropping the envelope.
    pub fn push(&self, envelope: InboundEnvelope) -> CoreResult<()> {
        let mut buffer = self.buffer.lock().unwrap();
        if buffer.len() >= self.capacity {
            return Err(CoreError::DispatchQueueOverflow(self.capacity));
        }
        buffer.push_back(envelope);
        Ok(())
    }

    /// Drains the whole buffer in FIFO order. Called exactly once per `start()`, before any
    /// envelope arriving concurrently with the drain is handed to the same delivery path.
    pub fn drain(&self) -> Vec<InboundEnvelope> {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ConnectionId, ConsumerId, SessionId};
    use crate::message::Message;

    fn envelope(dispatch_id: u64) -> InboundEnvelope {
        let connection_id = ConnectionId::new();
        let session_id = SessionId {
            connection_id,
            sequence: 0,
        };
        InboundEnvelope {
            consumer_id: ConsumerId {
                session_id,
                sequence: 0,
            },
            transaction_id: None,
            message: Message::default(),
            dispatch_id,
        }
    }

    #[test]
    fn drains_in_fifo_order() {
        let queue = DispatchQueue::default();
        for i in 0..10 {
            queue.push(envelope(i)).unwrap();
        }
        let drained = queue.drain();
        let ids: Vec<u64> = drained.iter().map(|e| e.dispatch_id).collect();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_is_refused_not_dropped() {
        let queue = DispatchQueue::new(2);
        queue.push(envelope(0)).unwrap();
        queue.push(envelope(1)).unwrap();
        let err = queue.push(envelope(2)).unwrap_err();
        assert!(matches!(err, CoreError::DispatchQueueOverflow(2)));
        // The rejected envelope must not have been silently accepted anyway.
        assert_eq!(queue.len(), 2);
    }
}
