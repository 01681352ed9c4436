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

//! Tracks in-flight asynchronous requests so every one of them can be failed when the provider
//! is lost, rather than leaving an application thread blocked on a future that will never
//! complete.

use crate::error::{CoreError, FailureCause};
use crate::ids::RequestId;
use crate::provider::CompletionSink;
use papaya::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub struct RequestTracker {
    pending: HashMap<u64, Arc<dyn CompletionSink>>,
    next_id: AtomicU64,
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Allocates a fresh request id. Callers register the completion sink under this id
    /// *before* invoking the provider call, so a failure that races the call itself is never
    /// missed.
    pub fn next_request_id(&self) -> RequestId {
        RequestId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn register(&self, id: RequestId, sink: Arc<dyn CompletionSink>) {
        self.pending.pin().insert(id.0, sink);
    }

    /// Deregisters a request after it has completed, on any path (success or failure). Calling
    /// this for an id that is not present is a harmless no-op.
    pub fn deregister(&self, id: &RequestId) {
        self.pending.pin().remove(&id.0);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.pin().len()
    }

    /// Fails every request pending *right now* with `cause`. Completion is idempotent, so
    /// calling this twice (once inline to unblock current awaiters immediately, once again on
    /// the executor to catch registrations that race the failure) is safe -- the second pass
    /// only catches requests that were not yet registered on the first pass.
    pub fn fail_all(&self, cause: FailureCause) {
        let pinned = self.pending.pin();
        let ids: Vec<u64> = pinned.keys().copied().collect();
        debug!(count = ids.len(), "failing all pending requests");
        for id in ids {
            if let Some(sink) = pinned.get(&id) {
                sink.fail(CoreError::ConnectionFailed(cause.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::provider_future;
    use std::sync::Arc as StdArc;
    use std::time::Duration;

    #[test]
    fn fail_all_completes_every_pending_request() {
        let tracker = RequestTracker::new();
        let mut futures = Vec::new();
        for _ in 0..5 {
            let id = tracker.next_request_id();
            let (completer, future) = provider_future::<()>();
            tracker.register(id.clone(), StdArc::new(completer));
            futures.push(future);
        }
        assert_eq!(tracker.pending_count(), 5);

        let cause: FailureCause = StdArc::from("socket reset");
        tracker.fail_all(cause.clone());

        for future in futures {
            let err = future.wait(Duration::from_secs(1)).unwrap_err();
            match err {
                CoreError::ConnectionFailed(c) => assert_eq!(&*c, &*cause),
                other => panic!("expected ConnectionFailed, got {other:?}"),
            }
        }
    }

    #[test]
    fn double_fail_all_is_idempotent() {
        let tracker = RequestTracker::new();
        let id = tracker.next_request_id();
        let (completer, future) = provider_future::<()>();
        tracker.register(id, StdArc::new(completer));

        let cause: FailureCause = StdArc::from("boom");
        tracker.fail_all(cause.clone());
        tracker.fail_all(cause);

        // Only one completion is observed; the second fail_all is a no-op for this request.
        assert!(future.wait(Duration::from_secs(1)).is_err());
    }

    #[test]
    fn deregister_removes_from_pending_set() {
        let tracker = RequestTracker::new();
        let id = tracker.next_request_id();
        let (completer, _future) = provider_future::<()>();
        tracker.register(id.clone(), StdArc::new(completer));
        assert_eq!(tracker.pending_count(), 1);
        tracker.deregister(&id);
        assert_eq!(tracker.pending_count(), 0);
    }
}
