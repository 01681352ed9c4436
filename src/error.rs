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

//! The error taxonomy the whole crate reports through. Every synchronous operation
//! translates provider failures into one of these at the boundary; nothing downstream of the
//! provider should need to inspect provider-specific error types.

use std::sync::Arc;
use thiserror::Error;

/// Cause reported by the provider when a connection is permanently lost. Shared (`Arc`) because
/// the same cause is replayed into every pending request and every subsequent call on a failed
/// connection.
pub type FailureCause = Arc<str>;

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    #[error("invalid client id: {0}")]
    InvalidClientId(String),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(FailureCause),

    #[error("not supported: {0}")]
    NotSupported(&'static str),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("provider closed while request was pending")]
    ProviderClosed,

    /// The stopped-session dispatch queue is at capacity. The source treats this queue as
    /// unbounded in practice despite a declared capacity; this crate tightens that ambiguity
    /// (see DESIGN.md) by refusing acceptance and surfacing this as an async exception instead
    /// of growing without bound or silently dropping the envelope.
    #[error("dispatch queue overflow: buffer of {0} envelopes is full")]
    DispatchQueueOverflow(usize),
}

impl CoreError {
    pub fn illegal_state(reason: &'static str) -> Self {
        Self::IllegalState(reason)
    }

    /// True for errors that are expected/benign during an orderly shutdown and should not be
    /// escalated to a user exception listener.
    pub fn is_benign_during_close(&self) -> bool {
        matches!(self, Self::ProviderClosed | Self::IllegalState(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failed_carries_cause() {
        let cause: FailureCause = Arc::from("socket reset by peer");
        let err = CoreError::ConnectionFailed(cause.clone());
        assert_eq!(err.to_string(), "connection failed: socket reset by peer");
    }

    #[test]
    fn provider_closed_is_benign_during_close() {
        assert!(CoreError::ProviderClosed.is_benign_during_close());
        assert!(!CoreError::Timeout(std::time::Duration::from_secs(1)).is_benign_during_close());
    }
}
