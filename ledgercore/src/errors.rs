//! Error types for the LedgerCore engine.
//!
//! One enum per subsystem, each with a `Result` alias. Every surfaced error
//! carries a structured kind and a human-readable message; validation
//! failures additionally carry the offending record and the sorted list of
//! issue strings.

use thiserror::Error;

use crate::record::EventRecord;
use crate::types::{EventId, EventKind};

/// Errors produced by the hybrid logical clock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    /// The wall clock stepped forward beyond the configured tolerance.
    #[error("wall clock jumped forward by {jump}ms, tolerated forward jump is {tolerance}ms")]
    ForwardJump {
        /// Observed forward step in milliseconds.
        jump: u64,
        /// Configured tolerance in milliseconds.
        tolerance: u64,
    },

    /// A received timestamp leads the wall clock by more than the allowed
    /// offset.
    #[error("timestamp is {offset}ms ahead of the wall clock, max offset is {max}ms")]
    ClockOffset {
        /// Observed lead in milliseconds.
        offset: u64,
        /// Configured maximum in milliseconds.
        max: u64,
    },

    /// The produced wall time reached the configured upper bound.
    #[error("wall time {time}ms reached the upper bound of {max}ms")]
    WallTimeOverflow {
        /// The wall time that was about to be produced.
        time: u64,
        /// The bound in effect.
        max: u64,
    },

    /// A timestamp string did not match the `"{time}-{logical:05}"` wire
    /// format.
    #[error("malformed timestamp '{0}'")]
    Malformed(String),
}

/// Errors produced by a storage adapter.
///
/// Adapters reduce their backend failures to a message; the store wraps
/// write failures as [`StoreError::Insertion`] and read failures as
/// [`StoreError::Adapter`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AdapterError(String);

impl AdapterError {
    /// Creates an adapter error from a backend message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors surfaced by the event store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named event kind is not registered with the catalog.
    #[error("unknown event kind '{0}'")]
    MissingEvent(EventKind),

    /// A record failed validation against its type's schemas.
    #[error("validation failed for record {}:\n{}", record.id, issues.join("\n"))]
    Validation {
        /// The record that failed validation.
        record: Box<EventRecord>,
        /// Human-readable issues, sorted by path depth ascending.
        issues: Vec<String>,
    },

    /// The adapter rejected a write. For a multi-record insert the entire
    /// batch is rejected atomically.
    #[error("insertion failed: {0}")]
    Insertion(String),

    /// The adapter failed a read operation.
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// Reducer state could not be serialized for a snapshot, or snapshot
    /// state could not be deserialized back into reducer state.
    #[error("snapshot state serialization failed: {0}")]
    Serialization(String),

    /// The hybrid logical clock refused to produce a timestamp.
    #[error(transparent)]
    Clock(#[from] ClockError),

    /// A projection handler failed while the store was fanning out an
    /// inserted record.
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// A configured hook failed after a successful insert. Absorbed by the
    /// store's error routing, never failing the insert itself.
    #[error("hook '{hook}' failed: {reason}")]
    Hook {
        /// The hook that failed.
        hook: &'static str,
        /// Failure description.
        reason: String,
    },
}

/// Errors produced by the projection system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    /// A subscriber handler failed to process a record.
    #[error("handler failed for event {id}: {reason}")]
    HandlerFailed {
        /// Id of the record being dispatched.
        id: EventId,
        /// The handler's failure description.
        reason: String,
    },

    /// The per-stream queue was dropped before the dispatch completed.
    #[error("projection queue closed before event {id} was dispatched")]
    QueueClosed {
        /// Id of the record whose dispatch was lost.
        id: EventId,
    },

    /// A second handler was registered for a kind on a single-handler
    /// channel.
    #[error("a handler is already registered for kind '{kind}'")]
    DuplicateHandler {
        /// The kind that already has a handler.
        kind: EventKind,
    },
}

/// Result alias for clock operations.
pub type ClockResult<T> = Result<T, ClockError>;

/// Result alias for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result alias for projection operations.
pub type ProjectionResult<T> = Result<T, ProjectionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;
    use crate::types::StreamId;

    #[test]
    fn clock_error_messages_are_descriptive() {
        let err = ClockError::ForwardJump {
            jump: 5000,
            tolerance: 1000,
        };
        assert_eq!(
            err.to_string(),
            "wall clock jumped forward by 5000ms, tolerated forward jump is 1000ms"
        );

        let err = ClockError::ClockOffset {
            offset: 2000,
            max: 500,
        };
        assert_eq!(
            err.to_string(),
            "timestamp is 2000ms ahead of the wall clock, max offset is 500ms"
        );

        let err = ClockError::Malformed("nope".to_string());
        assert_eq!(err.to_string(), "malformed timestamp 'nope'");
    }

    #[test]
    fn store_error_messages_are_descriptive() {
        let kind = EventKind::try_new("user:created").unwrap();
        let err = StoreError::MissingEvent(kind.clone());
        assert_eq!(err.to_string(), "unknown event kind 'user:created'");

        let record = EventRecord {
            id: EventId::new(),
            stream: StreamId::try_new("u1").unwrap(),
            kind,
            data: None,
            meta: None,
            created: Timestamp::new(1, 0),
            recorded: Timestamp::new(1, 0),
        };
        let err = StoreError::Validation {
            record: Box::new(record.clone()),
            issues: vec!["✖ first".to_string(), "✖ second".to_string()],
        };
        let rendered = err.to_string();
        assert!(rendered.contains(&record.id.to_string()));
        assert!(rendered.contains("✖ first\n✖ second"));

        let err = StoreError::Insertion("unique violation".to_string());
        assert_eq!(err.to_string(), "insertion failed: unique violation");
    }

    #[test]
    fn clock_error_converts_into_store_error() {
        let clock_err = ClockError::WallTimeOverflow { time: 10, max: 5 };
        let store_err: StoreError = clock_err.clone().into();
        assert!(matches!(store_err, StoreError::Clock(e) if e == clock_err));
    }

    #[test]
    fn projection_error_messages_are_descriptive() {
        let id = EventId::new();
        let err = ProjectionError::HandlerFailed {
            id,
            reason: "read model write failed".to_string(),
        };
        assert!(err.to_string().contains("handler failed for event"));
        assert!(err.to_string().contains("read model write failed"));

        let err = ProjectionError::DuplicateHandler {
            kind: EventKind::try_new("user:created").unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "a handler is already registered for kind 'user:created'"
        );
    }
}
