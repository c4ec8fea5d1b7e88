//! Core identifier types for the LedgerCore event sourcing engine.
//!
//! All identifiers follow the "parse, don't validate" principle: smart
//! constructors ensure validity at construction time, so a value that exists
//! is a value that is valid for the lifetime of the program.
//!
//! - [`StreamId`]: non-empty, at most 255 characters, trimmed
//! - [`EventKind`]: the registered name of an event type definition
//! - [`RelationKey`]: secondary-index label grouping streams for fan-in reads
//! - [`ReducerName`]: names a reducer; used as the snapshot lookup key
//! - [`EventId`]: always a valid UUIDv7, giving time-based ordering
//!
//! # Examples
//!
//! ```
//! use ledgercore::{StreamId, EventKind, EventId};
//!
//! let stream = StreamId::try_new("user-123").expect("valid stream id");
//! let kind = EventKind::try_new("user:created").expect("valid kind");
//! let id = EventId::new();
//! ```

use nutype::nutype;
use uuid::Uuid;

/// A unique identifier for an event stream.
///
/// A stream groups the ordered set of events representing one logical entity
/// timeline. Streams have no schema of their own; they exist as soon as a
/// record referencing them is inserted.
///
/// # Guarantees
///
/// Once constructed, a `StreamId` is guaranteed to be non-empty (after
/// trimming whitespace) and at most 255 characters.
///
/// # Examples
///
/// ```
/// use ledgercore::StreamId;
///
/// let user_stream = StreamId::try_new("user-123").expect("valid stream id");
///
/// // Stream IDs are automatically trimmed
/// let trimmed = StreamId::try_new("  order-456  ").expect("valid stream id");
/// assert_eq!(trimmed.as_ref(), "order-456");
///
/// // Invalid stream IDs are rejected at construction
/// assert!(StreamId::try_new("").is_err());
/// assert!(StreamId::try_new("   ").is_err());
/// assert!(StreamId::try_new("a".repeat(256)).is_err());
/// ```
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct StreamId(String);

impl StreamId {
    /// Generates a fresh stream identifier from a UUIDv7.
    ///
    /// The record factory calls this when a payload does not name a stream:
    /// the new record opens its own timeline.
    ///
    /// # Examples
    ///
    /// ```
    /// use ledgercore::StreamId;
    ///
    /// let a = StreamId::generate();
    /// let b = StreamId::generate();
    /// assert_ne!(a, b);
    /// ```
    pub fn generate() -> Self {
        Self::try_new(Uuid::now_v7().to_string()).expect("uuid string is non-empty")
    }
}

/// The name of a registered event type definition.
///
/// Every [`EventRecord`](crate::EventRecord) carries the kind of the
/// definition it was created from; the catalog maps kinds to their data and
/// meta schemas. Kinds are conventionally namespaced with a colon, e.g.
/// `"user:created"`, but any non-empty string up to 255 characters is
/// accepted.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EventKind(String);

/// A secondary-index label tagging a set of streams for fan-in reads.
///
/// A key has no ownership semantics: a stream may appear under many keys and
/// a key may reference many streams. The `(key, stream)` pair is unique per
/// ledger.
///
/// # Examples
///
/// ```
/// use ledgercore::RelationKey;
///
/// let key = RelationKey::try_new("user:u1:posts").expect("valid key");
/// assert_eq!(key.as_ref(), "user:u1:posts");
/// ```
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct RelationKey(String);

/// The name of a reducer.
///
/// Reducer names key snapshots: at most one snapshot exists per
/// `(name, stream-or-relation)` pair, so two reducers sharing a name would
/// overwrite each other's cursors.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ReducerName(String);

/// A globally unique event identifier using UUIDv7 format.
///
/// `EventId` provides globally unique identification for records while the
/// embedded timestamp component keeps identifiers roughly time-ordered.
/// Ordering of records in the ledger is defined by their
/// [`created`](crate::EventRecord::created) HLC timestamp, not by the id; the
/// id exists for uniqueness and point lookups.
///
/// # Guarantees
///
/// Every `EventId` is a valid UUIDv7 (RFC 9562), suitable for distributed
/// generation without coordination.
///
/// # Examples
///
/// ```
/// use ledgercore::EventId;
/// use uuid::Uuid;
///
/// let id = EventId::new();
///
/// // Only UUIDv7 values are accepted
/// assert!(EventId::try_new(Uuid::nil()).is_err());
/// ```
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new `EventId` with the current timestamp.
    ///
    /// # Examples
    ///
    /// ```
    /// use ledgercore::EventId;
    ///
    /// let id = EventId::new();
    /// let another = EventId::new();
    /// assert_ne!(id, another);
    /// ```
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() always returns a valid v7 UUID")
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn stream_id_accepts_valid_strings(s in "[a-zA-Z0-9_:-]{1,255}") {
            let result = StreamId::try_new(s.clone());
            prop_assert!(result.is_ok());
            let value = result.unwrap();
            prop_assert_eq!(value.as_ref(), &s);
        }

        #[test]
        fn stream_id_trims_whitespace(s in " {0,10}[a-zA-Z0-9_:-]{1,240} {0,10}") {
            let result = StreamId::try_new(s.clone());
            prop_assert!(result.is_ok());
            let value = result.unwrap();
            prop_assert_eq!(value.as_ref(), s.trim());
        }

        #[test]
        fn stream_id_rejects_blank_strings(s in " {0,50}") {
            prop_assert!(StreamId::try_new(s).is_err());
        }

        #[test]
        fn event_kind_roundtrip_serialization(s in "[a-z:]{1,64}") {
            let kind = EventKind::try_new(s).unwrap();
            let json = serde_json::to_string(&kind).unwrap();
            let back: EventKind = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(kind, back);
        }
    }

    #[test]
    fn stream_id_rejects_over_255_chars() {
        assert!(StreamId::try_new("a".repeat(256)).is_err());
        assert!(StreamId::try_new("a".repeat(255)).is_ok());
    }

    #[test]
    fn generated_stream_ids_are_unique() {
        let a = StreamId::generate();
        let b = StreamId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn event_id_new_creates_valid_v7() {
        let id = EventId::new();
        assert_eq!(id.as_ref().get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn event_id_rejects_non_v7_uuids() {
        assert!(EventId::try_new(Uuid::nil()).is_err());
        assert!(EventId::try_new(Uuid::max()).is_err());

        let mut bytes = [0u8; 16];
        bytes[6] = 0x40; // version 4
        bytes[8] = 0x80;
        assert!(EventId::try_new(Uuid::from_bytes(bytes)).is_err());
    }

    #[test]
    fn relation_key_and_reducer_name_validate_like_stream_id() {
        assert!(RelationKey::try_new("").is_err());
        assert!(ReducerName::try_new("   ").is_err());
        assert_eq!(
            RelationKey::try_new(" user:u1:posts ").unwrap().as_ref(),
            "user:u1:posts"
        );
        assert_eq!(ReducerName::try_new("user").unwrap().as_ref(), "user");
    }
}
