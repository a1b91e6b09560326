use crate::common::Properties;
use crate::errors::ZeoliteResult;
use crate::store::{CommitSink, SinkId};
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::sync::Arc;

/// Identifies a collection within a database by scope and name.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct CollectionId {
    scope: String,
    name: String,
}

impl CollectionId {
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        CollectionId {
            scope: scope.into(),
            name: name.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The qualified `scope.name` form used in logs.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.scope, self.name)
    }
}

impl Display for CollectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.scope, self.name)
    }
}

/// An opaque version token identifying one immutable revision of a
/// document's content. A document handle that has never been saved carries
/// no revision ID.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RevisionId(String);

impl RevisionId {
    pub fn new(id: impl Into<String>) -> Self {
        RevisionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric generation prefix, when the ID has the `gen-suffix`
    /// shape; 0 otherwise.
    pub fn generation(&self) -> u64 {
        self.0
            .split('-')
            .next()
            .and_then(|g| g.parse().ok())
            .unwrap_or(0)
    }
}

impl Display for RevisionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for RevisionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RevisionId({})", self.0)
    }
}

/// The current stored state of a document: its revision ID, sequence
/// number, deletion flag, and properties. Tombstones are snapshots with
/// `deleted = true` and empty properties; they remain valid revisions for
/// conflict detection.
#[derive(Clone, Debug)]
pub struct RevisionSnapshot {
    revision: RevisionId,
    sequence: u64,
    deleted: bool,
    properties: Properties,
}

impl RevisionSnapshot {
    pub fn new(
        revision: RevisionId,
        sequence: u64,
        deleted: bool,
        properties: Properties,
    ) -> Self {
        RevisionSnapshot {
            revision,
            sequence,
            deleted,
            properties,
        }
    }

    pub fn revision(&self) -> &RevisionId {
        &self.revision
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn into_properties(self) -> Properties {
        self.properties
    }
}

/// The narrow contract the mutation and notification layers consume from a
/// storage engine.
///
/// The store is the only mutual-exclusion boundary shared across database
/// handles: the atomic `put_if_match` primitive is the sole way stored
/// state changes, and every higher-level concurrency policy is expressed by
/// retrying it. Implementations must serialize commits per collection and
/// honor the two-phase [`CommitSink`] contract.
pub trait RevisionStoreProvider: Send + Sync {
    /// Creates the collection's storage if absent; reopens it if present.
    fn open_collection(&self, collection: &CollectionId) -> ZeoliteResult<()>;

    /// Removes the collection's storage and detaches its subscribers.
    /// Subsequent operations on the collection fail with `InvalidState`.
    fn drop_collection(&self, collection: &CollectionId) -> ZeoliteResult<()>;

    fn is_collection_dropped(&self, collection: &CollectionId) -> ZeoliteResult<bool>;

    /// IDs of all open (non-dropped) collections, in name order.
    fn collection_ids(&self) -> ZeoliteResult<Vec<CollectionId>>;

    /// Reads the current revision of `doc_id`, tombstones included.
    fn get_current(
        &self,
        collection: &CollectionId,
        doc_id: &str,
    ) -> ZeoliteResult<Option<RevisionSnapshot>>;

    /// Atomically replaces the current revision of `doc_id` if its revision
    /// ID equals `base`, assigning a fresh revision ID and the next
    /// per-collection sequence number. `body = None` writes a tombstone.
    ///
    /// Fails with `Conflict` when the base does not match the stored
    /// current revision, and with `NotFound` when `base` names a revision
    /// but no current revision exists at all (the document was purged or
    /// never saved).
    fn put_if_match(
        &self,
        collection: &CollectionId,
        doc_id: &str,
        base: Option<&RevisionId>,
        body: Option<Properties>,
    ) -> ZeoliteResult<(RevisionId, u64)>;

    /// Unconditionally removes all stored state for `doc_id`, bypassing
    /// conflict detection. Fails with `NotFound` if the document has no
    /// stored state.
    fn purge(&self, collection: &CollectionId, doc_id: &str) -> ZeoliteResult<()>;

    /// The last sequence number assigned in the collection.
    fn last_sequence(&self, collection: &CollectionId) -> ZeoliteResult<u64>;

    /// Number of live (non-tombstone) documents.
    fn count(&self, collection: &CollectionId) -> ZeoliteResult<u64>;

    fn subscribe_commits(
        &self,
        collection: &CollectionId,
        sink: Arc<dyn CommitSink>,
    ) -> ZeoliteResult<SinkId>;

    fn unsubscribe_commits(&self, collection: &CollectionId, sink: SinkId)
        -> ZeoliteResult<()>;

    fn close(&self) -> ZeoliteResult<()>;

    fn is_closed(&self) -> bool;
}

/// A revision store handle.
///
/// Thin clone-friendly wrapper over a [`RevisionStoreProvider`]
/// implementation; all clones share the same underlying store.
#[derive(Clone)]
pub struct RevisionStore {
    inner: Arc<dyn RevisionStoreProvider>,
}

impl RevisionStore {
    pub fn new<T: RevisionStoreProvider + 'static>(inner: T) -> Self {
        RevisionStore {
            inner: Arc::new(inner),
        }
    }
}

impl Deref for RevisionStore {
    type Target = Arc<dyn RevisionStoreProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_id_full_name() {
        let id = CollectionId::new("inventory", "widgets");
        assert_eq!(id.scope(), "inventory");
        assert_eq!(id.name(), "widgets");
        assert_eq!(id.full_name(), "inventory.widgets");
        assert_eq!(format!("{}", id), "inventory.widgets");
    }

    #[test]
    fn test_revision_id_generation() {
        assert_eq!(RevisionId::new("3-abc").generation(), 3);
        assert_eq!(RevisionId::new("17-ff00").generation(), 17);
        assert_eq!(RevisionId::new("opaque").generation(), 0);
    }

    #[test]
    fn test_revision_snapshot_accessors() {
        let snapshot = RevisionSnapshot::new(
            RevisionId::new("1-a"),
            4,
            false,
            crate::props! { name: "bob" },
        );
        assert_eq!(snapshot.revision().as_str(), "1-a");
        assert_eq!(snapshot.sequence(), 4);
        assert!(!snapshot.is_deleted());
        assert_eq!(
            snapshot.properties().get("name").and_then(crate::common::Value::as_str),
            Some("bob")
        );
    }
}
