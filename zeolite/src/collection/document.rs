use super::collection::CollectionInner;
use crate::common::{Properties, Value};
use crate::errors::{ErrorKind, ZeoliteError, ZeoliteResult};
use crate::store::{RevisionId, RevisionSnapshot};
use parking_lot::RwLock;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// A handle to one document: its ID, the revision it was read from, and a
/// copy-on-write overlay of its properties.
///
/// Handles come in two flavors. Documents fetched with
/// [`Collection::document`](crate::Collection::document) are immutable
/// snapshots, safe to share and read from any number of threads. Documents
/// created fresh, fetched with
/// [`Collection::mutable_document`](crate::Collection::mutable_document),
/// or forked with [`mutable_copy`](Document::mutable_copy) accept property
/// writes; the contract is a single mutator at a time per handle.
///
/// Handles are cheap to clone and all clones share state: a save upgrades
/// the handle in place, so every clone immediately observes the new
/// revision ID and sequence number.
///
/// Reads of an unmodified property return the value from the base revision;
/// a write materializes only the touched path, leaving the rest of the tree
/// shared with the base (see [`Properties`]).
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

struct DocumentInner {
    id: String,
    mutable: bool,
    // Set on first save or on fetch; a handle never moves between
    // collections afterwards.
    collection: RwLock<Option<Weak<CollectionInner>>>,
    state: RwLock<DocState>,
}

#[derive(Clone)]
struct DocState {
    revision: Option<RevisionId>,
    sequence: u64,
    deleted: bool,
    // Set by mark_deleted; the next save writes a tombstone.
    pending_delete: bool,
    properties: Properties,
}

impl Document {
    /// Creates an unsaved mutable document with a random UUID for its ID.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().simple().to_string())
    }

    /// Creates an unsaved mutable document with the given ID.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self::build(id.into(), true, None, DocState {
            revision: None,
            sequence: 0,
            deleted: false,
            pending_delete: false,
            properties: Properties::new(),
        })
    }

    /// Creates an unsaved mutable document with the given ID and initial
    /// properties.
    pub fn with_properties(id: impl Into<String>, properties: Properties) -> Self {
        let doc = Self::with_id(id);
        doc.inner.state.write().properties = properties;
        doc
    }

    pub(crate) fn from_snapshot(
        id: impl Into<String>,
        snapshot: RevisionSnapshot,
        mutable: bool,
    ) -> Self {
        Self::build(id.into(), mutable, None, DocState {
            revision: Some(snapshot.revision().clone()),
            sequence: snapshot.sequence(),
            deleted: snapshot.is_deleted(),
            pending_delete: false,
            properties: snapshot.into_properties(),
        })
    }

    fn build(
        id: String,
        mutable: bool,
        collection: Option<Weak<CollectionInner>>,
        state: DocState,
    ) -> Self {
        Document {
            inner: Arc::new(DocumentInner {
                id,
                mutable,
                collection: RwLock::new(collection),
                state: RwLock::new(state),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// True for handles that accept property writes.
    pub fn is_mutable(&self) -> bool {
        self.inner.mutable
    }

    /// The revision this handle is based on, or `None` before the first
    /// save.
    pub fn revision(&self) -> Option<RevisionId> {
        self.inner.state.read().revision.clone()
    }

    /// The sequence number assigned by the last save, or 0.
    pub fn sequence(&self) -> u64 {
        self.inner.state.read().sequence
    }

    /// True once a tombstone has been saved through this handle, or after
    /// [`mark_deleted`](Document::mark_deleted).
    pub fn is_deleted(&self) -> bool {
        let state = self.inner.state.read();
        state.deleted || state.pending_delete
    }

    /// True if the document has ever been saved.
    pub fn exists(&self) -> bool {
        self.inner.state.read().revision.is_some()
    }

    /// A snapshot of the properties tree. O(1); shares structure with the
    /// handle's current state.
    pub fn properties(&self) -> Properties {
        self.inner.state.read().properties.clone()
    }

    /// Returns the value at `key`, if present.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.state.read().properties.get(key).cloned()
    }

    /// Replaces the whole properties tree. Fails with `InvalidState` on an
    /// immutable handle.
    pub fn set_properties(&self, properties: Properties) -> ZeoliteResult<()> {
        self.ensure_mutable()?;
        self.inner.state.write().properties = properties;
        Ok(())
    }

    /// Sets `key` to `value` in the handle's private overlay. Fails with
    /// `InvalidState` on an immutable handle.
    pub fn put(&self, key: impl Into<String>, value: impl Into<Value>) -> ZeoliteResult<()> {
        self.ensure_mutable()?;
        self.inner.state.write().properties.put(key, value);
        Ok(())
    }

    /// Removes `key` from the overlay; returns true if it was present.
    pub fn remove_property(&self, key: &str) -> ZeoliteResult<bool> {
        self.ensure_mutable()?;
        Ok(self.inner.state.write().properties.remove(key))
    }

    /// Flags the handle so that its next save writes a tombstone instead of
    /// a body. Used by conflict resolvers that decide the merge outcome is
    /// a deletion.
    pub fn mark_deleted(&self) -> ZeoliteResult<()> {
        self.ensure_mutable()?;
        self.inner.state.write().pending_delete = true;
        Ok(())
    }

    /// An independent mutable handle starting from the same ID, revision,
    /// properties, and collection. Mutations and saves of the copy do not
    /// affect this handle, and vice versa.
    pub fn mutable_copy(&self) -> Document {
        let mut state = self.inner.state.read().clone();
        state.pending_delete = false;
        Self::build(
            self.inner.id.clone(),
            true,
            self.inner.collection.read().clone(),
            state,
        )
    }

    fn ensure_mutable(&self) -> ZeoliteResult<()> {
        if !self.inner.mutable {
            log::error!("Document '{}' is an immutable snapshot", self.inner.id);
            return Err(ZeoliteError::new(
                &format!("Document '{}' is an immutable snapshot", self.inner.id),
                ErrorKind::InvalidState,
            ));
        }
        Ok(())
    }

    /// Ties the handle to `collection` on first save or fetch; afterwards
    /// a save through any other collection fails with `InvalidParameter`.
    pub(crate) fn bind(&self, collection: &Arc<CollectionInner>) -> ZeoliteResult<()> {
        let mut bound = self.inner.collection.write();
        match bound.as_ref().and_then(Weak::upgrade) {
            None => {
                *bound = Some(Arc::downgrade(collection));
                Ok(())
            }
            Some(current) if Arc::ptr_eq(&current, collection) => Ok(()),
            Some(_) => {
                log::error!(
                    "Document '{}' belongs to another collection",
                    self.inner.id
                );
                Err(ZeoliteError::new(
                    &format!("Document '{}' belongs to another collection", self.inner.id),
                    ErrorKind::InvalidParameter,
                ))
            }
        }
    }

    /// The base revision and body a save attempt should submit.
    /// `body = None` requests a tombstone.
    pub(crate) fn save_payload(&self) -> (Option<RevisionId>, Option<Properties>) {
        let state = self.inner.state.read();
        let body = if state.pending_delete {
            None
        } else {
            Some(state.properties.clone())
        };
        (state.revision.clone(), body)
    }

    /// Internal mark used by the delete path; unlike
    /// [`mark_deleted`](Document::mark_deleted) it works on immutable
    /// handles too, since deleting a fetched snapshot is legal.
    pub(crate) fn set_pending_delete(&self) {
        self.inner.state.write().pending_delete = true;
    }

    /// Undoes the pending-delete mark after a delete that did not commit.
    pub(crate) fn clear_pending_delete(&self) {
        self.inner.state.write().pending_delete = false;
    }

    /// Re-targets the handle's base revision without touching its
    /// properties. The last-write-wins retry loop uses this to rebase onto
    /// whatever revision won the race.
    pub(crate) fn rebase(&self, revision: Option<RevisionId>) {
        self.inner.state.write().revision = revision;
    }

    /// Upgrades the handle in place after a successful commit. All clones
    /// of the handle observe the new revision immediately.
    pub(crate) fn apply_commit(&self, revision: RevisionId, sequence: u64) {
        let mut state = self.inner.state.write();
        state.revision = Some(revision);
        state.sequence = sequence;
        if state.pending_delete {
            state.pending_delete = false;
            state.deleted = true;
            state.properties = Properties::new();
        } else {
            state.deleted = false;
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Document")
            .field("id", &self.inner.id)
            .field("mutable", &self.inner.mutable)
            .field("revision", &state.revision)
            .field("sequence", &state.sequence)
            .field("deleted", &state.deleted)
            .field("properties", &state.properties)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props;
    use crate::store::RevisionSnapshot;

    #[test]
    fn test_new_document_has_uuid_id() {
        let doc = Document::new();
        assert_eq!(doc.id().len(), 32);
        assert!(doc.is_mutable());
        assert!(doc.revision().is_none());
        assert!(!doc.exists());
        assert_eq!(doc.sequence(), 0);
    }

    #[test]
    fn test_property_overlay() {
        let doc = Document::with_id("foo");
        doc.put("greeting", "Howdy!").unwrap();
        doc.put("count", 3i64).unwrap();
        assert_eq!(doc.get("greeting"), Some(Value::String("Howdy!".into())));
        assert!(doc.remove_property("count").unwrap());
        assert!(!doc.remove_property("count").unwrap());
        assert_eq!(doc.get("count"), None);
    }

    #[test]
    fn test_immutable_snapshot_rejects_writes() {
        let snapshot = RevisionSnapshot::new(
            RevisionId::new("1-a"),
            1,
            false,
            props! { n: 1 },
        );
        let doc = Document::from_snapshot("foo", snapshot, false);
        assert!(!doc.is_mutable());
        assert_eq!(doc.get("n").and_then(|v| v.as_i64()), Some(1));

        let err = doc.put("n", 2i64).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidState);
        let err = doc.mark_deleted().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidState);

        // but a mutable copy accepts them
        let copy = doc.mutable_copy();
        copy.put("n", 2i64).unwrap();
        assert_eq!(doc.get("n").and_then(|v| v.as_i64()), Some(1));
    }

    #[test]
    fn test_clones_share_state() {
        let doc = Document::with_id("foo");
        let alias = doc.clone();
        doc.put("n", 1i64).unwrap();
        assert_eq!(alias.get("n").and_then(|v| v.as_i64()), Some(1));

        doc.apply_commit(RevisionId::new("1-abc"), 5);
        assert_eq!(alias.revision(), Some(RevisionId::new("1-abc")));
        assert_eq!(alias.sequence(), 5);
    }

    #[test]
    fn test_mutable_copy_is_independent() {
        let doc = Document::with_properties("foo", props! { name: "bob" });
        doc.apply_commit(RevisionId::new("1-abc"), 1);

        let copy = doc.mutable_copy();
        copy.put("name", "sally").unwrap();
        assert_eq!(
            doc.get("name").and_then(|v| v.as_str().map(String::from)),
            Some("bob".into())
        );
        assert_eq!(copy.revision(), doc.revision());
        // copying preserves content independent of mutation sharing
        assert_eq!(doc.mutable_copy().properties(), doc.properties());

        copy.apply_commit(RevisionId::new("2-def"), 2);
        assert_eq!(doc.revision(), Some(RevisionId::new("1-abc")));
    }

    #[test]
    fn test_mark_deleted_produces_tombstone_payload() {
        let doc = Document::with_properties("foo", props! { n: 1 });
        doc.apply_commit(RevisionId::new("1-abc"), 1);
        doc.mark_deleted().unwrap();
        assert!(doc.is_deleted());

        let (base, body) = doc.save_payload();
        assert_eq!(base, Some(RevisionId::new("1-abc")));
        assert!(body.is_none());

        doc.apply_commit(RevisionId::new("2-def"), 2);
        assert!(doc.is_deleted());
        assert!(doc.properties().is_empty());
    }

    #[test]
    fn test_rebase_keeps_local_edits() {
        let doc = Document::with_properties("foo", props! { n: 1 });
        doc.apply_commit(RevisionId::new("1-abc"), 1);
        doc.put("n", 2i64).unwrap();
        doc.rebase(Some(RevisionId::new("2-zzz")));

        let (base, body) = doc.save_payload();
        assert_eq!(base, Some(RevisionId::new("2-zzz")));
        assert_eq!(body.unwrap().get("n").and_then(Value::as_i64), Some(2));
    }
}
