use crate::collection::Collection;
use std::fmt::{Debug, Formatter};

/// Delivered to collection change listeners: the documents mutated since
/// the listener was last notified, in commit order.
///
/// Commits that land while a notification is pending are coalesced: one
/// event may carry document IDs from several commits, and a document that
/// changed twice appears once, at its first position.
#[derive(Clone)]
pub struct CollectionChange {
    collection: Collection,
    doc_ids: Vec<String>,
}

impl CollectionChange {
    pub(crate) fn new(collection: Collection, doc_ids: Vec<String>) -> Self {
        CollectionChange {
            collection,
            doc_ids,
        }
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// IDs of the changed documents, in first-commit order, deduplicated.
    pub fn doc_ids(&self) -> &[String] {
        &self.doc_ids
    }
}

impl Debug for CollectionChange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionChange")
            .field("collection", &self.collection.full_name())
            .field("doc_ids", &self.doc_ids)
            .finish()
    }
}

/// Delivered to document change listeners when their document is saved,
/// deleted, or purged.
#[derive(Clone)]
pub struct DocumentChange {
    collection: Collection,
    doc_id: String,
}

impl DocumentChange {
    pub(crate) fn new(collection: Collection, doc_id: String) -> Self {
        DocumentChange { collection, doc_id }
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }
}

impl Debug for DocumentChange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentChange")
            .field("collection", &self.collection.full_name())
            .field("doc_id", &self.doc_id)
            .finish()
    }
}
