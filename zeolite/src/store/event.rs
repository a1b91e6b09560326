use crate::store::CollectionId;
use smallvec::SmallVec;
use std::fmt::Debug;

/// One committed mutation, as reported by the revision store: which
/// collection, which documents, tagged with the commit's sequence number.
///
/// Commits may touch multiple documents; all document IDs from one commit
/// travel together in a single batch, in the order they were mutated.
#[derive(Clone, Debug)]
pub struct CommitBatch {
    collection: CollectionId,
    sequence: u64,
    doc_ids: SmallVec<[String; 4]>,
}

impl CommitBatch {
    pub fn new(
        collection: CollectionId,
        sequence: u64,
        doc_ids: impl IntoIterator<Item = String>,
    ) -> Self {
        CommitBatch {
            collection,
            sequence,
            doc_ids: doc_ids.into_iter().collect(),
        }
    }

    pub fn collection(&self) -> &CollectionId {
        &self.collection
    }

    /// The sequence number assigned by the commit.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Document IDs touched by the commit, in mutation order.
    pub fn doc_ids(&self) -> &[String] {
        &self.doc_ids
    }
}

/// Receiver of per-commit mutation batches from a revision store.
///
/// Delivery happens in two phases so that listener code never runs inside
/// the store's commit critical section:
///
/// 1. [`CommitSink::record`] is invoked while the store still holds its
///    per-collection commit lock. Implementations must only enqueue the
///    batch; they must not block or call back into user code. Because this
///    phase is serialized by the commit lock, recorded batches observe the
///    total per-collection commit order.
/// 2. [`CommitSink::notify`] is invoked after the store has released its
///    locks. Implementations dispatch whatever phase 1 accumulated; user
///    callbacks may run here and may freely re-enter the store.
pub trait CommitSink: Send + Sync {
    fn record(&self, batch: &CommitBatch);

    fn notify(&self);
}

/// Identifies one commit subscription, for unsubscribing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SinkId(pub(crate) u64);
