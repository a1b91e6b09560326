use crate::common::Properties;
use crate::errors::{ErrorKind, ZeoliteError, ZeoliteResult};
use crate::store::{
    CollectionId, CommitBatch, CommitSink, RevisionId, RevisionSnapshot,
    RevisionStoreProvider, SinkId,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// In-memory implementation of a revision store.
///
/// # Purpose
/// `MemoryRevisionStore` keeps every collection's current revisions in
/// memory, providing the atomic `put_if_match` primitive that all
/// higher-level concurrency policies are built on. All clones share the same
/// state, so several `Database` handles opened on the same store observe
/// each other's writes, just like separate process-local handles on one
/// underlying file.
///
/// # Characteristics
/// - **Thread-Safe**: a per-collection commit lock is the serialization
///   point; commits form a total order per collection
/// - **Event-Driven**: publishes one [`CommitBatch`] per committed change
///   to subscribed sinks, with sink `record` inside and `notify` outside
///   the commit critical section
/// - **No Persistence**: all data is lost when the store is dropped
#[derive(Clone)]
pub struct MemoryRevisionStore {
    inner: Arc<MemoryStoreInner>,
}

impl MemoryRevisionStore {
    pub fn new() -> Self {
        MemoryRevisionStore {
            inner: Arc::new(MemoryStoreInner {
                slabs: RwLock::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

impl Default for MemoryRevisionStore {
    fn default() -> Self {
        Self::new()
    }
}

struct MemoryStoreInner {
    slabs: RwLock<HashMap<CollectionId, Arc<CollectionSlab>>>,
    closed: AtomicBool,
}

/// Storage for one collection: current revisions keyed by document ID, the
/// per-collection sequence counter, and the commit subscribers.
struct CollectionSlab {
    docs: RwLock<BTreeMap<String, StoredRevision>>,
    last_sequence: AtomicU64,
    // Serializes commits; sink.record runs under this lock so subscribers
    // observe the total per-collection commit order.
    commit_lock: Mutex<()>,
    sinks: Mutex<Vec<(SinkId, Arc<dyn CommitSink>)>>,
    next_sink_id: AtomicU64,
    dropped: AtomicBool,
}

impl CollectionSlab {
    fn new() -> Self {
        CollectionSlab {
            docs: RwLock::new(BTreeMap::new()),
            last_sequence: AtomicU64::new(0),
            commit_lock: Mutex::new(()),
            sinks: Mutex::new(Vec::new()),
            next_sink_id: AtomicU64::new(1),
            dropped: AtomicBool::new(false),
        }
    }

    fn snapshot_sinks(&self) -> Vec<Arc<dyn CommitSink>> {
        self.sinks.lock().iter().map(|(_, s)| s.clone()).collect()
    }
}

#[derive(Clone)]
struct StoredRevision {
    revision: RevisionId,
    sequence: u64,
    deleted: bool,
    properties: Properties,
}

fn next_revision_id(current: Option<&StoredRevision>) -> RevisionId {
    let generation = current.map(|c| c.revision.generation()).unwrap_or(0) + 1;
    RevisionId::new(format!("{}-{}", generation, Uuid::new_v4().simple()))
}

impl MemoryStoreInner {
    fn ensure_open(&self) -> ZeoliteResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            log::error!("Revision store is closed");
            return Err(ZeoliteError::new(
                "Revision store is closed",
                ErrorKind::InvalidState,
            ));
        }
        Ok(())
    }

    fn slab(&self, collection: &CollectionId) -> ZeoliteResult<Arc<CollectionSlab>> {
        self.ensure_open()?;
        let slabs = self.slabs.read();
        match slabs.get(collection) {
            Some(slab) if !slab.dropped.load(Ordering::Relaxed) => Ok(slab.clone()),
            _ => {
                log::error!("Collection '{}' is deleted or was never opened", collection);
                Err(ZeoliteError::new(
                    &format!("Collection '{}' is deleted or was never opened", collection),
                    ErrorKind::InvalidState,
                ))
            }
        }
    }
}

impl RevisionStoreProvider for MemoryRevisionStore {
    fn open_collection(&self, collection: &CollectionId) -> ZeoliteResult<()> {
        self.inner.ensure_open()?;
        let mut slabs = self.inner.slabs.write();
        match slabs.get(collection) {
            Some(slab) if !slab.dropped.load(Ordering::Relaxed) => Ok(()),
            _ => {
                log::debug!("Opening collection '{}'", collection);
                slabs.insert(collection.clone(), Arc::new(CollectionSlab::new()));
                Ok(())
            }
        }
    }

    fn drop_collection(&self, collection: &CollectionId) -> ZeoliteResult<()> {
        let slab = self.inner.slab(collection)?;
        log::debug!("Dropping collection '{}'", collection);
        slab.dropped.store(true, Ordering::Relaxed);
        slab.docs.write().clear();
        slab.sinks.lock().clear();
        Ok(())
    }

    fn is_collection_dropped(&self, collection: &CollectionId) -> ZeoliteResult<bool> {
        self.inner.ensure_open()?;
        let slabs = self.inner.slabs.read();
        Ok(match slabs.get(collection) {
            Some(slab) => slab.dropped.load(Ordering::Relaxed),
            None => true,
        })
    }

    fn collection_ids(&self) -> ZeoliteResult<Vec<CollectionId>> {
        self.inner.ensure_open()?;
        let slabs = self.inner.slabs.read();
        let mut ids: Vec<CollectionId> = slabs
            .iter()
            .filter(|(_, slab)| !slab.dropped.load(Ordering::Relaxed))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort_by_key(|id| id.full_name());
        Ok(ids)
    }

    fn get_current(
        &self,
        collection: &CollectionId,
        doc_id: &str,
    ) -> ZeoliteResult<Option<RevisionSnapshot>> {
        let slab = self.inner.slab(collection)?;
        let docs = slab.docs.read();
        Ok(docs.get(doc_id).map(|stored| {
            RevisionSnapshot::new(
                stored.revision.clone(),
                stored.sequence,
                stored.deleted,
                stored.properties.clone(),
            )
        }))
    }

    fn put_if_match(
        &self,
        collection: &CollectionId,
        doc_id: &str,
        base: Option<&RevisionId>,
        body: Option<Properties>,
    ) -> ZeoliteResult<(RevisionId, u64)> {
        let slab = self.inner.slab(collection)?;
        let commit_guard = slab.commit_lock.lock();

        let (revision, sequence, batch) = {
            let mut docs = slab.docs.write();
            let current = docs.get(doc_id);

            match (current, base) {
                (None, None) => {}
                (Some(stored), Some(base)) if stored.revision == *base => {}
                (None, Some(_)) => {
                    return Err(ZeoliteError::new(
                        &format!(
                            "Document '{}' has no current revision in '{}'",
                            doc_id, collection
                        ),
                        ErrorKind::NotFound,
                    ));
                }
                _ => {
                    return Err(ZeoliteError::new(
                        &format!(
                            "Base revision of document '{}' no longer matches the stored current revision",
                            doc_id
                        ),
                        ErrorKind::Conflict,
                    ));
                }
            }

            let revision = next_revision_id(current);
            let sequence = slab.last_sequence.fetch_add(1, Ordering::SeqCst) + 1;
            let deleted = body.is_none();
            docs.insert(
                doc_id.to_string(),
                StoredRevision {
                    revision: revision.clone(),
                    sequence,
                    deleted,
                    properties: body.unwrap_or_default(),
                },
            );
            let batch =
                CommitBatch::new(collection.clone(), sequence, [doc_id.to_string()]);
            (revision, sequence, batch)
        };

        let sinks = slab.snapshot_sinks();
        for sink in &sinks {
            sink.record(&batch);
        }
        drop(commit_guard);

        // Listener code runs here, off the commit lock.
        for sink in &sinks {
            sink.notify();
        }

        Ok((revision, sequence))
    }

    fn purge(&self, collection: &CollectionId, doc_id: &str) -> ZeoliteResult<()> {
        let slab = self.inner.slab(collection)?;
        let commit_guard = slab.commit_lock.lock();

        let batch = {
            let mut docs = slab.docs.write();
            if docs.remove(doc_id).is_none() {
                log::error!("Cannot purge '{}': not found in '{}'", doc_id, collection);
                return Err(ZeoliteError::new(
                    &format!("Document '{}' not found in '{}'", doc_id, collection),
                    ErrorKind::NotFound,
                ));
            }
            CommitBatch::new(
                collection.clone(),
                slab.last_sequence.load(Ordering::SeqCst),
                [doc_id.to_string()],
            )
        };

        let sinks = slab.snapshot_sinks();
        for sink in &sinks {
            sink.record(&batch);
        }
        drop(commit_guard);

        for sink in &sinks {
            sink.notify();
        }
        Ok(())
    }

    fn last_sequence(&self, collection: &CollectionId) -> ZeoliteResult<u64> {
        let slab = self.inner.slab(collection)?;
        Ok(slab.last_sequence.load(Ordering::SeqCst))
    }

    fn count(&self, collection: &CollectionId) -> ZeoliteResult<u64> {
        let slab = self.inner.slab(collection)?;
        let docs = slab.docs.read();
        Ok(docs.values().filter(|d| !d.deleted).count() as u64)
    }

    fn subscribe_commits(
        &self,
        collection: &CollectionId,
        sink: Arc<dyn CommitSink>,
    ) -> ZeoliteResult<SinkId> {
        let slab = self.inner.slab(collection)?;
        let id = SinkId(slab.next_sink_id.fetch_add(1, Ordering::Relaxed));
        slab.sinks.lock().push((id, sink));
        Ok(id)
    }

    fn unsubscribe_commits(
        &self,
        collection: &CollectionId,
        sink: SinkId,
    ) -> ZeoliteResult<()> {
        // Unsubscribing from a dropped or missing collection is a no-op;
        // its sink list is already gone.
        self.inner.ensure_open()?;
        let slabs = self.inner.slabs.read();
        if let Some(slab) = slabs.get(collection) {
            slab.sinks.lock().retain(|(id, _)| *id != sink);
        }
        Ok(())
    }

    fn close(&self) -> ZeoliteResult<()> {
        if self.inner.closed.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        log::debug!("Closing in-memory revision store");
        let slabs = self.inner.slabs.read();
        for slab in slabs.values() {
            slab.sinks.lock().clear();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props;
    use std::sync::atomic::AtomicUsize;

    fn store_and_collection() -> (MemoryRevisionStore, CollectionId) {
        let store = MemoryRevisionStore::new();
        let collection = CollectionId::new("_default", "test");
        store.open_collection(&collection).unwrap();
        (store, collection)
    }

    #[test]
    fn test_put_fresh_document() {
        let (store, collection) = store_and_collection();
        let (rev, seq) = store
            .put_if_match(&collection, "foo", None, Some(props! { greeting: "Howdy!" }))
            .unwrap();
        assert_eq!(seq, 1);
        assert_eq!(rev.generation(), 1);

        let snapshot = store.get_current(&collection, "foo").unwrap().unwrap();
        assert_eq!(snapshot.revision(), &rev);
        assert!(!snapshot.is_deleted());
    }

    #[test]
    fn test_put_with_matching_base_advances_revision() {
        let (store, collection) = store_and_collection();
        let (rev1, _) = store
            .put_if_match(&collection, "foo", None, Some(props! { n: 1 }))
            .unwrap();
        let (rev2, seq2) = store
            .put_if_match(&collection, "foo", Some(&rev1), Some(props! { n: 2 }))
            .unwrap();
        assert_eq!(seq2, 2);
        assert_eq!(rev2.generation(), 2);
        assert_ne!(rev1, rev2);
    }

    #[test]
    fn test_put_with_stale_base_conflicts() {
        let (store, collection) = store_and_collection();
        let (rev1, _) = store
            .put_if_match(&collection, "foo", None, Some(props! { n: 1 }))
            .unwrap();
        store
            .put_if_match(&collection, "foo", Some(&rev1), Some(props! { n: 2 }))
            .unwrap();

        let err = store
            .put_if_match(&collection, "foo", Some(&rev1), Some(props! { n: 3 }))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Conflict);
    }

    #[test]
    fn test_insert_over_existing_conflicts() {
        let (store, collection) = store_and_collection();
        store
            .put_if_match(&collection, "foo", None, Some(props! { n: 1 }))
            .unwrap();
        let err = store
            .put_if_match(&collection, "foo", None, Some(props! { n: 2 }))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Conflict);
    }

    #[test]
    fn test_put_against_missing_document_not_found() {
        let (store, collection) = store_and_collection();
        let stale = RevisionId::new("1-gone");
        let err = store
            .put_if_match(&collection, "ghost", Some(&stale), None)
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NotFound);
    }

    #[test]
    fn test_tombstone_remains_current_revision() {
        let (store, collection) = store_and_collection();
        let (rev1, _) = store
            .put_if_match(&collection, "foo", None, Some(props! { n: 1 }))
            .unwrap();
        let (rev2, _) = store
            .put_if_match(&collection, "foo", Some(&rev1), None)
            .unwrap();

        let snapshot = store.get_current(&collection, "foo").unwrap().unwrap();
        assert!(snapshot.is_deleted());
        assert_eq!(snapshot.revision(), &rev2);
        assert_eq!(store.count(&collection).unwrap(), 0);

        // a new write must rebase onto the tombstone revision
        let err = store
            .put_if_match(&collection, "foo", None, Some(props! { n: 2 }))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Conflict);
        let (rev3, _) = store
            .put_if_match(&collection, "foo", Some(&rev2), Some(props! { n: 2 }))
            .unwrap();
        assert_eq!(rev3.generation(), 3);
    }

    #[test]
    fn test_purge_removes_all_state() {
        let (store, collection) = store_and_collection();
        store
            .put_if_match(&collection, "foo", None, Some(props! { n: 1 }))
            .unwrap();
        store.purge(&collection, "foo").unwrap();
        assert!(store.get_current(&collection, "foo").unwrap().is_none());

        let err = store.purge(&collection, "foo").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NotFound);
    }

    #[test]
    fn test_sequence_is_per_collection() {
        let (store, c1) = store_and_collection();
        let c2 = CollectionId::new("_default", "other");
        store.open_collection(&c2).unwrap();

        store.put_if_match(&c1, "a", None, Some(props! {})).unwrap();
        store.put_if_match(&c1, "b", None, Some(props! {})).unwrap();
        let (_, seq) = store.put_if_match(&c2, "a", None, Some(props! {})).unwrap();
        assert_eq!(seq, 1);
        assert_eq!(store.last_sequence(&c1).unwrap(), 2);
        assert_eq!(store.last_sequence(&c2).unwrap(), 1);
    }

    #[test]
    fn test_dropped_collection_rejects_operations() {
        let (store, collection) = store_and_collection();
        store.drop_collection(&collection).unwrap();
        assert!(store.is_collection_dropped(&collection).unwrap());
        let err = store
            .put_if_match(&collection, "foo", None, Some(props! {}))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidState);
    }

    #[test]
    fn test_closed_store_rejects_operations() {
        let (store, collection) = store_and_collection();
        store.close().unwrap();
        assert!(store.is_closed());
        let err = store.get_current(&collection, "foo").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidState);
    }

    struct CountingSink {
        recorded: AtomicUsize,
        notified: AtomicUsize,
    }

    impl CommitSink for CountingSink {
        fn record(&self, _batch: &CommitBatch) {
            self.recorded.fetch_add(1, Ordering::SeqCst);
        }

        fn notify(&self) {
            self.notified.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_sinks_observe_commits() {
        let (store, collection) = store_and_collection();
        let sink = Arc::new(CountingSink {
            recorded: AtomicUsize::new(0),
            notified: AtomicUsize::new(0),
        });
        let id = store.subscribe_commits(&collection, sink.clone()).unwrap();

        store.put_if_match(&collection, "a", None, Some(props! {})).unwrap();
        store.put_if_match(&collection, "b", None, Some(props! {})).unwrap();
        assert_eq!(sink.recorded.load(Ordering::SeqCst), 2);
        assert_eq!(sink.notified.load(Ordering::SeqCst), 2);

        store.unsubscribe_commits(&collection, id).unwrap();
        store.put_if_match(&collection, "c", None, Some(props! {})).unwrap();
        assert_eq!(sink.recorded.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_shared_handles_see_each_other() {
        let (store, collection) = store_and_collection();
        let other = store.clone();
        store
            .put_if_match(&collection, "foo", None, Some(props! { n: 1 }))
            .unwrap();
        assert!(other.get_current(&collection, "foo").unwrap().is_some());
    }
}
