use crate::collection::mutation::MutationEngine;
use crate::collection::{CollectionChange, ConcurrencyControl, Document, DocumentChange};
use crate::errors::{ErrorKind, ZeoliteError, ZeoliteResult};
use crate::listener::{ListenerToken, Listeners};
use crate::notifier::NotificationQueue;
use crate::store::{
    CollectionId, CommitBatch, CommitSink, RevisionStore, RevisionStoreProvider, SinkId,
};
use dashmap::DashMap;
use itertools::Itertools;
use parking_lot::{Mutex, ReentrantMutex};
use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// A named collection of documents within a database.
///
/// All mutation goes through the save, delete, and purge operations here;
/// listeners registered on the collection observe every commit, including
/// commits made through other handles to the same underlying store.
///
/// Handles are cheap to clone; clones share the same collection state.
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

pub(crate) struct CollectionInner {
    id: CollectionId,
    store: RevisionStore,
    engine: MutationEngine,
    queue: NotificationQueue,
    collection_listeners: Listeners<CollectionChange>,
    doc_listeners: DashMap<String, Arc<Listeners<DocumentChange>>>,
    // Batches recorded under the store's commit lock, awaiting dispatch.
    change_log: Mutex<VecDeque<CommitBatch>>,
    // The flag is true while the owning thread is inside the drain loop, so
    // a listener that triggers another commit re-enters, sees it set, and
    // returns; the outer loop picks the new batch up.
    dispatch_lock: ReentrantMutex<Cell<bool>>,
    sink_id: Mutex<Option<SinkId>>,
    closed: AtomicBool,
}

// Bridges store commits to the collection's change log. Holds the
// collection weakly so a dropped collection never lingers through its
// subscription.
struct ChangeObserver {
    collection: Weak<CollectionInner>,
}

impl CommitSink for ChangeObserver {
    fn record(&self, batch: &CommitBatch) {
        if let Some(inner) = self.collection.upgrade() {
            if inner.has_listeners() {
                inner.change_log.lock().push_back(batch.clone());
            }
        }
    }

    fn notify(&self) {
        if let Some(inner) = self.collection.upgrade() {
            inner.schedule_dispatch();
        }
    }
}

impl Collection {
    /// Opens (creating if needed) the collection `id` in `store`, wiring
    /// its change notifications through `queue`.
    pub(crate) fn open(
        id: CollectionId,
        store: RevisionStore,
        queue: NotificationQueue,
    ) -> ZeoliteResult<Collection> {
        store.open_collection(&id)?;
        let inner = Arc::new(CollectionInner {
            engine: MutationEngine::new(id.clone(), store.clone()),
            id,
            store,
            queue,
            collection_listeners: Listeners::new(),
            doc_listeners: DashMap::new(),
            change_log: Mutex::new(VecDeque::new()),
            dispatch_lock: ReentrantMutex::new(Cell::new(false)),
            sink_id: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        let observer = Arc::new(ChangeObserver {
            collection: Arc::downgrade(&inner),
        });
        let sink_id = inner.store.subscribe_commits(&inner.id, observer)?;
        *inner.sink_id.lock() = Some(sink_id);
        Ok(Collection { inner })
    }

    pub fn name(&self) -> &str {
        self.inner.id.name()
    }

    pub fn scope(&self) -> &str {
        self.inner.id.scope()
    }

    /// The qualified `scope.name` form.
    pub fn full_name(&self) -> String {
        self.inner.id.full_name()
    }

    pub(crate) fn id(&self) -> &CollectionId {
        &self.inner.id
    }

    /// False once the collection was dropped or its database closed; every
    /// operation on an invalid collection fails with `InvalidState`.
    pub fn is_valid(&self) -> bool {
        !self.inner.closed.load(Ordering::Relaxed)
            && !self.inner.store.is_closed()
            && !self
                .inner
                .store
                .is_collection_dropped(&self.inner.id)
                .unwrap_or(true)
    }

    /// Number of live (non-deleted) documents.
    pub fn count(&self) -> ZeoliteResult<u64> {
        self.inner.ensure_valid()?;
        self.inner.store.count(&self.inner.id)
    }

    /// The last sequence number assigned in this collection.
    pub fn last_sequence(&self) -> ZeoliteResult<u64> {
        self.inner.ensure_valid()?;
        self.inner.store.last_sequence(&self.inner.id)
    }

    /// Fetches the current revision of `doc_id` as an immutable snapshot
    /// handle. Returns `None` for documents that are absent or deleted.
    pub fn document(&self, doc_id: &str) -> ZeoliteResult<Option<Document>> {
        self.fetch(doc_id, false)
    }

    /// Like [`document`](Collection::document) but yields a mutable handle,
    /// ready to be edited and saved back.
    pub fn mutable_document(&self, doc_id: &str) -> ZeoliteResult<Option<Document>> {
        self.fetch(doc_id, true)
    }

    fn fetch(&self, doc_id: &str, mutable: bool) -> ZeoliteResult<Option<Document>> {
        self.inner.ensure_valid()?;
        let snapshot = self
            .inner
            .store
            .get_current(&self.inner.id, doc_id)?
            .filter(|s| !s.is_deleted());
        match snapshot {
            Some(s) => {
                let doc = Document::from_snapshot(doc_id, s, mutable);
                doc.bind(&self.inner)?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    /// Saves the document with the default last-write-wins policy,
    /// upgrading the handle in place on success.
    pub fn save(&self, doc: &Document) -> ZeoliteResult<()> {
        self.save_with(doc, ConcurrencyControl::LastWriteWins)
    }

    /// Saves the document under an explicit concurrency-control policy.
    pub fn save_with(&self, doc: &Document, control: ConcurrencyControl) -> ZeoliteResult<()> {
        self.inner.ensure_valid()?;
        doc.bind(&self.inner)?;
        self.inner.engine.save(doc, control)
    }

    /// Saves the document, resolving each lost race through `handler`. The
    /// handler receives the document being saved and the conflicting
    /// current document (`None` if it was deleted or purged); it may mutate
    /// `doc` (or [`mark_deleted`](Document::mark_deleted) it) and return
    /// true to retry, or return false to give up with a `Conflict` error.
    /// The handler runs with no internal locks held.
    pub fn save_resolving<F>(&self, doc: &Document, handler: F) -> ZeoliteResult<()>
    where
        F: FnMut(&Document, Option<&Document>) -> bool,
    {
        self.inner.ensure_valid()?;
        doc.bind(&self.inner)?;
        self.inner.engine.save_resolving(doc, handler)
    }

    /// Deletes the document (writes a tombstone) with the default
    /// last-write-wins policy. The tombstone remains for conflict
    /// detection; a later save against it must rebase.
    pub fn delete(&self, doc: &Document) -> ZeoliteResult<()> {
        self.delete_with(doc, ConcurrencyControl::LastWriteWins)
    }

    pub fn delete_with(&self, doc: &Document, control: ConcurrencyControl) -> ZeoliteResult<()> {
        self.inner.ensure_valid()?;
        doc.bind(&self.inner)?;
        self.inner.engine.delete(doc, control)
    }

    /// Deletes by ID without fetching a handle first. Fails with `NotFound`
    /// if the document is absent or already deleted.
    pub fn delete_by_id(&self, doc_id: &str) -> ZeoliteResult<()> {
        self.inner.ensure_valid()?;
        self.inner.engine.delete_by_id(doc_id)
    }

    /// Unconditionally removes every trace of the document, bypassing
    /// conflict detection. Change listeners still hear about it.
    pub fn purge(&self, doc: &Document) -> ZeoliteResult<()> {
        self.inner.ensure_valid()?;
        doc.bind(&self.inner)?;
        self.inner.engine.purge_id(doc.id())
    }

    pub fn purge_by_id(&self, doc_id: &str) -> ZeoliteResult<()> {
        self.inner.ensure_valid()?;
        self.inner.engine.purge_id(doc_id)
    }

    /// Registers a listener for all document changes in this collection.
    /// The listener hears only about commits that land after registration.
    pub fn add_change_listener<F>(&self, listener: F) -> ZeoliteResult<ListenerToken<CollectionChange>>
    where
        F: Fn(&CollectionChange) + Send + Sync + 'static,
    {
        self.inner.ensure_valid()?;
        Ok(self.inner.collection_listeners.add(listener))
    }

    /// Registers a listener for changes to one document.
    pub fn add_document_change_listener<F>(
        &self,
        doc_id: &str,
        listener: F,
    ) -> ZeoliteResult<ListenerToken<DocumentChange>>
    where
        F: Fn(&DocumentChange) + Send + Sync + 'static,
    {
        self.inner.ensure_valid()?;
        let listeners = self
            .inner
            .doc_listeners
            .entry(doc_id.to_string())
            .or_insert_with(|| Arc::new(Listeners::new()))
            .clone();
        Ok(listeners.add(listener))
    }

    /// Detaches the collection from its store and drops every listener.
    /// Called when the database closes or the collection is dropped.
    pub(crate) fn invalidate(&self) {
        self.inner.invalidate();
    }
}

impl CollectionInner {
    fn ensure_valid(&self) -> ZeoliteResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            log::error!("Collection '{}' is no longer valid", self.id);
            return Err(ZeoliteError::new(
                &format!("Collection '{}' is no longer valid", self.id),
                ErrorKind::InvalidState,
            ));
        }
        Ok(())
    }

    fn has_listeners(&self) -> bool {
        !self.collection_listeners.is_empty() || !self.doc_listeners.is_empty()
    }

    fn schedule_dispatch(self: &Arc<Self>) {
        if self.change_log.lock().is_empty() {
            return;
        }
        let weak = Arc::downgrade(self);
        self.queue.add(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch_changes();
            }
        }));
    }

    /// Drains the change log and invokes listeners until no batches are
    /// left. Runs entirely outside the store's locks, so listeners may save,
    /// delete, and purge; commits they cause are appended to the log and
    /// absorbed by the loop instead of recursing.
    fn dispatch_changes(self: &Arc<Self>) {
        let guard = self.dispatch_lock.lock();
        if guard.get() {
            return;
        }
        guard.set(true);
        loop {
            let batches: Vec<CommitBatch> = {
                let mut log = self.change_log.lock();
                log.drain(..).collect()
            };
            if batches.is_empty() {
                break;
            }
            let doc_ids: Vec<String> = batches
                .iter()
                .flat_map(|b| b.doc_ids())
                .cloned()
                .unique()
                .collect();
            log::trace!(
                "Dispatching changes for {} document(s) in '{}'",
                doc_ids.len(),
                self.id
            );
            let collection = Collection {
                inner: self.clone(),
            };
            if !self.collection_listeners.is_empty() {
                let change = CollectionChange::new(collection.clone(), doc_ids.clone());
                self.collection_listeners.invoke_all(&change);
            }
            // per-document listeners are exact: one invocation per commit
            // that touched the document, even when the collection-level
            // change coalesced those commits into one call
            for batch in &batches {
                for doc_id in batch.doc_ids() {
                    let listeners = self
                        .doc_listeners
                        .get(doc_id.as_str())
                        .map(|e| e.value().clone());
                    if let Some(listeners) = listeners {
                        if listeners.is_empty() {
                            self.doc_listeners.remove(doc_id.as_str());
                        } else {
                            listeners.invoke_all(&DocumentChange::new(
                                collection.clone(),
                                doc_id.clone(),
                            ));
                        }
                    }
                }
            }
        }
        guard.set(false);
    }

    fn invalidate(&self) {
        if self.closed.swap(true, Ordering::Relaxed) {
            return;
        }
        log::debug!("Invalidating collection '{}'", self.id);
        if let Some(sink_id) = self.sink_id.lock().take() {
            let _ = self.store.unsubscribe_commits(&self.id, sink_id);
        }
        self.collection_listeners.clear();
        for entry in self.doc_listeners.iter() {
            entry.value().clear();
        }
        self.doc_listeners.clear();
        self.change_log.lock().clear();
    }
}

impl Drop for CollectionInner {
    fn drop(&mut self) {
        self.invalidate();
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Debug for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.full_name())
            .field("valid", &self.is_valid())
            .finish()
    }
}
