use crate::collection::Document;
use crate::errors::{ErrorKind, ZeoliteError, ZeoliteResult};
use crate::store::{CollectionId, RevisionStore, RevisionStoreProvider};

/// How a save or delete behaves when the document's base revision is no
/// longer the stored current revision.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ConcurrencyControl {
    /// Rebase onto whatever revision won the race and retry until the
    /// write lands. The last writer's properties replace the earlier
    /// writer's entirely.
    #[default]
    LastWriteWins,
    /// Fail immediately with a `Conflict` error, leaving the handle
    /// untouched so the caller can refetch and reapply.
    FailOnConflict,
}

/// Runs the compare-and-swap retry loops behind save, delete, and purge.
///
/// The engine holds no locks of its own: every attempt is one atomic
/// `put_if_match` against the store, and all policy behavior is expressed
/// by what happens between a failed attempt and the next one. Conflict
/// handlers therefore run with no internal locks held and may freely read
/// from the collection.
pub(crate) struct MutationEngine {
    collection: CollectionId,
    store: RevisionStore,
}

impl MutationEngine {
    pub(crate) fn new(collection: CollectionId, store: RevisionStore) -> Self {
        MutationEngine { collection, store }
    }

    pub(crate) fn save(
        &self,
        doc: &Document,
        control: ConcurrencyControl,
    ) -> ZeoliteResult<()> {
        loop {
            let outcome = self.attempt(doc)?;
            match outcome {
                Attempt::Committed => return Ok(()),
                // a purge underneath a save is just another lost race: the
                // stale base is dropped and the save retries as an insert
                Attempt::Lost | Attempt::Gone => match control {
                    ConcurrencyControl::FailOnConflict => {
                        return Err(conflict_error(doc.id()));
                    }
                    ConcurrencyControl::LastWriteWins => {
                        let current =
                            self.store.get_current(&self.collection, doc.id())?;
                        doc.rebase(current.map(|s| s.revision().clone()));
                    }
                },
            }
        }
    }

    /// Save with an application-supplied merge. On every lost race the
    /// handler receives the document being saved and the conflicting
    /// current document (`None` when the current revision is a tombstone or
    /// the document was purged). Returning true retries with the handler's
    /// edits; returning false abandons the save with a `Conflict` error.
    pub(crate) fn save_resolving<F>(
        &self,
        doc: &Document,
        mut handler: F,
    ) -> ZeoliteResult<()>
    where
        F: FnMut(&Document, Option<&Document>) -> bool,
    {
        loop {
            let outcome = self.attempt(doc)?;
            match outcome {
                Attempt::Committed => return Ok(()),
                Attempt::Lost | Attempt::Gone => {
                    let current = self.store.get_current(&self.collection, doc.id())?;
                    let conflicting = current
                        .as_ref()
                        .filter(|s| !s.is_deleted())
                        .map(|s| Document::from_snapshot(doc.id(), s.clone(), false));
                    if !handler(doc, conflicting.as_ref()) {
                        log::debug!(
                            "Conflict handler declined to save document '{}'",
                            doc.id()
                        );
                        return Err(conflict_error(doc.id()));
                    }
                    doc.rebase(current.map(|s| s.revision().clone()));
                }
            }
        }
    }

    pub(crate) fn delete(
        &self,
        doc: &Document,
        control: ConcurrencyControl,
    ) -> ZeoliteResult<()> {
        if !doc.exists() {
            log::error!("Cannot delete document '{}': it was never saved", doc.id());
            return Err(ZeoliteError::new(
                &format!("Cannot delete document '{}': it was never saved", doc.id()),
                ErrorKind::NotFound,
            ));
        }
        doc.set_pending_delete();
        let result = self.delete_loop(doc, control);
        if result.is_err() {
            doc.clear_pending_delete();
        }
        result
    }

    fn delete_loop(&self, doc: &Document, control: ConcurrencyControl) -> ZeoliteResult<()> {
        loop {
            match self.attempt(doc) {
                Ok(Attempt::Committed) => return Ok(()),
                // purged out from under us; nothing left to delete,
                // regardless of policy
                Ok(Attempt::Gone) => return Err(vanished_error(doc.id())),
                Ok(Attempt::Lost) => match control {
                    ConcurrencyControl::FailOnConflict => {
                        return Err(conflict_error(doc.id()));
                    }
                    ConcurrencyControl::LastWriteWins => {
                        match self.store.get_current(&self.collection, doc.id())? {
                            Some(current) => doc.rebase(Some(current.revision().clone())),
                            None => return Err(vanished_error(doc.id())),
                        }
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Deletes by ID without a handle, with last-write-wins semantics.
    pub(crate) fn delete_by_id(&self, doc_id: &str) -> ZeoliteResult<()> {
        loop {
            let current = match self.store.get_current(&self.collection, doc_id)? {
                Some(current) if !current.is_deleted() => current,
                _ => {
                    log::error!("Cannot delete '{}': not found", doc_id);
                    return Err(ZeoliteError::new(
                        &format!("Document '{}' not found", doc_id),
                        ErrorKind::NotFound,
                    ));
                }
            };
            match self.store.put_if_match(
                &self.collection,
                doc_id,
                Some(current.revision()),
                None,
            ) {
                Ok(_) => return Ok(()),
                Err(e)
                    if e.kind() == &ErrorKind::Conflict
                        || e.kind() == &ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }

    pub(crate) fn purge_id(&self, doc_id: &str) -> ZeoliteResult<()> {
        self.store.purge(&self.collection, doc_id)
    }

    /// One compare-and-swap attempt. A lost race surfaces as `Attempt::Lost`
    /// and a base that no longer has any current revision (the document was
    /// purged after this handle read it) as `Attempt::Gone`, so the policy
    /// loops can decide what to do; other errors propagate.
    fn attempt(&self, doc: &Document) -> ZeoliteResult<Attempt> {
        let (base, body) = doc.save_payload();
        match self
            .store
            .put_if_match(&self.collection, doc.id(), base.as_ref(), body)
        {
            Ok((revision, sequence)) => {
                doc.apply_commit(revision, sequence);
                Ok(Attempt::Committed)
            }
            Err(e) if e.kind() == &ErrorKind::Conflict => Ok(Attempt::Lost),
            Err(e) if e.kind() == &ErrorKind::NotFound && base.is_some() => {
                Ok(Attempt::Gone)
            }
            Err(e) => Err(e),
        }
    }
}

enum Attempt {
    Committed,
    Lost,
    Gone,
}

fn vanished_error(doc_id: &str) -> ZeoliteError {
    log::error!("Document '{}' no longer exists", doc_id);
    ZeoliteError::new(
        &format!("Document '{}' no longer exists", doc_id),
        ErrorKind::NotFound,
    )
}

fn conflict_error(doc_id: &str) -> ZeoliteError {
    log::error!("Conflict saving document '{}'", doc_id);
    ZeoliteError::new(
        &format!(
            "Document '{}' was modified concurrently; its base revision is stale",
            doc_id
        ),
        ErrorKind::Conflict,
    )
}
