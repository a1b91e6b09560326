use crate::collection::Collection;
use crate::common::{
    validate_collection_name, validate_scope_name, DEFAULT_COLLECTION, DEFAULT_SCOPE,
};
use crate::errors::{ErrorKind, ZeoliteError, ZeoliteResult};
use crate::notifier::{NotificationQueue, ReadyCallback};
use crate::store::memory::{registry, MemoryRevisionStore};
use crate::store::{CollectionId, RevisionStore, RevisionStoreProvider};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A handle to one named database.
///
/// Several handles may be open on the same database name at once; they
/// share stored state but each has its own collection handles, listeners,
/// and notification scheduling. A commit made through one handle is
/// observed by listeners registered through any other.
///
/// Notifications default to immediate delivery on the mutating thread.
/// [`buffer_notifications`](Database::buffer_notifications) switches the
/// whole handle to buffered delivery, where
/// [`send_notifications`](Database::send_notifications) drains from a
/// thread of the application's choosing.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    name: String,
    store: RevisionStore,
    queue: NotificationQueue,
    collections: Mutex<HashMap<CollectionId, Collection>>,
    closed: AtomicBool,
}

impl Database {
    /// Opens the database `name`, backed by the process-wide in-memory
    /// store registered under that name. Opening the same name twice
    /// yields two handles on the same stored state.
    pub fn open(name: &str) -> ZeoliteResult<Database> {
        if name.is_empty() {
            log::error!("Database name must not be empty");
            return Err(ZeoliteError::new(
                "Database name must not be empty",
                ErrorKind::InvalidParameter,
            ));
        }
        let store = RevisionStore::new(registry::obtain(name));
        Self::open_with_store(name, store)
    }

    /// Opens a database over a caller-supplied revision store, for backends
    /// other than the built-in in-memory one.
    pub fn open_with_store(name: &str, store: RevisionStore) -> ZeoliteResult<Database> {
        log::debug!("Opening database '{}'", name);
        let database = Database {
            inner: Arc::new(DatabaseInner {
                name: name.to_string(),
                store,
                queue: NotificationQueue::new(),
                collections: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        };
        // the default collection always exists
        database.create_collection_in(DEFAULT_SCOPE, DEFAULT_COLLECTION)?;
        Ok(database)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }

    /// The `_default._default` collection.
    pub fn default_collection(&self) -> ZeoliteResult<Collection> {
        self.collection_in(DEFAULT_SCOPE, DEFAULT_COLLECTION)?.ok_or_else(|| {
            ZeoliteError::new("Default collection is missing", ErrorKind::InvalidState)
        })
    }

    /// Creates (or reopens) a collection in the default scope.
    pub fn create_collection(&self, name: &str) -> ZeoliteResult<Collection> {
        self.create_collection_in(DEFAULT_SCOPE, name)
    }

    /// Creates (or reopens) a collection in the given scope. Returns the
    /// existing handle when the collection is already open through this
    /// database handle.
    pub fn create_collection_in(&self, scope: &str, name: &str) -> ZeoliteResult<Collection> {
        self.ensure_open()?;
        validate_scope_name(scope)?;
        validate_collection_name(name)?;

        let id = CollectionId::new(scope, name);
        let mut collections = self.inner.collections.lock();
        if let Some(existing) = collections.get(&id) {
            if existing.is_valid() {
                return Ok(existing.clone());
            }
            collections.remove(&id);
        }
        let collection = Collection::open(
            id.clone(),
            self.inner.store.clone(),
            self.inner.queue.clone(),
        )?;
        collections.insert(id, collection.clone());
        Ok(collection)
    }

    /// Looks up an existing collection in the default scope; `None` if it
    /// was never created or has been dropped.
    pub fn collection(&self, name: &str) -> ZeoliteResult<Option<Collection>> {
        self.collection_in(DEFAULT_SCOPE, name)
    }

    pub fn collection_in(&self, scope: &str, name: &str) -> ZeoliteResult<Option<Collection>> {
        self.ensure_open()?;
        let id = CollectionId::new(scope, name);
        if self.inner.store.is_collection_dropped(&id)? {
            return Ok(None);
        }
        // reuse the cached handle so listeners survive repeated lookups
        let mut collections = self.inner.collections.lock();
        if let Some(existing) = collections.get(&id) {
            if existing.is_valid() {
                return Ok(Some(existing.clone()));
            }
            collections.remove(&id);
        }
        let collection = Collection::open(
            id.clone(),
            self.inner.store.clone(),
            self.inner.queue.clone(),
        )?;
        collections.insert(id, collection.clone());
        Ok(Some(collection))
    }

    /// Names of the collections in `scope`, in name order.
    pub fn collection_names(&self, scope: &str) -> ZeoliteResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self
            .inner
            .store
            .collection_ids()?
            .into_iter()
            .filter(|id| id.scope() == scope)
            .map(|id| id.name().to_string())
            .collect())
    }

    /// Drops a collection and its documents. Handles to it become invalid;
    /// the default collection cannot be dropped.
    pub fn drop_collection_in(&self, scope: &str, name: &str) -> ZeoliteResult<()> {
        self.ensure_open()?;
        if scope == DEFAULT_SCOPE && name == DEFAULT_COLLECTION {
            log::error!("The default collection cannot be dropped");
            return Err(ZeoliteError::new(
                "The default collection cannot be dropped",
                ErrorKind::InvalidParameter,
            ));
        }
        let id = CollectionId::new(scope, name);
        if let Some(collection) = self.inner.collections.lock().remove(&id) {
            collection.invalidate();
        }
        self.inner.store.drop_collection(&id)
    }

    pub fn drop_collection(&self, name: &str) -> ZeoliteResult<()> {
        self.drop_collection_in(DEFAULT_SCOPE, name)
    }

    /// Switches this handle to buffered notification delivery. From now on
    /// listener invocations accumulate instead of running on the mutating
    /// thread; `ready` fires whenever the pending set goes from empty to
    /// non-empty, signaling that a
    /// [`send_notifications`](Database::send_notifications) call is due.
    /// Buffering stays in effect until the handle is closed; anything still
    /// pending at close is discarded.
    pub fn buffer_notifications(&self, ready: ReadyCallback) -> ZeoliteResult<()> {
        self.ensure_open()?;
        self.inner.queue.buffer(ready);
        Ok(())
    }

    /// Delivers all pending buffered notifications on the calling thread,
    /// in order.
    pub fn send_notifications(&self) -> ZeoliteResult<()> {
        self.ensure_open()?;
        self.inner.queue.notify_all();
        Ok(())
    }

    /// Closes this handle: its collections become invalid, its listeners
    /// are detached, and pending buffered notifications are discarded.
    /// Other handles on the same database name are unaffected. Closing
    /// twice is a no-op.
    pub fn close(&self) -> ZeoliteResult<()> {
        if self.inner.closed.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        log::debug!("Closing database '{}'", self.inner.name);
        self.inner.queue.close();
        let collections: Vec<Collection> =
            self.inner.collections.lock().drain().map(|(_, c)| c).collect();
        for collection in collections {
            collection.invalidate();
        }
        Ok(())
    }

    /// Closes this handle and erases the named in-memory store, so a later
    /// [`open`](Database::open) of the same name starts empty. Other live
    /// handles on the name fail with `InvalidState` from then on.
    pub fn delete(self) -> ZeoliteResult<()> {
        self.close()?;
        registry::evict(&self.inner.name);
        Ok(())
    }

    fn ensure_open(&self) -> ZeoliteResult<()> {
        if self.is_closed() {
            log::error!("Database '{}' is closed", self.inner.name);
            return Err(ZeoliteError::new(
                &format!("Database '{}' is closed", self.inner.name),
                ErrorKind::InvalidState,
            ));
        }
        Ok(())
    }
}

impl Debug for Database {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Opens a database over a fresh private in-memory store that is not
/// shared through the registry. Mostly useful in tests.
pub fn open_private(name: &str) -> ZeoliteResult<Database> {
    Database::open_with_store(name, RevisionStore::new(MemoryRevisionStore::new()))
}
