use crate::store::memory::MemoryRevisionStore;
use crate::store::RevisionStoreProvider;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::LazyLock;

// Process-wide table of named in-memory stores. Two database handles opened
// on the same name share one store, the in-memory analog of two handles on
// the same file.
static STORES: LazyLock<Mutex<HashMap<String, MemoryRevisionStore>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Returns the shared store registered under `name`, creating it on first
/// use. A store that was closed is replaced with a fresh one.
pub fn obtain(name: &str) -> MemoryRevisionStore {
    let mut stores = STORES.lock();
    match stores.get(name) {
        Some(store) if !store.is_closed() => store.clone(),
        _ => {
            log::debug!("Creating in-memory store '{}'", name);
            let store = MemoryRevisionStore::new();
            stores.insert(name.to_string(), store.clone());
            store
        }
    }
}

/// Removes the store registered under `name` from the registry and closes
/// it. Returns true if a store was registered. Live handles fail with
/// `InvalidState` from then on.
pub fn evict(name: &str) -> bool {
    let store = STORES.lock().remove(name);
    match store {
        Some(store) => {
            let _ = store.close();
            true
        }
        None => false,
    }
}
