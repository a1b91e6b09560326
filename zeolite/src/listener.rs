//! Listener registration and removal.
//!
//! A [`Listeners`] registry owns the callbacks subscribed to one event
//! source; each registration hands back a [`ListenerToken`] that removes the
//! callback again. Tokens hold only a weak reference to the registry, so a
//! dropped event source never keeps listeners alive through their tokens.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Callback<A> = Arc<dyn Fn(&A) + Send + Sync>;

struct TokenInner<A> {
    id: u64,
    // The callback slot is nulled on removal. Dispatch clones the Arc out
    // of the slot and drops the guard before calling, so removal never
    // blocks on a running callback and a callback can remove its own token.
    callback: RwLock<Option<Callback<A>>>,
    registry: Weak<ListenersInner<A>>,
}

/// Handle returned from a listener registration; removing it detaches the
/// callback.
pub struct ListenerToken<A> {
    inner: Arc<TokenInner<A>>,
}

impl<A> std::fmt::Debug for ListenerToken<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerToken")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

impl<A> ListenerToken<A> {
    /// Detaches the callback. Once this returns, the callback will not be
    /// invoked again; an invocation already in flight on another thread may
    /// still finish. Removing twice, or after the event source is gone, is
    /// a no-op.
    pub fn remove(&self) {
        let had_callback = self.inner.callback.write().take().is_some();
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.detach(self.inner.id);
        }
        if had_callback {
            log::trace!("Removed listener {}", self.inner.id);
        }
    }
}

struct ListenersInner<A> {
    tokens: RwLock<Vec<Arc<TokenInner<A>>>>,
    next_id: AtomicU64,
}

impl<A> ListenersInner<A> {
    fn detach(&self, id: u64) {
        self.tokens.write().retain(|t| t.id != id);
    }
}

/// An ordered registry of callbacks for one event source.
pub struct Listeners<A> {
    inner: Arc<ListenersInner<A>>,
}

impl<A> Listeners<A> {
    pub fn new() -> Self {
        Listeners {
            inner: Arc::new(ListenersInner {
                tokens: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registers `callback` and returns the token that removes it.
    pub fn add<F>(&self, callback: F) -> ListenerToken<A>
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let token = Arc::new(TokenInner {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            callback: RwLock::new(Some(Arc::new(callback))),
            registry: Arc::downgrade(&self.inner),
        });
        self.inner.tokens.write().push(token.clone());
        ListenerToken { inner: token }
    }

    /// Invokes every registered callback with `argument`, in registration
    /// order. No registry lock is held while a callback runs, so callbacks
    /// may add or remove listeners freely.
    pub fn invoke_all(&self, argument: &A) {
        let snapshot: Vec<Arc<TokenInner<A>>> =
            self.inner.tokens.read().iter().cloned().collect();
        for token in snapshot {
            let callback = token.callback.read().clone();
            if let Some(callback) = callback {
                callback(argument);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tokens.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.tokens.read().len()
    }

    /// Detaches every registered callback at once.
    pub fn clear(&self) {
        let tokens: Vec<Arc<TokenInner<A>>> =
            self.inner.tokens.write().drain(..).collect();
        for token in tokens {
            token.callback.write().take();
        }
    }
}

impl<A> Default for Listeners<A> {
    fn default() -> Self {
        Self::new()
    }
}
