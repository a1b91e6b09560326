//! Notification scheduling.
//!
//! Every listener invocation in the crate funnels through a
//! [`NotificationQueue`]. In immediate mode (the default) a posted
//! notification runs synchronously on the posting thread. In buffered mode
//! notifications accumulate instead, and the queue pings a ready callback
//! whenever it goes from empty to non-empty; the application then drains
//! the queue from a thread of its choosing with
//! [`NotificationQueue::notify_all`].

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A deferred listener invocation.
pub type Notification = Box<dyn FnOnce() + Send>;

/// Invoked when a buffered queue goes from empty to non-empty.
pub type ReadyCallback = Arc<dyn Fn() + Send + Sync>;

struct QueueState {
    ready: Option<ReadyCallback>,
    pending: VecDeque<Notification>,
    closed: bool,
}

/// Decides, per posted notification, whether it runs now or is buffered for
/// a later [`notify_all`](NotificationQueue::notify_all) call.
#[derive(Clone)]
pub struct NotificationQueue {
    state: Arc<Mutex<QueueState>>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        NotificationQueue {
            state: Arc::new(Mutex::new(QueueState {
                ready: None,
                pending: VecDeque::new(),
                closed: false,
            })),
        }
    }

    /// Posts a notification. Runs it synchronously unless the queue is
    /// buffered, in which case it is enqueued; the transition from an empty
    /// to a non-empty queue fires the ready callback. Posting to a closed
    /// queue discards the notification.
    pub fn add(&self, notification: Notification) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        match &state.ready {
            Some(ready) => {
                let ready = ready.clone();
                let was_empty = state.pending.is_empty();
                state.pending.push_back(notification);
                drop(state);
                if was_empty {
                    ready();
                }
            }
            None => {
                drop(state);
                notification();
            }
        }
    }

    /// Switches to buffered mode. Notifications posted from now on are held
    /// until [`notify_all`](NotificationQueue::notify_all); `ready` fires
    /// each time the held set goes from empty to non-empty. Buffering lasts
    /// for the rest of the queue's life; only [`close`](NotificationQueue::close)
    /// ends it, discarding whatever is still held.
    pub fn buffer(&self, ready: ReadyCallback) {
        let mut state = self.state.lock();
        if !state.closed {
            state.ready = Some(ready);
        }
    }

    /// Delivers all currently buffered notifications in posting order on
    /// the calling thread. Notifications posted while draining are buffered
    /// for the next round and re-fire the ready callback.
    pub fn notify_all(&self) {
        let pending = {
            let mut state = self.state.lock();
            std::mem::take(&mut state.pending)
        };
        for notification in pending {
            notification();
        }
    }

    /// True when notifications are currently being buffered.
    pub fn is_buffered(&self) -> bool {
        self.state.lock().ready.is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Shuts the queue down, discarding buffered notifications. Later posts
    /// are discarded too.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.ready = None;
        state.pending.clear();
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}
