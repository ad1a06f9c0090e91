#![forbid(unsafe_code)]

//! Tree-shaped listener registry used to order change notifications.
//!
//! # Design
//!
//! Every connected component owns one [`Subscription`]. A node registers a
//! single callback with its parent node (or with the store, when it has no
//! parent) and fans notifications out to its own listeners. The parent is
//! referenced through a `Weak` back-pointer; it never enumerates or owns its
//! children, it only forwards notifications downward.
//!
//! # Invariants
//!
//! 1. A node is subscribed iff [`try_subscribe`](Subscription::try_subscribe)
//!    succeeded and [`try_unsubscribe`](Subscription::try_unsubscribe) has not
//!    run since. Both are idempotent.
//! 2. A node with no listeners holds no upstream registration unless it was
//!    subscribed explicitly; [`add_nested_sub`](Subscription::add_nested_sub)
//!    subscribes lazily.
//! 3. A notification pass iterates over the listener set as it was when the
//!    pass started. A listener removed mid-pass is skipped if it has not run
//!    yet; a listener added mid-pass first runs on the next pass.
//! 4. If a listener tears down the notifying node, the rest of the pass is
//!    skipped.
//!
//! # Failure Modes
//!
//! - **Listener panics**: the panic propagates to whoever called
//!   [`notify_nested_subs`](Subscription::notify_nested_subs). The node's
//!   notifying flag is restored on unwind.
//! - **Parent dropped**: `try_subscribe` on an orphaned node leaves it
//!   unsubscribed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::store::{Listener, StoreHandle, Unsubscribe};

type StoreSubscriber = Rc<dyn Fn(Listener) -> Unsubscribe>;

/// Listener collection. Removal handles point here, not at the node, so a
/// successor node can take the collection over.
type SharedListeners = Rc<RefCell<ListenerCollection>>;

/// Where a node registers its change callback.
enum Upstream {
    Store(StoreSubscriber),
    Parent(Weak<SubscriptionInner>),
}

/// What a node does when its upstream fires.
#[derive(Clone)]
enum ChangeHandler {
    /// Forward to this node's listeners.
    Notify,
    /// Run an owner-supplied callback (the owning controller).
    Custom(Listener),
    /// Torn down: ignore.
    Inert,
}

struct Entry {
    id: u64,
    callback: Listener,
    /// Cleared on removal so an in-flight pass skips the entry.
    armed: Rc<Cell<bool>>,
}

#[derive(Default)]
struct ListenerCollection {
    next_id: u64,
    entries: Vec<Entry>,
}

impl ListenerCollection {
    fn add(&mut self, callback: Listener) -> u64 {
        let key = Rc::as_ptr(&callback).cast::<()>();
        if let Some(existing) = self
            .entries
            .iter()
            .find(|e| std::ptr::eq(Rc::as_ptr(&e.callback).cast::<()>(), key))
        {
            return existing.id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            callback,
            armed: Rc::new(Cell::new(true)),
        });
        id
    }

    fn remove(&mut self, id: u64) -> Option<Entry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        let entry = self.entries.remove(pos);
        entry.armed.set(false);
        Some(entry)
    }

    fn drain(&mut self) -> Vec<Entry> {
        let drained: Vec<Entry> = self.entries.drain(..).collect();
        for entry in &drained {
            entry.armed.set(false);
        }
        drained
    }

    fn snapshot(&self) -> Vec<(Rc<Cell<bool>>, Listener)> {
        self.entries
            .iter()
            .map(|e| (Rc::clone(&e.armed), Rc::clone(&e.callback)))
            .collect()
    }
}

struct SubscriptionInner {
    upstream: Upstream,
    listeners: SharedListeners,
    unsubscribe: RefCell<Option<Unsubscribe>>,
    handler: RefCell<ChangeHandler>,
    notifying: Cell<bool>,
}

impl SubscriptionInner {
    fn is_subscribed(&self) -> bool {
        self.unsubscribe.borrow().is_some()
    }

    fn handle_change(self: &Rc<Self>) {
        let handler = self.handler.borrow().clone();
        match handler {
            ChangeHandler::Notify => self.notify(),
            ChangeHandler::Custom(callback) => callback(),
            ChangeHandler::Inert => {}
        }
    }

    fn notify(&self) {
        let snapshot = self.listeners.borrow().snapshot();
        if snapshot.is_empty() {
            return;
        }
        let _span = tracing::trace_span!("subscription.notify", listeners = snapshot.len()).entered();
        let _guard = NotifyingGuard::enter(&self.notifying);
        for (armed, callback) in snapshot {
            if !self.is_subscribed() {
                tracing::trace!(message = "subscription.notify_aborted");
                break;
            }
            if armed.get() {
                callback();
            }
        }
    }
}

impl Drop for SubscriptionInner {
    fn drop(&mut self) {
        if let Some(handle) = self.unsubscribe.get_mut().take() {
            handle.unsubscribe();
        }
    }
}

/// Restores the previous notifying flag, also on unwind.
struct NotifyingGuard<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl<'a> NotifyingGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        let previous = flag.replace(true);
        Self { flag, previous }
    }
}

impl Drop for NotifyingGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

/// A node in the notification tree.
///
/// Cloning a `Subscription` creates a new handle to the **same** node.
pub struct Subscription {
    inner: Rc<SubscriptionInner>,
}

impl Clone for Subscription {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subscribed", &self.is_subscribed())
            .field("listeners", &self.listener_count())
            .field("notifying", &self.is_notifying())
            .field("nested", &matches!(self.inner.upstream, Upstream::Parent(_)))
            .finish()
    }
}

impl Subscription {
    /// Create a node. With `parent`, the node registers with that node;
    /// otherwise it registers with `store` directly.
    ///
    /// The node starts unsubscribed, forwarding notifications to its
    /// listeners.
    pub fn new<S: 'static, A: 'static>(
        store: &StoreHandle<S, A>,
        parent: Option<&Subscription>,
    ) -> Self {
        Self::with_listeners(store, parent, SharedListeners::default())
    }

    fn with_listeners<S: 'static, A: 'static>(
        store: &StoreHandle<S, A>,
        parent: Option<&Subscription>,
        listeners: SharedListeners,
    ) -> Self {
        let upstream = match parent {
            Some(parent) => Upstream::Parent(Rc::downgrade(&parent.inner)),
            None => {
                let store = Rc::clone(store);
                let subscribe: StoreSubscriber = Rc::new(move |listener| store.subscribe(listener));
                Upstream::Store(subscribe)
            }
        };
        Self {
            inner: Rc::new(SubscriptionInner {
                upstream,
                listeners,
                unsubscribe: RefCell::new(None),
                handler: RefCell::new(ChangeHandler::Notify),
                notifying: Cell::new(false),
            }),
        }
    }

    /// Replace the default forward-to-listeners behavior with `on_change`.
    ///
    /// The owner becomes responsible for calling
    /// [`notify_nested_subs`](Self::notify_nested_subs).
    pub fn set_change_handler(&self, on_change: Listener) {
        *self.inner.handler.borrow_mut() = ChangeHandler::Custom(on_change);
    }

    /// Turn the node's change callback into a no-op. Notification passes that
    /// already captured the callback then do nothing when they reach it.
    pub fn disarm(&self) {
        *self.inner.handler.borrow_mut() = ChangeHandler::Inert;
    }

    /// Whether [`disarm`](Self::disarm) has run.
    #[must_use]
    pub fn is_disarmed(&self) -> bool {
        matches!(*self.inner.handler.borrow(), ChangeHandler::Inert)
    }

    /// Register with the parent node or the store, if not already registered.
    pub fn try_subscribe(&self) {
        if self.inner.is_subscribed() {
            return;
        }

        let weak = Rc::downgrade(&self.inner);
        let on_upstream_change: Listener = Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.handle_change();
            }
        });

        let handle = match &self.inner.upstream {
            Upstream::Store(subscribe) => subscribe(on_upstream_change),
            Upstream::Parent(parent) => match parent.upgrade() {
                Some(parent) => Subscription { inner: parent }.add_nested_sub(on_upstream_change),
                None => {
                    tracing::trace!(message = "subscription.orphaned");
                    return;
                }
            },
        };

        tracing::trace!(
            message = "subscription.subscribe",
            nested = matches!(self.inner.upstream, Upstream::Parent(_))
        );
        *self.inner.unsubscribe.borrow_mut() = Some(handle);
    }

    /// Deregister from upstream and drop every listener. Idempotent.
    pub fn try_unsubscribe(&self) {
        let handle = self.inner.unsubscribe.borrow_mut().take();
        let Some(handle) = handle else {
            return;
        };
        handle.unsubscribe();
        let dropped = self.inner.listeners.borrow_mut().drain();
        tracing::trace!(message = "subscription.unsubscribe", listeners = dropped.len());
        drop(dropped);
    }

    /// Register a child listener, subscribing this node first if needed.
    ///
    /// Adding the same `Rc` twice registers it once. The returned handle
    /// removes exactly this listener.
    pub fn add_nested_sub(&self, listener: Listener) -> Unsubscribe {
        self.try_subscribe();
        let id = self.inner.listeners.borrow_mut().add(listener);
        let weak = Rc::downgrade(&self.inner.listeners);
        Unsubscribe::new(move || {
            if let Some(listeners) = weak.upgrade() {
                let removed = listeners.borrow_mut().remove(id);
                drop(removed);
            }
        })
    }

    /// Run every listener registered when the pass starts.
    pub fn notify_nested_subs(&self) {
        self.inner.notify();
    }

    /// Whether the node currently holds an upstream registration.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.inner.is_subscribed()
    }

    /// Whether a notification pass over this node is in progress.
    #[must_use]
    pub fn is_notifying(&self) -> bool {
        self.inner.notifying.get()
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().entries.len()
    }

    /// Whether both handles refer to the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Replace this node with a fresh one that keeps its listeners.
    ///
    /// This node drops its upstream registration and is disarmed, but its
    /// listeners stay registered: they move to the returned node, and the
    /// handles returned by earlier [`add_nested_sub`](Self::add_nested_sub)
    /// calls remove them from there.
    #[cfg(any(test, feature = "test-helpers"))]
    pub(crate) fn successor<S: 'static, A: 'static>(
        &self,
        store: &StoreHandle<S, A>,
        parent: Option<&Subscription>,
    ) -> Self {
        let handle = self.inner.unsubscribe.borrow_mut().take();
        if let Some(handle) = handle {
            handle.unsubscribe();
        }
        self.disarm();
        Self::with_listeners(store, parent, Rc::clone(&self.inner.listeners))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
