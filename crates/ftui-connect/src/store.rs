#![forbid(unsafe_code)]

//! The store contract consumed by the binding layer.
//!
//! The binding layer never mutates store state. It reads state through
//! [`Store::get_state`], relays actions through [`Store::dispatch`], and
//! registers change listeners through [`Store::subscribe`].
//!
//! State is handed out as `Rc<State>` so that "did the state change" is a
//! pointer comparison, not a deep comparison.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// A change listener. Listeners take no arguments; they pull whatever they
/// need from the store.
pub type Listener = Rc<dyn Fn()>;

/// A store as seen through its three-operation contract.
pub trait Store {
    /// Opaque state type.
    type State: 'static;
    /// Opaque action type.
    type Action: 'static;

    /// Current state. Returns the same `Rc` until the state changes.
    fn get_state(&self) -> Rc<Self::State>;

    /// Apply an action and notify listeners.
    fn dispatch(&self, action: Self::Action) -> Self::Action;

    /// Register a listener. The returned handle removes it.
    fn subscribe(&self, listener: Listener) -> Unsubscribe;
}

/// Shared handle to a store.
pub type StoreHandle<S, A> = Rc<dyn Store<State = S, Action = A>>;

/// A bound `dispatch` operation, handed to selector factories.
pub type Dispatch<A> = Rc<dyn Fn(A) -> A>;

/// Bind a store's `dispatch` into a standalone callable.
#[must_use]
pub fn dispatcher<S: 'static, A: 'static>(store: &StoreHandle<S, A>) -> Dispatch<A> {
    let store = Rc::clone(store);
    Rc::new(move |action| store.dispatch(action))
}

/// One-shot removal handle returned by [`Store::subscribe`] and
/// [`Subscription::add_nested_sub`](crate::Subscription::add_nested_sub).
///
/// Calling [`unsubscribe`](Self::unsubscribe) more than once is a no-op.
/// Dropping the handle does **not** unsubscribe.
#[must_use = "dropping an Unsubscribe handle leaves the listener registered"]
pub struct Unsubscribe {
    remove: Cell<Option<Box<dyn FnOnce()>>>,
}

impl Unsubscribe {
    /// Wrap a removal closure.
    pub fn new(remove: impl FnOnce() + 'static) -> Self {
        Self {
            remove: Cell::new(Some(Box::new(remove))),
        }
    }

    /// A handle that removes nothing.
    pub fn noop() -> Self {
        Self {
            remove: Cell::new(None),
        }
    }

    /// Remove the listener. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    /// Whether the handle has already been used (or never held anything).
    #[must_use]
    pub fn is_spent(&self) -> bool {
        let remove = self.remove.take();
        let spent = remove.is_none();
        self.remove.set(remove);
        spent
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("spent", &self.is_spent())
            .finish()
    }
}
