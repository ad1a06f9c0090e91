#![forbid(unsafe_code)]

//! Reducer-driven reference store.
//!
//! Behaves like a minimal single-state container: `dispatch` runs the reducer
//! and then notifies every listener registered when the dispatch started.
//! A reducer that returns the previous `Rc` leaves the state reference
//! unchanged, but listeners are still notified.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ftui_connect::{Listener, Store, StoreHandle, Unsubscribe};

/// Pure state transition.
pub type Reducer<S, A> = Box<dyn Fn(&Rc<S>, &A) -> Rc<S>>;

pub struct ReducerStore<S, A> {
    me: Weak<Self>,
    state: RefCell<Rc<S>>,
    reducer: Reducer<S, A>,
    listeners: RefCell<Vec<(u64, Listener)>>,
    next_id: Cell<u64>,
    dispatches: Cell<u64>,
}

impl<S: 'static, A: 'static> ReducerStore<S, A> {
    pub fn new(initial: S, reducer: impl Fn(&Rc<S>, &A) -> Rc<S> + 'static) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            state: RefCell::new(Rc::new(initial)),
            reducer: Box::new(reducer),
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            dispatches: Cell::new(0),
        })
    }

    /// Type-erased handle for the binding layer.
    #[must_use]
    pub fn handle(self: &Rc<Self>) -> StoreHandle<S, A> {
        Rc::clone(self) as StoreHandle<S, A>
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    #[must_use]
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches.get()
    }

    fn notify(&self) {
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in snapshot {
            listener();
        }
    }
}

impl<S: 'static, A: 'static> Store for ReducerStore<S, A> {
    type State = S;
    type Action = A;

    fn get_state(&self) -> Rc<S> {
        Rc::clone(&self.state.borrow())
    }

    fn dispatch(&self, action: A) -> A {
        let current = self.get_state();
        let next = (self.reducer)(&current, &action);
        let previous = self.state.replace(next);
        drop((current, previous));
        self.dispatches.set(self.dispatches.get() + 1);
        tracing::trace!(message = "store.dispatch", listeners = self.listener_count());
        self.notify();
        action
    }

    fn subscribe(&self, listener: Listener) -> Unsubscribe {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().push((id, listener));
        let me = self.me.clone();
        Unsubscribe::new(move || {
            if let Some(store) = me.upgrade() {
                store.listeners.borrow_mut().retain(|(other, _)| *other != id);
            }
        })
    }
}

impl<S, A> fmt::Debug for ReducerStore<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerStore")
            .field("listeners", &self.listeners.borrow().len())
            .field("dispatches", &self.dispatches.get())
            .finish()
    }
}
