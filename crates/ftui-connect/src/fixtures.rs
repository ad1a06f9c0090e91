#![forbid(unsafe_code)]

//! In-crate test store. Dispatching an action replaces the state with it.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::store::{Listener, Store, Unsubscribe};

pub(crate) struct TestStore<S> {
    me: Weak<Self>,
    state: RefCell<Rc<S>>,
    listeners: RefCell<Vec<(u64, Listener)>>,
    next_id: Cell<u64>,
}

impl<S: Clone + 'static> TestStore<S> {
    pub(crate) fn new(initial: S) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            state: RefCell::new(Rc::new(initial)),
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        })
    }

    /// Notify listeners without changing the state reference.
    pub(crate) fn touch(&self) {
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in snapshot {
            listener();
        }
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl<S: Clone + 'static> Store for TestStore<S> {
    type State = S;
    type Action = S;

    fn get_state(&self) -> Rc<S> {
        Rc::clone(&self.state.borrow())
    }

    fn dispatch(&self, action: S) -> S {
        *self.state.borrow_mut() = Rc::new(action.clone());
        self.touch();
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
