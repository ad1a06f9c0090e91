#![forbid(unsafe_code)]

//! Ambient store context and the component that provides it.
//!
//! A [`StoreContext`] is the read-only slot the host passes down the
//! component tree: the store plus the subscription node that context-mode
//! descendants should chain onto. [`Provider`] owns the root node.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::store::StoreHandle;
use crate::subscription::Subscription;

/// The ambient value read by context-mode connected components.
pub struct StoreContext<S, A> {
    store: StoreHandle<S, A>,
    subscription: Option<Subscription>,
}

impl<S, A> Clone for StoreContext<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: Rc::clone(&self.store),
            subscription: self.subscription.clone(),
        }
    }
}

impl<S, A> fmt::Debug for StoreContext<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("store", &Rc::as_ptr(&self.store).cast::<()>())
            .field("subscription", &self.subscription)
            .finish()
    }
}

impl<S, A> StoreContext<S, A> {
    pub fn new(store: StoreHandle<S, A>, subscription: Option<Subscription>) -> Self {
        Self {
            store,
            subscription,
        }
    }

    #[must_use]
    pub fn store(&self) -> &StoreHandle<S, A> {
        &self.store
    }

    #[must_use]
    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    /// Identity comparison: same store and same subscription node.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
            && match (&self.subscription, &other.subscription) {
                (Some(a), Some(b)) => a.ptr_eq(b),
                (None, None) => true,
                _ => false,
            }
    }
}

/// Identity comparison of two optional contexts.
#[must_use]
pub fn same_context<S, A>(a: Option<&StoreContext<S, A>>, b: Option<&StoreContext<S, A>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same_as(b),
        (None, None) => true,
        _ => false,
    }
}

/// Makes a store available to every context-mode connected descendant.
///
/// The provider's root node forwards store notifications to its listeners
/// (the topmost connected components). It subscribes in
/// [`did_mount`](Self::did_mount); if the state changed between construction
/// and mount, for example because a descendant dispatched while being
/// constructed, it notifies its descendants right away.
pub struct Provider<S, A> {
    context: RefCell<StoreContext<S, A>>,
    state_at_mount: RefCell<Rc<S>>,
}

impl<S: 'static, A: 'static> Provider<S, A> {
    pub fn new(store: StoreHandle<S, A>) -> Self {
        let subscription = Subscription::new(&store, None);
        let state = store.get_state();
        Self {
            context: RefCell::new(StoreContext::new(store, Some(subscription))),
            state_at_mount: RefCell::new(state),
        }
    }

    /// The context value to hand to descendants.
    #[must_use]
    pub fn context(&self) -> StoreContext<S, A> {
        self.context.borrow().clone()
    }

    #[must_use]
    pub fn store(&self) -> StoreHandle<S, A> {
        Rc::clone(self.context.borrow().store())
    }

    fn root(&self) -> Option<Subscription> {
        self.context.borrow().subscription().cloned()
    }

    pub fn did_mount(&self) {
        let Some(root) = self.root() else {
            return;
        };
        root.try_subscribe();
        self.notify_if_changed(&root);
    }

    pub fn will_unmount(&self) {
        if let Some(root) = self.root() {
            root.try_unsubscribe();
        }
    }

    /// Swap the provided store. Returns false if `store` is already provided.
    ///
    /// The new context has a fresh root node, so connected descendants see a
    /// different context identity on their next render and refresh against
    /// the new store.
    pub fn set_store(&self, store: StoreHandle<S, A>) -> bool {
        if Rc::ptr_eq(self.context.borrow().store(), &store) {
            return false;
        }
        tracing::debug!(message = "provider.store_swapped");
        if let Some(old) = self.root() {
            old.try_unsubscribe();
        }
        let subscription = Subscription::new(&store, None);
        let state = store.get_state();
        *self.context.borrow_mut() = StoreContext::new(store, Some(subscription.clone()));
        *self.state_at_mount.borrow_mut() = state;
        subscription.try_subscribe();
        true
    }

    fn notify_if_changed(&self, root: &Subscription) {
        let current = self.store().get_state();
        let changed = !Rc::ptr_eq(&self.state_at_mount.borrow(), &current);
        if changed {
            *self.state_at_mount.borrow_mut() = current;
            root.notify_nested_subs();
        }
    }
}

impl<S, A> fmt::Debug for Provider<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("context", &self.context.borrow())
            .finish()
    }
}
