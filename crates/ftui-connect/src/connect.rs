#![forbid(unsafe_code)]

//! Connected-component controller.
//!
//! # Overview
//!
//! [`connect_advanced`] validates a selector factory and its options once.
//! [`ConnectAdvanced::wrap`] binds them to a wrapped component name, producing
//! a [`Connector`]. Each component instance the host creates gets its own
//! [`Connect`] controller through [`Connector::instantiate`].
//!
//! The host drives a controller through the usual lifecycle calls:
//!
//! ```text
//! instantiate ─► render ─► did_mount
//!                  ▲            │
//!                  │            ▼
//!       should_update ◄── (props change / schedule_update)
//!                  │
//!                  ▼
//!               render ─► did_update ─► … ─► will_unmount
//! ```
//!
//! # Notification order
//!
//! When the controller's subscription node fires, the controller re-runs its
//! selector. If the derived props did not change, it notifies its children
//! immediately. If they did, it asks the host for an update and notifies its
//! children from [`Connect::did_update`], after its own render completed. A
//! host that renders synchronously inside
//! [`UpdateHost::schedule_update`] therefore completes the whole two-step
//! sequence (own update, then children) in one stack frame.
//!
//! The children are whatever registered beneath the controller's node. Every
//! controller that handles state changes hands descendants a
//! [`StoreContext`] carrying its own node, so each connected component's node
//! sits under the node of its nearest connected ancestor (or the
//! [`Provider`](crate::Provider), or the store for a props-mode instance).
//!
//! # Teardown
//!
//! [`Connect::will_unmount`] unsubscribes and swaps both the selector run and
//! the downward notification for no-ops, so notification passes that are
//! already in flight reach this component harmlessly.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::context::{StoreContext, same_context};
use crate::error::{ConnectError, Result};
use crate::options::ConnectOptions;
use crate::selector::{SourceSelector, StatefulSelector};
use crate::store::{Dispatch, StoreHandle, dispatcher};
use crate::subscription::Subscription;

/// Opaque handle the caller wants forwarded to the wrapped component.
pub type ForwardedRef = Rc<dyn Any>;

/// Resolves a mapping function for one component instance.
pub type SelectorFactory<S, A, OP, P> = Rc<dyn Fn(&SelectorInit<A>) -> SourceSelector<S, OP, P>>;

/// The rendering framework, as seen by a controller.
pub trait UpdateHost {
    /// Re-render the component owning this controller.
    ///
    /// A host may render synchronously, calling [`Connect::render`] and then
    /// [`Connect::did_update`] before returning, or defer the update.
    fn schedule_update(&self);
}

/// Inputs handed to a [`SelectorFactory`].
pub struct SelectorInit<A> {
    pub dispatch: Dispatch<A>,
    pub display_name: Rc<str>,
    pub wrapped_component_name: Rc<str>,
    pub method_name: Rc<str>,
    pub pure: bool,
    pub should_handle_state_changes: bool,
    pub forward_ref: bool,
}

impl<A> fmt::Debug for SelectorInit<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorInit")
            .field("display_name", &self.display_name)
            .field("wrapped_component_name", &self.wrapped_component_name)
            .field("method_name", &self.method_name)
            .field("pure", &self.pure)
            .field("should_handle_state_changes", &self.should_handle_state_changes)
            .field("forward_ref", &self.forward_ref)
            .finish()
    }
}

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Constructing,
    Mounted,
    /// Rebuilding against a changed ambient store or subscription.
    Refreshing,
    Unmounted,
}

/// Validated selector factory and options, not yet bound to a component.
pub struct ConnectAdvanced<S, A, OP, P> {
    factory: SelectorFactory<S, A, OP, P>,
    options: ConnectOptions,
}

impl<S, A, OP, P> fmt::Debug for ConnectAdvanced<S, A, OP, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectAdvanced")
            .field("options", &self.options)
            .finish()
    }
}

/// Validate `options` and pair them with `factory`.
///
/// The factory is called once per instance (and again on refresh) with the
/// store's dispatch and the connector's names and flags; it returns the
/// instance's mapping function. The mapping function is responsible for
/// returning the previous `Rc` when nothing relevant changed.
pub fn connect_advanced<S, A, OP, P>(
    factory: impl Fn(&SelectorInit<A>) -> SourceSelector<S, OP, P> + 'static,
    options: ConnectOptions,
) -> Result<ConnectAdvanced<S, A, OP, P>> {
    options.validate()?;
    Ok(ConnectAdvanced {
        factory: Rc::new(factory),
        options,
    })
}

impl<S, A, OP, P> ConnectAdvanced<S, A, OP, P> {
    /// Bind to a wrapped component.
    pub fn wrap(&self, wrapped_component_name: &str) -> Result<Connector<S, A, OP, P>> {
        if wrapped_component_name.trim().is_empty() {
            return Err(ConnectError::invalid(format!(
                "you must pass a component name to the function returned by {}",
                self.options.method()
            )));
        }
        let display_name: Rc<str> = self.options.display_name_for(wrapped_component_name).into();
        Ok(Connector {
            shared: Rc::new(ConnectorShared {
                factory: Rc::clone(&self.factory),
                options: self.options.clone(),
                method_name: self.options.method().into(),
                display_name,
                wrapped_component_name: wrapped_component_name.into(),
            }),
        })
    }
}

struct ConnectorShared<S, A, OP, P> {
    factory: SelectorFactory<S, A, OP, P>,
    options: ConnectOptions,
    method_name: Rc<str>,
    display_name: Rc<str>,
    wrapped_component_name: Rc<str>,
}

/// A selector factory bound to one wrapped component. Creates controllers.
pub struct Connector<S, A, OP, P> {
    shared: Rc<ConnectorShared<S, A, OP, P>>,
}

impl<S, A, OP, P> Clone for Connector<S, A, OP, P> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<S, A, OP, P> fmt::Debug for Connector<S, A, OP, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("display_name", &self.shared.display_name)
            .field("options", &self.shared.options)
            .finish()
    }
}

/// Per-instance inputs besides the ambient context.
pub struct InstanceProps<OP, S, A> {
    own: Rc<OP>,
    store: Option<StoreHandle<S, A>>,
    forwarded_ref: Option<ForwardedRef>,
}

impl<OP, S, A> InstanceProps<OP, S, A> {
    pub fn new(own: Rc<OP>) -> Self {
        Self {
            own,
            store: None,
            forwarded_ref: None,
        }
    }

    /// Use this store instead of the ambient one (props-mode).
    #[must_use]
    pub fn with_store(mut self, store: StoreHandle<S, A>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_forwarded_ref(mut self, forwarded_ref: ForwardedRef) -> Self {
        self.forwarded_ref = Some(forwarded_ref);
        self
    }
}

impl<S: 'static, A: 'static, OP: 'static, P: 'static> Connector<S, A, OP, P> {
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.shared.display_name
    }

    #[must_use]
    pub fn wrapped_component_name(&self) -> &str {
        &self.shared.wrapped_component_name
    }

    #[must_use]
    pub fn options(&self) -> &ConnectOptions {
        &self.shared.options
    }

    /// Construct a controller.
    ///
    /// Resolves the store (explicit store first, then `ambient`), runs the
    /// selector once so the first render has props, and builds the
    /// subscription node without subscribing it.
    pub fn instantiate(
        &self,
        props: InstanceProps<OP, S, A>,
        ambient: Option<&StoreContext<S, A>>,
        host: Rc<dyn UpdateHost>,
    ) -> Result<Connect<S, A, OP, P>> {
        let inner = Rc::new(ConnectInner {
            shared: Rc::clone(&self.shared),
            host,
            own_props: RefCell::new(props.own),
            explicit_store: props.store,
            forwarded_ref: props.forwarded_ref,
            ambient: RefCell::new(ambient.cloned()),
            store: RefCell::new(None),
            props_mode: Cell::new(false),
            selector: RefCell::new(None),
            subscription: RefCell::new(None),
            provided: RefCell::new(None),
            notify: RefCell::new(NotifyTarget::Inert),
            notify_on_did_update: Cell::new(false),
            refresh_pending: Cell::new(false),
            lifecycle: Cell::new(Lifecycle::Constructing),
        });
        inner.init_store(ambient)?;
        inner.init_selector();
        inner.init_subscription();
        tracing::trace!(
            message = "connect.construct",
            display_name = %self.shared.display_name,
            props_mode = inner.props_mode.get()
        );
        Ok(Connect { inner })
    }
}

/// Where downward notifications go.
#[derive(Clone)]
enum NotifyTarget {
    Live(Subscription),
    /// Torn down, or never subscribing.
    Inert,
}

struct ConnectInner<S, A, OP, P> {
    shared: Rc<ConnectorShared<S, A, OP, P>>,
    host: Rc<dyn UpdateHost>,
    own_props: RefCell<Rc<OP>>,
    explicit_store: Option<StoreHandle<S, A>>,
    forwarded_ref: Option<ForwardedRef>,
    /// Last ambient context observed.
    ambient: RefCell<Option<StoreContext<S, A>>>,
    store: RefCell<Option<StoreHandle<S, A>>>,
    props_mode: Cell<bool>,
    selector: RefCell<Option<StatefulSelector<S, A, OP, P>>>,
    subscription: RefCell<Option<Subscription>>,
    /// Context handed to descendants in props-mode.
    provided: RefCell<Option<StoreContext<S, A>>>,
    notify: RefCell<NotifyTarget>,
    notify_on_did_update: Cell<bool>,
    refresh_pending: Cell<bool>,
    lifecycle: Cell<Lifecycle>,
}

impl<S: 'static, A: 'static, OP: 'static, P: 'static> ConnectInner<S, A, OP, P> {
    fn display_name(&self) -> String {
        self.shared.display_name.to_string()
    }

    fn selector(&self) -> Option<StatefulSelector<S, A, OP, P>> {
        self.selector.borrow().clone()
    }

    fn own_props(&self) -> Rc<OP> {
        Rc::clone(&self.own_props.borrow())
    }

    fn init_store(&self, ambient: Option<&StoreContext<S, A>>) -> Result<()> {
        let (store, props_mode) = match (&self.explicit_store, ambient) {
            (Some(store), _) => (Rc::clone(store), true),
            (None, Some(context)) => (Rc::clone(context.store()), false),
            (None, None) => {
                return Err(ConnectError::MissingStore {
                    display_name: self.display_name(),
                });
            }
        };
        *self.store.borrow_mut() = Some(store);
        self.props_mode.set(props_mode);
        Ok(())
    }

    fn init_selector(&self) {
        let store = self.store.borrow().clone();
        let Some(store) = store else {
            return;
        };
        let shared = &self.shared;
        let init = SelectorInit {
            dispatch: dispatcher(&store),
            display_name: Rc::clone(&shared.display_name),
            wrapped_component_name: Rc::clone(&shared.wrapped_component_name),
            method_name: Rc::clone(&shared.method_name),
            pure: shared.options.is_pure(),
            should_handle_state_changes: shared.options.handles_state_changes(),
            forward_ref: shared.options.forwards_ref(),
        };
        let source = (shared.factory)(&init);
        let selector = StatefulSelector::new(source, store);
        selector.run(&self.own_props());
        let previous = self.selector.replace(Some(selector));
        drop(previous);
    }

    fn init_subscription(self: &Rc<Self>) {
        let store = self.store.borrow().clone();
        let Some(store) = store else {
            return;
        };
        // Without a node of its own, the instance leaves the ambient context
        // untouched for its descendants.
        if !self.shared.options.handles_state_changes() {
            *self.provided.borrow_mut() = None;
            return;
        }

        let parent = self.parent_subscription();
        let subscription = Subscription::new(&store, parent.as_ref());
        self.install_subscription(store, subscription);
    }

    /// The node a new subscription registers with. It must come from the
    /// same place as the store: a props-mode instance never chains onto the
    /// ambient subscription.
    fn parent_subscription(&self) -> Option<Subscription> {
        if self.props_mode.get() {
            return None;
        }
        self.ambient
            .borrow()
            .as_ref()
            .and_then(|context| context.subscription().cloned())
    }

    /// Make `subscription` the instance's node. Descendants chain onto it
    /// through the provided context, so every connected child registers
    /// beneath its nearest connected ancestor.
    fn install_subscription(self: &Rc<Self>, store: StoreHandle<S, A>, subscription: Subscription) {
        let weak: Weak<Self> = Rc::downgrade(self);
        subscription.set_change_handler(Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_state_change();
            }
        }));

        let provided = StoreContext::new(store, Some(subscription.clone()));
        *self.provided.borrow_mut() = Some(provided);
        *self.notify.borrow_mut() = NotifyTarget::Live(subscription.clone());
        *self.subscription.borrow_mut() = Some(subscription);
    }

    fn notify_nested_subs(&self) {
        let target = self.notify.borrow().clone();
        if let NotifyTarget::Live(subscription) = target {
            subscription.notify_nested_subs();
        }
    }

    fn on_state_change(&self) {
        let Some(selector) = self.selector() else {
            return;
        };
        selector.run(&self.own_props());
        let dirty = selector.should_component_update();
        tracing::trace!(
            message = "connect.state_change",
            display_name = %self.shared.display_name,
            dirty
        );
        if dirty {
            self.notify_on_did_update.set(true);
            self.host.schedule_update();
        } else {
            self.notify_nested_subs();
        }
    }

    /// Subscribe, re-run, and request a render if the re-run is dirty.
    fn subscribe_and_catch_up(&self) {
        if self.catch_up() {
            self.host.schedule_update();
        }
    }

    /// Subscribe and re-run. Returns whether the run left the selector dirty.
    fn catch_up(&self) -> bool {
        let subscription = self.subscription.borrow().clone();
        if let Some(subscription) = subscription {
            subscription.try_subscribe();
        }
        let Some(selector) = self.selector() else {
            return false;
        };
        selector.run(&self.own_props());
        selector.should_component_update()
    }

    /// Catch up after the node was replaced. Descendants still hold the old
    /// node in their context, so a render is due even when the derived props
    /// are unchanged.
    fn catch_up_after_rebuild(&self) {
        let dirty = self.catch_up();
        if dirty || self.provided.borrow().is_some() {
            self.host.schedule_update();
        }
    }

    fn clean_store_subscription(&self) {
        let subscription = self.subscription.borrow_mut().take();
        if let Some(subscription) = subscription {
            subscription.try_unsubscribe();
            subscription.disarm();
        }
        *self.notify.borrow_mut() = NotifyTarget::Inert;
        let store = self.store.borrow_mut().take();
        let provided = self.provided.borrow_mut().take();
        drop((store, provided));
        if let Some(selector) = self.selector() {
            selector.disable();
            selector.reset_should_component_update();
        }
    }

    fn refresh(self: &Rc<Self>) -> Result<()> {
        self.refresh_pending.set(false);
        self.lifecycle.set(Lifecycle::Refreshing);
        let _span = tracing::debug_span!(
            "connect.refresh",
            display_name = %self.shared.display_name
        )
        .entered();

        self.clean_store_subscription();
        let ambient = self.ambient.borrow().clone();
        self.init_store(ambient.as_ref())?;
        self.init_selector();
        self.init_subscription();
        self.lifecycle.set(Lifecycle::Mounted);
        self.catch_up_after_rebuild();
        Ok(())
    }
}

/// One connected component instance.
///
/// Cloning a `Connect` creates a new handle to the **same** controller.
pub struct Connect<S, A, OP, P> {
    inner: Rc<ConnectInner<S, A, OP, P>>,
}

impl<S, A, OP, P> Clone for Connect<S, A, OP, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S, A, OP, P> fmt::Debug for Connect<S, A, OP, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connect")
            .field("display_name", &self.inner.shared.display_name)
            .field("lifecycle", &self.inner.lifecycle.get())
            .field("props_mode", &self.inner.props_mode.get())
            .field("subscription", &self.inner.subscription.borrow())
            .finish()
    }
}

/// Output of a successful [`Connect::render`].
pub struct Rendered<S, A, P> {
    /// Derived props for the wrapped component.
    pub props: Rc<P>,
    /// Context to hand to descendants: one carrying the instance's own node
    /// when it has one, otherwise the ambient context.
    pub context: Option<StoreContext<S, A>>,
    /// The caller's ref, present only with `forward_ref` enabled.
    pub forwarded_ref: Option<ForwardedRef>,
}

impl<S, A, P: fmt::Debug> fmt::Debug for Rendered<S, A, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rendered")
            .field("props", &self.props)
            .field("context", &self.context)
            .field("forwarded_ref", &self.forwarded_ref.is_some())
            .finish()
    }
}

impl<S: 'static, A: 'static, OP: 'static, P: 'static> Connect<S, A, OP, P> {
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.inner.shared.display_name
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lifecycle.get()
    }

    /// Whether the store came from an explicit per-instance store.
    #[must_use]
    pub fn is_props_mode(&self) -> bool {
        self.inner.props_mode.get()
    }

    /// The instance's subscription node, absent after unmount or when state
    /// changes are not handled.
    #[must_use]
    pub fn subscription(&self) -> Option<Subscription> {
        self.inner.subscription.borrow().clone()
    }

    #[must_use]
    pub fn store(&self) -> Option<StoreHandle<S, A>> {
        self.inner.store.borrow().clone()
    }

    #[must_use]
    pub fn own_props(&self) -> Rc<OP> {
        self.inner.own_props()
    }

    /// Whether an ambient change was seen and a refresh is due.
    #[must_use]
    pub fn is_refresh_pending(&self) -> bool {
        self.inner.refresh_pending.get()
    }

    /// Finish mounting: subscribe, then catch up with state changes that
    /// happened while descendants were being constructed.
    pub fn did_mount(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.lifecycle.get() != Lifecycle::Constructing {
            return Ok(());
        }
        inner.lifecycle.set(Lifecycle::Mounted);
        if !inner.shared.options.handles_state_changes() {
            return Ok(());
        }
        if inner.refresh_pending.get() {
            return inner.refresh();
        }
        inner.subscribe_and_catch_up();
        Ok(())
    }

    /// Decide whether new own props require a render.
    ///
    /// With `pure`, pointer-identical props skip the selector run and the
    /// render unless the selector is already dirty.
    pub fn should_update(&self, next_props: Rc<OP>) -> bool {
        let inner = &self.inner;
        let pure = inner.shared.options.is_pure();
        let changed = !Rc::ptr_eq(&inner.own_props.borrow(), &next_props);
        let previous = inner.own_props.replace(Rc::clone(&next_props));
        drop(previous);

        let Some(selector) = inner.selector() else {
            return !pure;
        };
        if !pure || changed {
            selector.run(&next_props);
        }
        !pure || selector.should_component_update()
    }

    /// Produce the wrapped component's props.
    ///
    /// `ambient` is the context the host currently provides to this instance.
    /// A context-mode instance that sees a different context identity
    /// schedules a refresh for its next `did_update`.
    pub fn render(&self, ambient: Option<&StoreContext<S, A>>) -> Result<Rendered<S, A, P>> {
        let inner = &self.inner;
        self.read_context(ambient);

        let Some(selector) = inner.selector() else {
            return Err(ConnectError::NoProps {
                display_name: inner.display_name(),
            });
        };
        let props = inner.own_props();
        let stale = selector
            .last_processed_props()
            .is_none_or(|last| !Rc::ptr_eq(&last, &props));
        if stale {
            selector.run(&props);
        }
        selector.reset_should_component_update();

        if let Some(source) = selector.error() {
            return Err(ConnectError::Selector {
                display_name: inner.display_name(),
                source,
            });
        }
        let derived = selector.props().ok_or_else(|| ConnectError::NoProps {
            display_name: inner.display_name(),
        })?;

        let context = inner
            .provided
            .borrow()
            .clone()
            .or_else(|| ambient.cloned());
        let forwarded_ref = if inner.shared.options.forwards_ref() {
            inner.forwarded_ref.clone()
        } else {
            None
        };
        Ok(Rendered {
            props: derived,
            context,
            forwarded_ref,
        })
    }

    fn read_context(&self, ambient: Option<&StoreContext<S, A>>) {
        let inner = &self.inner;
        if inner.props_mode.get() {
            return;
        }
        let unchanged = same_context(inner.ambient.borrow().as_ref(), ambient);
        if unchanged {
            return;
        }
        tracing::debug!(
            message = "connect.context_changed",
            display_name = %inner.shared.display_name
        );
        let previous = inner.ambient.replace(ambient.cloned());
        drop(previous);
        inner.refresh_pending.set(true);
    }

    /// Finish an update: notify children deferred by a dirty notification,
    /// then apply a pending refresh.
    pub fn did_update(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.lifecycle.get() == Lifecycle::Unmounted {
            return Ok(());
        }
        if inner.notify_on_did_update.replace(false) {
            inner.notify_nested_subs();
        }
        if inner.refresh_pending.get() {
            inner.refresh()?;
        }
        Ok(())
    }

    /// Tear down. Idempotent.
    pub fn will_unmount(&self) {
        let inner = &self.inner;
        if inner.lifecycle.get() == Lifecycle::Unmounted {
            return;
        }
        inner.clean_store_subscription();
        inner.notify_on_did_update.set(false);
        inner.refresh_pending.set(false);
        inner.lifecycle.set(Lifecycle::Unmounted);
        tracing::trace!(
            message = "connect.unmount",
            display_name = %inner.shared.display_name
        );
    }

    /// Rebuild the selector and subscription node in place. The new node
    /// takes over the old node's child listeners, and the children's removal
    /// handles keep working against it.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn reinitialize(&self) {
        let inner = &self.inner;
        if inner.lifecycle.get() == Lifecycle::Unmounted {
            return;
        }
        inner.init_selector();

        let old = inner.subscription.borrow_mut().take();
        let store = inner.store.borrow().clone();
        match (old, store) {
            (Some(old), Some(store)) => {
                let parent = inner.parent_subscription();
                let next = old.successor(&store, parent.as_ref());
                inner.install_subscription(store, next);
            }
            _ => inner.init_subscription(),
        }
        inner.catch_up_after_rebuild();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Provider;
    use crate::error::SelectorError;
    use crate::fixtures::TestStore;
    use crate::store::Store;

    #[derive(Default)]
    struct RecordingHost {
        updates: Cell<u32>,
    }

    impl UpdateHost for RecordingHost {
        fn schedule_update(&self) {
            self.updates.set(self.updates.get() + 1);
        }
    }

    type Counter = Rc<Cell<u32>>;

    fn handle(store: &Rc<TestStore<u32>>) -> StoreHandle<u32, u32> {
        Rc::clone(store) as StoreHandle<u32, u32>
    }

    /// Identity mapping that counts its runs.
    fn identity_connector(options: ConnectOptions) -> (Connector<u32, u32, (), u32>, Counter) {
        let runs: Counter = Rc::new(Cell::new(0));
        let runs_clone = Rc::clone(&runs);
        let connector = connect_advanced(
            move |_init: &SelectorInit<u32>| {
                let runs = Rc::clone(&runs_clone);
                Rc::new(move |state: &Rc<u32>, _: &Rc<()>| {
                    runs.set(runs.get() + 1);
                    Ok(Rc::clone(state))
                }) as SourceSelector<u32, (), u32>
            },
            options,
        )
        .unwrap()
        .wrap("Counter")
        .unwrap();
        (connector, runs)
    }

    fn mount(
        connector: &Connector<u32, u32, (), u32>,
        provider: &Provider<u32, u32>,
        host: &Rc<RecordingHost>,
    ) -> Connect<u32, u32, (), u32> {
        let context = provider.context();
        let connect = connector
            .instantiate(InstanceProps::new(Rc::new(())), Some(&context), host.clone())
            .unwrap();
        connect.render(Some(&context)).unwrap();
        connect.did_mount().unwrap();
        provider.did_mount();
        connect
    }

    #[test]
    fn missing_store_fails_fast() {
        let (connector, runs) = identity_connector(ConnectOptions::default());
        let err = connector
            .instantiate(InstanceProps::new(Rc::new(())), None, Rc::new(RecordingHost::default()))
            .unwrap_err();
        assert!(matches!(err, ConnectError::MissingStore { .. }));
        assert!(err.to_string().contains("ConnectAdvanced(Counter)"));
        assert_eq!(runs.get(), 0);
    }

    #[test]
    fn removed_option_fails_at_connect_time() {
        let result = connect_advanced(
            |_: &SelectorInit<u32>| {
                Rc::new(|s: &Rc<u32>, _: &Rc<()>| Ok(Rc::clone(s))) as SourceSelector<u32, (), u32>
            },
            ConnectOptions::new().with_ref(true),
        );
        assert!(matches!(result, Err(ConnectError::RemovedOption { option: "with_ref", .. })));
    }

    #[test]
    fn empty_component_name_is_rejected() {
        let advanced = connect_advanced(
            |_: &SelectorInit<u32>| {
                Rc::new(|s: &Rc<u32>, _: &Rc<()>| Ok(Rc::clone(s))) as SourceSelector<u32, (), u32>
            },
            ConnectOptions::default(),
        )
        .unwrap();
        assert!(advanced.wrap("").is_err());
    }

    #[test]
    fn construction_runs_selector_without_subscribing() {
        let store = TestStore::new(1);
        let provider = Provider::new(handle(&store));
        let (connector, runs) = identity_connector(ConnectOptions::default());
        let host = Rc::new(RecordingHost::default());
        let context = provider.context();
        let connect = connector
            .instantiate(InstanceProps::new(Rc::new(())), Some(&context), host)
            .unwrap();

        assert_eq!(runs.get(), 1);
        assert_eq!(connect.lifecycle(), Lifecycle::Constructing);
        assert!(!connect.subscription().unwrap().is_subscribed());
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn mount_maps_twice_and_subscribes() {
        let store = TestStore::new(1);
        let provider = Provider::new(handle(&store));
        let (connector, runs) = identity_connector(ConnectOptions::default());
        let host = Rc::new(RecordingHost::default());
        let connect = mount(&connector, &provider, &host);

        assert_eq!(runs.get(), 2);
        assert_eq!(host.updates.get(), 0);
        assert_eq!(connect.lifecycle(), Lifecycle::Mounted);
        assert!(connect.subscription().unwrap().is_subscribed());
    }

    #[test]
    fn dirty_notification_requests_update_and_defers_children() {
        let store = TestStore::new(1);
        let provider = Provider::new(handle(&store));
        let (connector, _runs) = identity_connector(ConnectOptions::default());
        let host = Rc::new(RecordingHost::default());
        let connect = mount(&connector, &provider, &host);

        let child_calls: Counter = Rc::new(Cell::new(0));
        let child_clone = Rc::clone(&child_calls);
        let child = connect
            .subscription()
            .unwrap()
            .add_nested_sub(Rc::new(move || child_clone.set(child_clone.get() + 1)));

        store.dispatch(2);
        assert_eq!(host.updates.get(), 1);
        assert_eq!(child_calls.get(), 0);

        connect.render(Some(&provider.context())).unwrap();
        connect.did_update().unwrap();
        assert_eq!(child_calls.get(), 1);

        // A second did_update has nothing deferred.
        connect.did_update().unwrap();
        assert_eq!(child_calls.get(), 1);
    }

    #[test]
    fn clean_notification_forwards_immediately() {
        let store = TestStore::new(1);
        let provider = Provider::new(handle(&store));
        let (connector, runs) = identity_connector(ConnectOptions::default());
        let host = Rc::new(RecordingHost::default());
        let connect = mount(&connector, &provider, &host);

        let child_calls: Counter = Rc::new(Cell::new(0));
        let child_clone = Rc::clone(&child_calls);
        let child = connect
            .subscription()
            .unwrap()
            .add_nested_sub(Rc::new(move || child_clone.set(child_clone.get() + 1)));

        store.touch();
        assert_eq!(runs.get(), 3);
        assert_eq!(host.updates.get(), 0);
        assert_eq!(child_calls.get(), 1);
    }

    #[test]
    fn pure_skips_identical_props() {
        let store = TestStore::new(1);
        let provider = Provider::new(handle(&store));
        let (connector, runs) = identity_connector(ConnectOptions::new().pure(true));
        let host = Rc::new(RecordingHost::default());
        let connect = mount(&connector, &provider, &host);

        let same = connect.own_props();
        assert!(!connect.should_update(same));
        assert_eq!(runs.get(), 2);

        // New props reference, same derived props: mapped but not rendered.
        assert!(!connect.should_update(Rc::new(())));
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn impure_always_updates() {
        let store = TestStore::new(1);
        let provider = Provider::new(handle(&store));
        let (connector, runs) = identity_connector(ConnectOptions::new().pure(false));
        let host = Rc::new(RecordingHost::default());
        let connect = mount(&connector, &provider, &host);

        assert!(connect.should_update(connect.own_props()));
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn selector_error_is_reraised_at_render() {
        let store = TestStore::new(1);
        let provider = Provider::new(handle(&store));
        let failure = SelectorError::msg("state 13 is cursed");
        let failure_clone = failure.clone();
        let connector = connect_advanced(
            move |_: &SelectorInit<u32>| {
                let failure = failure_clone.clone();
                Rc::new(move |state: &Rc<u32>, _: &Rc<()>| {
                    if **state == 13 {
                        Err(failure.clone())
                    } else {
                        Ok(Rc::clone(state))
                    }
                }) as SourceSelector<u32, (), u32>
            },
            ConnectOptions::default(),
        )
        .unwrap()
        .wrap("Cursed")
        .unwrap();
        let host = Rc::new(RecordingHost::default());
        let context = provider.context();
        let connect = connector
            .instantiate(InstanceProps::new(Rc::new(())), Some(&context), host.clone())
            .unwrap();
        connect.render(Some(&context)).unwrap();
        connect.did_mount().unwrap();

        store.dispatch(13);
        assert_eq!(host.updates.get(), 1);
        let err = connect.render(Some(&context)).unwrap_err();
        assert!(err.selector_error().unwrap().ptr_eq(&failure));

        store.dispatch(14);
        assert_eq!(*connect.render(Some(&context)).unwrap().props, 14);
    }

    #[test]
    fn unmount_is_idempotent_and_inert() {
        let store = TestStore::new(1);
        let provider = Provider::new(handle(&store));
        let (connector, runs) = identity_connector(ConnectOptions::default());
        let host = Rc::new(RecordingHost::default());
        let connect = mount(&connector, &provider, &host);
        let node = connect.subscription().unwrap();

        connect.will_unmount();
        connect.will_unmount();
        assert_eq!(connect.lifecycle(), Lifecycle::Unmounted);
        assert!(connect.subscription().is_none());
        assert!(connect.store().is_none());
        assert!(!node.is_subscribed());
        assert!(node.is_disarmed());

        store.dispatch(5);
        assert_eq!(runs.get(), 2);
        assert_eq!(host.updates.get(), 0);
        assert!(connect.did_update().is_ok());
    }

    #[test]
    fn static_mapper_never_subscribes() {
        let store = TestStore::new(1);
        let provider = Provider::new(handle(&store));
        let (connector, runs) =
            identity_connector(ConnectOptions::new().should_handle_state_changes(false));
        let host = Rc::new(RecordingHost::default());
        let connect = mount(&connector, &provider, &host);

        assert!(connect.subscription().is_none());
        store.dispatch(2);
        assert_eq!(runs.get(), 1);
        assert_eq!(host.updates.get(), 0);
    }

    #[test]
    fn props_mode_provides_own_context() {
        let ambient_store = TestStore::new(1);
        let own_store = TestStore::new(100);
        let provider = Provider::new(handle(&ambient_store));
        let (connector, _runs) = identity_connector(ConnectOptions::default());
        let host = Rc::new(RecordingHost::default());
        let context = provider.context();
        let connect = connector
            .instantiate(
                InstanceProps::new(Rc::new(())).with_store(handle(&own_store)),
                Some(&context),
                host,
            )
            .unwrap();
        assert!(connect.is_props_mode());

        let rendered = connect.render(Some(&context)).unwrap();
        assert_eq!(*rendered.props, 100);
        let provided = rendered.context.unwrap();
        assert!(Rc::ptr_eq(provided.store(), &handle(&own_store)));
        assert!(provided.subscription().unwrap().ptr_eq(&connect.subscription().unwrap()));

        connect.did_mount().unwrap();
        assert_eq!(own_store.listener_count(), 1);
        assert_eq!(ambient_store.listener_count(), 0);
    }

    #[test]
    fn context_mode_provides_own_node() {
        let store = TestStore::new(1);
        let provider = Provider::new(handle(&store));
        let (connector, _runs) = identity_connector(ConnectOptions::default());
        let host = Rc::new(RecordingHost::default());
        let context = provider.context();
        let connect = connector
            .instantiate(InstanceProps::new(Rc::new(())), Some(&context), host)
            .unwrap();
        let rendered = connect.render(Some(&context)).unwrap();
        let provided = rendered.context.unwrap();
        assert!(!provided.same_as(&context));
        assert!(Rc::ptr_eq(provided.store(), context.store()));
        assert!(provided.subscription().unwrap().ptr_eq(&connect.subscription().unwrap()));

        // The provided context is stable across renders.
        let again = connect.render(Some(&context)).unwrap().context.unwrap();
        assert!(again.same_as(&provided));
    }

    #[test]
    fn nested_context_mode_child_registers_under_parent() {
        let store = TestStore::new(1);
        let provider = Provider::new(handle(&store));
        let (connector, _runs) = identity_connector(ConnectOptions::default());
        let context = provider.context();
        let parent_host = Rc::new(RecordingHost::default());
        let child_host = Rc::new(RecordingHost::default());

        // Framework order: parent renders, child mounts, then the parent mounts.
        let parent = connector
            .instantiate(InstanceProps::new(Rc::new(())), Some(&context), parent_host.clone())
            .unwrap();
        let parent_context = parent.render(Some(&context)).unwrap().context.unwrap();
        let child = connector
            .instantiate(InstanceProps::new(Rc::new(())), Some(&parent_context), child_host.clone())
            .unwrap();
        child.render(Some(&parent_context)).unwrap();
        child.did_mount().unwrap();
        parent.did_mount().unwrap();
        provider.did_mount();

        let parent_node = parent.subscription().unwrap();
        assert_eq!(parent_node.listener_count(), 1);
        assert_eq!(provider.context().subscription().unwrap().listener_count(), 1);
        assert_eq!(store.listener_count(), 1);

        // A dirty parent holds its child back until its own update finishes.
        store.dispatch(2);
        assert_eq!(parent_host.updates.get(), 1);
        assert_eq!(child_host.updates.get(), 0);
        parent.render(Some(&context)).unwrap();
        parent.did_update().unwrap();
        assert_eq!(child_host.updates.get(), 1);
    }

    #[test]
    fn static_mapper_passes_ambient_context_through() {
        let ambient_store = TestStore::new(1);
        let own_store = TestStore::new(100);
        let provider = Provider::new(handle(&ambient_store));
        let (connector, _runs) =
            identity_connector(ConnectOptions::new().should_handle_state_changes(false));
        let context = provider.context();

        for explicit in [false, true] {
            let mut props = InstanceProps::new(Rc::new(()));
            if explicit {
                props = props.with_store(handle(&own_store));
            }
            let connect = connector
                .instantiate(props, Some(&context), Rc::new(RecordingHost::default()))
                .unwrap();
            assert_eq!(connect.is_props_mode(), explicit);
            let rendered = connect.render(Some(&context)).unwrap();
            assert!(rendered.context.unwrap().same_as(&context));
        }
    }

    #[test]
    fn ambient_change_refreshes_against_new_store() {
        let first = TestStore::new(1);
        let second = TestStore::new(2);
        let provider = Provider::new(handle(&first));
        let (connector, _runs) = identity_connector(ConnectOptions::default());
        let host = Rc::new(RecordingHost::default());
        let connect = mount(&connector, &provider, &host);
        assert_eq!(first.listener_count(), 1);

        provider.set_store(handle(&second));
        let context = provider.context();
        connect.render(Some(&context)).unwrap();
        assert!(connect.is_refresh_pending());
        connect.did_update().unwrap();

        assert!(!connect.is_refresh_pending());
        assert_eq!(connect.lifecycle(), Lifecycle::Mounted);
        assert_eq!(first.listener_count(), 0);
        assert!(connect.subscription().unwrap().is_subscribed());
        // New store's state differs, so the refresh requested a render.
        assert_eq!(host.updates.get(), 1);
        assert_eq!(*connect.render(Some(&context)).unwrap().props, 2);
    }

    #[test]
    fn forwarded_ref_only_with_option() {
        let store = TestStore::new(1);
        let provider = Provider::new(handle(&store));
        let context = provider.context();
        let handle_ref: ForwardedRef = Rc::new("wrapped-instance");

        for (forward, expect) in [(true, true), (false, false)] {
            let (connector, _runs) = identity_connector(ConnectOptions::new().forward_ref(forward));
            let connect = connector
                .instantiate(
                    InstanceProps::new(Rc::new(())).with_forwarded_ref(Rc::clone(&handle_ref)),
                    Some(&context),
                    Rc::new(RecordingHost::default()),
                )
                .unwrap();
            let rendered = connect.render(Some(&context)).unwrap();
            assert_eq!(rendered.forwarded_ref.is_some(), expect);
        }
    }

    #[test]
    fn factory_receives_names_and_flags() {
        let seen: Rc<RefCell<Option<(String, String, bool)>>> = Rc::new(RefCell::new(None));
        let seen_clone = Rc::clone(&seen);
        let connector = connect_advanced(
            move |init: &SelectorInit<u32>| {
                *seen_clone.borrow_mut() = Some((
                    init.display_name.to_string(),
                    init.wrapped_component_name.to_string(),
                    init.pure,
                ));
                Rc::new(|s: &Rc<u32>, _: &Rc<()>| Ok(Rc::clone(s))) as SourceSelector<u32, (), u32>
            },
            ConnectOptions::new().pure(false),
        )
        .unwrap()
        .wrap("Todo")
        .unwrap();
        let store = TestStore::new(0);
        let _connect = connector
            .instantiate(
                InstanceProps::new(Rc::new(())).with_store(handle(&store)),
                None,
                Rc::new(RecordingHost::default()),
            )
            .unwrap();
        assert_eq!(
            seen.borrow().clone(),
            Some(("ConnectAdvanced(Todo)".to_string(), "Todo".to_string(), false))
        );
    }

    #[test]
    fn reinitialize_keeps_child_listeners() {
        let store = TestStore::new(1);
        let provider = Provider::new(handle(&store));
        let (connector, _runs) = identity_connector(ConnectOptions::default());
        let host = Rc::new(RecordingHost::default());
        let connect = mount(&connector, &provider, &host);

        let child_calls: Counter = Rc::new(Cell::new(0));
        let child_clone = Rc::clone(&child_calls);
        let child = connect
            .subscription()
            .unwrap()
            .add_nested_sub(Rc::new(move || child_clone.set(child_clone.get() + 1)));
        let old = connect.subscription().unwrap();

        connect.reinitialize();
        let new = connect.subscription().unwrap();
        assert!(!old.ptr_eq(&new));
        assert!(!old.is_subscribed());
        assert!(new.is_subscribed());
        assert_eq!(new.listener_count(), 1);

        // The rebuilt selector's first result asks for a render.
        assert_eq!(host.updates.get(), 1);
        connect.render(Some(&provider.context())).unwrap();
        connect.did_update().unwrap();
        assert_eq!(child_calls.get(), 0);

        store.touch();
        assert_eq!(child_calls.get(), 1);

        // The handle from before the rebuild removes the carried listener.
        child.unsubscribe();
        assert_eq!(new.listener_count(), 0);
        store.touch();
        assert_eq!(child_calls.get(), 1);
    }
}
