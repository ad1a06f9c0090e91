#![forbid(unsafe_code)]

//! A miniature component tree that drives [`Connect`] controllers the way a
//! rendering framework would.
//!
//! # Lifecycle order
//!
//! The tree reproduces the ordering a class-component framework guarantees:
//!
//! - **Mount**: a node constructs and renders, mounts its children, then
//!   calls `did_mount` (children finish mounting before their parent).
//! - **Update**: a node renders, updates or mounts or unmounts its children,
//!   then calls `did_update`.
//! - **Unmount**: a node calls `will_unmount` before its children do.
//!
//! Each node owns a [`SyncHost`]; a re-render requested by the controller
//! re-renders that node and its subtree.
//!
//! # Static rendering
//!
//! [`Child::render_static`] constructs and renders without ever mounting,
//! like server-side rendering: no subscription is ever made.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ftui_connect::{
    Connect, ConnectError, Connector, ForwardedRef, InstanceProps, Provider, Result, StoreContext,
    StoreHandle, UpdateHost, same_context,
};

use crate::host::{HostMode, Rerender, SyncHost};
use crate::journal::Journal;

/// A child slot, as seen by its parent. `PP` is the parent's rendered props.
pub trait Child<S, A, PP> {
    fn name(&self) -> &str;
    fn is_mounted(&self) -> bool;
    fn mount(&self, parent_props: &Rc<PP>, ambient: Option<&StoreContext<S, A>>) -> Result<()>;
    fn update_from_parent(
        &self,
        parent_props: &Rc<PP>,
        ambient: Option<&StoreContext<S, A>>,
    ) -> Result<()>;
    fn unmount(&self);
    fn render_static(
        &self,
        parent_props: &Rc<PP>,
        ambient: Option<&StoreContext<S, A>>,
    ) -> Result<String>;
    /// Markup of the mounted subtree; empty when not mounted.
    fn markup(&self) -> String;
}

pub type ChildHandle<S, A, PP> = Rc<dyn Child<S, A, PP>>;

type OwnPropsFn<PP, OP> = Box<dyn Fn(&Rc<PP>) -> Rc<OP>>;
type ViewFn<P> = Box<dyn Fn(&P) -> String>;
type ShowFn<P> = Box<dyn Fn(&P) -> bool>;
type RenderHook<P> = Box<dyn Fn(&Rc<P>)>;

/// Builder for [`ConnectedNode`].
pub struct NodeBuilder<S, A, PP, OP, P> {
    name: String,
    connector: Connector<S, A, OP, P>,
    own_props: OwnPropsFn<PP, OP>,
    store: Option<StoreHandle<S, A>>,
    forwarded_ref: Option<ForwardedRef>,
    view: ViewFn<P>,
    show_children: ShowFn<P>,
    on_render: Vec<RenderHook<P>>,
    children: Vec<ChildHandle<S, A, P>>,
    journal: Journal,
    host_mode: HostMode,
}

impl<S: 'static, A: 'static, PP: 'static, OP: 'static, P: 'static> NodeBuilder<S, A, PP, OP, P> {
    /// Give the instance an explicit store (props-mode).
    #[must_use]
    pub fn store(mut self, store: StoreHandle<S, A>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn forwarded_ref(mut self, forwarded_ref: ForwardedRef) -> Self {
        self.forwarded_ref = Some(forwarded_ref);
        self
    }

    /// Text rendered inside the node's tag.
    #[must_use]
    pub fn view(mut self, view: impl Fn(&P) -> String + 'static) -> Self {
        self.view = Box::new(view);
        self
    }

    /// Render children only while `show` holds for the node's props.
    #[must_use]
    pub fn show_children_when(mut self, show: impl Fn(&P) -> bool + 'static) -> Self {
        self.show_children = Box::new(show);
        self
    }

    /// Run `hook` on every render, before children are reconciled.
    #[must_use]
    pub fn on_render(mut self, hook: impl Fn(&Rc<P>) + 'static) -> Self {
        self.on_render.push(Box::new(hook));
        self
    }

    #[must_use]
    pub fn child(mut self, child: ChildHandle<S, A, P>) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn journal(mut self, journal: &Journal) -> Self {
        self.journal = journal.clone();
        self
    }

    #[must_use]
    pub fn host_mode(mut self, mode: HostMode) -> Self {
        self.host_mode = mode;
        self
    }

    #[must_use]
    pub fn build(self) -> Rc<ConnectedNode<S, A, PP, OP, P>> {
        let host = Rc::new(SyncHost::new(self.host_mode));
        let node = Rc::new(ConnectedNode {
            name: self.name,
            connector: self.connector,
            own_props: self.own_props,
            store: self.store,
            forwarded_ref: self.forwarded_ref,
            view: self.view,
            show_children: self.show_children,
            on_render: self.on_render,
            children: self.children,
            journal: self.journal,
            host: Rc::clone(&host),
            connect: RefCell::new(None),
            ambient: RefCell::new(None),
            rendered: RefCell::new(None),
            child_context: RefCell::new(None),
            received_ref: RefCell::new(None),
            renders: Cell::new(0),
            mounted: Cell::new(false),
            last_error: RefCell::new(None),
        });
        let target: Weak<ConnectedNode<S, A, PP, OP, P>> = Rc::downgrade(&node);
        host.bind(target);
        node
    }
}

/// A connected component instance in the harness tree.
pub struct ConnectedNode<S, A, PP, OP, P> {
    name: String,
    connector: Connector<S, A, OP, P>,
    own_props: OwnPropsFn<PP, OP>,
    store: Option<StoreHandle<S, A>>,
    forwarded_ref: Option<ForwardedRef>,
    view: ViewFn<P>,
    show_children: ShowFn<P>,
    on_render: Vec<RenderHook<P>>,
    children: Vec<ChildHandle<S, A, P>>,
    journal: Journal,
    host: Rc<SyncHost>,
    connect: RefCell<Option<Connect<S, A, OP, P>>>,
    ambient: RefCell<Option<StoreContext<S, A>>>,
    rendered: RefCell<Option<Rc<P>>>,
    child_context: RefCell<Option<StoreContext<S, A>>>,
    received_ref: RefCell<Option<ForwardedRef>>,
    renders: Cell<u32>,
    mounted: Cell<bool>,
    last_error: RefCell<Option<ConnectError>>,
}

impl<S: 'static, A: 'static, PP: 'static, OP: 'static, P: 'static> ConnectedNode<S, A, PP, OP, P> {
    pub fn builder(
        name: &str,
        connector: Connector<S, A, OP, P>,
        own_props: impl Fn(&Rc<PP>) -> Rc<OP> + 'static,
    ) -> NodeBuilder<S, A, PP, OP, P> {
        NodeBuilder {
            name: name.to_string(),
            connector,
            own_props: Box::new(own_props),
            store: None,
            forwarded_ref: None,
            view: Box::new(|_: &P| String::new()),
            show_children: Box::new(|_: &P| true),
            on_render: Vec::new(),
            children: Vec::new(),
            journal: Journal::new(),
            host_mode: HostMode::Immediate,
        }
    }

    /// Renders since the node was built, static renders included.
    #[must_use]
    pub fn render_count(&self) -> u32 {
        self.renders.get()
    }

    /// The current controller, if the node has been mounted at least once.
    #[must_use]
    pub fn connect(&self) -> Option<Connect<S, A, OP, P>> {
        self.connect.borrow().clone()
    }

    /// Props from the last render.
    #[must_use]
    pub fn props(&self) -> Option<Rc<P>> {
        self.rendered.borrow().clone()
    }

    /// Context the last render handed to children.
    #[must_use]
    pub fn child_context(&self) -> Option<StoreContext<S, A>> {
        self.child_context.borrow().clone()
    }

    #[must_use]
    pub fn received_ref(&self) -> Option<ForwardedRef> {
        self.received_ref.borrow().clone()
    }

    /// Error from the last host-requested re-render.
    #[must_use]
    pub fn last_error(&self) -> Option<ConnectError> {
        self.last_error.borrow().clone()
    }

    #[must_use]
    pub fn host(&self) -> &SyncHost {
        &self.host
    }

    fn instance_props(&self, parent_props: &Rc<PP>) -> InstanceProps<OP, S, A> {
        let mut props = InstanceProps::new((self.own_props)(parent_props));
        if let Some(store) = &self.store {
            props = props.with_store(Rc::clone(store));
        }
        if let Some(forwarded_ref) = &self.forwarded_ref {
            props = props.with_forwarded_ref(Rc::clone(forwarded_ref));
        }
        props
    }

    fn instantiate(
        &self,
        parent_props: &Rc<PP>,
        ambient: Option<&StoreContext<S, A>>,
    ) -> Result<Connect<S, A, OP, P>> {
        let host: Rc<dyn UpdateHost> = self.host.clone();
        self.connector
            .instantiate(self.instance_props(parent_props), ambient, host)
    }

    fn count_render(&self) {
        let renders = self.renders.get() + 1;
        self.renders.set(renders);
        self.journal.record(&self.name, "render");
        tracing::debug!(message = "harness.render", component = %self.name, renders);
    }

    fn render_pass(&self, ambient: Option<&StoreContext<S, A>>) -> Result<()> {
        let Some(connect) = self.connect() else {
            return Ok(());
        };
        let rendered = connect.render(ambient)?;
        self.count_render();
        let props = rendered.props;
        *self.rendered.borrow_mut() = Some(Rc::clone(&props));
        *self.child_context.borrow_mut() = rendered.context.clone();
        *self.received_ref.borrow_mut() = rendered.forwarded_ref;
        for hook in &self.on_render {
            hook(&props);
        }
        self.reconcile_children(&props, rendered.context.as_ref())
    }

    fn reconcile_children(&self, props: &Rc<P>, context: Option<&StoreContext<S, A>>) -> Result<()> {
        let show = (self.show_children)(props);
        for child in &self.children {
            match (show, child.is_mounted()) {
                (true, true) => child.update_from_parent(props, context)?,
                (true, false) => child.mount(props, context)?,
                (false, true) => child.unmount(),
                (false, false) => {}
            }
        }
        Ok(())
    }

    fn finish_update(&self) -> Result<()> {
        match self.connect() {
            Some(connect) => connect.did_update(),
            None => Ok(()),
        }
    }
}

impl<S: 'static, A: 'static, PP: 'static, OP: 'static, P: 'static> Child<S, A, PP>
    for ConnectedNode<S, A, PP, OP, P>
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    fn mount(&self, parent_props: &Rc<PP>, ambient: Option<&StoreContext<S, A>>) -> Result<()> {
        let connect = self.instantiate(parent_props, ambient)?;
        *self.connect.borrow_mut() = Some(connect.clone());
        *self.ambient.borrow_mut() = ambient.cloned();
        *self.last_error.borrow_mut() = None;
        self.render_pass(ambient)?;
        self.mounted.set(true);
        connect.did_mount()?;
        self.journal.record(&self.name, "mount");
        Ok(())
    }

    fn update_from_parent(
        &self,
        parent_props: &Rc<PP>,
        ambient: Option<&StoreContext<S, A>>,
    ) -> Result<()> {
        let Some(connect) = self.connect() else {
            return Ok(());
        };
        let context_changed = !same_context(self.ambient.borrow().as_ref(), ambient);
        *self.ambient.borrow_mut() = ambient.cloned();
        let wants_update = connect.should_update((self.own_props)(parent_props));
        if !wants_update && !context_changed {
            self.journal.record(&self.name, "skip");
            return Ok(());
        }
        self.render_pass(ambient)?;
        self.finish_update()
    }

    fn unmount(&self) {
        if !self.mounted.replace(false) {
            return;
        }
        if let Some(connect) = self.connect() {
            connect.will_unmount();
        }
        self.journal.record(&self.name, "unmount");
        for child in &self.children {
            child.unmount();
        }
    }

    fn render_static(
        &self,
        parent_props: &Rc<PP>,
        ambient: Option<&StoreContext<S, A>>,
    ) -> Result<String> {
        let connect = self.instantiate(parent_props, ambient)?;
        let rendered = connect.render(ambient)?;
        self.count_render();
        for hook in &self.on_render {
            hook(&rendered.props);
        }
        let mut inner = (self.view)(&rendered.props);
        if (self.show_children)(&rendered.props) {
            for child in &self.children {
                inner.push_str(&child.render_static(&rendered.props, rendered.context.as_ref())?);
            }
        }
        Ok(format!("<{name}>{inner}</{name}>", name = self.name))
    }

    fn markup(&self) -> String {
        if !self.mounted.get() {
            return String::new();
        }
        let props = self.props();
        let mut inner = props.as_deref().map(|p| (self.view)(p)).unwrap_or_default();
        for child in &self.children {
            inner.push_str(&child.markup());
        }
        format!("<{name}>{inner}</{name}>", name = self.name)
    }
}

impl<S: 'static, A: 'static, PP: 'static, OP: 'static, P: 'static> Rerender
    for ConnectedNode<S, A, PP, OP, P>
{
    fn rerender(&self) {
        if !self.mounted.get() {
            return;
        }
        let ambient = self.ambient.borrow().clone();
        let result = self
            .render_pass(ambient.as_ref())
            .and_then(|()| self.finish_update());
        let failure = match result {
            Ok(()) => None,
            Err(err) => {
                self.journal.record(&self.name, "error");
                tracing::debug!(message = "harness.render_failed", component = %self.name, error = %err);
                Some(err)
            }
        };
        *self.last_error.borrow_mut() = failure;
    }
}

impl<S, A, PP, OP, P> fmt::Debug for ConnectedNode<S, A, PP, OP, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectedNode")
            .field("name", &self.name)
            .field("renders", &self.renders.get())
            .field("mounted", &self.mounted.get())
            .field("children", &self.children.len())
            .finish()
    }
}

/// The top of a harness tree: an optional [`Provider`] and one root child.
pub struct Tree<S, A> {
    provider: Option<Provider<S, A>>,
    root: ChildHandle<S, A, ()>,
    root_props: Rc<()>,
}

impl<S: 'static, A: 'static> Tree<S, A> {
    /// Root wrapped in a provider for `store`.
    pub fn new(store: StoreHandle<S, A>, root: ChildHandle<S, A, ()>) -> Self {
        Self {
            provider: Some(Provider::new(store)),
            root,
            root_props: Rc::new(()),
        }
    }

    /// Root without a provider; connected nodes need an explicit store.
    pub fn without_provider(root: ChildHandle<S, A, ()>) -> Self {
        Self {
            provider: None,
            root,
            root_props: Rc::new(()),
        }
    }

    #[must_use]
    pub fn provider(&self) -> Option<&Provider<S, A>> {
        self.provider.as_ref()
    }

    fn context(&self) -> Option<StoreContext<S, A>> {
        self.provider.as_ref().map(Provider::context)
    }

    pub fn mount(&self) -> Result<()> {
        let context = self.context();
        self.root.mount(&self.root_props, context.as_ref())?;
        if let Some(provider) = &self.provider {
            provider.did_mount();
        }
        Ok(())
    }

    pub fn unmount(&self) {
        if let Some(provider) = &self.provider {
            provider.will_unmount();
        }
        self.root.unmount();
    }

    /// Swap the provided store and re-render the root against it.
    pub fn set_store(&self, store: StoreHandle<S, A>) -> Result<()> {
        let Some(provider) = &self.provider else {
            return Ok(());
        };
        if !provider.set_store(store) {
            return Ok(());
        }
        let context = provider.context();
        self.root.update_from_parent(&self.root_props, Some(&context))
    }

    /// Re-render the root as if its parent had re-rendered.
    pub fn update(&self) -> Result<()> {
        let context = self.context();
        self.root.update_from_parent(&self.root_props, context.as_ref())
    }

    /// Render once without mounting.
    pub fn render_to_string(&self) -> Result<String> {
        let context = self.context();
        self.root.render_static(&self.root_props, context.as_ref())
    }

    #[must_use]
    pub fn markup(&self) -> String {
        self.root.markup()
    }
}

impl<S, A> fmt::Debug for Tree<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("provider", &self.provider)
            .field("root", &self.root.name())
            .finish()
    }
}
