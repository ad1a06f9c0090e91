#![forbid(unsafe_code)]

//! Memoized mapping from store state and own props to derived props.
//!
//! # Design
//!
//! [`StatefulSelector`] wraps a caller-supplied [`SourceSelector`] and keeps
//! the last derived props, the last error, and a dirty flag
//! (`should_component_update`). Change detection is `Rc` pointer identity:
//! the source selector is responsible for returning the previous `Rc` when
//! nothing relevant changed. [`memoize_by_identity`] and [`memoize_by_value`]
//! package the two common ways of doing that.
//!
//! # Invariants
//!
//! 1. After a successful run, the dirty flag is set iff the derived `Rc`
//!    differs from the stored one or the previous run failed.
//! 2. After a failed run, the dirty flag is set and the error is stored; the
//!    stored props are left untouched.
//! 3. The flag is never cleared by `run`; consumers call
//!    [`reset_should_component_update`](StatefulSelector::reset_should_component_update)
//!    after acting on it.
//! 4. The source selector runs with no internal borrow held, so it may
//!    dispatch to the store.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::SelectorError;
use crate::store::StoreHandle;

/// The resolved mapping function of one component instance.
pub type SourceSelector<S, OP, P> = Rc<dyn Fn(&Rc<S>, &Rc<OP>) -> Result<Rc<P>, SelectorError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Live,
    /// Torn down: `run` does nothing.
    Inert,
}

struct SelectorInner<S, A, OP, P> {
    source: SourceSelector<S, OP, P>,
    store: StoreHandle<S, A>,
    mode: Cell<RunMode>,
    props: RefCell<Option<Rc<P>>>,
    error: RefCell<Option<SelectorError>>,
    should_component_update: Cell<bool>,
    last_processed_props: RefCell<Option<Rc<OP>>>,
}

/// A source selector bound to a store, remembering its last result.
///
/// Cloning a `StatefulSelector` creates a new handle to the **same** state.
pub struct StatefulSelector<S, A, OP, P> {
    inner: Rc<SelectorInner<S, A, OP, P>>,
}

impl<S, A, OP, P> Clone for StatefulSelector<S, A, OP, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S, A, OP, P: fmt::Debug> fmt::Debug for StatefulSelector<S, A, OP, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatefulSelector")
            .field("props", &self.inner.props.borrow())
            .field("error", &self.inner.error.borrow())
            .field(
                "should_component_update",
                &self.inner.should_component_update.get(),
            )
            .field("inert", &(self.inner.mode.get() == RunMode::Inert))
            .finish()
    }
}

impl<S: 'static, A: 'static, OP, P> StatefulSelector<S, A, OP, P> {
    pub fn new(source: SourceSelector<S, OP, P>, store: StoreHandle<S, A>) -> Self {
        Self {
            inner: Rc::new(SelectorInner {
                source,
                store,
                mode: Cell::new(RunMode::Live),
                props: RefCell::new(None),
                error: RefCell::new(None),
                should_component_update: Cell::new(false),
                last_processed_props: RefCell::new(None),
            }),
        }
    }

    /// Recompute derived props from the current store state and `own_props`.
    pub fn run(&self, own_props: &Rc<OP>) {
        let inner = &self.inner;
        if inner.mode.get() == RunMode::Inert {
            return;
        }
        *inner.last_processed_props.borrow_mut() = Some(Rc::clone(own_props));

        let state = inner.store.get_state();
        match (inner.source)(&state, own_props) {
            Ok(next) => {
                let changed = inner
                    .props
                    .borrow()
                    .as_ref()
                    .is_none_or(|prev| !Rc::ptr_eq(prev, &next));
                let recovering = inner.error.borrow().is_some();
                if changed || recovering {
                    inner.should_component_update.set(true);
                    let previous = inner.props.replace(Some(next));
                    let cleared = inner.error.replace(None);
                    drop((previous, cleared));
                }
            }
            Err(error) => {
                inner.should_component_update.set(true);
                let previous = inner.error.replace(Some(error));
                drop(previous);
            }
        }
    }

    /// Whether the last runs produced something the component must render.
    #[must_use]
    pub fn should_component_update(&self) -> bool {
        self.inner.should_component_update.get()
    }

    /// Acknowledge the dirty flag.
    pub fn reset_should_component_update(&self) {
        self.inner.should_component_update.set(false);
    }

    /// Last successfully derived props.
    #[must_use]
    pub fn props(&self) -> Option<Rc<P>> {
        self.inner.props.borrow().clone()
    }

    /// Error from the last run, if it failed and has not been superseded.
    #[must_use]
    pub fn error(&self) -> Option<SelectorError> {
        self.inner.error.borrow().clone()
    }

    /// Own props passed to the last run.
    #[must_use]
    pub fn last_processed_props(&self) -> Option<Rc<OP>> {
        self.inner.last_processed_props.borrow().clone()
    }

    /// Make every later [`run`](Self::run) a no-op.
    pub fn disable(&self) {
        self.inner.mode.set(RunMode::Inert);
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.inner.mode.get() == RunMode::Inert
    }
}

/// Memoize `map` on the identity of its inputs: when both the state and the
/// own-props `Rc`s are the ones seen last time, the previous output `Rc` is
/// returned without calling `map`.
pub fn memoize_by_identity<S, OP, P>(
    map: impl Fn(&S, &OP) -> Result<P, SelectorError> + 'static,
) -> SourceSelector<S, OP, P>
where
    S: 'static,
    OP: 'static,
    P: 'static,
{
    type Cache<S, OP, P> = Option<(Rc<S>, Rc<OP>, Rc<P>)>;
    let cache: RefCell<Cache<S, OP, P>> = RefCell::new(None);
    Rc::new(move |state: &Rc<S>, props: &Rc<OP>| {
        let hit = cache
            .borrow()
            .as_ref()
            .filter(|(s, p, _)| Rc::ptr_eq(s, state) && Rc::ptr_eq(p, props))
            .map(|(_, _, out)| Rc::clone(out));
        if let Some(out) = hit {
            return Ok(out);
        }
        let out = Rc::new(map(state, props)?);
        *cache.borrow_mut() = Some((Rc::clone(state), Rc::clone(props), Rc::clone(&out)));
        Ok(out)
    })
}

/// Memoize `map` on the value of its output: `map` runs on every call, but
/// when the result equals the previous one, the previous `Rc` is returned.
pub fn memoize_by_value<S, OP, P>(
    map: impl Fn(&S, &OP) -> Result<P, SelectorError> + 'static,
) -> SourceSelector<S, OP, P>
where
    S: 'static,
    OP: 'static,
    P: PartialEq + 'static,
{
    let last: RefCell<Option<Rc<P>>> = RefCell::new(None);
    Rc::new(move |state: &Rc<S>, props: &Rc<OP>| {
        let next = map(state, props)?;
        let same = last.borrow().as_ref().filter(|prev| ***prev == next).cloned();
        if let Some(prev) = same {
            return Ok(prev);
        }
        let next = Rc::new(next);
        *last.borrow_mut() = Some(Rc::clone(&next));
        Ok(next)
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
