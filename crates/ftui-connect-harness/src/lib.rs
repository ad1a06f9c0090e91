#![forbid(unsafe_code)]

//! Test harness and reference fixtures for `ftui-connect`.
//!
//! - [`ReducerStore`]: a reducer-driven store implementing the three-operation
//!   store contract.
//! - [`SyncHost`]: plays the rendering framework for one component.
//! - [`ConnectedNode`] and [`Tree`]: a component tree that calls the
//!   controller lifecycle in framework order.
//! - [`Journal`]: ordered event log for assertions.

pub mod host;
pub mod journal;
pub mod store;
pub mod tree;

pub use host::{HostMode, Rerender, SyncHost};
pub use journal::{Journal, JournalEntry};
pub use store::{Reducer, ReducerStore};
pub use tree::{Child, ChildHandle, ConnectedNode, NodeBuilder, Tree};

use std::rc::Rc;

use ftui_connect::{
    ConnectOptions, Connector, Result, SelectorError, SelectorInit, SourceSelector, connect_advanced,
    memoize_by_value,
};

/// Connector whose source selector records a `map` journal entry per run.
///
/// `map` is memoized by value, so a run whose result equals the previous one
/// returns the previous derived `Rc`.
pub fn journaled_connector<S, A, OP, P>(
    name: &str,
    journal: &Journal,
    options: ConnectOptions,
    map: impl Fn(&S, &OP) -> std::result::Result<P, SelectorError> + Clone + 'static,
) -> Result<Connector<S, A, OP, P>>
where
    S: 'static,
    A: 'static,
    OP: 'static,
    P: PartialEq + 'static,
{
    journaled_source_connector(name, journal, options, move || memoize_by_value(map.clone()))
}

/// Connector built from a raw source selector, recording a `map` journal
/// entry per run.
///
/// `source` is called once per component instance and its result is used
/// unchanged, so the derived `Rc` it returns decides whether the component
/// renders.
pub fn journaled_source_connector<S, A, OP, P>(
    name: &str,
    journal: &Journal,
    options: ConnectOptions,
    source: impl Fn() -> SourceSelector<S, OP, P> + 'static,
) -> Result<Connector<S, A, OP, P>>
where
    S: 'static,
    A: 'static,
    OP: 'static,
    P: 'static,
{
    let label: Rc<str> = name.into();
    let journal = journal.clone();
    connect_advanced(
        move |_init: &SelectorInit<A>| -> SourceSelector<S, OP, P> {
            let selector = source();
            let journal = journal.clone();
            let label = Rc::clone(&label);
            Rc::new(move |state: &Rc<S>, props: &Rc<OP>| {
                journal.record(&label, "map");
                selector(state, props)
            })
        },
        options,
    )?
    .wrap(name)
}
