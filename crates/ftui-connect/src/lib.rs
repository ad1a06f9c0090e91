#![forbid(unsafe_code)]

//! Store bindings for FrankenTUI component trees.
//!
//! This crate connects a single-state-container store (get / dispatch /
//! subscribe) to a component tree whose host re-renders components on demand.
//! Connected components declare a mapping from store state and their own
//! props to the props they render with; the binding layer re-renders them
//! exactly when that mapped result changes.
//!
//! # Architecture
//!
//! - [`Subscription`]: one node per connected component. Nodes form a tree that
//!   mirrors the connected part of the component tree; a node registers with
//!   its parent node (or with the store, when topmost) and forwards change
//!   notifications to its own listeners.
//! - [`StatefulSelector`]: memoizes the mapping function's output by `Rc`
//!   identity and records whether the component must update.
//! - [`Connect`]: the per-instance controller. It owns one node and one
//!   selector and drives them from the host's lifecycle calls.
//! - [`Provider`]: owns the root node and produces the ambient
//!   [`StoreContext`] that context-mode components read.
//!
//! # Invariants
//!
//! 1. If B's subscription node is registered beneath A's, A's selector
//!    re-run and update decision complete before B's re-run begins.
//! 2. If A re-renders, B is notified only after A's `did_update`.
//! 3. Listener removal during a notification pass takes effect immediately;
//!    listeners added during a pass first fire on the next pass.
//! 4. Teardown is idempotent, and notifications reaching a torn-down
//!    component are no-ops.
//!
//! Every connected component that handles state changes provides its own node
//! to its descendants, so a connected component's node is registered beneath
//! the node of its nearest connected ancestor. Invariants 1 and 2 therefore
//! order every connected parent before its connected children.
//!
//! All types are single-threaded (`Rc`-based) and never hold a `RefCell`
//! borrow across calls into mapping functions, listeners, or the host.

pub mod connect;
pub mod context;
pub mod error;
pub mod options;
pub mod selector;
pub mod store;
pub mod subscription;

#[cfg(test)]
mod fixtures;

pub use connect::{
    Connect, ConnectAdvanced, Connector, ForwardedRef, InstanceProps, Lifecycle, Rendered,
    SelectorFactory, SelectorInit, UpdateHost, connect_advanced,
};
pub use context::{Provider, StoreContext, same_context};
pub use error::{ConnectError, Result, SelectorError};
pub use options::ConnectOptions;
pub use selector::{SourceSelector, StatefulSelector, memoize_by_identity, memoize_by_value};
pub use store::{Dispatch, Listener, Store, StoreHandle, Unsubscribe, dispatcher};
pub use subscription::Subscription;
