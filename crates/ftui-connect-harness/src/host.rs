#![forbid(unsafe_code)]

//! Host side of the update seam.
//!
//! [`SyncHost`] stands in for the rendering framework. In immediate mode it
//! re-renders its component inside [`UpdateHost::schedule_update`], which is
//! the strictest ordering a real framework can produce. In deferred mode it
//! only records the request until [`SyncHost::flush`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Weak;

use ftui_connect::UpdateHost;

/// A component the host can re-render.
pub trait Rerender {
    fn rerender(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostMode {
    Immediate,
    Deferred,
}

pub struct SyncHost {
    mode: HostMode,
    target: RefCell<Option<Weak<dyn Rerender>>>,
    requested: Cell<u32>,
    pending: Cell<bool>,
}

impl SyncHost {
    #[must_use]
    pub fn new(mode: HostMode) -> Self {
        Self {
            mode,
            target: RefCell::new(None),
            requested: Cell::new(0),
            pending: Cell::new(false),
        }
    }

    pub fn bind(&self, target: Weak<dyn Rerender>) {
        *self.target.borrow_mut() = Some(target);
    }

    #[must_use]
    pub fn mode(&self) -> HostMode {
        self.mode
    }

    /// Total `schedule_update` calls.
    #[must_use]
    pub fn requested(&self) -> u32 {
        self.requested.get()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.get()
    }

    /// Run a deferred re-render, if one was requested. Returns whether it ran.
    pub fn flush(&self) -> bool {
        if !self.pending.replace(false) {
            return false;
        }
        self.run();
        true
    }

    fn run(&self) {
        let target = self.target.borrow().as_ref().and_then(Weak::upgrade);
        if let Some(target) = target {
            target.rerender();
        }
    }
}

impl UpdateHost for SyncHost {
    fn schedule_update(&self) {
        self.requested.set(self.requested.get() + 1);
        match self.mode {
            HostMode::Immediate => self.run(),
            HostMode::Deferred => self.pending.set(true),
        }
    }
}

impl fmt::Debug for SyncHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncHost")
            .field("mode", &self.mode)
            .field("requested", &self.requested.get())
            .field("pending", &self.pending.get())
            .finish()
    }
}
