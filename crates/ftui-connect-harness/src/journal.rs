#![forbid(unsafe_code)]

//! Shared, ordered event log for harness components.
//!
//! Selectors, render hooks and the tree itself append `(component, event)`
//! pairs. Tests assert on the order; [`Journal::to_jsonl`] dumps the log for
//! failure reports.

use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub seq: usize,
    pub component: String,
    pub event: String,
}

/// Cloning a `Journal` creates a new handle to the **same** log.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Rc<RefCell<Vec<JournalEntry>>>,
}

impl Journal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, component: &str, event: &str) {
        let mut entries = self.entries.borrow_mut();
        let seq = entries.len();
        entries.push(JournalEntry {
            seq,
            component: component.to_string(),
            event: event.to_string(),
        });
    }

    #[must_use]
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.borrow().clone()
    }

    /// Entries as `"component:event"` strings.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .map(|e| format!("{}:{}", e.component, e.event))
            .collect()
    }

    /// Number of entries matching `component` and `event`.
    #[must_use]
    pub fn count(&self, component: &str, event: &str) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.component == component && e.event == event)
            .count()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// One JSON object per line.
    #[must_use]
    pub fn to_jsonl(&self) -> String {
        self.entries
            .borrow()
            .iter()
            .map(|e| {
                serde_json::json!({
                    "seq": e.seq,
                    "component": e.component,
                    "event": e.event,
                })
                .to_string()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
