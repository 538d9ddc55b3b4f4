//! Cell handles
//!
//! A [`CellRef`] is the introspection handle for one cell of an object:
//! its current value, revision, dependent rules and, while a commit runs,
//! its previous value.

use std::fmt;

use super::object::Object;
use super::rule::RuleInfo;
use super::runtime::Runtime;
use crate::error::Result;
use crate::graph::CellId;
use crate::value::Value;

/// Handle to a single cell.
///
/// The handle does not keep the cell's object alive; once the object is
/// released every operation fails with [`ReactiveError::Released`].
///
/// [`ReactiveError::Released`]: crate::ReactiveError::Released
#[derive(Clone)]
pub struct CellRef {
    runtime: Runtime,
    id: CellId,
}

impl CellRef {
    pub(crate) fn new(runtime: Runtime, id: CellId) -> Self {
        Self { runtime, id }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    /// `Schema.field` of the cell.
    pub fn name(&self) -> Result<String> {
        Ok(self.runtime.cell_label(self.id)?.to_string())
    }

    /// Current value. Inside a rule the read becomes a dependency.
    pub fn get(&self) -> Result<Value> {
        self.runtime.read_cell(self.id)
    }

    /// Current value, never recorded as a dependency.
    pub fn peek(&self) -> Result<Value> {
        self.runtime.peek_cell(self.id)
    }

    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        self.runtime.write_cell(self.id, value.into())
    }

    /// The value held before the change being committed.
    ///
    /// Only valid while the dependents of that change are running; anywhere
    /// else this fails with [`ReactiveError::StaleHistoryAccess`]. A cell
    /// the commit did not change reports its current value.
    ///
    /// [`ReactiveError::StaleHistoryAccess`]: crate::ReactiveError::StaleHistoryAccess
    pub fn previous(&self) -> Result<Value> {
        self.runtime.previous(self.id)
    }

    /// Number of accepted writes.
    pub fn revision(&self) -> Result<u64> {
        Ok(self.runtime.inner.graph.borrow().cell(self.id)?.revision)
    }

    /// Rules that read this cell during their last run.
    pub fn dependents(&self) -> Result<Vec<RuleInfo>> {
        let graph = self.runtime.inner.graph.borrow();
        let cell = graph.cell(self.id)?;
        Ok(cell
            .dependents
            .iter()
            .filter_map(|id| {
                graph.rule(*id).ok().map(|rule| RuleInfo {
                    id: *id,
                    name: rule.label.to_string(),
                    priority: rule.priority,
                    runs: rule.runs,
                })
            })
            .collect())
    }

    /// The object owning the cell, if it is still alive.
    pub fn owner(&self) -> Option<Object> {
        let handle = {
            let graph = self.runtime.inner.graph.borrow();
            let cell = graph.cell(self.id).ok()?;
            graph.object(cell.owner).ok()?.handle.clone()
        };
        handle.upgrade().map(Object::from_inner)
    }
}

impl PartialEq for CellRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.runtime.ptr_eq(&other.runtime)
    }
}

impl fmt::Debug for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.runtime.cell_label(self.id) {
            Ok(label) => write!(f, "CellRef({label})"),
            Err(_) => write!(f, "CellRef({}, released)", self.id),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
