//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph:
//! cells (sources), rules (derivations) and the reactive objects that own
//! both.

use std::cmp::Ordering;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::arena::{CellId, ObjectId, RuleId};
use crate::convert::Converter;
use crate::reactive::object::ObjectInner;
use crate::reactive::rule::RuleFn;
use crate::reactive::schema::Schema;
use crate::value::Value;

/// A storage cell.
pub(crate) struct CellNode {
    /// Object that owns this cell.
    pub owner: ObjectId,

    /// `Schema.field`, used in errors and logs.
    pub label: Rc<str>,

    pub value: Value,

    /// Bumped on every accepted write.
    pub revision: u64,

    /// Applied to every incoming value before storage.
    pub converter: Option<Converter>,

    /// Containers notify on every write regardless of value equality.
    pub notify_always: bool,

    /// Rules that read this cell during their last tracked phase.
    /// Non-owning: the rule's owner keeps the rule alive, not the cell.
    pub dependents: IndexSet<RuleId>,
}

impl CellNode {
    pub fn new(owner: ObjectId, label: Rc<str>, value: Value) -> Self {
        Self {
            owner,
            label,
            value,
            revision: 0,
            converter: None,
            notify_always: false,
            dependents: IndexSet::new(),
        }
    }
}

/// A derivation rule bound to an object.
pub(crate) struct RuleNode {
    pub owner: ObjectId,

    /// `Schema.rule`, used in errors and logs.
    pub label: Rc<str>,

    /// Lower values run first within a wave.
    pub priority: i32,

    /// Registration order; breaks priority ties.
    pub seq: u64,

    pub body: RuleFn,

    /// Cells read during the last tracked phase. Rebuilt on every run.
    pub dependencies: IndexSet<CellId>,

    /// Number of completed runs.
    pub runs: u64,
}

impl RuleNode {
    pub fn key(&self, id: RuleId) -> RuleKey {
        RuleKey {
            priority: self.priority,
            seq: self.seq,
            id,
        }
    }
}

/// Where a schema field's storage lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldSlot {
    /// The field owns a cell.
    Cell(CellId),

    /// The field forwards to a cell on another object.
    Delegate,
}

/// Arena entry of a reactive object.
pub(crate) struct ObjectNode {
    pub schema: Rc<Schema>,

    /// Back-reference to the public handle; never keeps it alive.
    pub handle: Weak<ObjectInner>,

    /// One slot per schema field, in declaration order.
    pub fields: SmallVec<[FieldSlot; 8]>,

    pub rules: SmallVec<[RuleId; 4]>,
}

/// Ordering key of a scheduled rule: priority, then registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RuleKey {
    pub priority: i32,
    pub seq: u64,
    pub id: RuleId,
}

impl Ord for RuleKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.seq.cmp(&other.seq))
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for RuleKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::arena::Arena;

    fn rule_ids(n: usize) -> Vec<RuleId> {
        let mut arena = Arena::new();
        (0..n).map(|_| RuleId(arena.insert(()))).collect()
    }

    #[test]
    fn lower_priority_sorts_first() {
        let ids = rule_ids(2);
        let early = RuleKey { priority: -1, seq: 9, id: ids[0] };
        let late = RuleKey { priority: 0, seq: 1, id: ids[1] };
        assert!(early < late);
    }

    #[test]
    fn registration_order_breaks_ties() {
        let ids = rule_ids(2);
        let first = RuleKey { priority: 3, seq: 1, id: ids[1] };
        let second = RuleKey { priority: 3, seq: 2, id: ids[0] };
        assert!(first < second);
    }
}
