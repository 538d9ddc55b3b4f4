//! Dependency Graph
//!
//! This module implements the graph that tracks which rules read which
//! cells.
//!
//! # Overview
//!
//! - Cells are sources. Each cell records the rules that read it during
//!   their last tracked phase (its *dependents*).
//! - Rules are derivations. Each rule records the cells it read (its
//!   *dependencies*).
//!
//! Both directions are kept mutually consistent. Edges are plain handles:
//! a cell never keeps a rule alive. Owning edges run from a reactive object
//! to its cells and rules, so releasing the object removes every edge it
//! appears in.
//!
//! # Design Decisions
//!
//! 1. All nodes live in generational arenas indexed by copyable ids, so
//!    reference cycles between objects are expressible without leaks.
//!
//! 2. Edge sets are `IndexSet`s: O(1) insert and removal, deterministic
//!    iteration. Rebuilding a rule's edges costs O(old deps + new deps).

mod arena;
mod node;
mod scheduler;

pub use arena::{CellId, Key, ObjectId, RuleId};
pub(crate) use node::{CellNode, FieldSlot, ObjectNode, RuleKey, RuleNode};
pub(crate) use scheduler::{Placement, RuleScheduler};

use indexmap::IndexSet;

pub(crate) use arena::Arena;

use crate::error::{ReactiveError, Result};

/// Everything removed from the graph when an object is released.
///
/// Dropped by the caller once no graph borrow is held: cell values and
/// rule closures may own further objects.
pub(crate) type Released = (ObjectNode, Vec<CellNode>, Vec<RuleNode>);

/// Cells, rules and objects of one runtime.
#[derive(Default)]
pub(crate) struct Graph {
    cells: Arena<CellNode>,
    rules: Arena<RuleNode>,
    objects: Arena<ObjectNode>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell(&self, id: CellId) -> Result<&CellNode> {
        self.cells.get(id.0).ok_or(ReactiveError::Released("cell"))
    }

    pub fn cell_mut(&mut self, id: CellId) -> Result<&mut CellNode> {
        self.cells.get_mut(id.0).ok_or(ReactiveError::Released("cell"))
    }

    pub fn rule(&self, id: RuleId) -> Result<&RuleNode> {
        self.rules.get(id.0).ok_or(ReactiveError::Released("rule"))
    }

    pub fn rule_mut(&mut self, id: RuleId) -> Result<&mut RuleNode> {
        self.rules.get_mut(id.0).ok_or(ReactiveError::Released("rule"))
    }

    pub fn object(&self, id: ObjectId) -> Result<&ObjectNode> {
        self.objects.get(id.0).ok_or(ReactiveError::Released("object"))
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Result<&mut ObjectNode> {
        self.objects
            .get_mut(id.0)
            .ok_or(ReactiveError::Released("object"))
    }

    pub fn insert_object(&mut self, node: ObjectNode) -> ObjectId {
        ObjectId(self.objects.insert(node))
    }

    pub fn insert_cell(&mut self, node: CellNode) -> CellId {
        CellId(self.cells.insert(node))
    }

    pub fn insert_rule(&mut self, node: RuleNode) -> RuleId {
        RuleId(self.rules.insert(node))
    }

    /// Scheduling keys of the rules currently depending on `cell`.
    pub fn dependents(&self, cell: CellId) -> Result<Vec<RuleKey>> {
        let node = self.cell(cell)?;
        Ok(node
            .dependents
            .iter()
            .filter_map(|id| self.rules.get(id.0).map(|rule| rule.key(*id)))
            .collect())
    }

    /// Replace a rule's dependencies with exactly `reads`.
    ///
    /// Runs in O(old + new): only the cells that appear in either set are
    /// touched.
    pub fn set_dependencies(&mut self, rule: RuleId, reads: IndexSet<CellId>) {
        let Some(node) = self.rules.get_mut(rule.0) else {
            return;
        };
        let old = std::mem::take(&mut node.dependencies);

        for cell in old.iter().filter(|cell| !reads.contains(*cell)) {
            if let Some(cell) = self.cells.get_mut(cell.0) {
                cell.dependents.swap_remove(&rule);
            }
        }

        // Cells released while the rule ran are skipped.
        let mut live = IndexSet::with_capacity(reads.len());
        for cell in reads {
            if let Some(node) = self.cells.get_mut(cell.0) {
                node.dependents.insert(rule);
                live.insert(cell);
            }
        }

        if let Some(node) = self.rules.get_mut(rule.0) {
            node.dependencies = live;
        }
    }

    /// Remove an object together with its cells, rules and every edge they
    /// take part in.
    pub fn remove_object(&mut self, id: ObjectId) -> Option<Released> {
        let object = self.objects.remove(id.0)?;

        let mut rules = Vec::with_capacity(object.rules.len());
        for rule_id in &object.rules {
            if let Some(rule) = self.rules.remove(rule_id.0) {
                for cell in &rule.dependencies {
                    if let Some(cell) = self.cells.get_mut(cell.0) {
                        cell.dependents.swap_remove(rule_id);
                    }
                }
                rules.push(rule);
            }
        }

        let mut cells = Vec::new();
        for slot in &object.fields {
            let FieldSlot::Cell(cell_id) = slot else {
                continue;
            };
            if let Some(cell) = self.cells.remove(cell_id.0) {
                for rule in &cell.dependents {
                    if let Some(rule) = self.rules.get_mut(rule.0) {
                        rule.dependencies.swap_remove(cell_id);
                    }
                }
                cells.push(cell);
            }
        }

        Some((object, cells, rules))
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Number of rule-to-cell dependency edges.
    pub fn edge_count(&self) -> usize {
        self.rules
            .iter()
            .map(|(_, rule)| rule.dependencies.len())
            .sum()
    }

    /// Whether any rule of the object currently depends on some cell.
    pub fn is_observing(&self, id: ObjectId) -> bool {
        self.objects.get(id.0).is_some_and(|object| {
            object.rules.iter().any(|rule| {
                self.rules
                    .get(rule.0)
                    .is_some_and(|rule| !rule.dependencies.is_empty())
            })
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
