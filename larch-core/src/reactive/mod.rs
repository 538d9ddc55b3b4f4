//! Reactive Core
//!
//! This module implements the reactive object model: cells, rules, objects
//! and the transactions that propagate changes between them.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A cell is the storage unit of an object's field. Reading a cell while a
//! rule runs makes the rule depend on it. Writing a cell with a new value
//! marks its dependents dirty.
//!
//! ## Rules
//!
//! A rule is a closure over its object. It runs once when the object is
//! created and again whenever a cell it read during its last run changes.
//! Its dependencies are exactly the cells it read during that last run.
//!
//! ## Transactions
//!
//! Writes are batched. Dirty rules run only when the outermost `atomic`
//! scope exits (or right away for a bare write), in priority order, wave
//! after wave until nothing is dirty.
//!
//! # Implementation Notes
//!
//! Each [`Runtime`] keeps its own context stack, so reads are attributed to
//! the running rule without global state. Tracking can be suspended with
//! `untouched` scopes or for the rest of a rule with `stop_tracking`.

mod cell;
mod context;
pub(crate) mod object;
pub(crate) mod rule;
mod runtime;
pub(crate) mod schema;
mod transaction;

pub use cell::CellRef;
pub use object::{Object, OldView, WeakObject};
pub use rule::{RuleFn, RuleInfo};
pub use runtime::{GraphStats, Runtime};
pub use schema::{Factory, FieldDef, FieldKind, RuleDef, Schema, SchemaBuilder};

pub(crate) use runtime::Builtins;
