//! Larch Core
//!
//! This crate provides the runtime of the Larch reactive dataflow engine.
//! It implements:
//!
//! - Reactive objects built from schemas of cells and rules
//! - Automatic dependency tracking and wave-based rule scheduling
//! - Transactions with previous-value history
//! - Pointers and proxy expressions that follow cells across objects
//! - Reactive lists and dicts that publish structured change actions
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: runtime, schemas, objects, cells and transactions
//! - `graph`: dependency graph and rule scheduler
//! - `pointer`: pointers and pointer expressions
//! - `collections`: reactive `List` and `Dict`
//! - `value`: the dynamic value stored in cells
//! - `convert`: converters for typed cells
//!
//! # Example
//!
//! ```rust
//! use larch_core::{Pointer, Runtime, Schema, Value};
//!
//! let rt = Runtime::new();
//! let node = Schema::builder("Node")
//!     .cell("value", 1)
//!     .build()
//!     .unwrap();
//! let sum = Schema::builder("Sum")
//!     .cell("source", Value::Null)
//!     .cell("total", 0)
//!     .rule("_rule_total", |sum| {
//!         let value = sum.resolve("source")?;
//!         sum.set("total", value.try_add(&Value::Int(10))?)
//!     })
//!     .build()
//!     .unwrap();
//!
//! let a = rt.create(&node, []).unwrap();
//! let s = rt.create(&sum, [("source", Pointer::to(&a).attr("value").into())]).unwrap();
//! assert_eq!(s.get("total").unwrap(), Value::Int(11));
//!
//! // The rule depends on `a.value` through the pointer.
//! a.set("value", 5).unwrap();
//! assert_eq!(s.get("total").unwrap(), Value::Int(15));
//! ```

pub mod collections;
pub mod config;
pub mod convert;
pub mod debug;
pub mod error;
pub mod graph;
pub mod pointer;
pub mod reactive;
pub mod value;

pub use collections::{ActionKind, ActionPhase, ActionRecord, ChangeAction, Dict, List};
pub use config::RuntimeConfig;
pub use error::{ReactiveError, Result};
pub use graph::{CellId, ObjectId, RuleId};
pub use pointer::{Pointer, PointerExpression};
pub use reactive::{
    CellRef, GraphStats, Object, OldView, RuleInfo, Runtime, Schema, SchemaBuilder, WeakObject,
};
pub use value::{BinaryOp, DictKey, Value};
