//! Reactive Collections
//!
//! [`List`] and [`Dict`] are reactive objects with three cells:
//!
//! - `items`: the current contents, as a plain snapshot.
//! - `__action_start__` / `__action_end__`: the [`ActionRecord`]s of the
//!   most recent edit.
//!
//! All three cells notify on every write. A rule that reads the contents
//! re-runs on every edit, even one that leaves the contents equal; a rule
//! that reads an action cell learns exactly what changed. Each edit writes
//! the three cells in one transaction, so observers run once per edit.
//!
//! Reads through a collection handle are tracked like any other cell read.

mod action;
mod dict;
mod list;

pub use action::{ActionKind, ActionPhase, ActionRecord, ChangeAction};
pub use dict::Dict;
pub use list::List;

use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::error::{ReactiveError, Result};
use crate::reactive::{Builtins, Object, Runtime, Schema};
use crate::value::{DictKey, Value};

pub(crate) const ITEMS: &str = "items";
pub(crate) const ACTION_START: &str = "__action_start__";
pub(crate) const ACTION_END: &str = "__action_end__";

fn collection_schema(name: &str, empty: Value) -> Result<Rc<Schema>> {
    Schema::builder(name)
        .event_cell(ITEMS, empty)
        .event_cell(ACTION_START, Value::Null)
        .event_cell(ACTION_END, Value::Null)
        .build()
}

/// Schemas of the built-in collections of `runtime`, built on first use.
pub(crate) fn builtins(runtime: &Runtime) -> Result<&Builtins> {
    if let Some(builtins) = runtime.inner.builtins.get() {
        return Ok(builtins);
    }
    let built = Builtins {
        list: collection_schema("List", Value::from(Vec::<Value>::new()))?,
        dict: collection_schema("Dict", Value::from(IndexMap::<DictKey, Value>::new()))?,
    };
    Ok(runtime.inner.builtins.get_or_init(|| built))
}

/// Publish one edit: start record, new contents, end record.
fn publish(object: &Object, action: ChangeAction, contents: Value) -> Result<()> {
    let runtime = object.runtime();
    let seq = runtime.next_seq();
    let action = Rc::new(action);
    trace!(collection = %object, action = action.kind().as_str(), seq, "collection edited");

    runtime.atomic(|| {
        object.set(
            ACTION_START,
            ActionRecord {
                seq,
                phase: ActionPhase::Start,
                action: action.clone(),
            },
        )?;
        object.set(ITEMS, contents)?;
        object.set(
            ACTION_END,
            ActionRecord {
                seq,
                phase: ActionPhase::End,
                action,
            },
        )
    })
}

/// Read an action cell of a collection.
fn action_record(object: &Object, cell: &str) -> Result<Option<ActionRecord>> {
    match object.get(cell)? {
        Value::Action(record) => Ok(Some(record)),
        Value::Null => Ok(None),
        other => Err(ReactiveError::TypeMismatch {
            op: "action",
            lhs: other.kind_name(),
            rhs: "action",
        }),
    }
}
