//! Reactive Objects
//!
//! An object is an instance of a [`Schema`]: one cell per stored field and
//! one registered rule per declared rule. Handles are reference counted.
//!
//! # Lifecycle
//!
//! An object observes other cells as soon as one of its rules reads them,
//! and keeps observing exactly as long as a handle to it is alive. Dropping
//! the last handle removes the object's cells, rules and every dependency
//! edge they take part in, so no rule of a dead object ever runs again.
//!
//! Objects that reference each other through strong handles keep each other
//! alive. Use [`WeakObject`] or [`Pointer::weak`] for back-references.

use std::fmt;
use std::rc::{Rc, Weak};

use super::cell::CellRef;
use super::rule::RuleInfo;
use super::runtime::Runtime;
use super::schema::{FieldKind, Schema};
use crate::error::{ReactiveError, Result};
use crate::graph::{CellId, FieldSlot, ObjectId, RuleId};
use crate::pointer::Pointer;
use crate::value::Value;

pub struct ObjectInner {
    id: ObjectId,
    runtime: Runtime,
    schema: Rc<Schema>,
}

impl ObjectInner {
    pub(crate) fn new(id: ObjectId, runtime: Runtime, schema: Rc<Schema>) -> Self {
        Self {
            id,
            runtime,
            schema,
        }
    }
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        self.runtime.release(self.id);
    }
}

/// Shared handle to a reactive object.
#[derive(Clone)]
pub struct Object(Rc<ObjectInner>);

/// Non-owning handle to a reactive object.
#[derive(Clone)]
pub struct WeakObject(Weak<ObjectInner>);

impl Object {
    pub(crate) fn from_inner(inner: Rc<ObjectInner>) -> Self {
        Self(inner)
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.0.schema
    }

    pub fn runtime(&self) -> &Runtime {
        &self.0.runtime
    }

    fn unknown_field(&self, name: &str) -> ReactiveError {
        ReactiveError::UnknownField {
            object: self.schema().name().to_owned(),
            field: name.to_owned(),
        }
    }

    /// Cell behind a stored field.
    fn own_cell(&self, name: &str) -> Result<Option<CellId>> {
        let (slot, _) = self
            .schema()
            .field(name)
            .ok_or_else(|| self.unknown_field(name))?;
        let graph = self.runtime().inner.graph.borrow();
        let node = graph.object(self.id())?;
        match node.fields.get(slot) {
            Some(FieldSlot::Cell(cell)) => Ok(Some(*cell)),
            Some(FieldSlot::Delegate) => Ok(None),
            None => Err(self.unknown_field(name)),
        }
    }

    /// The cell behind `name`, following delegates.
    ///
    /// Resolving a delegate reads every hop of its path, so inside a rule the
    /// path itself becomes a dependency.
    pub fn cell(&self, name: &str) -> Result<CellRef> {
        if let Some(cell) = self.own_cell(name)? {
            return Ok(CellRef::new(self.runtime().clone(), cell));
        }
        let path = match self.schema().field(name) {
            Some((_, field)) => match &field.kind {
                FieldKind::Delegate { path } => path.clone(),
                _ => return Err(self.unknown_field(name)),
            },
            None => return Err(self.unknown_field(name)),
        };
        path.iter()
            .fold(Pointer::to(self), |pointer, hop| pointer.attr(hop))
            .resolve_cell()
    }

    /// Read a field. Inside a rule the read becomes a dependency.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.cell(name)?.get()
    }

    /// Read a field and convert it.
    pub fn get_as<T>(&self, name: &str) -> Result<T>
    where
        T: TryFrom<Value, Error = ReactiveError>,
    {
        T::try_from(self.get(name)?)
    }

    /// Read a field and dereference a stored pointer or expression.
    pub fn resolve(&self, name: &str) -> Result<Value> {
        self.get(name)?.resolve()
    }

    /// Write a field. Outside a transaction, the write commits immediately
    /// and returns the first failure of the rules it triggered.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.cell(name)?.set(value)
    }

    /// View of the values fields held before the change being committed.
    pub fn old(&self) -> OldView<'_> {
        OldView(self)
    }

    fn rule_id(&self, name: &str) -> Result<RuleId> {
        let (slot, _) = self
            .schema()
            .rule(name)
            .ok_or_else(|| self.unknown_field(name))?;
        let graph = self.runtime().inner.graph.borrow();
        graph
            .object(self.id())?
            .rules
            .get(slot)
            .copied()
            .ok_or_else(|| self.unknown_field(name))
    }

    /// Run one rule now, e.g. to pick up changes made under `silent`.
    pub fn run_rule(&self, name: &str) -> Result<()> {
        let rule = self.rule_id(name)?;
        let runtime = self.runtime();
        runtime.atomic(|| runtime.run_rule(rule))
    }

    /// How many times a rule has completed.
    pub fn rule_runs(&self, name: &str) -> Result<u64> {
        let rule = self.rule_id(name)?;
        Ok(self.runtime().inner.graph.borrow().rule(rule)?.runs)
    }

    /// Snapshot of the object's rules.
    pub fn rules(&self) -> Vec<RuleInfo> {
        let graph = self.runtime().inner.graph.borrow();
        let Ok(node) = graph.object(self.id()) else {
            return Vec::new();
        };
        node.rules
            .iter()
            .filter_map(|id| {
                graph.rule(*id).ok().map(|rule| RuleInfo {
                    id: *id,
                    name: rule.label.to_string(),
                    priority: rule.priority,
                    runs: rule.runs,
                })
            })
            .collect()
    }

    /// Whether any rule of this object currently depends on a cell.
    pub fn is_observing(&self) -> bool {
        self.runtime().inner.graph.borrow().is_observing(self.id())
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.schema().name(), self.id().index())
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({self})")
    }
}

impl WeakObject {
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(Object)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub fn ptr_eq(&self, other: &WeakObject) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(object) => write!(f, "WeakObject({object})"),
            None => f.write_str("WeakObject(<released>)"),
        }
    }
}

/// Previous values of an object's fields; see [`CellRef::previous`].
pub struct OldView<'a>(&'a Object);

impl OldView<'_> {
    /// The value `name` held before the change being committed.
    ///
    /// Fields not changed in this commit report their current value.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.0.cell(name)?.previous()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn point(rt: &Runtime) -> Object {
        let schema = Schema::builder("Point")
            .cell("x", 0)
            .cell("y", 0)
            .build()
            .unwrap();
        rt.create(&schema, [("x", Value::Int(3))]).unwrap()
    }

    #[test]
    fn get_and_set() {
        let rt = Runtime::new();
        let p = point(&rt);
        assert_eq!(p.get("x").unwrap(), Value::Int(3));
        assert_eq!(p.get_as::<i64>("y").unwrap(), 0);

        p.set("y", 4).unwrap();
        assert_eq!(p.get("y").unwrap(), Value::Int(4));
    }

    #[test]
    fn unknown_fields_are_reported() {
        let rt = Runtime::new();
        let p = point(&rt);
        let err = p.get("z").unwrap_err();
        assert_eq!(
            err,
            ReactiveError::UnknownField {
                object: "Point".into(),
                field: "z".into()
            }
        );
        assert!(p.rule_runs("z").is_err());
    }

    #[test]
    fn display_names_schema_and_slot() {
        let rt = Runtime::new();
        let p = point(&rt);
        assert_eq!(p.to_string(), format!("Point#{}", p.id().index()));
    }

    #[test]
    fn weak_handles_do_not_keep_objects_alive() {
        let rt = Runtime::new();
        let p = point(&rt);
        let weak = p.downgrade();
        assert!(weak.upgrade().is_some_and(|o| o == p));

        drop(p);
        assert!(!weak.is_alive());
        assert_eq!(rt.stats().objects, 0);
    }

    #[test]
    fn old_view_sees_value_before_commit() {
        let rt = Runtime::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let schema = Schema::builder("Watched")
            .cell("value", 1)
            .rule("_rule_watch", move |obj| {
                let now = obj.get("value")?;
                let before = obj.old().get("value")?;
                log.borrow_mut().push((before, now));
                Ok(())
            })
            .build()
            .unwrap();
        let obj = rt.create(&schema, []).unwrap();
        obj.set("value", 2).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                (Value::Int(1), Value::Int(1)),
                (Value::Int(1), Value::Int(2))
            ]
        );
    }

    #[test]
    fn run_rule_after_silent_write() {
        let rt = Runtime::new();
        let schema = Schema::builder("Copy")
            .cell("source", 1)
            .cell("target", 0)
            .rule("_rule_copy", |obj| obj.set("target", obj.get("source")?))
            .build()
            .unwrap();
        let obj = rt.create(&schema, []).unwrap();

        rt.silent(|| obj.set("source", 5)).unwrap();
        assert_eq!(obj.get("target").unwrap(), Value::Int(1));
        assert_eq!(obj.rule_runs("_rule_copy").unwrap(), 1);

        obj.run_rule("_rule_copy").unwrap();
        assert_eq!(obj.get("target").unwrap(), Value::Int(5));
        assert_eq!(obj.rule_runs("_rule_copy").unwrap(), 2);
    }
}
