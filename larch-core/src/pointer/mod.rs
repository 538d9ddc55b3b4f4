//! Pointers and Proxy Expressions
//!
//! A [`Pointer`] is a lazy reference to a cell reached through an attribute
//! path, e.g. `Pointer::to(&scheduler).attr("task").attr("start")`.
//! Nothing is resolved when the pointer is built. Every [`Pointer::get`]
//! or [`Pointer::set`] follows the path again from the root, so when an
//! intermediate reference changes the pointer follows the new target.
//!
//! Reading through a pointer inside a rule reads every hop of the path, so
//! the rule depends on the path as well as on the final cell.
//!
//! Arithmetic on pointers builds a [`PointerExpression`] tree; see
//! [`expression`].

pub mod expression;

pub use expression::{ExprFn, PointerExpression};

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::{ReactiveError, Result};
use crate::reactive::{CellRef, Object, WeakObject};
use crate::value::Value;

#[derive(Debug)]
enum Root {
    /// A value held by the pointer; objects are kept alive.
    Value(Value),
    /// An object that may be released while the pointer lives.
    Weak(WeakObject),
}

/// Lazily resolved reference to a cell.
#[derive(Clone)]
pub struct Pointer {
    root: Rc<Root>,
    path: SmallVec<[Rc<str>; 4]>,
}

impl Pointer {
    fn with_root(root: Root) -> Self {
        Self {
            root: Rc::new(root),
            path: SmallVec::new(),
        }
    }

    /// Pointer rooted at `object`.
    pub fn to(object: &Object) -> Self {
        Self::with_root(Root::Value(Value::Object(object.clone())))
    }

    /// Pointer rooted at any value. A pointer is returned unchanged.
    pub fn new(target: impl Into<Value>) -> Self {
        match target.into() {
            Value::Pointer(pointer) => pointer,
            other => Self::with_root(Root::Value(other)),
        }
    }

    /// Read-only pointer yielding `value`.
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::with_root(Root::Value(value.into()))
    }

    /// Pointer that does not keep `object` alive. Once the object is
    /// released, resolving fails with [`ReactiveError::UnresolvedPointer`].
    pub fn weak(object: &Object) -> Self {
        Self::with_root(Root::Weak(object.downgrade()))
    }

    /// Extend the path by one attribute.
    pub fn attr(&self, name: &str) -> Self {
        let mut path = self.path.clone();
        path.push(name.into());
        Self {
            root: self.root.clone(),
            path,
        }
    }

    pub fn path(&self) -> impl Iterator<Item = &str> {
        self.path.iter().map(|hop| &**hop)
    }

    /// Whether the pointer has no attribute path and therefore no cell.
    pub fn is_constant(&self) -> bool {
        self.path.is_empty()
    }

    fn unresolved(&self, reason: impl fmt::Display) -> ReactiveError {
        ReactiveError::UnresolvedPointer {
            pointer: self.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Lookup failures become pointer errors; anything else propagates.
    fn lookup_error(&self, err: ReactiveError) -> ReactiveError {
        match err {
            ReactiveError::UnknownField { .. }
            | ReactiveError::Released(_)
            | ReactiveError::UnresolvedPointer { .. } => self.unresolved(err),
            other => other,
        }
    }

    fn root_value(&self) -> Result<Value> {
        match &*self.root {
            Root::Value(value) => value.resolve(),
            Root::Weak(weak) => weak
                .upgrade()
                .map(Value::Object)
                .ok_or_else(|| self.unresolved("root object has been released")),
        }
    }

    fn as_object(&self, value: &Value, hop: &str) -> Result<Object> {
        value.as_reactive().cloned().ok_or_else(|| {
            self.unresolved(format!("`{hop}` is a {}, not an object", value.kind_name()))
        })
    }

    /// Follow the path to its final cell.
    pub fn resolve_cell(&self) -> Result<CellRef> {
        let Some((last, hops)) = self.path.split_last() else {
            return Err(self.unresolved("pointer has no attribute path"));
        };
        let mut target = self.as_object(&self.root_value()?, "root")?;
        for hop in hops {
            let value = target
                .get(hop)
                .and_then(|value| value.resolve())
                .map_err(|err| self.lookup_error(err))?;
            target = self.as_object(&value, hop)?;
        }
        target.cell(last).map_err(|err| self.lookup_error(err))
    }

    /// Read through the pointer. A pointer without a path yields its root.
    pub fn get(&self) -> Result<Value> {
        if self.path.is_empty() {
            return self.root_value();
        }
        self.resolve_cell()?.get()
    }

    /// Write through the pointer to the resolved cell.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        if self.path.is_empty() {
            return Err(ReactiveError::InvalidOperation(format!(
                "cannot write through constant {self}"
            )));
        }
        self.resolve_cell()?.set(value)
    }
}

impl PartialEq for Pointer {
    fn eq(&self, other: &Self) -> bool {
        let same_root = Rc::ptr_eq(&self.root, &other.root)
            || match (&*self.root, &*other.root) {
                (Root::Value(a), Root::Value(b)) => a == b,
                (Root::Weak(a), Root::Weak(b)) => a.ptr_eq(b),
                _ => false,
            };
        same_root && self.path == other.path
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.root {
            Root::Value(value) => write!(f, "Pointer({value})")?,
            Root::Weak(weak) => match weak.upgrade() {
                Some(object) => write!(f, "Pointer(weak {object})")?,
                None => f.write_str("Pointer(<released>)")?,
            },
        }
        for hop in &self.path {
            write!(f, ".{hop}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
