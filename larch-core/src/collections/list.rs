//! Reactive list.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::rc::Rc;

use super::{action_record, builtins, publish, ActionRecord, ChangeAction};
use super::{ACTION_END, ACTION_START, ITEMS};
use crate::error::{ReactiveError, Result};
use crate::reactive::{Object, Runtime};
use crate::value::Value;

/// Ordered reactive sequence.
///
/// ```rust
/// use larch_core::{ActionKind, Runtime, Value};
///
/// let rt = Runtime::new();
/// let list = rt.list([1, 2, 3]).unwrap();
/// list.push(4).unwrap();
/// list.reverse().unwrap();
///
/// assert_eq!(list.get(0).unwrap(), Value::Int(4));
/// assert_eq!(list.action_end().unwrap().unwrap().kind(), ActionKind::Reorder);
/// ```
#[derive(Clone, PartialEq)]
pub struct List(Object);

impl Runtime {
    /// Create a reactive list holding `values`.
    pub fn list<I, V>(&self, values: I) -> Result<List>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let items: Vec<Value> = values.into_iter().map(Into::into).collect();
        let schema = builtins(self)?.list.clone();
        let object = self.create(&schema, [(ITEMS, Value::from(items))])?;
        Ok(List(object))
    }
}

fn resolve_range(range: impl RangeBounds<usize>, len: usize) -> (usize, usize) {
    let start = match range.start_bound() {
        Bound::Included(&i) => i,
        Bound::Excluded(&i) => i.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&i) => i.saturating_add(1),
        Bound::Excluded(&i) => i,
        Bound::Unbounded => len,
    };
    (start, end)
}

impl List {
    /// The object behind the list.
    pub fn as_object(&self) -> &Object {
        &self.0
    }

    /// Contents, tracked.
    fn items(&self) -> Result<Rc<Vec<Value>>> {
        match self.0.get(ITEMS)? {
            Value::Seq(items) => Ok(items),
            other => Err(ReactiveError::TypeMismatch {
                op: "items",
                lhs: other.kind_name(),
                rhs: "seq",
            }),
        }
    }

    /// Contents, untracked; edits must not make the editing rule depend on
    /// the list.
    fn snapshot(&self) -> Result<Vec<Value>> {
        match self.0.cell(ITEMS)?.peek()? {
            Value::Seq(items) => Ok(items.as_ref().clone()),
            other => Err(ReactiveError::TypeMismatch {
                op: "items",
                lhs: other.kind_name(),
                rhs: "seq",
            }),
        }
    }

    fn edit(&self, action: ChangeAction) -> Result<()> {
        let mut items = self.snapshot()?;
        action.apply_to_seq(&mut items)?;
        publish(&self.0, action, Value::from(items))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.items()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, index: usize) -> Result<Value> {
        let items = self.items()?;
        items.get(index).cloned().ok_or(ReactiveError::IndexOutOfRange {
            index,
            len: items.len(),
        })
    }

    pub fn to_vec(&self) -> Result<Vec<Value>> {
        Ok(self.items()?.as_ref().clone())
    }

    /// Start record of the latest edit.
    ///
    /// Written in the same transaction as the new contents and the end
    /// record, so an observer reading it also sees the edited contents.
    pub fn action_start(&self) -> Result<Option<ActionRecord>> {
        action_record(&self.0, ACTION_START)
    }

    /// End record of the latest edit, written alongside the start record.
    pub fn action_end(&self) -> Result<Option<ActionRecord>> {
        action_record(&self.0, ACTION_END)
    }

    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        let index = self.snapshot()?.len();
        self.insert(index, value)
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.edit(ChangeAction::Insert {
            index,
            values: vec![value.into()],
        })
    }

    pub fn extend<I, V>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let index = self.snapshot()?.len();
        self.edit(ChangeAction::Insert {
            index,
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    /// Overwrite one element.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.edit(ChangeAction::Assign {
            index,
            value: value.into(),
        })
    }

    /// Replace a range of elements; `..` replaces everything.
    pub fn replace_range<R, I, V>(&self, range: R, values: I) -> Result<()>
    where
        R: RangeBounds<usize>,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let (start, end) = resolve_range(range, self.snapshot()?.len());
        self.edit(ChangeAction::Replace {
            start,
            end,
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn reverse(&self) -> Result<()> {
        let len = self.snapshot()?.len();
        self.edit(ChangeAction::Reorder {
            permutation: (0..len).rev().collect(),
        })
    }

    /// Stable ascending sort. Fails without editing if two elements cannot
    /// be compared.
    pub fn sort(&self) -> Result<()> {
        let items = self.snapshot()?;
        let mut permutation: Vec<usize> = (0..items.len()).collect();
        let mut failure = None;
        permutation.sort_by(|&a, &b| {
            items[a].compare(&items[b]).unwrap_or_else(|err| {
                failure.get_or_insert(err);
                Ordering::Equal
            })
        });
        if let Some(err) = failure {
            return Err(err);
        }
        self.edit(ChangeAction::Reorder { permutation })
    }

    /// Repeat the contents `times` times in place.
    pub fn repeat(&self, times: usize) -> Result<()> {
        let items = self.snapshot()?;
        if times == 0 {
            return self.edit(ChangeAction::Clear);
        }
        let too_long = || {
            ReactiveError::InvalidOperation(format!(
                "cannot repeat {} elements {times} times",
                items.len()
            ))
        };
        let extra = items
            .len()
            .checked_mul(times - 1)
            .filter(|extra| extra.checked_add(items.len()).is_some())
            .ok_or_else(too_long)?;
        let mut values = Vec::new();
        values.try_reserve_exact(extra).map_err(|_| too_long())?;
        values.extend(items.iter().cloned().cycle().take(extra));
        self.edit(ChangeAction::Insert {
            index: items.len(),
            values,
        })
    }

    pub fn remove_range(&self, range: impl RangeBounds<usize>) -> Result<()> {
        let (start, end) = resolve_range(range, self.snapshot()?.len());
        self.edit(ChangeAction::Delete { start, end })
    }

    /// Remove and return one element.
    pub fn remove(&self, index: usize) -> Result<Value> {
        let items = self.snapshot()?;
        let value = items
            .get(index)
            .cloned()
            .ok_or(ReactiveError::IndexOutOfRange {
                index,
                len: items.len(),
            })?;
        self.edit(ChangeAction::Delete {
            start: index,
            end: index + 1,
        })?;
        Ok(value)
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Result<Value> {
        let len = self.snapshot()?.len();
        match len.checked_sub(1) {
            Some(last) => self.remove(last),
            None => Err(ReactiveError::IndexOutOfRange { index: 0, len: 0 }),
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.edit(ChangeAction::Clear)
    }
}

impl TryFrom<Value> for List {
    type Error = ReactiveError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::List(list) => Ok(list),
            other => Err(ReactiveError::TypeMismatch {
                op: "into",
                lhs: other.kind_name(),
                rhs: "list",
            }),
        }
    }
}

impl fmt::Display for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "List({})", self.0)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
