//! Reactive dictionary.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::{action_record, builtins, publish, ActionRecord, ChangeAction};
use super::{ACTION_END, ACTION_START, ITEMS};
use crate::error::{ReactiveError, Result};
use crate::reactive::{Object, Runtime};
use crate::value::{DictKey, Value};

/// Insertion-ordered reactive mapping.
#[derive(Clone, PartialEq)]
pub struct Dict(Object);

impl Runtime {
    /// Create a reactive dict holding `entries`.
    pub fn dict<I, K, V>(&self, entries: I) -> Result<Dict>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<DictKey>,
        V: Into<Value>,
    {
        let entries: IndexMap<DictKey, Value> = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        let schema = builtins(self)?.dict.clone();
        let object = self.create(&schema, [(ITEMS, Value::from(entries))])?;
        Ok(Dict(object))
    }
}

impl Dict {
    /// The object behind the dict.
    pub fn as_object(&self) -> &Object {
        &self.0
    }

    fn entries(&self) -> Result<Rc<IndexMap<DictKey, Value>>> {
        match self.0.get(ITEMS)? {
            Value::Map(entries) => Ok(entries),
            other => Err(ReactiveError::TypeMismatch {
                op: "items",
                lhs: other.kind_name(),
                rhs: "map",
            }),
        }
    }

    fn snapshot(&self) -> Result<IndexMap<DictKey, Value>> {
        match self.0.cell(ITEMS)?.peek()? {
            Value::Map(entries) => Ok(entries.as_ref().clone()),
            other => Err(ReactiveError::TypeMismatch {
                op: "items",
                lhs: other.kind_name(),
                rhs: "map",
            }),
        }
    }

    fn edit(&self, action: ChangeAction) -> Result<()> {
        let mut entries = self.snapshot()?;
        action.apply_to_map(&mut entries)?;
        publish(&self.0, action, Value::from(entries))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, key: impl Into<DictKey>) -> Result<Value> {
        let key = key.into();
        self.entries()?
            .get(&key)
            .cloned()
            .ok_or_else(|| ReactiveError::KeyNotFound(key.to_string()))
    }

    pub fn contains_key(&self, key: impl Into<DictKey>) -> Result<bool> {
        Ok(self.entries()?.contains_key(&key.into()))
    }

    pub fn keys(&self) -> Result<Vec<DictKey>> {
        Ok(self.entries()?.keys().cloned().collect())
    }

    pub fn to_map(&self) -> Result<IndexMap<DictKey, Value>> {
        Ok(self.entries()?.as_ref().clone())
    }

    /// Start record of the latest edit. Observers see it together with the
    /// edited entries, since both are written in one transaction.
    pub fn action_start(&self) -> Result<Option<ActionRecord>> {
        action_record(&self.0, ACTION_START)
    }

    pub fn action_end(&self) -> Result<Option<ActionRecord>> {
        action_record(&self.0, ACTION_END)
    }

    pub fn insert(&self, key: impl Into<DictKey>, value: impl Into<Value>) -> Result<()> {
        self.edit(ChangeAction::Merge {
            entries: vec![(key.into(), value.into())],
        })
    }

    /// Insert or overwrite several entries as one edit.
    pub fn update<I, K, V>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<DictKey>,
        V: Into<Value>,
    {
        self.edit(ChangeAction::Merge {
            entries: entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        })
    }

    /// Remove and return the value under `key`.
    pub fn remove(&self, key: impl Into<DictKey>) -> Result<Value> {
        let key = key.into();
        let value = self
            .snapshot()?
            .get(&key)
            .cloned()
            .ok_or_else(|| ReactiveError::KeyNotFound(key.to_string()))?;
        self.edit(ChangeAction::Remove { keys: vec![key] })?;
        Ok(value)
    }

    /// Remove and return the most recently inserted entry.
    pub fn pop_item(&self) -> Result<(DictKey, Value)> {
        let (key, value) = self
            .snapshot()?
            .pop()
            .ok_or_else(|| ReactiveError::KeyNotFound("pop_item on an empty dict".into()))?;
        self.edit(ChangeAction::Remove {
            keys: vec![key.clone()],
        })?;
        Ok((key, value))
    }

    pub fn clear(&self) -> Result<()> {
        self.edit(ChangeAction::Clear)
    }
}

impl TryFrom<Value> for Dict {
    type Error = ReactiveError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Dict(dict) => Ok(dict),
            other => Err(ReactiveError::TypeMismatch {
                op: "into",
                lhs: other.kind_name(),
                rhs: "dict",
            }),
        }
    }
}

impl fmt::Display for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dict({})", self.0)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
