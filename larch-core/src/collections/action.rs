//! Change actions
//!
//! Every structural edit of a reactive collection is described by a
//! [`ChangeAction`]. The collection publishes it twice, wrapped in an
//! [`ActionRecord`]: once in its `__action_start__` cell and once in its
//! `__action_end__` cell. Observers reading either cell run once per edit,
//! even when the edit leaves the contents equal.
//!
//! Actions carry their operands, so an observer can replay them on a
//! mirror with [`ChangeAction::apply_to_seq`] or
//! [`ChangeAction::apply_to_map`].

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{ReactiveError, Result};
use crate::value::{DictKey, Value};

/// One structural edit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeAction {
    /// `values` inserted before `index`.
    Insert { index: usize, values: Vec<Value> },
    /// Element at `index` overwritten.
    Assign { index: usize, value: Value },
    /// Elements `start..end` replaced by `values`.
    Replace {
        start: usize,
        end: usize,
        values: Vec<Value>,
    },
    /// Elements rearranged: `new[i] = old[permutation[i]]`.
    Reorder { permutation: Vec<usize> },
    /// Elements `start..end` removed.
    Delete { start: usize, end: usize },
    /// Dict entries inserted or overwritten, in order.
    Merge { entries: Vec<(DictKey, Value)> },
    /// Dict entries removed.
    Remove { keys: Vec<DictKey> },
    /// Everything removed.
    Clear,
}

/// Kind of a [`ChangeAction`], without operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Insert,
    Assign,
    Replace,
    Reorder,
    Delete,
    Merge,
    Remove,
    Clear,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Assign => "assign",
            Self::Replace => "replace",
            Self::Reorder => "reorder",
            Self::Delete => "delete",
            Self::Merge => "merge",
            Self::Remove => "remove",
            Self::Clear => "clear",
        }
    }
}

fn check_range(start: usize, end: usize, len: usize) -> Result<()> {
    if end > len {
        return Err(ReactiveError::IndexOutOfRange { index: end, len });
    }
    if start > end {
        return Err(ReactiveError::InvalidOperation(format!(
            "range start {start} is after end {end}"
        )));
    }
    Ok(())
}

impl ChangeAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Insert { .. } => ActionKind::Insert,
            Self::Assign { .. } => ActionKind::Assign,
            Self::Replace { .. } => ActionKind::Replace,
            Self::Reorder { .. } => ActionKind::Reorder,
            Self::Delete { .. } => ActionKind::Delete,
            Self::Merge { .. } => ActionKind::Merge,
            Self::Remove { .. } => ActionKind::Remove,
            Self::Clear => ActionKind::Clear,
        }
    }

    /// Apply a list edit. The sequence is left untouched if the edit does
    /// not fit it.
    pub fn apply_to_seq(&self, items: &mut Vec<Value>) -> Result<()> {
        let len = items.len();
        match self {
            Self::Insert { index, values } => {
                if *index > len {
                    return Err(ReactiveError::IndexOutOfRange { index: *index, len });
                }
                items.splice(*index..*index, values.iter().cloned());
            }
            Self::Assign { index, value } => {
                let slot = items
                    .get_mut(*index)
                    .ok_or(ReactiveError::IndexOutOfRange { index: *index, len })?;
                *slot = value.clone();
            }
            Self::Replace { start, end, values } => {
                check_range(*start, *end, len)?;
                items.splice(*start..*end, values.iter().cloned());
            }
            Self::Reorder { permutation } => {
                let mut seen = vec![false; len];
                let valid = permutation.len() == len
                    && permutation
                        .iter()
                        .all(|&i| i < len && !std::mem::replace(&mut seen[i], true));
                if !valid {
                    return Err(ReactiveError::InvalidOperation(format!(
                        "not a permutation of {len} elements"
                    )));
                }
                let old = std::mem::take(items);
                *items = permutation.iter().map(|&i| old[i].clone()).collect();
            }
            Self::Delete { start, end } => {
                check_range(*start, *end, len)?;
                items.drain(*start..*end);
            }
            Self::Clear => items.clear(),
            Self::Merge { .. } | Self::Remove { .. } => {
                return Err(ReactiveError::InvalidOperation(format!(
                    "`{}` does not apply to a list",
                    self.kind().as_str()
                )));
            }
        }
        Ok(())
    }

    /// Apply a dict edit. The map is left untouched if the edit does not
    /// fit it.
    pub fn apply_to_map(&self, entries: &mut IndexMap<DictKey, Value>) -> Result<()> {
        match self {
            Self::Merge { entries: merged } => {
                for (key, value) in merged {
                    entries.insert(key.clone(), value.clone());
                }
            }
            Self::Remove { keys } => {
                if let Some(missing) = keys.iter().find(|key| !entries.contains_key(*key)) {
                    return Err(ReactiveError::KeyNotFound(missing.to_string()));
                }
                for key in keys {
                    entries.shift_remove(key);
                }
            }
            Self::Clear => entries.clear(),
            _ => {
                return Err(ReactiveError::InvalidOperation(format!(
                    "`{}` does not apply to a dict",
                    self.kind().as_str()
                )));
            }
        }
        Ok(())
    }
}

/// Which of the two notifications of an edit a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPhase {
    Start,
    End,
}

/// A published edit. Both records of one edit share `seq`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    pub seq: u64,
    pub phase: ActionPhase,
    pub action: Rc<ChangeAction>,
}

impl ActionRecord {
    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }
}

impl fmt::Display for ActionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self.phase {
            ActionPhase::Start => "start",
            ActionPhase::End => "end",
        };
        write!(f, "{phase} {}#{}", self.kind().as_str(), self.seq)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
