//! Transaction Manager
//!
//! Writes are batched into transactions. A transaction moves through three
//! phases:
//!
//! - *idle*: nothing is open. A bare write opens an implicit transaction
//!   around itself and commits immediately.
//! - *open*: `atomic` bodies are running. Written cells are collected but no
//!   rule runs.
//! - *committing*: the outermost `atomic` has exited and the scheduler runs
//!   dirty rules until nothing is dirty. Writes made by rules feed straight
//!   into the scheduler.
//!
//! # Previous Values
//!
//! Each changed cell keeps a history entry holding its value from before the
//! change and the last wave allowed to observe it. A write made while the
//! transaction is open is visible during wave 1. A write made during wave
//! `k` is visible for the rest of wave `k`, and during wave `k + 1` if one of
//! its dependents had to be deferred there. History is dropped when the
//! commit ends.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;
use tracing::error;

use super::context::ReactiveContext;
use super::runtime::Runtime;
use crate::error::{ReactiveError, Result};
use crate::graph::{CellId, Graph, Placement, RuleKey, RuleScheduler};
use crate::value::Value;

/// Lifecycle phase of the runtime's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Open,
    Committing,
}

#[derive(Debug)]
struct HistoryEntry {
    previous: Value,
    /// Last wave that may read `previous`.
    valid_through: u32,
}

/// Outcome of looking up a cell's previous value.
#[derive(Debug)]
pub(crate) enum Previous {
    /// The cell changed and the value is still observable.
    Value(Value),
    /// The cell did not change in this commit.
    Unchanged,
    /// No commit is running, or the observable window has passed.
    Stale,
}

/// Per-runtime transaction bookkeeping.
#[derive(Debug)]
pub(crate) struct TransactionState {
    phase: Phase,

    /// Nesting depth of `atomic` scopes.
    depth: u32,

    /// Nesting depth of `silent` scopes.
    silent: u32,

    /// Cells written while the transaction was open.
    pending: IndexSet<CellId>,

    history: HashMap<CellId, HistoryEntry>,

    /// Cells changed at any point of the current commit.
    touched: HashSet<CellId>,

    pub scheduler: RuleScheduler,

    /// Rules run by the current commit.
    pub rules_run: u64,

    first_error: Option<ReactiveError>,
}

impl Default for TransactionState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            depth: 0,
            silent: 0,
            pending: IndexSet::new(),
            history: HashMap::new(),
            touched: HashSet::new(),
            scheduler: RuleScheduler::new(),
            rules_run: 0,
            first_error: None,
        }
    }
}

impl TransactionState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Enter an `atomic` scope. Returns true for the outermost scope of a
    /// new transaction, which is responsible for committing it.
    pub fn open(&mut self) -> bool {
        self.depth += 1;
        if self.phase == Phase::Idle && self.depth == 1 {
            self.phase = Phase::Open;
            true
        } else {
            false
        }
    }

    /// Leave an `atomic` scope.
    pub fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn enter_silent(&mut self) {
        self.silent += 1;
    }

    pub fn exit_silent(&mut self) {
        self.silent = self.silent.saturating_sub(1);
    }

    pub fn is_silent(&self) -> bool {
        self.silent > 0
    }

    /// Queue a rule for the running or upcoming commit.
    pub fn schedule(&mut self, key: RuleKey) -> Placement {
        self.scheduler.schedule(key)
    }

    /// Record a write that changed `cell` from `old`, marking `dependents`
    /// dirty. Returns a value the caller drops once no borrow is held.
    pub fn record_write(
        &mut self,
        cell: CellId,
        old: Value,
        dependents: &[RuleKey],
    ) -> Option<Value> {
        if self.silent > 0 {
            return Some(old);
        }
        match self.phase {
            Phase::Idle => Some(old),
            Phase::Open => {
                self.pending.insert(cell);
                self.touched.insert(cell);
                match self.history.entry(cell) {
                    // keep the value from before the first write
                    Entry::Occupied(_) => Some(old),
                    Entry::Vacant(slot) => {
                        slot.insert(HistoryEntry {
                            previous: old,
                            valid_through: 1,
                        });
                        None
                    }
                }
            }
            Phase::Committing => {
                self.touched.insert(cell);
                let wave = self.scheduler.wave();
                let mut deferred = false;
                for key in dependents {
                    deferred |= self.scheduler.schedule(*key) == Placement::Next;
                }
                let valid_through = if deferred { wave + 1 } else { wave };

                match self.history.entry(cell) {
                    Entry::Occupied(mut entry) if entry.get().valid_through >= wave => {
                        let entry = entry.get_mut();
                        entry.valid_through = entry.valid_through.max(valid_through);
                        Some(old)
                    }
                    Entry::Occupied(mut entry) => {
                        let expired = entry.insert(HistoryEntry {
                            previous: old,
                            valid_through,
                        });
                        Some(expired.previous)
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(HistoryEntry {
                            previous: old,
                            valid_through,
                        });
                        None
                    }
                }
            }
        }
    }

    /// Switch to the committing phase and dirty the dependents of every cell
    /// written while the transaction was open.
    ///
    /// Cells that ended up back at their original value are forgotten,
    /// unless they notify on every write or the short circuit is disabled.
    pub fn seed(&mut self, graph: &Graph, rule_optimize: bool) -> Vec<Value> {
        self.phase = Phase::Committing;
        let mut garbage = Vec::new();

        for cell in std::mem::take(&mut self.pending) {
            let changed = match graph.cell(cell) {
                Ok(node) => {
                    node.notify_always
                        || !rule_optimize
                        || self
                            .history
                            .get(&cell)
                            .map_or(true, |entry| entry.previous != node.value)
                }
                Err(_) => false,
            };

            if changed {
                for key in graph.dependents(cell).unwrap_or_default() {
                    self.scheduler.schedule(key);
                }
            } else {
                self.touched.remove(&cell);
                if let Some(entry) = self.history.remove(&cell) {
                    garbage.push(entry.previous);
                }
            }
        }
        garbage
    }

    /// Drop history that the given wave may no longer observe.
    pub fn expire_history(&mut self, wave: u32) -> Vec<Value> {
        let mut garbage = Vec::new();
        self.history.retain(|_, entry| {
            if entry.valid_through < wave {
                garbage.push(std::mem::take(&mut entry.previous));
                false
            } else {
                true
            }
        });
        garbage
    }

    pub fn previous(&self, cell: CellId) -> Previous {
        if self.phase != Phase::Committing {
            return Previous::Stale;
        }
        match self.history.get(&cell) {
            Some(entry) if entry.valid_through >= self.scheduler.wave() => {
                Previous::Value(entry.previous.clone())
            }
            Some(_) => Previous::Stale,
            None if self.touched.contains(&cell) => Previous::Stale,
            None => Previous::Unchanged,
        }
    }

    /// Keep the first rule failure of the commit.
    pub fn record_error(&mut self, err: ReactiveError) {
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }

    /// End the commit: back to idle, all history dropped.
    ///
    /// Returns the first rule failure and the values to drop.
    pub fn finish(&mut self) -> (Option<ReactiveError>, Vec<Value>) {
        self.phase = Phase::Idle;
        self.pending.clear();
        self.touched.clear();
        self.scheduler.reset();
        self.rules_run = 0;
        let garbage = self
            .history
            .drain()
            .map(|(_, entry)| entry.previous)
            .collect();
        (self.first_error.take(), garbage)
    }

    /// Reset everything after a panic unwound through a transaction.
    pub fn abort(&mut self) -> Vec<Value> {
        self.depth = 0;
        self.silent = 0;
        let (_, garbage) = self.finish();
        garbage
    }
}

// ----------------------------------------------------------------------------
// Scoped contexts
// ----------------------------------------------------------------------------

/// Closes an `atomic` scope however it is left.
struct AtomicScope<'a> {
    runtime: &'a Runtime,
    outermost: bool,
}

impl Drop for AtomicScope<'_> {
    fn drop(&mut self) {
        let garbage = {
            let mut tx = self.runtime.inner.tx.borrow_mut();
            tx.close();
            if std::thread::panicking() && self.outermost {
                tx.abort()
            } else {
                Vec::new()
            }
        };
        drop(garbage);
    }
}

/// Returns a commit to idle if a rule panics while it runs.
pub(crate) struct CommitScope<'a>(pub(crate) &'a Runtime);

impl Drop for CommitScope<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let garbage = match self.0.inner.tx.try_borrow_mut() {
            Ok(mut tx) => tx.abort(),
            Err(_) => Vec::new(),
        };
        drop(garbage);
    }
}

/// Leaves a `silent` scope however it is left.
struct SilentScope<'a>(&'a Runtime);

impl Drop for SilentScope<'_> {
    fn drop(&mut self) {
        self.0.inner.tx.borrow_mut().exit_silent();
    }
}

impl Runtime {
    /// Run `body` as one transaction.
    ///
    /// Writes inside `body` trigger no rule until the outermost `atomic`
    /// exits; then every dirty rule runs until nothing is dirty. Nested
    /// calls join the enclosing transaction, and calls made from inside a
    /// rule join the running commit.
    ///
    /// If `body` fails, the writes it already made are kept and still
    /// committed; its error is returned.
    ///
    /// ```rust
    /// use larch_core::{Runtime, Schema, Value};
    ///
    /// let rt = Runtime::new();
    /// let schema = Schema::builder("Pair").cell("a", 0).cell("b", 0).build().unwrap();
    /// let pair = rt.create(&schema, []).unwrap();
    ///
    /// rt.atomic(|| {
    ///     pair.set("a", 1)?;
    ///     pair.set("b", 2)
    /// })
    /// .unwrap();
    /// assert_eq!(pair.get("b").unwrap(), Value::Int(2));
    /// ```
    pub fn atomic<T>(&self, body: impl FnOnce() -> Result<T>) -> Result<T> {
        let outermost = self.inner.tx.borrow_mut().open();
        let scope = AtomicScope {
            runtime: self,
            outermost,
        };
        let result = body();
        drop(scope);

        if !outermost {
            return result;
        }
        match (result, self.commit()) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) | (Err(err), Ok(())) => Err(err),
            (Err(err), Err(commit_err)) => {
                error!(error = %commit_err, "commit failed after atomic body error");
                Err(err)
            }
        }
    }

    /// Run `body` with change notification suppressed.
    ///
    /// Writes still store values and bump revisions, but no dependent rule
    /// is scheduled and no previous value is kept.
    pub fn silent<T>(&self, body: impl FnOnce() -> T) -> T {
        self.inner.tx.borrow_mut().enter_silent();
        let _scope = SilentScope(self);
        body()
    }

    /// Run `body` without recording its reads as dependencies of the
    /// running rule. Values read are still live.
    pub fn untouched<T>(&self, body: impl FnOnce() -> T) -> T {
        let _scope = ReactiveContext::enter_untouched(&self.inner.context);
        body()
    }

    /// End the tracked phase of the running rule. Reads made for the rest
    /// of the run do not become dependencies.
    ///
    /// Returns false when called outside a rule.
    pub fn stop_tracking(&self) -> bool {
        self.inner.context.borrow_mut().stop_tracking()
    }

    /// Whether a commit is currently running rules.
    pub fn is_committing(&self) -> bool {
        self.inner.tx.borrow().phase() == Phase::Committing
    }

    /// Whether an `atomic` scope or commit is in progress.
    pub fn in_transaction(&self) -> bool {
        self.inner.tx.borrow().phase() != Phase::Idle
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
