//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects cells, rules and
//! transactions. It owns the dependency graph and runs the scheduler when a
//! transaction commits.
//!
//! # How It Works
//!
//! 1. When an object is created, its cells and rules are registered in the
//!    graph and every rule runs once to establish its dependencies.
//!
//! 2. When a rule reads a cell, the runtime records the read in the reactive
//!    context; when the rule finishes, its edges are replaced by exactly
//!    the cells it read.
//!
//! 3. When a cell's value changes, the runtime:
//!    a. Stores the new value and remembers the old one for the commit
//!    b. Marks every dependent rule dirty
//!    c. At commit, runs dirty rules wave by wave until nothing is dirty
//!
//! # Ownership
//!
//! A `Runtime` is a cheap handle; every object keeps its runtime alive. The
//! graph never owns objects: releasing the last handle of an object removes
//! its cells, rules and edges.
//!
//! # Threading
//!
//! The runtime is single-threaded. Rule bodies run on the caller's stack, and
//! no `RefCell` borrow is held while user code runs.

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, debug_span, error, trace, warn};

use super::context::{ContextStack, ReactiveContext};
use super::object::{Object, ObjectInner};
use super::schema::{FieldKind, Schema};
use super::transaction::{CommitScope, Phase, Previous, TransactionState};
use crate::config::RuntimeConfig;
use crate::error::{ReactiveError, Result};
use crate::graph::{CellId, CellNode, FieldSlot, Graph, ObjectId, ObjectNode, RuleId, RuleNode};
use crate::value::Value;

/// Schemas of the built-in collections, built on first use.
pub(crate) struct Builtins {
    pub list: Rc<Schema>,
    pub dict: Rc<Schema>,
}

pub(crate) struct RuntimeInner {
    pub config: RuntimeConfig,
    pub graph: RefCell<Graph>,
    pub context: RefCell<ContextStack>,
    pub tx: RefCell<TransactionState>,

    /// Objects whose handles were dropped while the graph was borrowed.
    pub released: RefCell<Vec<ObjectId>>,

    /// Source of rule registration order and change-action sequence numbers.
    pub seq: Cell<u64>,

    pub builtins: OnceCell<Builtins>,
}

/// Handle to a reactive runtime.
///
/// # Example
///
/// ```rust
/// use larch_core::{Runtime, Schema, Value};
///
/// let rt = Runtime::new();
/// let schema = Schema::builder("Counter")
///     .cell("count", 1)
///     .cell("doubled", 0)
///     .rule("_rule_double", |counter| {
///         let count = counter.get("count")?;
///         counter.set("doubled", count.try_mul(&Value::Int(2))?)
///     })
///     .build()
///     .unwrap();
///
/// let counter = rt.create(&schema, []).unwrap();
/// assert_eq!(counter.get("doubled").unwrap(), Value::Int(2));
///
/// counter.set("count", 5).unwrap();
/// assert_eq!(counter.get("doubled").unwrap(), Value::Int(10));
/// ```
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

/// Size of the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub objects: usize,
    pub cells: usize,
    pub rules: usize,
    /// Rule-to-cell dependency edges.
    pub edges: usize,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::from_config(RuntimeConfig::default())
    }

    /// Create a runtime with a validated configuration.
    pub fn with_config(config: RuntimeConfig) -> Result<Self> {
        Ok(Self::from_config(config.validate()?))
    }

    fn from_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                graph: RefCell::new(Graph::new()),
                context: RefCell::new(ContextStack::default()),
                tx: RefCell::new(TransactionState::default()),
                released: RefCell::new(Vec::new()),
                seq: Cell::new(0),
                builtins: OnceCell::new(),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether both handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn stats(&self) -> GraphStats {
        let graph = self.inner.graph.borrow();
        GraphStats {
            objects: graph.object_count(),
            cells: graph.cell_count(),
            rules: graph.rule_count(),
            edges: graph.edge_count(),
        }
    }

    pub(crate) fn next_seq(&self) -> u64 {
        let seq = self.inner.seq.get() + 1;
        self.inner.seq.set(seq);
        seq
    }

    pub(crate) fn phase(&self) -> Phase {
        self.inner.tx.borrow().phase()
    }

    // ------------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------------

    /// Instantiate `schema`.
    ///
    /// Fields take their value from `init` when given, otherwise from their
    /// default or factory; typed fields pass through their converter. Once
    /// the object exists, initial values for delegated fields are written
    /// through and every rule runs once, all in one transaction.
    pub fn create<'a>(
        &self,
        schema: &Rc<Schema>,
        init: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<Object> {
        let mut init: Vec<(&str, Value)> = init.into_iter().collect();
        for (name, _) in &init {
            if schema.field(name).is_none() {
                return Err(ReactiveError::UnknownField {
                    object: schema.name().to_owned(),
                    field: (*name).to_owned(),
                });
            }
        }

        // Converters and factories are user code: run them before touching
        // the graph.
        let mut values: Vec<Option<Value>> = Vec::with_capacity(schema.fields().len());
        let mut delegated = Vec::new();
        for field in schema.fields() {
            let given = init
                .iter()
                .position(|(name, _)| *name == &*field.name)
                .map(|index| init.swap_remove(index).1);
            let value = match &field.kind {
                FieldKind::Delegate { .. } => {
                    if let Some(value) = given {
                        delegated.push((field.name.clone(), value));
                    }
                    None
                }
                FieldKind::Plain { default } => Some(given.unwrap_or_else(|| default.clone())),
                FieldKind::Typed { default, converter } => {
                    let raw = given.unwrap_or_else(|| default.clone());
                    let value = converter(raw).map_err(|reason| ReactiveError::Conversion {
                        cell: format!("{}.{}", schema.name(), field.name),
                        reason,
                    })?;
                    Some(value)
                }
                FieldKind::Factory { factory, args } => {
                    Some(given.unwrap_or_else(|| factory(args.as_slice())))
                }
            };
            values.push(value);
        }

        let id = {
            let mut graph = self.inner.graph.borrow_mut();
            let id = graph.insert_object(ObjectNode {
                schema: schema.clone(),
                handle: Weak::new(),
                fields: SmallVec::new(),
                rules: SmallVec::new(),
            });

            let mut fields = SmallVec::new();
            for (field, value) in schema.fields().iter().zip(values) {
                let Some(value) = value else {
                    fields.push(FieldSlot::Delegate);
                    continue;
                };
                let label: Rc<str> = format!("{}.{}", schema.name(), field.name).into();
                let mut node = CellNode::new(id, label, value);
                node.converter = field.converter();
                node.notify_always = field.notify_always;
                fields.push(FieldSlot::Cell(graph.insert_cell(node)));
            }

            let mut rules = SmallVec::new();
            for rule in schema.rules() {
                let label: Rc<str> = format!("{}.{}", schema.name(), rule.name).into();
                rules.push(graph.insert_rule(RuleNode {
                    owner: id,
                    label,
                    priority: rule.priority,
                    seq: self.next_seq(),
                    body: rule.body.clone(),
                    dependencies: Default::default(),
                    runs: 0,
                }));
            }

            let node = graph.object_mut(id)?;
            node.fields = fields;
            node.rules = rules;
            id
        };

        let inner = Rc::new(ObjectInner::new(id, self.clone(), schema.clone()));
        self.inner.graph.borrow_mut().object_mut(id)?.handle = Rc::downgrade(&inner);
        let object = Object::from_inner(inner);
        trace!(object = %object, "object created");

        self.atomic(|| {
            for (name, value) in delegated {
                object.set(&name, value)?;
            }
            let keys = {
                let graph = self.inner.graph.borrow();
                let node = graph.object(id)?;
                node.rules
                    .iter()
                    .filter_map(|rule| graph.rule(*rule).ok().map(|node| node.key(*rule)))
                    .collect::<Vec<_>>()
            };
            let mut tx = self.inner.tx.borrow_mut();
            for key in keys {
                tx.schedule(key);
            }
            Ok(())
        })?;
        Ok(object)
    }

    /// Queue an object's handle for removal from the graph.
    pub(crate) fn release(&self, id: ObjectId) {
        self.inner.released.borrow_mut().push(id);
        self.collect_released();
    }

    /// Remove released objects from the graph.
    ///
    /// Removed values are dropped with no borrow held, which may release
    /// further objects; those are picked up by the same loop.
    pub(crate) fn collect_released(&self) {
        loop {
            let next = self.inner.released.borrow_mut().pop();
            let Some(id) = next else {
                return;
            };
            let removed = match self.inner.graph.try_borrow_mut() {
                Ok(mut graph) => graph.remove_object(id),
                Err(_) => {
                    // retried after the current graph operation
                    self.inner.released.borrow_mut().push(id);
                    return;
                }
            };
            if let Some(removed) = removed {
                trace!(object = %id, cells = removed.1.len(), rules = removed.2.len(), "object released");
                drop(removed);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Cells
    // ------------------------------------------------------------------------

    /// Read a cell, recording the read in the running rule.
    pub(crate) fn read_cell(&self, cell: CellId) -> Result<Value> {
        let value = self.inner.graph.borrow().cell(cell)?.value.clone();
        self.inner.context.borrow_mut().track(cell);
        Ok(value)
    }

    /// Read a cell without recording a dependency.
    pub(crate) fn peek_cell(&self, cell: CellId) -> Result<Value> {
        Ok(self.inner.graph.borrow().cell(cell)?.value.clone())
    }

    pub(crate) fn cell_label(&self, cell: CellId) -> Result<Rc<str>> {
        Ok(self.inner.graph.borrow().cell(cell)?.label.clone())
    }

    /// Write a cell through its converter.
    ///
    /// Outside a transaction the write is wrapped in its own `atomic`.
    pub(crate) fn write_cell(&self, cell: CellId, value: Value) -> Result<()> {
        let (converter, label) = {
            let graph = self.inner.graph.borrow();
            let node = graph.cell(cell)?;
            (node.converter.clone(), node.label.clone())
        };
        let value = match converter {
            Some(converter) => converter(value).map_err(|reason| ReactiveError::Conversion {
                cell: label.to_string(),
                reason,
            })?,
            None => value,
        };

        if self.phase() == Phase::Idle {
            self.atomic(|| self.store(cell, value))
        } else {
            self.store(cell, value)
        }
    }

    fn store(&self, cell: CellId, value: Value) -> Result<()> {
        let rule_optimize = self.inner.config.rule_optimize;
        let garbage = {
            let mut graph = self.inner.graph.borrow_mut();
            let node = graph.cell_mut(cell)?;
            node.revision += 1;
            let changed = node.notify_always || !rule_optimize || node.value != value;
            trace!(cell = %node.label, revision = node.revision, changed, "cell written");

            if changed {
                let old = std::mem::replace(&mut node.value, value);
                let dependents = graph.dependents(cell)?;
                self.inner
                    .tx
                    .borrow_mut()
                    .record_write(cell, old, &dependents)
            } else {
                Some(value)
            }
        };
        drop(garbage);
        Ok(())
    }

    /// The value `cell` held before the change being committed.
    pub(crate) fn previous(&self, cell: CellId) -> Result<Value> {
        let lookup = self.inner.tx.borrow().previous(cell);
        match lookup {
            Previous::Value(value) => {
                self.inner.context.borrow_mut().track(cell);
                Ok(value)
            }
            Previous::Unchanged => self.read_cell(cell),
            Previous::Stale => Err(ReactiveError::StaleHistoryAccess {
                cell: self.cell_label(cell)?.to_string(),
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------------

    /// Run dirty rules until nothing is dirty, then return to idle.
    pub(crate) fn commit(&self) -> Result<()> {
        let span = debug_span!("commit");
        let _enter = span.enter();
        let _scope = CommitScope(self);

        let garbage = {
            let graph = self.inner.graph.borrow();
            self.inner
                .tx
                .borrow_mut()
                .seed(&graph, self.inner.config.rule_optimize)
        };
        drop(garbage);
        debug!(dirty = self.inner.tx.borrow().scheduler.pending().count(), "commit started");

        let outcome = self.run_waves();

        let (rules_run, waves) = {
            let tx = self.inner.tx.borrow();
            (tx.rules_run, tx.scheduler.wave())
        };
        let (first_error, garbage) = self.inner.tx.borrow_mut().finish();
        drop(garbage);
        self.collect_released();
        debug!(waves, rules_run, "commit finished");

        outcome?;
        first_error.map_or(Ok(()), Err)
    }

    fn run_waves(&self) -> Result<()> {
        let max_waves = self.inner.config.max_waves;
        loop {
            let (wave, garbage) = {
                let mut tx = self.inner.tx.borrow_mut();
                if !tx.scheduler.begin_wave() {
                    return Ok(());
                }
                let wave = tx.scheduler.wave();
                (wave, tx.expire_history(wave))
            };
            drop(garbage);

            if wave > max_waves {
                let rules = self.pending_rule_labels();
                warn!(waves = max_waves, pending = rules.len(), "commit aborted: rules did not settle");
                return Err(ReactiveError::DependencyCycle {
                    waves: max_waves,
                    rules,
                });
            }
            trace!(wave, "wave started");

            loop {
                let next = self.inner.tx.borrow_mut().scheduler.pop();
                let Some(key) = next else {
                    break;
                };
                if let Err(err) = self.run_rule(key.id) {
                    self.inner.tx.borrow_mut().record_error(err);
                }
            }
        }
    }

    fn pending_rule_labels(&self) -> Vec<String> {
        let graph = self.inner.graph.borrow();
        let tx = self.inner.tx.borrow();
        tx.scheduler
            .pending()
            .filter_map(|key| graph.rule(key.id).ok())
            .map(|rule| rule.label.to_string())
            .collect()
    }

    /// Run one rule now and rebuild its dependencies from what it read.
    ///
    /// Rules of released objects are skipped.
    pub(crate) fn run_rule(&self, id: RuleId) -> Result<()> {
        let (body, handle, label) = {
            let graph = self.inner.graph.borrow();
            let Ok(rule) = graph.rule(id) else {
                return Ok(());
            };
            let owner = graph.object(rule.owner)?;
            (rule.body.clone(), owner.handle.clone(), rule.label.clone())
        };
        let Some(owner) = handle.upgrade().map(Object::from_inner) else {
            return Ok(());
        };

        trace!(rule = %label, "running rule");
        let context = ReactiveContext::enter_rule(&self.inner.context, id);
        let result = body(&owner);
        let reads = context.finish();

        {
            let mut graph = self.inner.graph.borrow_mut();
            trace!(rule = %label, dependencies = reads.len(), "edges rebuilt");
            graph.set_dependencies(id, reads);
            if let Ok(rule) = graph.rule_mut(id) {
                rule.runs += 1;
            }
        }
        self.inner.tx.borrow_mut().rules_run += 1;

        drop(owner);
        self.collect_released();

        if let Err(err) = &result {
            error!(rule = %label, error = %err, "rule failed");
        }
        result
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell as Counter;

    fn counter_schema(runs: Rc<Counter<u32>>) -> Rc<Schema> {
        Schema::builder("Counter")
            .cell("count", 0)
            .cell("doubled", 0)
            .rule("_rule_double", move |counter| {
                runs.set(runs.get() + 1);
                let count = counter.get("count")?;
                counter.set("doubled", count.try_mul(&Value::Int(2))?)
            })
            .build()
            .unwrap()
    }

    #[test]
    fn create_runs_rules_once() {
        let rt = Runtime::new();
        let runs = Rc::new(Counter::new(0));
        let counter = rt.create(&counter_schema(runs.clone()), []).unwrap();

        assert_eq!(runs.get(), 1);
        assert!(counter.is_observing());
        assert_eq!(rt.stats().edges, 1);
    }

    #[test]
    fn equal_write_bumps_revision_only() {
        let rt = Runtime::new();
        let runs = Rc::new(Counter::new(0));
        let counter = rt.create(&counter_schema(runs.clone()), []).unwrap();
        let cell = counter.cell("count").unwrap();

        counter.set("count", 0).unwrap();
        assert_eq!(cell.revision().unwrap(), 1);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn disabling_optimization_dirties_on_equal_writes() {
        let rt = Runtime::with_config(RuntimeConfig::default().with_rule_optimize(false)).unwrap();
        let runs = Rc::new(Counter::new(0));
        let counter = rt.create(&counter_schema(runs.clone()), []).unwrap();

        counter.set("count", 0).unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn invalid_config_rejected() {
        let err = Runtime::with_config(RuntimeConfig::default().with_max_waves(0)).unwrap_err();
        assert!(matches!(err, ReactiveError::Config(_)));
    }

    #[test]
    fn previous_outside_commit_is_stale() {
        let rt = Runtime::new();
        let counter = rt
            .create(&counter_schema(Rc::new(Counter::new(0))), [])
            .unwrap();
        let err = counter.cell("count").unwrap().previous().unwrap_err();
        assert_eq!(
            err,
            ReactiveError::StaleHistoryAccess {
                cell: "Counter.count".into()
            }
        );
    }

    #[test]
    fn released_object_leaves_graph() {
        let rt = Runtime::new();
        let counter = rt
            .create(&counter_schema(Rc::new(Counter::new(0))), [])
            .unwrap();
        assert_eq!(rt.stats().objects, 1);

        drop(counter);
        assert_eq!(
            rt.stats(),
            GraphStats {
                objects: 0,
                cells: 0,
                rules: 0,
                edges: 0
            }
        );
    }

    #[test]
    fn unknown_init_field_rejected() {
        let rt = Runtime::new();
        let schema = counter_schema(Rc::new(Counter::new(0)));
        let err = rt.create(&schema, [("missing", Value::Int(1))]).unwrap_err();
        assert!(matches!(err, ReactiveError::UnknownField { .. }));
        assert_eq!(rt.stats().objects, 0);
    }
}
