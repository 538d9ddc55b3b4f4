//! Schemas
//!
//! A schema describes a kind of reactive object: its fields and its rules.
//! Schemas are built once and shared by every object created from them.
//!
//! # Fields
//!
//! - *plain*: stores whatever is written.
//! - *typed*: every incoming value passes through a converter, inferred from
//!   the default or given explicitly.
//! - *factory*: the default is produced per object by calling a factory with
//!   stored arguments, so objects never share a mutable default.
//! - *delegate*: no storage of its own; reads and writes follow an attribute
//!   path to a cell of another object, re-resolved on every access.
//!
//! # Rules
//!
//! Rules are declared with an optional priority. Lower priorities run first
//! within a wave; rules of equal priority run in registration order.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::object::Object;
use super::rule::RuleFn;
use crate::convert::{self, Converter};
use crate::error::{ReactiveError, Result};
use crate::value::Value;

/// Produces a field's default from the schema's stored arguments.
pub type Factory = Rc<dyn Fn(&[Value]) -> Value>;

/// How a field gets its storage and its default.
#[derive(Clone)]
pub enum FieldKind {
    Plain {
        default: Value,
    },
    Typed {
        default: Value,
        converter: Converter,
    },
    Factory {
        factory: Factory,
        args: Vec<Value>,
    },
    Delegate {
        path: SmallVec<[Rc<str>; 4]>,
    },
}

#[derive(Clone)]
pub struct FieldDef {
    pub name: Rc<str>,
    pub kind: FieldKind,
    /// Dirty dependents on every write, even when the value is unchanged.
    pub notify_always: bool,
}

impl FieldDef {
    pub(crate) fn converter(&self) -> Option<Converter> {
        match &self.kind {
            FieldKind::Typed { converter, .. } => Some(converter.clone()),
            _ => None,
        }
    }

    pub fn is_delegate(&self) -> bool {
        matches!(self.kind, FieldKind::Delegate { .. })
    }
}

#[derive(Clone)]
pub struct RuleDef {
    pub name: Rc<str>,
    pub priority: i32,
    pub body: RuleFn,
}

/// Shared description of a kind of reactive object.
pub struct Schema {
    name: Rc<str>,
    /// Field names in declaration order; a name's position is its slot.
    names: IndexSet<Rc<str>>,
    fields: Vec<FieldDef>,
    rules: Vec<RuleDef>,
}

impl Schema {
    /// Start declaring a schema called `name`.
    ///
    /// ```rust
    /// use larch_core::{Schema, Value};
    ///
    /// let schema = Schema::builder("Task")
    ///     .typed_cell("duration", Value::Int(0))
    ///     .cell("end", Value::Null)
    ///     .rule("_rule_end", |task| {
    ///         let duration = task.get("duration")?;
    ///         task.set("end", duration)
    ///     })
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(schema.name(), "Task");
    /// assert!(schema.field("duration").is_some());
    /// ```
    pub fn builder(name: impl Into<Rc<str>>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn rules(&self) -> &[RuleDef] {
        &self.rules
    }

    /// Slot and declaration of a field.
    pub fn field(&self, name: &str) -> Option<(usize, &FieldDef)> {
        let slot = self.names.get_index_of(name)?;
        Some((slot, &self.fields[slot]))
    }

    pub fn rule(&self, name: &str) -> Option<(usize, &RuleDef)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| &*rule.name == name)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("fields", &self.names)
            .field(
                "rules",
                &self.rules.iter().map(|rule| &rule.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Builder returned by [`Schema::builder`].
pub struct SchemaBuilder {
    name: Rc<str>,
    fields: Vec<FieldDef>,
    rules: Vec<RuleDef>,
}

impl SchemaBuilder {
    fn field(mut self, name: &str, kind: FieldKind, notify_always: bool) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            kind,
            notify_always,
        });
        self
    }

    /// A plain cell.
    pub fn cell(self, name: &str, default: impl Into<Value>) -> Self {
        self.field(
            name,
            FieldKind::Plain {
                default: default.into(),
            },
            false,
        )
    }

    /// A cell whose converter is inferred from the default's kind.
    pub fn typed_cell(self, name: &str, default: impl Into<Value>) -> Self {
        let default = default.into();
        let converter = convert::infer(&default);
        self.typed_cell_with(name, default, converter)
    }

    pub fn typed_cell_with(
        self,
        name: &str,
        default: impl Into<Value>,
        converter: Converter,
    ) -> Self {
        self.field(
            name,
            FieldKind::Typed {
                default: default.into(),
                converter,
            },
            false,
        )
    }

    /// A cell whose default is built per object by `factory(args)`.
    pub fn factory_cell<F>(self, name: &str, factory: F, args: Vec<Value>) -> Self
    where
        F: Fn(&[Value]) -> Value + 'static,
    {
        self.field(
            name,
            FieldKind::Factory {
                factory: Rc::new(factory),
                args,
            },
            false,
        )
    }

    /// A cell that dirties its dependents on every write.
    pub fn event_cell(self, name: &str, default: impl Into<Value>) -> Self {
        self.field(
            name,
            FieldKind::Plain {
                default: default.into(),
            },
            true,
        )
    }

    /// A field that forwards to the cell at `path`, e.g. `["task", "start"]`.
    pub fn delegate<I, S>(self, name: &str, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let path = path.into_iter().map(|hop| Rc::from(hop.as_ref())).collect();
        self.field(name, FieldKind::Delegate { path }, false)
    }

    /// A rule with the default priority 0.
    pub fn rule<F>(self, name: &str, body: F) -> Self
    where
        F: Fn(&Object) -> Result<()> + 'static,
    {
        self.rule_with_priority(name, 0, body)
    }

    pub fn rule_with_priority<F>(mut self, name: &str, priority: i32, body: F) -> Self
    where
        F: Fn(&Object) -> Result<()> + 'static,
    {
        self.rules.push(RuleDef {
            name: name.into(),
            priority,
            body: Rc::new(body),
        });
        self
    }

    pub fn build(self) -> Result<Rc<Schema>> {
        let invalid = |reason: String| ReactiveError::Schema {
            schema: self.name.to_string(),
            reason,
        };

        let mut names = IndexSet::with_capacity(self.fields.len());
        for field in &self.fields {
            if !names.insert(field.name.clone()) {
                return Err(invalid(format!("duplicate field `{}`", field.name)));
            }
            if let FieldKind::Delegate { path } = &field.kind {
                if path.is_empty() {
                    return Err(invalid(format!("delegate `{}` has an empty path", field.name)));
                }
            }
        }

        let mut rule_names = IndexSet::with_capacity(self.rules.len());
        for rule in &self.rules {
            if names.contains(&rule.name) || !rule_names.insert(rule.name.clone()) {
                return Err(invalid(format!("duplicate name `{}`", rule.name)));
            }
        }

        Ok(Rc::new(Schema {
            name: self.name,
            names,
            fields: self.fields,
            rules: self.rules,
        }))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
