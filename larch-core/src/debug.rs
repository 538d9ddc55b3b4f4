//! Introspection helpers.
//!
//! [`dump`] renders an object as JSON: every field with its value, revision
//! and dependent rules, and every rule with its priority, run count and
//! current dependencies. Nothing read by a dump becomes a dependency.

use serde_json::{json, Map};

use crate::error::Result;
use crate::graph::FieldSlot;
use crate::reactive::{FieldKind, Object};

/// Describe `object` and its place in the dependency graph.
pub fn dump(object: &Object) -> Result<serde_json::Value> {
    let runtime = object.runtime();
    let graph = runtime.inner.graph.borrow();
    let node = graph.object(object.id())?;

    let mut fields = Map::new();
    for (def, slot) in object.schema().fields().iter().zip(node.fields.iter()) {
        let entry = match (&def.kind, slot) {
            (FieldKind::Delegate { path }, _) => json!({
                "delegate": path.iter().map(|hop| hop.to_string()).collect::<Vec<_>>(),
            }),
            (_, FieldSlot::Cell(id)) => {
                let cell = graph.cell(*id)?;
                let dependents: Vec<String> = cell
                    .dependents
                    .iter()
                    .filter_map(|rule| graph.rule(*rule).ok())
                    .map(|rule| rule.label.to_string())
                    .collect();
                json!({
                    "value": serde_json::to_value(&cell.value)?,
                    "revision": cell.revision,
                    "dependents": dependents,
                })
            }
            (_, FieldSlot::Delegate) => serde_json::Value::Null,
        };
        fields.insert(def.name.to_string(), entry);
    }

    let mut rules = Map::new();
    for id in &node.rules {
        let rule = graph.rule(*id)?;
        let dependencies: Vec<String> = rule
            .dependencies
            .iter()
            .filter_map(|cell| graph.cell(*cell).ok())
            .map(|cell| cell.label.to_string())
            .collect();
        rules.insert(
            rule.label.to_string(),
            json!({
                "priority": rule.priority,
                "runs": rule.runs,
                "dependencies": dependencies,
            }),
        );
    }

    Ok(json!({
        "object": object.to_string(),
        "fields": fields,
        "rules": rules,
    }))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
