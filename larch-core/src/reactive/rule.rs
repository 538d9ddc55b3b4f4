//! Rule bodies and rule introspection.

use std::rc::Rc;

use serde::Serialize;

use super::object::Object;
use crate::error::Result;
use crate::graph::RuleId;

/// Body of a rule. Receives the object that owns the rule.
pub type RuleFn = Rc<dyn Fn(&Object) -> Result<()>>;

/// Snapshot of a registered rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleInfo {
    #[serde(skip)]
    pub id: RuleId,

    /// `Schema.rule`
    pub name: String,

    pub priority: i32,

    /// Completed runs so far.
    pub runs: u64,
}
