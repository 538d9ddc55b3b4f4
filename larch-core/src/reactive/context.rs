//! Reactive Context
//!
//! The reactive context tracks which rule is currently running so that cell
//! reads can be recorded as dependencies of that rule.
//!
//! # Implementation
//!
//! Each runtime keeps a stack of frames. Running a rule pushes a tracking
//! frame; `untouched` scopes push a non-tracking frame. A read is recorded
//! only when the innermost frame is tracking. When a rule reaches its
//! untracked tail, its frame stops tracking for the rest of the run.
//!
//! Frames are popped by a guard, so the stack stays balanced even if a rule
//! body panics.

use std::cell::RefCell;

use indexmap::IndexSet;

use crate::graph::{CellId, RuleId};

/// One entry of the context stack.
#[derive(Debug)]
struct Frame {
    /// Rule that owns the frame; `None` for untouched scopes.
    rule: Option<RuleId>,
    tracking: bool,
    /// Cells read while tracking, in first-read order.
    reads: IndexSet<CellId>,
}

/// Stack of running rules and untouched scopes.
#[derive(Debug, Default)]
pub(crate) struct ContextStack {
    frames: Vec<Frame>,
}

impl ContextStack {
    fn push(&mut self, rule: Option<RuleId>) {
        self.frames.push(Frame {
            rule,
            tracking: rule.is_some(),
            reads: IndexSet::new(),
        });
    }

    /// Record a read of `cell` if the innermost frame is tracking.
    pub fn track(&mut self, cell: CellId) {
        if let Some(frame) = self.frames.last_mut() {
            if frame.tracking {
                frame.reads.insert(cell);
            }
        }
    }

    /// Whether a read right now would be recorded.
    pub fn is_tracking(&self) -> bool {
        self.frames.last().is_some_and(|frame| frame.tracking)
    }

    /// The innermost running rule, if any.
    pub fn current_rule(&self) -> Option<RuleId> {
        self.frames.iter().rev().find_map(|frame| frame.rule)
    }

    /// Switch the innermost rule to its untracked tail.
    ///
    /// Returns false when no rule is running.
    pub fn stop_tracking(&mut self) -> bool {
        match self.frames.iter_mut().rev().find(|frame| frame.rule.is_some()) {
            Some(frame) => {
                frame.tracking = false;
                true
            }
            None => false,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Guard that pops its frame when dropped.
pub(crate) struct ReactiveContext<'a> {
    stack: &'a RefCell<ContextStack>,
    rule: Option<RuleId>,
    active: bool,
}

impl<'a> ReactiveContext<'a> {
    /// Enter the tracked phase of `rule`.
    pub fn enter_rule(stack: &'a RefCell<ContextStack>, rule: RuleId) -> Self {
        stack.borrow_mut().push(Some(rule));
        Self {
            stack,
            rule: Some(rule),
            active: true,
        }
    }

    /// Enter a scope whose reads are never recorded.
    pub fn enter_untouched(stack: &'a RefCell<ContextStack>) -> Self {
        stack.borrow_mut().push(None);
        Self {
            stack,
            rule: None,
            active: true,
        }
    }

    /// Leave the frame and return the cells read while it was tracking.
    pub fn finish(mut self) -> IndexSet<CellId> {
        self.active = false;
        self.pop().map(|frame| frame.reads).unwrap_or_default()
    }

    fn pop(&self) -> Option<Frame> {
        let popped = self.stack.borrow_mut().frames.pop();
        // Catch mismatched guards early.
        if let Some(frame) = &popped {
            debug_assert_eq!(
                frame.rule, self.rule,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.rule, frame.rule
            );
        }
        popped
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        if self.active {
            self.pop();
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
