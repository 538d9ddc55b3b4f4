//! Rule Scheduler
//!
//! The scheduler decides which rules run, and in which order, while a
//! transaction commits.
//!
//! # Algorithm
//!
//! Work is processed in waves:
//!
//! 1. Rules made dirty before the wave starts form the wave's queue.
//! 2. The queue is drained in `(priority, registration order)` order.
//! 3. A rule dirtied while the wave runs joins the current wave when it has
//!    not run yet and sorts after the rule currently running; otherwise it
//!    is deferred to the next wave.
//! 4. Waves repeat until nothing is dirty.
//!
//! A rule is never queued twice in the same wave.

use std::collections::{BTreeSet, HashSet};

use super::arena::RuleId;
use super::node::RuleKey;

/// Where a freshly dirtied rule was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    /// The rule runs later in the current wave.
    Current,
    /// The rule runs in the next wave.
    Next,
}

/// Wave-based priority queue of dirty rules.
#[derive(Debug, Default)]
pub(crate) struct RuleScheduler {
    /// Rules still to run in the current wave.
    current: BTreeSet<RuleKey>,

    /// Rules deferred to the next wave.
    next: BTreeSet<RuleKey>,

    /// Rules that already ran in the current wave.
    ran: HashSet<RuleId>,

    /// Key of the rule most recently popped.
    cursor: Option<RuleKey>,

    /// Number of the running wave; 0 while no wave has started.
    wave: u32,
}

impl RuleScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a rule dirty and report the wave it will run in. Scheduling
    /// an already queued rule changes nothing.
    pub fn schedule(&mut self, key: RuleKey) -> Placement {
        if self.current.contains(&key) {
            return Placement::Current;
        }
        if self.next.contains(&key) {
            return Placement::Next;
        }
        let joins_current = self.wave > 0
            && !self.ran.contains(&key.id)
            && self.cursor.map_or(true, |cursor| key > cursor);
        if joins_current {
            self.current.insert(key);
            Placement::Current
        } else {
            self.next.insert(key);
            Placement::Next
        }
    }

    /// Start the next wave. Returns false when nothing is dirty.
    pub fn begin_wave(&mut self) -> bool {
        debug_assert!(self.current.is_empty(), "previous wave not drained");
        if self.next.is_empty() {
            return false;
        }
        self.current = std::mem::take(&mut self.next);
        self.ran.clear();
        self.cursor = None;
        self.wave += 1;
        true
    }

    /// Take the next rule of the current wave.
    pub fn pop(&mut self) -> Option<RuleKey> {
        let key = self.current.pop_first()?;
        self.ran.insert(key.id);
        self.cursor = Some(key);
        Some(key)
    }

    /// Number of the running wave.
    pub fn wave(&self) -> u32 {
        self.wave
    }

    /// Rules still waiting, current wave first.
    pub fn pending(&self) -> impl Iterator<Item = &RuleKey> {
        self.current.iter().chain(self.next.iter())
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_empty() && self.next.is_empty()
    }

    /// Drop all queued work and return to wave 0.
    pub fn reset(&mut self) {
        self.current.clear();
        self.next.clear();
        self.ran.clear();
        self.cursor = None;
        self.wave = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::arena::Arena;

    fn keys(specs: &[(i32, u64)]) -> Vec<RuleKey> {
        let mut arena = Arena::new();
        specs
            .iter()
            .map(|&(priority, seq)| RuleKey {
                priority,
                seq,
                id: RuleId(arena.insert(())),
            })
            .collect()
    }

    #[test]
    fn drains_in_priority_then_registration_order() {
        let k = keys(&[(0, 2), (0, 1), (-5, 3)]);
        let mut scheduler = RuleScheduler::new();
        for key in &k {
            scheduler.schedule(*key);
        }

        assert!(scheduler.begin_wave());
        let order: Vec<_> = std::iter::from_fn(|| scheduler.pop()).collect();
        assert_eq!(order, vec![k[2], k[1], k[0]]);
        assert!(!scheduler.begin_wave());
    }

    #[test]
    fn queued_rule_is_not_duplicated() {
        let k = keys(&[(0, 1)]);
        let mut scheduler = RuleScheduler::new();
        assert_eq!(scheduler.schedule(k[0]), Placement::Next);
        assert_eq!(scheduler.schedule(k[0]), Placement::Next);

        scheduler.begin_wave();
        assert_eq!(scheduler.pop(), Some(k[0]));
        assert_eq!(scheduler.pop(), None);
    }

    #[test]
    fn rule_dirtied_after_running_waits_for_next_wave() {
        let k = keys(&[(0, 1), (0, 2)]);
        let mut scheduler = RuleScheduler::new();
        scheduler.schedule(k[0]);
        scheduler.schedule(k[1]);
        scheduler.begin_wave();

        assert_eq!(scheduler.pop(), Some(k[0]));
        assert_eq!(scheduler.pop(), Some(k[1]));
        // k[0] already ran in this wave
        assert_eq!(scheduler.schedule(k[0]), Placement::Next);
        assert_eq!(scheduler.pop(), None);

        assert!(scheduler.begin_wave());
        assert_eq!(scheduler.wave(), 2);
        assert_eq!(scheduler.pop(), Some(k[0]));
    }

    #[test]
    fn later_rule_joins_current_wave() {
        let k = keys(&[(0, 1), (0, 2), (-1, 3)]);
        let mut scheduler = RuleScheduler::new();
        scheduler.schedule(k[0]);
        scheduler.begin_wave();
        assert_eq!(scheduler.pop(), Some(k[0]));

        // sorts after the cursor: joins
        assert_eq!(scheduler.schedule(k[1]), Placement::Current);
        // sorts before the cursor: deferred
        assert_eq!(scheduler.schedule(k[2]), Placement::Next);

        assert_eq!(scheduler.pop(), Some(k[1]));
        assert_eq!(scheduler.pop(), None);
        assert!(scheduler.begin_wave());
        assert_eq!(scheduler.pop(), Some(k[2]));
    }

    #[test]
    fn reset_clears_everything() {
        let k = keys(&[(0, 1)]);
        let mut scheduler = RuleScheduler::new();
        scheduler.schedule(k[0]);
        scheduler.begin_wave();
        scheduler.reset();

        assert!(scheduler.is_idle());
        assert_eq!(scheduler.wave(), 0);
        assert!(!scheduler.begin_wave());
    }
}
