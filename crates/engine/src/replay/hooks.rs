use std::collections::{BTreeMap, HashSet};

use crate::record::{ActionRecord, SnapshotNode};
use crate::world::{EntityId, ReplayWorld};

/// Extension points around each replayed step. Every method has a no-op
/// default.
pub trait ReplayHooks {
    /// Gates the end of preparation.
    fn is_ready(&self) -> bool {
        true
    }

    fn should_skip(&mut self, _record: &ActionRecord) -> bool {
        false
    }

    fn on_new_attempt(&mut self, _start_state: &ActionRecord) {}

    fn on_step_pre(&mut self, _record: &ActionRecord) {}

    fn before_clear_state(&mut self, _world: &ReplayWorld) {}

    fn before_clear_action(&mut self, _world: &ReplayWorld) {}

    fn before_clear_start_state(&mut self, _world: &ReplayWorld) {}

    /// Called for every entity right after it is instantiated.
    fn specialize_new_entity(
        &mut self,
        _world: &mut ReplayWorld,
        _entity: EntityId,
        _node: &SnapshotNode,
        _record: &ActionRecord,
    ) {
    }

    fn on_step_post(&mut self, _record: &ActionRecord, _world: &ReplayWorld) {}

    fn on_settled(&mut self, _record: &ActionRecord, _world: &ReplayWorld) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ReplayHooks for NoopHooks {}

/// Skip list keyed by action verb. Also counts every verb it has been asked
/// about.
#[derive(Debug, Default, Clone)]
pub struct ActionFilter {
    skipped: HashSet<String>,
    seen: BTreeMap<String, u64>,
}

impl ActionFilter {
    pub fn new(skipped: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            skipped: skipped.into_iter().map(Into::into).collect(),
            seen: BTreeMap::new(),
        }
    }

    pub fn skip_action(&mut self, action: impl Into<String>) {
        self.skipped.insert(action.into());
    }

    pub fn allow_action(&mut self, action: &str) -> bool {
        self.skipped.remove(action)
    }

    pub fn is_skipped(&self, action: &str) -> bool {
        self.skipped.contains(action)
    }

    pub fn should_skip(&mut self, record: &ActionRecord) -> bool {
        *self.seen.entry(record.action().to_string()).or_insert(0) += 1;
        self.skipped.contains(record.action())
    }

    /// Verb counts in name order.
    pub fn seen_actions(&self) -> &BTreeMap<String, u64> {
        &self.seen
    }
}
