use std::mem;
use std::sync::Arc;

use crate::record::ActionRecord;

/// Previous/current/next cursor shared by every log backend. After a reset,
/// all three slots hold the null record.
#[derive(Debug, Clone)]
pub struct RecordWindow {
    previous: Arc<ActionRecord>,
    current: Arc<ActionRecord>,
    next: Arc<ActionRecord>,
    last_start_state: Arc<ActionRecord>,
}

impl Default for RecordWindow {
    fn default() -> Self {
        Self {
            previous: ActionRecord::null(),
            current: ActionRecord::null(),
            next: ActionRecord::null(),
            last_start_state: ActionRecord::null(),
        }
    }
}

impl RecordWindow {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Slides the window one record forward, pulling `incoming` into the next
    /// slot. Returns the new current record.
    pub fn shift(&mut self, incoming: Option<Arc<ActionRecord>>) -> Arc<ActionRecord> {
        let incoming = incoming.unwrap_or_else(ActionRecord::null);
        let current = mem::replace(&mut self.next, incoming);
        self.previous = mem::replace(&mut self.current, current);
        if self.current.is_start_state() {
            self.last_start_state = Arc::clone(&self.current);
        }
        Arc::clone(&self.current)
    }

    pub fn previous(&self) -> &Arc<ActionRecord> {
        &self.previous
    }

    pub fn current(&self) -> &Arc<ActionRecord> {
        &self.current
    }

    pub fn next(&self) -> &Arc<ActionRecord> {
        &self.next
    }

    pub fn last_start_state(&self) -> &Arc<ActionRecord> {
        &self.last_start_state
    }

    pub fn has_next(&self) -> bool {
        !self.next.is_null()
    }

    pub fn is_new_attempt(&self) -> bool {
        !self.current.is_null() && !self.current.is_same_attempt(&self.previous)
    }
}
