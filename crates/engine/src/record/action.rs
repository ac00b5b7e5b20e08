use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::NaiveDateTime;
use tracing::warn;

use super::snapshot::SnapshotNode;

/// Timestamp layout used by recorded logs, millisecond precision, UTC.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub const STATE_ACTION: &str = "State";
pub const START_STATE_ACTION: &str = "StartState";
pub const OBJECT_ELEMENT: &str = "Object";
pub const NAME_ELEMENT: &str = "Name";

const INPUT_ROOT: &str = "Input";
const STATE_ROOT: &str = "State";
const TRANSFORM_MARKER: &str = "<Transform>";
const OBJECT_MARKER: &str = "<Object>";
const STATE_WRAPPERS: [&str; 2] = [STATE_ACTION, START_STATE_ACTION];

/// Unparsed field values for one recorded action, as a log backend yields them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawActionFields {
    pub selection: String,
    pub action: String,
    pub input: String,
    pub state: String,
    pub time: String,
    pub user_id: String,
    pub session_id: String,
    pub transaction_id: String,
    pub level_name: String,
    pub attempt_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttemptKey {
    pub user_id: String,
    pub session_id: String,
    pub level_name: String,
    pub attempt_number: i32,
}

/// One recorded user action. Immutable once built; snapshots are parsed on
/// first access and cached.
#[derive(Debug)]
pub struct ActionRecord {
    selection: String,
    action: String,
    raw_input: String,
    raw_state: String,
    input_snapshot: OnceLock<Option<SnapshotNode>>,
    state_snapshot: OnceLock<Option<SnapshotNode>>,
    timestamp: NaiveDateTime,
    user_id: String,
    session_id: String,
    transaction_id: String,
    level_name: String,
    attempt_number: i32,
}

impl ActionRecord {
    /// The shared "no record" sentinel. Compare with `is_null`.
    pub fn null() -> Arc<ActionRecord> {
        static NULL_ACTION: OnceLock<Arc<ActionRecord>> = OnceLock::new();
        let null = NULL_ACTION
            .get_or_init(|| Arc::new(ActionRecord::from_fields(RawActionFields::default())));
        Arc::clone(null)
    }

    pub fn is_null(&self) -> bool {
        std::ptr::eq(self, Arc::as_ptr(&Self::null()))
    }

    /// Builds a record. Unparseable time or attempt number never fails: each
    /// falls back on its own, to the latest representable time or attempt `-1`.
    pub fn from_fields(fields: RawActionFields) -> Self {
        let timestamp = parse_timestamp(&fields.time).unwrap_or(NaiveDateTime::MAX);
        let attempt_number = fields.attempt_number.trim().parse::<i32>().unwrap_or(-1);
        Self {
            selection: fields.selection,
            action: fields.action,
            raw_input: fields.input,
            raw_state: fields.state,
            input_snapshot: OnceLock::new(),
            state_snapshot: OnceLock::new(),
            timestamp,
            user_id: fields.user_id,
            session_id: fields.session_id,
            transaction_id: fields.transaction_id,
            level_name: fields.level_name,
            attempt_number,
        }
    }

    pub fn selection(&self) -> &str {
        &self.selection
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn raw_input(&self) -> &str {
        &self.raw_input
    }

    pub fn raw_state(&self) -> &str {
        &self.raw_state
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn has_valid_timestamp(&self) -> bool {
        self.timestamp != NaiveDateTime::MAX
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn level_name(&self) -> &str {
        &self.level_name
    }

    pub fn attempt_number(&self) -> i32 {
        self.attempt_number
    }

    pub fn is_start_state(&self) -> bool {
        !self.is_null() && self.action == START_STATE_ACTION
    }

    pub fn attempt_key(&self) -> AttemptKey {
        AttemptKey {
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            level_name: self.level_name.clone(),
            attempt_number: self.attempt_number,
        }
    }

    /// Same user, session, level and attempt. The null record only matches
    /// itself.
    pub fn is_same_attempt(&self, other: &ActionRecord) -> bool {
        if self.is_null() || other.is_null() {
            return std::ptr::eq(self, other);
        }
        self.user_id == other.user_id
            && self.session_id == other.session_id
            && self.level_name == other.level_name
            && self.attempt_number == other.attempt_number
    }

    /// Entities carried by the action input, rooted at `<Input>`. Present only
    /// when the raw input holds a transform fragment.
    pub fn input_snapshot(&self) -> Option<&SnapshotNode> {
        self.input_snapshot
            .get_or_init(|| parse_input_payload(&self.raw_input, &self.transaction_id))
            .as_ref()
    }

    /// Scene entities captured with the action, rooted at `<State>`.
    pub fn state_snapshot(&self) -> Option<&SnapshotNode> {
        self.state_snapshot
            .get_or_init(|| parse_state_payload(&self.raw_state, &self.transaction_id))
            .as_ref()
    }

    pub fn has_input_objects(&self) -> bool {
        self.input_snapshot().is_some()
    }
}

impl fmt::Display for ActionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SELECTION:{} ACTION:{} INPUT:{} STATE:{}",
            self.selection, self.action, self.raw_input, self.raw_state
        )
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIME_FORMAT).ok()
}

fn parse_input_payload(raw: &str, transaction_id: &str) -> Option<SnapshotNode> {
    if !raw.contains(TRANSFORM_MARKER) {
        return None;
    }
    let fragment: Cow<'_, str> = if raw.contains(OBJECT_MARKER) {
        Cow::Borrowed(raw)
    } else {
        Cow::Owned(format!("<{OBJECT_ELEMENT}>{raw}</{OBJECT_ELEMENT}>"))
    };
    match SnapshotNode::parse_rooted(INPUT_ROOT, &fragment) {
        Ok(node) => Some(node),
        Err(error) => {
            warn!(
                payload = "input",
                transaction_id = %transaction_id,
                error = %error,
                "snapshot_parse_failed"
            );
            None
        }
    }
}

fn parse_state_payload(raw: &str, transaction_id: &str) -> Option<SnapshotNode> {
    if !raw.contains(OBJECT_MARKER) {
        return None;
    }
    match SnapshotNode::parse_rooted(STATE_ROOT, raw) {
        Ok(mut node) => {
            node.unwrap_single(&STATE_WRAPPERS);
            Some(node)
        }
        Err(error) => {
            warn!(
                payload = "state",
                transaction_id = %transaction_id,
                error = %error,
                "snapshot_parse_failed"
            );
            None
        }
    }
}
