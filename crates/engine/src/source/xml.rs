use std::borrow::Cow;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use roxmltree::{Document, Node};
use tracing::{debug, info};

use super::{LogSource, LogSourceError, RecordWindow};
use crate::record::{
    ActionRecord, RawActionFields, EVENT_ELEMENT, LOG_ROOT, STATE_ACTION, START_STATE_ACTION,
};

#[derive(Debug, Clone)]
enum XmlOrigin {
    File(PathBuf),
    Text(String),
}

/// Log source over an XML document of `<Event>` elements under `<Log>`.
/// The whole document is parsed on load; records are built as the window
/// advances.
#[derive(Debug)]
pub struct XmlLogSource {
    origin: XmlOrigin,
    pending: VecDeque<RawActionFields>,
    window: RecordWindow,
    loaded: bool,
}

impl XmlLogSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::with_origin(XmlOrigin::File(path.into()))
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self::with_origin(XmlOrigin::Text(text.into()))
    }

    fn with_origin(origin: XmlOrigin) -> Self {
        Self {
            origin,
            pending: VecDeque::new(),
            window: RecordWindow::default(),
            loaded: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    fn pull(&mut self) -> Option<Arc<ActionRecord>> {
        self.pending
            .pop_front()
            .map(|fields| Arc::new(ActionRecord::from_fields(fields)))
    }
}

impl LogSource for XmlLogSource {
    fn load(&mut self) -> Result<(), LogSourceError> {
        let events = match &self.origin {
            XmlOrigin::File(path) => {
                let raw = read_log_file(path)?;
                parse_log_events(&raw, &path.display().to_string())?
            }
            XmlOrigin::Text(raw) => parse_log_events(raw, "<inline>")?,
        };
        info!(event_count = events.len(), "log_loaded");

        self.pending = events.into();
        self.window.reset();
        let first = self.pull();
        self.window.shift(first);
        self.loaded = true;
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn advance(&mut self) -> Arc<ActionRecord> {
        let incoming = self.pull();
        self.window.shift(incoming)
    }

    fn window(&self) -> &RecordWindow {
        &self.window
    }
}

fn read_log_file(path: &Path) -> Result<String, LogSourceError> {
    fs::read_to_string(path).map_err(|source| LogSourceError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses a log document into raw events, in file order, with standalone
/// state events folded into the action that shares their transaction.
pub fn parse_log_events(raw: &str, origin: &str) -> Result<Vec<RawActionFields>, LogSourceError> {
    let body = normalize_log_root(raw);
    let doc = Document::parse(&body).map_err(|error| LogSourceError::Malformed {
        origin: origin.to_string(),
        line: error.pos().row,
        column: error.pos().col,
        message: error.to_string(),
    })?;

    let events = doc
        .root_element()
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == EVENT_ELEMENT)
        .map(|node| read_event(&body, node))
        .collect::<Vec<_>>();
    Ok(pair_state_events(events))
}

/// Accepts a bare sequence of events or a log whose closing tag was never
/// written, and re-roots both under `<Log>`.
fn normalize_log_root(raw: &str) -> Cow<'_, str> {
    let mut body = raw.trim();
    if body.starts_with("<?xml") {
        if let Some(end) = body.find("?>") {
            body = body[end + 2..].trim_start();
        }
    }
    let open = format!("<{LOG_ROOT}>");
    let close = format!("</{LOG_ROOT}>");
    if body.starts_with(&open) {
        if body.ends_with(&close) {
            Cow::Borrowed(body)
        } else {
            debug!("log_missing_close_tag");
            Cow::Owned(format!("{body}{close}"))
        }
    } else {
        Cow::Owned(format!("{open}{body}{close}"))
    }
}

fn read_event(input: &str, node: Node<'_, '_>) -> RawActionFields {
    let mut fields = RawActionFields::default();
    for field in node.children().filter(|child| child.is_element()) {
        let value = field_payload(input, field);
        match field.tag_name().name() {
            "Time" => fields.time = value,
            "SessionID" => fields.session_id = value,
            "UserID" => fields.user_id = value,
            "TransactionID" => fields.transaction_id = value,
            "LevelName" => fields.level_name = value,
            "AttemptNumber" => fields.attempt_number = value,
            "Selection" => fields.selection = value,
            "Action" => fields.action = value,
            "Input" => fields.input = value,
            "State" => fields.state = value,
            _ => {}
        }
    }
    fields
}

/// Element children are kept as their source markup; plain text is
/// unescaped and trimmed.
fn field_payload(input: &str, field: Node<'_, '_>) -> String {
    let mut elements = field.children().filter(|child| child.is_element());
    match elements.next() {
        Some(first) => {
            let last = elements.last().unwrap_or(first);
            input[first.range().start..last.range().end].to_string()
        }
        None => field
            .children()
            .filter_map(|child| child.text())
            .collect::<String>()
            .trim()
            .to_string(),
    }
}

fn pair_state_events(events: Vec<RawActionFields>) -> Vec<RawActionFields> {
    let mut paired = Vec::with_capacity(events.len());
    let mut events = events.into_iter().peekable();
    while let Some(mut event) = events.next() {
        if event.action == STATE_ACTION && !event.transaction_id.is_empty() {
            if let Some(following) = events.peek_mut() {
                let shares_transaction = following.transaction_id == event.transaction_id
                    && following.state.is_empty()
                    && following.action != STATE_ACTION;
                if shares_transaction {
                    following.state = std::mem::take(&mut event.input);
                    continue;
                }
            }
        }
        let carries_own_state = event.action == STATE_ACTION || event.action == START_STATE_ACTION;
        if carries_own_state && event.state.is_empty() {
            event.state = event.input.clone();
        }
        paired.push(event);
    }
    paired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::format_log;
    use tempfile::TempDir;

    fn event(action: &str, transaction: &str, input: &str) -> RawActionFields {
        RawActionFields {
            selection: "Ball".to_string(),
            action: action.to_string(),
            input: input.to_string(),
            time: "2021-06-01 12:00:00.250".to_string(),
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            transaction_id: transaction.to_string(),
            level_name: "Level1".to_string(),
            attempt_number: "1".to_string(),
            ..RawActionFields::default()
        }
    }

    const OBJECT: &str = "<Object><Name>Box</Name><Transform><Position><X>1</X><Y>2</Y></Position><Rotation>0</Rotation></Transform></Object>";

    #[test]
    fn reads_all_fields_in_order() {
        let events = vec![event("Move", "t1", "left"), event("Jump", "t2", "")];
        let raw = format_log(&events);

        let parsed = parse_log_events(&raw, "test").expect("parse");
        assert_eq!(parsed, events);
    }

    #[test]
    fn markup_payloads_are_kept_verbatim() {
        let events = vec![event("Place", "t1", OBJECT)];
        let parsed = parse_log_events(&format_log(&events), "test").expect("parse");
        assert_eq!(parsed[0].input, OBJECT);
    }

    #[test]
    fn state_event_is_folded_into_following_action() {
        let state_payload = format!("<State>{OBJECT}</State>");
        let events = vec![
            event("State", "t1", &state_payload),
            event("Place", "t1", "drop"),
            event("Move", "t2", "left"),
        ];
        let parsed = parse_log_events(&format_log(&events), "test").expect("parse");

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].action, "Place");
        assert_eq!(parsed[0].state, state_payload);
        assert!(parsed[1].state.is_empty());
    }

    #[test]
    fn unpaired_state_events_keep_their_own_payload() {
        let payload = format!("<StartState>{OBJECT}</StartState>");
        let events = vec![event("StartState", "t0", &payload), event("Move", "t1", "x")];
        let parsed = parse_log_events(&format_log(&events), "test").expect("parse");

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].state, payload);
        let record = ActionRecord::from_fields(parsed[0].clone());
        let snapshot = record.state_snapshot().expect("snapshot");
        assert_eq!(snapshot.children_named("Object").count(), 1);
    }

    #[test]
    fn tolerates_missing_root_and_unclosed_log() {
        let one = crate::record::format_event(&event("Move", "t1", "a"));
        let two = crate::record::format_event(&event("Move", "t2", "b"));

        let bare = format!("{one}\n{two}");
        assert_eq!(parse_log_events(&bare, "bare").expect("bare").len(), 2);

        let unclosed = format!("<?xml version=\"1.0\"?>\n<Log>\n{one}\n{two}\n");
        assert_eq!(parse_log_events(&unclosed, "unclosed").expect("unclosed").len(), 2);
    }

    #[test]
    fn event_without_attempt_number_keeps_its_timestamp() {
        let raw = "<Log><Event>\
            <Time>2021-06-01 12:00:00.250</Time><SessionID>s1</SessionID>\
            <UserID>u1</UserID><TransactionID>t1</TransactionID>\
            <LevelName>Level1</LevelName><Selection>Ball</Selection>\
            <Action>Move</Action><Input>left</Input>\
            </Event></Log>";
        let mut source = XmlLogSource::from_text(raw);
        source.load().expect("load");

        let record = source.advance();
        assert!(record.has_valid_timestamp());
        assert_eq!(
            crate::record::format_time(record.timestamp()),
            "2021-06-01 12:00:00.250"
        );
        assert_eq!(record.attempt_number(), -1);
        assert_eq!(record.selection(), "Ball");
    }

    #[test]
    fn malformed_log_reports_location() {
        let err = parse_log_events("<Log><Event><Time>x</Event></Log>", "bad").expect_err("err");
        match err {
            LogSourceError::Malformed { origin, line, .. } => {
                assert_eq!(origin, "bad");
                assert!(line >= 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn loads_from_file_and_prefetches_first_record() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("log.xml");
        let events = vec![event("Move", "t1", "a"), event("Move", "t2", "b")];
        fs::write(&path, format_log(&events)).expect("write");

        let mut source = XmlLogSource::from_path(&path);
        source.load().expect("load");
        assert!(source.is_loaded());
        assert!(source.current().is_null());
        assert_eq!(source.peek_next().transaction_id(), "t1");
        assert_eq!(source.remaining(), 1);

        assert_eq!(source.advance().transaction_id(), "t1");
        assert!(source.is_new_attempt());
        assert_eq!(source.advance().transaction_id(), "t2");
        assert!(!source.is_new_attempt());
        assert!(!source.has_next());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let temp = TempDir::new().expect("temp");
        let mut source = XmlLogSource::from_path(temp.path().join("absent.xml"));
        assert!(matches!(source.load(), Err(LogSourceError::Read { .. })));
        assert!(!source.is_loaded());
    }
}
