use std::sync::Arc;

use super::{LogSource, LogSourceError, RecordWindow};
use crate::record::{ActionRecord, RawActionFields};

/// Log source over rows already in memory, such as the result of a database
/// query.
#[derive(Debug, Default)]
pub struct VecLogSource {
    records: Vec<Arc<ActionRecord>>,
    cursor: usize,
    window: RecordWindow,
    loaded: bool,
}

impl VecLogSource {
    pub fn from_rows(rows: impl IntoIterator<Item = RawActionFields>) -> Self {
        Self::from_records(
            rows.into_iter()
                .map(|row| Arc::new(ActionRecord::from_fields(row))),
        )
    }

    pub fn from_records(records: impl IntoIterator<Item = Arc<ActionRecord>>) -> Self {
        Self {
            records: records.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn pull(&mut self) -> Option<Arc<ActionRecord>> {
        let record = self.records.get(self.cursor).cloned();
        if record.is_some() {
            self.cursor += 1;
        }
        record
    }
}

impl LogSource for VecLogSource {
    fn load(&mut self) -> Result<(), LogSourceError> {
        self.cursor = 0;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn row(selection: &str) -> RawActionFields {
        RawActionFields {
            selection: selection.to_string(),
            action: "Move".to_string(),
            time: "2020-01-01 00:00:00.000".to_string(),
            attempt_number: "1".to_string(),
            ..RawActionFields::default()
        }
    }

    #[test]
    fn iterates_rows_in_order_with_lookahead() {
        let mut source = VecLogSource::from_rows([row("a"), row("b")]);
        assert!(!source.is_loaded());
        source.load().expect("load");

        assert!(source.current().is_null());
        assert!(source.has_next());
        assert_eq!(source.peek_next().selection(), "a");

        assert_eq!(source.advance().selection(), "a");
        assert_eq!(source.peek_next().selection(), "b");
        assert_eq!(source.advance().selection(), "b");
        assert!(!source.has_next());
        assert!(source.advance().is_null());
    }

    #[test]
    fn reload_restarts_from_first_record() {
        let mut source = VecLogSource::from_rows([row("a"), row("b")]);
        source.load().expect("load");
        source.advance();
        source.advance();
        source.load().expect("reload");
        assert_eq!(source.advance().selection(), "a");
    }

    #[test]
    fn empty_source_has_nothing_next() {
        let mut source = VecLogSource::default();
        source.load().expect("load");
        assert!(source.is_empty());
        assert!(!source.has_next());
    }
}
