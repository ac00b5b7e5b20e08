mod memory;
mod window;
mod xml;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::record::ActionRecord;

pub use memory::VecLogSource;
pub use window::RecordWindow;
pub use xml::{parse_log_events, XmlLogSource};

#[derive(Debug, Error)]
pub enum LogSourceError {
    #[error("failed to read log {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed log {origin} at {line}:{column}: {message}")]
    Malformed {
        origin: String,
        line: u32,
        column: u32,
        message: String,
    },
}

/// Ordered, forward-only stream of recorded actions with a one-record
/// lookahead. Backends supply loading and the next record; window queries
/// are shared.
pub trait LogSource {
    /// Reads the backing store and positions the window before the first
    /// record. Calling it again restarts from the beginning.
    fn load(&mut self) -> Result<(), LogSourceError>;

    fn is_loaded(&self) -> bool;

    /// Moves to the next record and returns it. At the end of the stream the
    /// current record becomes the null record.
    fn advance(&mut self) -> Arc<ActionRecord>;

    fn window(&self) -> &RecordWindow;

    fn current(&self) -> &Arc<ActionRecord> {
        self.window().current()
    }

    fn previous(&self) -> &Arc<ActionRecord> {
        self.window().previous()
    }

    fn peek_next(&self) -> &Arc<ActionRecord> {
        self.window().next()
    }

    fn last_start_state(&self) -> &Arc<ActionRecord> {
        self.window().last_start_state()
    }

    fn has_next(&self) -> bool {
        self.window().has_next()
    }

    fn is_new_attempt(&self) -> bool {
        self.window().is_new_attempt()
    }
}
