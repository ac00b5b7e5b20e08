use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::atomic_io::write_text_atomic;
use super::output::{SceneCapture, Sink, SinkError};

/// Line-oriented text output with step captures written as JSON files.
#[derive(Debug)]
pub struct TextFileSink {
    output_path: PathBuf,
    capture_dir: PathBuf,
    writer: Option<BufWriter<File>>,
    writing_enabled: bool,
    allow_empty_lines: bool,
}

impl TextFileSink {
    /// Captures go to a `captures` directory next to the output file.
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        let output_path = output_path.into();
        let capture_dir = output_path
            .parent()
            .map(|parent| parent.join("captures"))
            .unwrap_or_else(|| PathBuf::from("captures"));
        Self {
            output_path,
            capture_dir,
            writer: None,
            writing_enabled: true,
            allow_empty_lines: false,
        }
    }

    /// A sink that accepts everything and writes nothing.
    pub fn disabled() -> Self {
        Self {
            writing_enabled: false,
            ..Self::new(PathBuf::new())
        }
    }

    pub fn with_capture_dir(mut self, capture_dir: impl Into<PathBuf>) -> Self {
        self.capture_dir = capture_dir.into();
        self
    }

    pub fn with_allow_empty_lines(mut self, allow: bool) -> Self {
        self.allow_empty_lines = allow;
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn capture_path(&self, name: &str) -> PathBuf {
        self.capture_dir.join(format!("{name}.json"))
    }

    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        if line.is_empty() && !self.allow_empty_lines {
            return Ok(());
        }
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        writeln!(writer, "{line}")
            .and_then(|()| writer.flush())
            .map_err(|source| SinkError::Write {
                path: self.output_path.clone(),
                source,
            })
    }
}

impl Sink for TextFileSink {
    fn open(&mut self, header: &str) -> Result<(), SinkError> {
        if !self.writing_enabled || self.writer.is_some() {
            return Ok(());
        }
        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| SinkError::Open {
                    path: self.output_path.clone(),
                    source,
                })?;
            }
        }
        let file = File::create(&self.output_path).map_err(|source| SinkError::Open {
            path: self.output_path.clone(),
            source,
        })?;
        self.writer = Some(BufWriter::new(file));
        info!(path = %self.output_path.display(), "sink_opened");
        self.write_line(header)
    }

    fn is_opened(&self) -> bool {
        !self.writing_enabled || self.writer.is_some()
    }

    fn write(&mut self, line: &str) -> Result<(), SinkError> {
        self.write_line(line)
    }

    fn close(&mut self, footer: &str) -> Result<(), SinkError> {
        if self.writer.is_none() {
            return Ok(());
        }
        let result = self.write_line(footer);
        self.writer = None;
        info!(path = %self.output_path.display(), "sink_closed");
        result
    }

    /// Existing captures are left untouched.
    fn capture_auxiliary(&mut self, name: &str, capture: &SceneCapture) -> Result<(), SinkError> {
        if !self.writing_enabled {
            return Ok(());
        }
        let path = self.capture_path(name);
        if path.exists() {
            debug!(path = %path.display(), "capture_exists_skipped");
            return Ok(());
        }
        let json = serde_json::to_string_pretty(capture).map_err(|source| {
            SinkError::EncodeCapture {
                name: name.to_string(),
                source,
            }
        })?;
        write_text_atomic(&path, &json).map_err(|source| SinkError::Write { path, source })
    }
}
