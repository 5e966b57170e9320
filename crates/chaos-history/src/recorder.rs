//! Concurrency-safe history writer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chaos_core::{InvokeError, ProcessId};
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::{HistoryError, HistoryRecord, Outcome, Result};

/// Append-only history writer shared by all workers of a run.
///
/// Records are encoded outside the lock and written as whole lines under it,
/// so concurrent callers never interleave. Each record is flushed to the OS
/// before the call returns; `close` additionally fsyncs. After `close` every
/// call fails with [`HistoryError::Closed`].
#[derive(Debug)]
pub struct Recorder {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl Recorder {
    /// Creates (or truncates) the history file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| HistoryError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "history recorder created");

        Ok(Self {
            path,
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the Invoke record for `proc_id`.
    pub fn record_request<T: Serialize + ?Sized>(
        &self,
        proc_id: ProcessId,
        node: &str,
        request: &T,
    ) -> Result<()> {
        let record = HistoryRecord::Invoke {
            proc_id,
            node: node.to_string(),
            timestamp: Utc::now(),
            request: serde_json::to_value(request)?,
        };
        self.append(&record)
    }

    /// Writes the Return record for `proc_id`.
    pub fn record_response<R: Serialize>(
        &self,
        proc_id: ProcessId,
        response: &std::result::Result<R, InvokeError>,
    ) -> Result<()> {
        let outcome = match response {
            Ok(value) => Outcome::Ok(serde_json::to_value(value)?),
            Err(e) => Outcome::Error(e.clone()),
        };
        let record = HistoryRecord::Return {
            proc_id,
            timestamp: Utc::now(),
            outcome,
        };
        self.append(&record)
    }

    /// Flushes and fsyncs the file; no further writes are accepted.
    pub fn close(&self) -> Result<()> {
        let mut guard = self
            .writer
            .lock()
            .map_err(|_| HistoryError::Poisoned(self.path.clone()))?;

        let writer = guard
            .take()
            .ok_or_else(|| HistoryError::Closed(self.path.clone()))?;

        let file = writer.into_inner().map_err(|e| HistoryError::Io {
            path: self.path.clone(),
            source: e.into_error(),
        })?;
        file.sync_all().map_err(|source| self.io(source))?;

        debug!(path = %self.path.display(), "history recorder closed");
        Ok(())
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.writer.lock().map_or(true, |guard| guard.is_none())
    }

    fn append(&self, record: &HistoryRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut guard = self
            .writer
            .lock()
            .map_err(|_| HistoryError::Poisoned(self.path.clone()))?;
        let writer = guard
            .as_mut()
            .ok_or_else(|| HistoryError::Closed(self.path.clone()))?;

        writer.write_all(&line).map_err(|source| self.io(source))?;
        writer.flush().map_err(|source| self.io(source))
    }

    fn io(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
