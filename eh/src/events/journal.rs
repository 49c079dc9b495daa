//! Event journal - appends hub events to a JSONL file
//!
//! One line per event, each an [`EventLogEntry`]. The journal is append-only
//! across restarts so a room's history survives the process.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::types::{EventLogEntry, HubEvent};

/// Writes every event it receives to a JSONL file
pub struct EventJournal {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl EventJournal {
    /// Open (or create) the journal at `path`
    pub fn open(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "EventJournal::open: called");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Default journal location under the local data directory
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("escapehub")
            .join("events.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event
    pub fn write_event(&mut self, event: &HubEvent) -> eyre::Result<()> {
        let entry = EventLogEntry::new(event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Consume events until the bus closes; returns how many were written
    pub async fn run(mut self, mut rx: broadcast::Receiver<HubEvent>) -> u64 {
        info!(path = %self.path.display(), "Event journal started");

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.write_event(&event) {
                        error!(event_type = event.event_type(), error = %e, "EventJournal: failed to write event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventJournal: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventJournal: channel closed, shutting down");
                    break;
                }
            }
        }

        let _ = self.writer.flush();
        self.written
    }
}

/// Read a journal back
///
/// Unparseable lines are skipped with a warning.
pub fn read_journal(path: impl AsRef<Path>) -> eyre::Result<Vec<EventLogEntry>> {
    let path = path.as_ref();
    debug!(?path, "read_journal: called");

    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line, error = %e, "read_journal: failed to parse line"),
        }
    }
    Ok(entries)
}
