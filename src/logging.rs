//! Exchange journal: every request the proxy handles and the response it sent,
//! kept in a bounded ring and mirrored to a JSONL file.

use crate::error::ProxyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{mpsc, Arc, Mutex};
use uuid::Uuid;

const MAX_LOG_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Request,
    Response,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeEntry {
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    pub route: String,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ExchangeEntry {
    fn new(request_id: Uuid, route: &str, direction: Direction) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id,
            route: route.to_string(),
            direction,
            status: None,
            body: None,
            note: None,
        }
    }
}

enum WriterCommand {
    Append(String),
    Rewrite(Vec<String>, mpsc::Sender<std::io::Result<()>>),
    Flush(mpsc::Sender<()>),
}

/// The in-memory ring. File IO happens on a dedicated writer thread fed
/// through a channel, so recording never blocks on disk.
pub struct Journal {
    entries: VecDeque<ExchangeEntry>,
    writer: mpsc::Sender<WriterCommand>,
}

impl Journal {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut entries = VecDeque::with_capacity(MAX_LOG_ENTRIES);

        if file_path.exists() {
            let reader = BufReader::new(File::open(&file_path)?);
            for line in reader.lines().map_while(std::result::Result::ok) {
                if let Ok(entry) = serde_json::from_str::<ExchangeEntry>(&line) {
                    if entries.len() >= MAX_LOG_ENTRIES {
                        entries.pop_front();
                    }
                    entries.push_back(entry);
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;

        let (writer, commands) = mpsc::channel();
        std::thread::Builder::new()
            .name("journal-writer".to_string())
            .spawn(move || run_writer(&file_path, BufWriter::new(file), &commands))?;

        Ok(Self { entries, writer })
    }

    pub fn record(&mut self, entry: ExchangeEntry) {
        if let Ok(json) = serde_json::to_string(&entry) {
            let _ = self.writer.send(WriterCommand::Append(json));
        }
        if self.entries.len() >= MAX_LOG_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn recent(&self, limit: usize) -> Vec<ExchangeEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Queue a rewrite of the file from the ring. Appends recorded afterwards
    /// land after the rewrite.
    fn request_compaction(&self) -> mpsc::Receiver<std::io::Result<()>> {
        let lines = self
            .entries
            .iter()
            .filter_map(|entry| serde_json::to_string(entry).ok())
            .collect();
        let (reply, done) = mpsc::channel();
        let _ = self.writer.send(WriterCommand::Rewrite(lines, reply));
        done
    }

    fn request_flush(&self) -> mpsc::Receiver<()> {
        let (reply, done) = mpsc::channel();
        let _ = self.writer.send(WriterCommand::Flush(reply));
        done
    }
}

fn run_writer(path: &Path, mut writer: BufWriter<File>, commands: &mpsc::Receiver<WriterCommand>) {
    for command in commands {
        match command {
            WriterCommand::Append(line) => {
                if let Err(e) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
                    tracing::warn!(path = %path.display(), error = %e, "journal write failed");
                }
            }
            WriterCommand::Rewrite(lines, reply) => {
                let result = rewrite(path, &lines).map(|fresh| writer = fresh);
                let _ = reply.send(result);
            }
            WriterCommand::Flush(reply) => {
                let _ = writer.flush();
                let _ = reply.send(());
            }
        }
    }
}

fn rewrite(path: &Path, lines: &[String]) -> std::io::Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut out = BufWriter::new(file);
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()?;

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

#[derive(Clone)]
pub struct SharedLogger {
    journal: Arc<Mutex<Journal>>,
    record_bodies: bool,
}

impl SharedLogger {
    pub fn new(file_path: impl AsRef<Path>, record_bodies: bool) -> std::io::Result<Self> {
        Ok(Self {
            journal: Arc::new(Mutex::new(Journal::new(file_path)?)),
            record_bodies,
        })
    }

    fn record(&self, entry: ExchangeEntry) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.record(entry);
        }
    }

    pub fn request(&self, request_id: Uuid, route: &str, body: Option<&serde_json::Value>) {
        let mut entry = ExchangeEntry::new(request_id, route, Direction::Request);
        if self.record_bodies {
            entry.body = body.cloned();
        }
        self.record(entry);
    }

    pub fn response<T: Serialize>(&self, request_id: Uuid, route: &str, status: u16, body: &T) {
        let mut entry = ExchangeEntry::new(request_id, route, Direction::Response);
        entry.status = Some(status);
        if self.record_bodies {
            entry.body = serde_json::to_value(body).ok();
        }
        self.record(entry);
    }

    /// A response recorded by summary only.
    pub fn response_note(&self, request_id: Uuid, route: &str, status: u16, note: impl Into<String>) {
        let mut entry = ExchangeEntry::new(request_id, route, Direction::Response);
        entry.status = Some(status);
        entry.note = Some(note.into());
        self.record(entry);
    }

    pub fn failure(&self, request_id: Uuid, route: &str, err: &ProxyError) {
        self.response_note(request_id, route, err.status_code().as_u16(), err.to_string());
    }

    pub fn recent(&self, limit: usize) -> Vec<ExchangeEntry> {
        self.journal
            .lock()
            .map(|j| j.recent(limit))
            .unwrap_or_default()
    }

    /// Rewrite the file so it holds only what is still in the ring.
    pub fn compact(&self) -> std::io::Result<()> {
        let done = match self.journal.lock() {
            Ok(journal) => journal.request_compaction(),
            Err(_) => return Ok(()),
        };
        done.recv().unwrap_or(Ok(()))
    }

    /// Block until every entry recorded so far has reached the file.
    pub fn flush(&self) {
        let done = match self.journal.lock() {
            Ok(journal) => journal.request_flush(),
            Err(_) => return,
        };
        let _ = done.recv();
    }
}
