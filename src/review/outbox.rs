//! Durable outbox for persistence jobs
//!
//! Jobs are appended to a JSONL log before the controller moves on, so a
//! graded review survives a store outage or a crash. A background flusher
//! delivers them in order and retries with exponential backoff.
//!
//! Files:
//! - `{name}.jsonl`: one `OutboxEntry` per line, append-only
//! - `{name}.cursor`: sequence number of the last delivered entry
//! - `{name}.dead.jsonl`: jobs the store rejected outright
//! - `{name}.lock`: held while a flush pass runs, so two processes sharing
//!   the outbox never deliver the same entry twice

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::dispatch::PersistJob;
use super::gateway::PersistenceGateway;

#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OutboxError>;

/// A flush lock older than this belongs to a process that died mid-pass
const FLUSH_LOCK_STALE: Duration = Duration::from_secs(600);

/// A single outbox line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub seq: u64,
    pub enqueued_at: DateTime<Utc>,
    pub job: PersistJob,
}

/// A job the store refused, kept for inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub entry: OutboxEntry,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Outcome of one pass over the pending entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    pub delivered: usize,
    pub dead_lettered: usize,
    pub remaining: usize,
    /// Set when a transient failure stopped the pass
    pub blocked_by: Option<String>,
}

impl FlushReport {
    pub fn is_blocked(&self) -> bool {
        self.blocked_by.is_some()
    }
}

#[derive(Debug)]
enum FlusherMessage {
    /// New entries were appended
    Nudge,
    Shutdown,
}

struct Cursor {
    next_seq: u64,
    acked: u64,
}

pub struct Outbox {
    log_path: PathBuf,
    cursor_path: PathBuf,
    dead_path: PathBuf,
    lock_path: PathBuf,
    cursor: Mutex<Cursor>,
    notifier: Mutex<Option<mpsc::Sender<FlusherMessage>>>,
}

impl Outbox {
    /// Open (or create) the outbox whose log lives at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let cursor_path = path.with_extension("cursor");
        let dead_path = path.with_extension("dead.jsonl");
        let lock_path = path.with_extension("lock");

        let acked = read_cursor(&cursor_path)?;

        let last_seq = read_entries(path)?.iter().map(|e| e.seq).max().unwrap_or(0);

        Ok(Self {
            log_path: path.to_path_buf(),
            cursor_path,
            dead_path,
            lock_path,
            cursor: Mutex::new(Cursor {
                next_seq: last_seq.max(acked) + 1,
                acked,
            }),
            notifier: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Append a job and wake the flusher. Returns the entry's sequence number.
    pub fn append(&self, job: &PersistJob) -> Result<u64> {
        let seq = {
            let mut cursor = self.cursor.lock().unwrap();
            let entry = OutboxEntry {
                seq: cursor.next_seq,
                enqueued_at: Utc::now(),
                job: job.clone(),
            };
            append_line(&self.log_path, &serde_json::to_string(&entry)?)?;
            cursor.next_seq += 1;
            entry.seq
        };

        if let Some(sender) = self.notifier.lock().unwrap().as_ref() {
            let _ = sender.try_send(FlusherMessage::Nudge);
        }

        Ok(seq)
    }

    /// Entries not yet delivered, oldest first
    pub fn pending(&self) -> Result<Vec<OutboxEntry>> {
        let acked = self.cursor.lock().unwrap().acked;
        let mut entries: Vec<_> = read_entries(&self.log_path)?
            .into_iter()
            .filter(|e| e.seq > acked)
            .collect();
        entries.sort_by_key(|e| e.seq);
        Ok(entries)
    }

    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.pending()?.len())
    }

    /// Mark every entry up to and including `seq` as delivered
    pub fn ack(&self, seq: u64) -> Result<()> {
        let mut cursor = self.cursor.lock().unwrap();
        if seq <= cursor.acked {
            return Ok(());
        }
        fs::write(&self.cursor_path, seq.to_string())?;
        cursor.acked = seq;
        cursor.next_seq = cursor.next_seq.max(seq + 1);
        Ok(())
    }

    /// Pick up entries another process delivered since this one last looked
    fn reload_cursor(&self) -> Result<()> {
        let on_disk = read_cursor(&self.cursor_path)?;
        let mut cursor = self.cursor.lock().unwrap();
        if on_disk > cursor.acked {
            cursor.acked = on_disk;
            cursor.next_seq = cursor.next_seq.max(on_disk + 1);
        }
        Ok(())
    }

    /// Move a rejected entry out of the way so later entries can flow
    pub fn dead_letter(&self, entry: &OutboxEntry, error: &str) -> Result<()> {
        let letter = DeadLetter {
            entry: entry.clone(),
            error: error.to_string(),
            failed_at: Utc::now(),
        };
        append_line(&self.dead_path, &serde_json::to_string(&letter)?)?;
        self.ack(entry.seq)
    }

    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        read_lines(&self.dead_path)
    }

    /// Truncate the log once everything in it has been delivered
    pub fn compact(&self) -> Result<bool> {
        let cursor = self.cursor.lock().unwrap();
        if cursor.acked + 1 < cursor.next_seq {
            return Ok(false);
        }
        // Another process may have appended past what this one has seen
        if read_entries(&self.log_path)?.iter().any(|e| e.seq > cursor.acked) {
            return Ok(false);
        }
        if self.log_path.exists() {
            fs::write(&self.log_path, "")?;
        }
        Ok(true)
    }

    /// Deliver pending entries in order.
    ///
    /// Stops at the first transient failure so later jobs never overtake an
    /// earlier one. Rejected jobs are dead-lettered and skipped. If another
    /// process holds the flush lock nothing is delivered and the report is
    /// blocked.
    pub async fn flush_once(&self, gateway: &dyn PersistenceGateway) -> Result<FlushReport> {
        let Some(_lock) = FlushLock::acquire(&self.lock_path)? else {
            return Ok(FlushReport {
                remaining: self.pending_count()?,
                blocked_by: Some(format!("flush lock {} is held", self.lock_path.display())),
                ..FlushReport::default()
            });
        };
        self.reload_cursor()?;

        let pending = self.pending()?;
        let mut report = FlushReport::default();

        for (i, entry) in pending.iter().enumerate() {
            match entry.job.apply(gateway).await {
                Ok(()) => {
                    self.ack(entry.seq)?;
                    report.delivered += 1;
                }
                Err(e) if e.is_transient() => {
                    report.remaining = pending.len() - i;
                    report.blocked_by = Some(e.to_string());
                    return Ok(report);
                }
                Err(e) => {
                    log::error!(
                        "Outbox: store rejected {} (seq {}): {}",
                        entry.job.describe(),
                        entry.seq,
                        e,
                    );
                    self.dead_letter(entry, &e.to_string())?;
                    report.dead_lettered += 1;
                }
            }
        }

        self.compact()?;
        Ok(report)
    }

    fn set_notifier(&self, sender: Option<mpsc::Sender<FlusherMessage>>) {
        *self.notifier.lock().unwrap() = sender;
    }
}

/// Marker file that exists while one process runs a flush pass
struct FlushLock {
    path: PathBuf,
}

impl FlushLock {
    /// Take the lock, or `None` if a live holder has it
    fn acquire(path: &Path) -> Result<Option<Self>> {
        if let Some(lock) = Self::try_create(path)? {
            return Ok(Some(lock));
        }

        let age = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => modified.elapsed().unwrap_or_default(),
            // Released between our attempt and the check
            Err(e) if e.kind() == ErrorKind::NotFound => return Self::try_create(path),
            Err(e) => return Err(e.into()),
        };
        if age < FLUSH_LOCK_STALE {
            return Ok(None);
        }

        log::warn!("Outbox: removing stale flush lock {} ({:?} old)", path.display(), age);
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Self::try_create(path)
    }

    fn try_create(path: &Path) -> Result<Option<Self>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let lock = Self {
                    path: path.to_path_buf(),
                };
                writeln!(file, "{}", std::process::id())?;
                Ok(Some(lock))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for FlushLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Outbox: failed to release flush lock {}: {}", self.path.display(), e);
        }
    }
}

fn read_cursor(path: &Path) -> Result<u64> {
    if !path.exists() {
        return Ok(0);
    }
    Ok(fs::read_to_string(path)?.trim().parse::<u64>().unwrap_or_else(|e| {
        log::warn!("Unreadable outbox cursor {}: {}", path.display(), e);
        0
    }))
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}

fn read_entries(path: &Path) -> Result<Vec<OutboxEntry>> {
    read_lines(path)
}

fn read_lines<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(fs::File::open(path)?);
    let mut items = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(item) => items.push(item),
            // A torn final write after a crash lands here
            Err(e) => log::warn!("Outbox: skipping malformed line in {}: {}", path.display(), e),
        }
    }
    Ok(items)
}

/// Timing for the background flusher
#[derive(Debug, Clone, Copy)]
pub struct FlusherTiming {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Poll interval when nothing nudges the flusher
    pub flush_interval: Duration,
}

impl Default for FlusherTiming {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            flush_interval: Duration::from_secs(30),
        }
    }
}

/// Handle for a running outbox flusher
pub struct OutboxFlusher {
    sender: mpsc::Sender<FlusherMessage>,
    task: JoinHandle<()>,
}

impl OutboxFlusher {
    /// Ask for a flush now (ignored while backing off)
    pub fn nudge(&self) {
        let _ = self.sender.try_send(FlusherMessage::Nudge);
    }

    /// Make a final delivery attempt and stop the task
    pub async fn shutdown(self) {
        let _ = self.sender.send(FlusherMessage::Shutdown).await;
        if let Err(e) = self.task.await {
            log::error!("Outbox flusher task failed: {}", e);
        }
    }
}

/// Start the background task that drains the outbox into the gateway.
///
/// Must be called from within a Tokio runtime.
pub fn start_outbox_flusher(
    outbox: Arc<Outbox>,
    gateway: Arc<dyn PersistenceGateway>,
    timing: FlusherTiming,
) -> OutboxFlusher {
    let (tx, rx) = mpsc::channel(16);
    outbox.set_notifier(Some(tx.clone()));

    let task = tokio::spawn(async move {
        flusher_loop(Arc::clone(&outbox), gateway, timing, rx).await;
        outbox.set_notifier(None);
    });

    OutboxFlusher { sender: tx, task }
}

async fn flusher_loop(
    outbox: Arc<Outbox>,
    gateway: Arc<dyn PersistenceGateway>,
    timing: FlusherTiming,
    mut rx: mpsc::Receiver<FlusherMessage>,
) {
    let mut backoff = timing.initial_backoff;

    log::info!("Outbox: flusher started for {}", outbox.path().display());

    loop {
        let backing_off = match outbox.flush_once(gateway.as_ref()).await {
            Ok(report) => {
                if report.delivered > 0 || report.dead_lettered > 0 {
                    log::debug!(
                        "Outbox: delivered {}, dead-lettered {}",
                        report.delivered,
                        report.dead_lettered,
                    );
                }
                match report.blocked_by {
                    Some(error) => {
                        log::warn!(
                            "Outbox: delivery blocked ({}), {} entries waiting, retrying in {:?}",
                            error,
                            report.remaining,
                            backoff,
                        );
                        true
                    }
                    None => false,
                }
            }
            Err(e) => {
                log::error!("Outbox: failed to read {}: {}", outbox.path().display(), e);
                true
            }
        };

        let wait = if backing_off {
            let wait = backoff;
            backoff = (backoff * 2).min(timing.max_backoff);
            wait
        } else {
            backoff = timing.initial_backoff;
            timing.flush_interval
        };

        let deadline = Instant::now() + wait;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                msg = rx.recv() => match msg {
                    Some(FlusherMessage::Nudge) if !backing_off => break,
                    Some(FlusherMessage::Nudge) => continue,
                    Some(FlusherMessage::Shutdown) | None => {
                        final_flush(&outbox, gateway.as_ref()).await;
                        return;
                    }
                },
            }
        }
    }
}

async fn final_flush(outbox: &Outbox, gateway: &dyn PersistenceGateway) {
    match outbox.flush_once(gateway).await {
        Ok(report) if report.remaining > 0 => log::warn!(
            "Outbox: shutting down with {} undelivered entries in {}",
            report.remaining,
            outbox.path().display(),
        ),
        Ok(_) => log::info!("Outbox: flusher stopped, nothing pending"),
        Err(e) => log::error!("Outbox: final flush failed: {}", e),
    }
}
