//! Persisted campaign results
//!
//! Every record is written the moment it exists; a crash or cancellation
//! mid-campaign loses nothing already gathered. The file journal keeps one
//! JSON-lines file per channel-slot, with the path fixed when the unit is
//! first opened and stable for the campaign's lifetime.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::probe::PerfCheck;
use crate::state::{ChannelId, TestOutcome};

/// One performance-check result for one channel-slot in one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRecord {
    /// 1-based iteration number
    pub iteration: u32,
    /// Channel the check ran on
    pub channel: ChannelId,
    /// Slot the check ran on
    pub slot: usize,
    /// The four sub-results
    pub check: PerfCheck,
    /// Rollup pass flag for this check
    pub passed: bool,
    /// Seconds since the Unix epoch when the record was made
    pub timestamp_secs: u64,
}

/// Final accounting for one tested channel-slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSummary {
    /// Channel
    pub channel: ChannelId,
    /// Slot
    pub slot: usize,
    /// Iterations that produced a record for this slot
    pub iterations: u32,
    /// Wall time the campaign spent, in seconds
    pub duration_secs: u64,
    /// AND of every sub-result across all iterations
    pub outcome: TestOutcome,
    /// Seconds since the Unix epoch at completion or cancellation
    pub finished_at_secs: u64,
}

/// Journal line format: records and summaries share a file, tagged apart.
#[derive(Debug, Serialize)]
enum JournalLine<'a> {
    #[serde(rename = "record")]
    Record(&'a SlotRecord),
    #[serde(rename = "summary")]
    Summary(&'a SlotSummary),
}

/// Seconds since the Unix epoch, saturating at zero on a misset clock.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Destination for campaign results
///
/// Journals cross task boundaries inside actor commands, so implementations
/// must be `Send + Sync`.
pub trait ResultJournal: Send + Sync {
    /// Open (or locate) the journal unit for a channel-slot, returning the
    /// file path if the journal is file-backed. Paths are assigned here, once,
    /// and never change for the campaign's lifetime.
    fn open_unit(&mut self, channel: ChannelId, slot: usize) -> io::Result<Option<PathBuf>>;

    /// Persist one record. Called immediately after each check.
    fn append(&mut self, record: &SlotRecord) -> io::Result<()>;

    /// Persist the final per-slot summaries.
    fn write_summary(&mut self, summaries: &[SlotSummary]) -> io::Result<()>;

    /// Push everything buffered to stable storage.
    fn flush(&mut self) -> io::Result<()>;
}

/// JSON-lines journal, one file per channel-slot
pub struct FileJournal {
    dir: PathBuf,
    prefix: String,
    writers: HashMap<(u8, usize), BufWriter<File>>,
    paths: HashMap<(u8, usize), PathBuf>,
}

impl FileJournal {
    /// Create a journal writing under `dir` with a per-campaign file prefix.
    pub fn new(dir: impl AsRef<Path>, prefix: impl Into<String>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
            writers: HashMap::new(),
            paths: HashMap::new(),
        })
    }

    fn unit_path(&self, channel: ChannelId, slot: usize) -> PathBuf {
        self.dir
            .join(format!("{}_ch{}_slot{}.jsonl", self.prefix, channel, slot))
    }

    fn writer(&mut self, channel: ChannelId, slot: usize) -> io::Result<&mut BufWriter<File>> {
        let key = (channel.get(), slot);
        if !self.writers.contains_key(&key) {
            let path = self.unit_path(channel, slot);
            debug!("opening journal unit {}", path.display());
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.writers.insert(key, BufWriter::new(file));
            self.paths.insert(key, path);
        }
        Ok(self.writers.get_mut(&key).expect("just inserted"))
    }

    fn write_line(&mut self, channel: ChannelId, slot: usize, line: &JournalLine) -> io::Result<()> {
        let json = serde_json::to_string(line).map_err(io::Error::other)?;
        let w = self.writer(channel, slot)?;
        writeln!(w, "{}", json)?;
        // Records must survive a crash; flush each line through to the file
        w.flush()
    }
}

impl ResultJournal for FileJournal {
    fn open_unit(&mut self, channel: ChannelId, slot: usize) -> io::Result<Option<PathBuf>> {
        self.writer(channel, slot)?;
        Ok(self.paths.get(&(channel.get(), slot)).cloned())
    }

    fn append(&mut self, record: &SlotRecord) -> io::Result<()> {
        self.write_line(record.channel, record.slot, &JournalLine::Record(record))
    }

    fn write_summary(&mut self, summaries: &[SlotSummary]) -> io::Result<()> {
        for summary in summaries {
            self.write_line(
                summary.channel,
                summary.slot,
                &JournalLine::Summary(summary),
            )?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        for w in self.writers.values_mut() {
            w.flush()?;
        }
        Ok(())
    }
}

/// In-memory journal for tests
#[derive(Debug, Default)]
pub struct MemoryJournal {
    /// Every appended record, in order
    pub records: Vec<SlotRecord>,
    /// Every written summary, in order
    pub summaries: Vec<SlotSummary>,
    /// Number of explicit flushes
    pub flushes: usize,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultJournal for MemoryJournal {
    fn open_unit(&mut self, _channel: ChannelId, _slot: usize) -> io::Result<Option<PathBuf>> {
        Ok(None)
    }

    fn append(&mut self, record: &SlotRecord) -> io::Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn write_summary(&mut self, summaries: &[SlotSummary]) -> io::Result<()> {
        self.summaries.extend_from_slice(summaries);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
