//! Append-only record journal for interrupted runs.
//!
//! Epistemic foundation:
//! - K_i: Every record is written and flushed before the next call starts
//! - B_i: Journal file may not exist → fresh run
//! - I^B: Crash mid-write → last line may be truncated, skipped on load

use crate::models::{BiasProbeError, RecordKey, ResponseRecord, Result};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// JSONL journal of records produced so far.
pub struct Journal {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl Journal {
    /// Journal path that accompanies a final log path.
    pub fn path_for(output_path: &Path) -> PathBuf {
        let mut name = output_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "raw_responses.json".into());
        name.push(".journal.jsonl");
        output_path.with_file_name(name)
    }

    /// Open a journal for writing.
    ///
    /// `append = true` continues an existing journal; a truncated last line
    /// is terminated first so new records start on a line of their own.
    /// `append = false` starts fresh; a non-empty journal left by an earlier
    /// run is moved aside to `<journal>.<unix-millis>.bak` rather than lost.
    pub fn open(path: &Path, append: bool) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| BiasProbeError::io("creating journal directory", e))?;
        }

        if !append {
            Self::back_up_previous(path)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .map_err(|e| BiasProbeError::io("opening journal", e))?;

        if append && !ends_with_newline(path)? {
            warn!(path = %path.display(), "Journal ends mid-record, terminating the partial line");
            file.write_all(b"\n")
                .map_err(|e| BiasProbeError::io("repairing journal", e))?;
        }

        debug!(path = %path.display(), append, "Journal opened");
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    fn back_up_previous(path: &Path) -> Result<()> {
        let len = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(()),
        };
        if len == 0 {
            return Ok(());
        }

        let mut name = path.as_os_str().to_os_string();
        name.push(format!(".{}.bak", chrono::Utc::now().timestamp_millis()));
        let backup = PathBuf::from(name);
        fs::rename(path, &backup).map_err(|e| BiasProbeError::io("backing up journal", e))?;

        warn!(
            path = %path.display(),
            backup = %backup.display(),
            "Found a journal from an earlier run; starting fresh (use --resume to continue it)"
        );
        Ok(())
    }

    /// Append one record and flush it to disk.
    pub fn append(&mut self, record: &ResponseRecord) -> Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| BiasProbeError::Internal(format!("Failed to serialize record: {e}")))?;

        writeln!(self.writer, "{json}").map_err(|e| BiasProbeError::io("writing journal", e))?;
        self.writer
            .flush()
            .map_err(|e| BiasProbeError::io("flushing journal", e))?;

        self.written += 1;
        Ok(())
    }

    /// Records appended through this handle.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close and delete the journal once the final log is durable.
    pub fn remove(mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| BiasProbeError::io("flushing journal", e))?;
        drop(self.writer);
        fs::remove_file(&self.path).map_err(|e| BiasProbeError::io("removing journal", e))?;
        debug!(path = %self.path.display(), "Journal removed");
        Ok(())
    }

    /// Load journaled records, keyed by work item.
    ///
    /// Returns an empty map if the journal does not exist. Unparseable lines
    /// (typically a truncated final line) are skipped with a warning. When a
    /// key appears more than once, the later record wins.
    pub fn load(path: &Path) -> Result<HashMap<RecordKey, ResponseRecord>> {
        let mut records = HashMap::new();
        if !path.exists() {
            return Ok(records);
        }

        let file = File::open(path).map_err(|e| BiasProbeError::io("opening journal", e))?;
        let reader = BufReader::new(file);

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| BiasProbeError::io("reading journal", e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ResponseRecord>(&line) {
                Ok(record) => {
                    records.insert(record.key(), record);
                }
                Err(e) => {
                    warn!(line = line_num + 1, error = %e, "Skipping unreadable journal line");
                }
            }
        }

        info!(count = records.len(), path = %path.display(), "Loaded journal");
        Ok(records)
    }
}

/// True for an empty or missing file, or one whose last byte is `\n`.
fn ends_with_newline(path: &Path) -> Result<bool> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return Ok(true),
    };
    let len = file
        .metadata()
        .map_err(|e| BiasProbeError::io("reading journal metadata", e))?
        .len();
    if len == 0 {
        return Ok(true);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))
        .and_then(|_| file.read_exact(&mut last))
        .map_err(|e| BiasProbeError::io("reading journal tail", e))?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(prompt_id: &str, trial: u32, text: &str) -> ResponseRecord {
        ResponseRecord::from_result(prompt_id, "A", "prompt", trial, Ok(text.to_string()))
    }

    #[test]
    fn test_path_for_sits_next_to_output() {
        let path = Journal::path_for(Path::new("data/raw_responses.json"));
        assert_eq!(path, PathBuf::from("data/raw_responses.json.journal.jsonl"));
    }

    #[test]
    fn test_append_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("run.journal.jsonl");

        let mut journal = Journal::open(&path, false).unwrap();
        journal.append(&record("p1", 0, "a")).unwrap();
        journal.append(&record("p1", 1, "b")).unwrap();
        assert_eq!(journal.written(), 2);

        let loaded = Journal::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded[&RecordKey::new("p1", "A", 1)].response_text(),
            Some("b")
        );
    }

    #[test]
    fn test_load_skips_truncated_tail() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run.journal.jsonl");

        let mut journal = Journal::open(&path, false).unwrap();
        journal.append(&record("p1", 0, "a")).unwrap();
        drop(journal);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"prompt_id\": \"p1\", \"mod").unwrap();

        let loaded = Journal::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_append_after_truncated_tail_starts_new_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run.journal.jsonl");

        let mut journal = Journal::open(&path, false).unwrap();
        journal.append(&record("p1", 0, "a")).unwrap();
        drop(journal);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"prompt_id\": \"p1\", \"mod").unwrap();
        drop(file);

        let mut journal = Journal::open(&path, true).unwrap();
        journal.append(&record("p1", 1, "b")).unwrap();
        drop(journal);

        let loaded = Journal::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded[&RecordKey::new("p1", "A", 1)].response_text(),
            Some("b")
        );
    }

    #[test]
    fn test_reopen_without_append_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run.journal.jsonl");

        let mut journal = Journal::open(&path, false).unwrap();
        journal.append(&record("p1", 0, "a")).unwrap();
        drop(journal);

        let mut journal = Journal::open(&path, true).unwrap();
        journal.append(&record("p2", 0, "b")).unwrap();
        drop(journal);
        assert_eq!(Journal::load(&path).unwrap().len(), 2);

        let journal = Journal::open(&path, false).unwrap();
        drop(journal);
        assert!(Journal::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_fresh_open_backs_up_previous_journal() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run.journal.jsonl");

        let mut journal = Journal::open(&path, false).unwrap();
        journal.append(&record("p1", 0, "kept")).unwrap();
        drop(journal);

        let journal = Journal::open(&path, false).unwrap();
        drop(journal);
        assert!(Journal::load(&path).unwrap().is_empty());

        let backups: Vec<PathBuf> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().ends_with(".bak"))
            .collect();
        assert_eq!(backups.len(), 1);
        let saved = Journal::load(&backups[0]).unwrap();
        assert_eq!(
            saved[&RecordKey::new("p1", "A", 0)].response_text(),
            Some("kept")
        );
    }

    #[test]
    fn test_remove_deletes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run.journal.jsonl");

        let journal = Journal::open(&path, false).unwrap();
        journal.remove().unwrap();
        assert!(!path.exists());
        assert!(Journal::load(&path).unwrap().is_empty());
    }
}
