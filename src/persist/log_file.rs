//! Final experiment log: one pretty-printed JSON array of records.

use crate::models::{BiasProbeError, ResponseRecord, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Write the log atomically (temp file, then rename).
pub fn write_log(path: &Path, records: &[ResponseRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| BiasProbeError::io("creating output dir", e))?;
    }

    let temp_path = with_suffix(path, ".tmp");
    {
        let file = File::create(&temp_path)
            .map_err(|e| BiasProbeError::io("creating temp output", e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, records)
            .map_err(|e| BiasProbeError::Internal(format!("Serializing log: {e}")))?;
        writer
            .flush()
            .map_err(|e| BiasProbeError::io("flushing temp output", e))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| BiasProbeError::io("syncing temp output", e))?;
    }

    fs::rename(&temp_path, path).map_err(|e| BiasProbeError::io("renaming output", e))?;
    debug!(path = %path.display(), records = records.len(), "Log written");
    Ok(())
}

/// Read a log previously written by [`write_log`].
pub fn read_log(path: &Path) -> Result<Vec<ResponseRecord>> {
    let content = fs::read_to_string(path).map_err(|e| BiasProbeError::io("reading log", e))?;
    serde_json::from_str(&content)
        .map_err(|e| BiasProbeError::ParseError(format!("Invalid log {}: {e}", path.display())))
}

/// Last-resort dump when the log cannot be written to its configured path.
///
/// Tries `<output>.<unix-seconds>.rescue.json`, then the system temp dir,
/// then stderr. Returns where the records ended up, if on disk.
pub fn dump_fallback(path: &Path, records: &[ResponseRecord]) -> Option<PathBuf> {
    let stamp = chrono::Utc::now().timestamp();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "raw_responses.json".to_string());

    let candidates = [
        with_suffix(path, &format!(".{stamp}.rescue.json")),
        std::env::temp_dir().join(format!("{file_name}.{stamp}.rescue.json")),
    ];

    for candidate in candidates {
        match write_log(&candidate, records) {
            Ok(()) => {
                warn!(path = %candidate.display(), records = records.len(), "Log dumped to fallback path");
                return Some(candidate);
            }
            Err(e) => warn!(path = %candidate.display(), error = %e, "Fallback dump failed"),
        }
    }

    match serde_json::to_string(records) {
        Ok(json) => {
            error!(records = records.len(), "All fallback paths failed, dumping log to stderr");
            eprintln!("{json}");
        }
        Err(e) => error!(error = %e, "Could not serialize log for stderr dump"),
    }
    None
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn records() -> Vec<ResponseRecord> {
        vec![
            ResponseRecord::from_result("p1", "A", "text1", 0, Ok("ok-0".to_string())),
            ResponseRecord::from_result(
                "p1",
                "A",
                "text1",
                1,
                Err(BiasProbeError::Internal("stub failure".to_string())),
            ),
        ]
    }

    #[test]
    fn test_write_log_is_a_json_array() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data").join("raw_responses.json");

        write_log(&path, &records()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let array = value.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["response_text"], "ok-0");
        assert!(array[1].get("response_text").is_none());
        assert!(!with_suffix(&path, ".tmp").exists());

        let back = read_log(&path).unwrap();
        assert_eq!(back[1].error_message(), records()[1].error_message());
    }

    #[test]
    fn test_dump_fallback_when_target_is_a_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.json");
        fs::create_dir_all(&path).unwrap();

        assert!(write_log(&path, &records()).is_err());

        let rescued = dump_fallback(&path, &records()).unwrap();
        assert_eq!(read_log(&rescued).unwrap().len(), 2);
        fs::remove_file(rescued).unwrap();
    }
}
