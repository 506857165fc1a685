//! Persistence for experiment output.
//!
//! Provides:
//! - `Journal`: Per-record JSONL journal, flushed after every record
//! - `write_log` / `read_log`: Final JSON array, written atomically
//! - `dump_fallback`: Rescue path when the final write fails

mod journal;
mod log_file;

pub use journal::*;
pub use log_file::*;
