//! Experiment execution.
//!
//! Provides:
//! - `ExecutionMatrix`: Lazy (prompt, provider, trial) enumeration
//! - `ExperimentEngine`: Paced sequential runner producing the response log

mod matrix;
mod runner;

pub use matrix::*;
pub use runner::*;
