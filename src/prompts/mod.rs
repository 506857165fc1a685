//! Experiment prompt design.

mod designer;

pub use designer::*;
