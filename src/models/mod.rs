//! Core data models for biasprobe.
//!
//! Epistemic mapping:
//! - K_i (Knowledge): Concrete types with compile-time guarantees
//! - B_i (Beliefs): Wrapped in Result/Option
//! - I^R (Resolvable): Config parameters
//! - I^B (Bounded): Error variants folded into records

mod config;
mod error;
mod record;

pub use config::*;
pub use error::*;
pub use record::*;
