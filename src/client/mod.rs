//! Provider client module.

mod anthropic;
mod gemini;
mod openai;
mod pacing;
mod provider;
mod registry;

pub use anthropic::*;
pub use gemini::*;
pub use openai::*;
pub use pacing::*;
pub use provider::ProviderAdapter;
pub use registry::*;
