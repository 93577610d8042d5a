//! # anima-core
//!
//! Foundation crate for the anima memory engine.
//! Defines all models, errors, configuration, and constants.
//! Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod models;

// Re-export the most commonly used types at the crate root.
pub use config::AnimaConfig;
pub use errors::{AnimaError, AnimaResult};
pub use models::memory::{Memory, Tier};
