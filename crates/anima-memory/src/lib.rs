//! # anima-memory
//!
//! The memory service: add with dedup and consolidation, semantic query
//! with access bookkeeping and promotions, the read-only tier bootstrap,
//! the tier & resonance rules, and the background job pool that keeps
//! the slow work off the request path.

pub mod catalyst;
pub mod jobs;
pub mod service;
pub mod tiers;

pub use jobs::{Job, JobQueue};
pub use service::{AddOptions, MemoryService, TierSlices};
