//! # anima-associations
//!
//! Records which memories surface together and what that co-occurrence
//! is worth. The graph is a table of ordered-pair edges; traversal is a
//! SQL join, so there are no back-pointers on memories.

pub mod engine;

pub use engine::AssociationEngine;
