//! Durable match-summary models and sinks.

/// Filesystem-backed summary sink.
pub mod fs_sink;
/// Durable summary model definitions.
pub mod models;
/// Summary sink abstraction.
pub mod sink;
